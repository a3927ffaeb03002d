use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;

use commands::{doctor, down, features, init, sync, up};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "bringup")]
#[command(version = VERSION)]
#[command(about = "Local development orchestrator for multi-component platforms")]
struct Cli {
    /// Plain-text output instead of the JSON envelope (where supported)
    #[arg(long, global = true)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring up the components of the selected features
    Up(up::UpArgs),
    /// Push recompiled binaries into running hot-reload components
    Sync(sync::SyncArgs),
    /// Tear down the components of the selected features
    Down(down::DownArgs),
    /// List registered features and their components
    Features(features::FeaturesArgs),
    /// Check the local environment and platform manifest
    Doctor(doctor::DoctorArgs),
    /// Create a starter platform manifest
    Init(init::InitArgs),
}

fn supports_raw(command: &Commands) -> bool {
    matches!(command, Commands::Features(_) | Commands::Doctor(_))
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    // Raw mode is a per-command rendering; commands without one keep
    // the JSON envelope.
    if cli.raw && supports_raw(&cli.command) {
        return match commands::run_raw(cli.command, &global) {
            Ok((content, exit_code)) => {
                print!("{}", content);
                std::process::ExitCode::from(exit_code_to_u8(exit_code))
            }
            Err(err) => {
                let (json_result, exit_code) =
                    output::map_cmd_result_to_json::<serde_json::Value>(Err(err));
                let _ = output::print_json_result(json_result);
                std::process::ExitCode::from(exit_code_to_u8(exit_code))
            }
        };
    }

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    let _ = output::print_json_result(json_result);
    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
