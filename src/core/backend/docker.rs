use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::core::backend::{
    attach_exit_hints, cargo, failure_tail, ImageBuildRequest, LocalCompileRequest,
    MinimalImageRequest,
};
use crate::core::backend::BuildBackend;
use crate::core::exec;
use crate::core::manifest::Platform;
use crate::core::shell;
use crate::core::{Error, Result};

/// Build backend shelling out to `docker build`, with per-component
/// scratch directories under the platform work dir for generated build
/// inputs.
pub struct DockerBackend {
    work_dir: PathBuf,
}

impl DockerBackend {
    pub fn new(platform: &Platform) -> Self {
        Self {
            work_dir: platform.work_dir(),
        }
    }

    /// Scratch directory for one component's generated build inputs.
    fn scratch_dir(&self, kind: &str, component_id: &str) -> Result<PathBuf> {
        let dir = self.work_dir.join(kind).join(component_id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::internal_io(e, Some(format!("create {}", dir.display()))))?;
        Ok(dir)
    }

    fn run_build(&self, component_id: &str, command: &str) -> Result<()> {
        crate::log_status!("build", "{}: {}", component_id, command);

        // BuildKit honors the per-dockerfile ignore staged next to the
        // dockerfile copy.
        let env = vec![("DOCKER_BUILDKIT".to_string(), "1".to_string())];
        let output = exec::run_shell(command, None, &env)?;
        if !output.success {
            let err = Error::build_image_failed(
                component_id,
                command,
                Some(output.exit_code),
                Some(failure_tail(&output)),
            );
            return Err(attach_exit_hints(err, output.exit_code));
        }
        Ok(())
    }
}

impl BuildBackend for DockerBackend {
    /// Standard from-source build. The dockerfile is staged into the
    /// scratch dir alongside a generated `.dockerignore` that admits
    /// only the component's declared paths, so sibling component
    /// changes never invalidate this build's cache.
    fn build_image(&self, req: &ImageBuildRequest) -> Result<()> {
        let scratch = self.scratch_dir("context", &req.component_id)?;

        let staged_dockerfile = scratch.join("Dockerfile");
        std::fs::copy(&req.dockerfile, &staged_dockerfile).map_err(|e| {
            Error::build_image_failed(
                &req.component_id,
                format!("stage {}", req.dockerfile.display()),
                None,
                Some(e.to_string()),
            )
        })?;

        std::fs::write(scratch.join("Dockerfile.dockerignore"), &req.dockerignore)
            .map_err(|e| Error::internal_io(e, Some("write dockerignore".to_string())))?;

        let mut command = format!(
            "docker build -t {} -f {}",
            shell::quote_arg(&req.image),
            shell::quote_path(&staged_dockerfile.to_string_lossy()),
        );
        for (key, value) in &req.build_env {
            command.push_str(&format!(
                " --build-arg {}",
                shell::quote_arg(&format!("{key}={value}"))
            ));
        }
        command.push_str(&format!(
            " {}",
            shell::quote_path(&req.context_dir.to_string_lossy())
        ));

        self.run_build(&req.component_id, &command)
    }

    /// Minimal runtime image: binary plus config staged as the whole
    /// build context. A content digest of the staged inputs skips the
    /// rebuild when nothing changed.
    fn build_minimal_image(&self, req: &MinimalImageRequest) -> Result<()> {
        let scratch = self.scratch_dir("minimal", &req.component_id)?;

        let binary_name = stage_file(&req.component_id, &req.binary, &scratch)?;
        let config_name = match &req.config {
            Some(config) => Some(stage_file(&req.component_id, config, &scratch)?),
            None => None,
        };

        let digest = staged_digest(&scratch, &req.image, &req.entrypoint_args)?;
        let digest_file = scratch.join(".digest");
        if std::fs::read_to_string(&digest_file).ok().as_deref() == Some(&digest) {
            crate::log_status!(
                "build",
                "{}: minimal image inputs unchanged, skipping rebuild",
                req.component_id
            );
            return Ok(());
        }

        let mut command = format!(
            "docker build -t {} -f {} --build-arg {}",
            shell::quote_arg(&req.image),
            shell::quote_path(&req.dockerfile.to_string_lossy()),
            shell::quote_arg(&format!("BRINGUP_BINARY={binary_name}")),
        );
        if let Some(config_name) = &config_name {
            command.push_str(&format!(
                " --build-arg {}",
                shell::quote_arg(&format!("BRINGUP_CONFIG={config_name}"))
            ));
        }
        if !req.entrypoint_args.is_empty() {
            command.push_str(&format!(
                " --build-arg {}",
                shell::quote_arg(&format!(
                    "BRINGUP_ARGS={}",
                    req.entrypoint_args.join(" ")
                ))
            ));
        }
        command.push_str(&format!(
            " {}",
            shell::quote_path(&scratch.to_string_lossy())
        ));

        self.run_build(&req.component_id, &command)?;

        std::fs::write(&digest_file, digest)
            .map_err(|e| Error::internal_io(e, Some("write digest".to_string())))?;
        Ok(())
    }

    fn compile(&self, req: &LocalCompileRequest) -> Result<()> {
        cargo::compile(req)
    }
}

/// Copy one file into the scratch context, returning its staged name.
fn stage_file(component_id: &str, source: &Path, scratch: &Path) -> Result<String> {
    let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::internal_unexpected(format!("path has no file name: {}", source.display()))
        })?
        .to_string();

    std::fs::copy(source, scratch.join(&name)).map_err(|e| {
        Error::build_image_failed(
            component_id,
            format!("stage {}", source.display()),
            None,
            Some(e.to_string()),
        )
    })?;

    Ok(name)
}

/// Content digest over every staged file plus the image ref and
/// entrypoint args. Sorted walk keeps the digest stable.
fn staged_digest(scratch: &Path, image: &str, args: &[String]) -> Result<String> {
    let mut names: Vec<PathBuf> = std::fs::read_dir(scratch)
        .map_err(|e| Error::internal_io(e, Some(format!("read {}", scratch.display()))))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.file_name().map(|n| n != ".digest").unwrap_or(false))
        .collect();
    names.sort();

    let mut hasher = Sha256::new();
    hasher.update(image.as_bytes());
    for arg in args {
        hasher.update(arg.as_bytes());
    }
    for path in names {
        let content = std::fs::read(&path)
            .map_err(|e| Error::internal_io(e, Some(format!("read {}", path.display()))))?;
        hasher.update(path.file_name().unwrap_or_default().as_encoded_bytes());
        hasher.update(&content);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}
