pub mod backend;
pub mod component;
pub mod context_filter;
pub mod dispatch;
pub mod error;
pub mod exec;
pub mod feature;
pub mod manifest;
pub mod materialize;
pub mod preflight;
pub mod secrets;
pub mod shell;

pub use error::{Error, ErrorCode, Result};
