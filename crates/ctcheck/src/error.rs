use thiserror::Error;

/// Checker errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] ctcheck_elf::DecodeError),
    #[error("{0}")]
    Cfg(#[from] ctcheck_cfg::CfgError),
    #[error("{0}")]
    Iflow(#[from] ctcheck_iflow::IflowError),
    #[error("invalid secret: {0}")]
    Secret(#[from] ctcheck_isa::LocationError),
    #[error("report serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
