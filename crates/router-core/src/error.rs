use thiserror::Error;

/// Stable error taxonomy shared by every protocol dialect.
///
/// Configuration and transport errors are expected to surface to the
/// registry (and ultimately the operator); frame-parse and semantic errors
/// are recovered locally by the dispatcher and never reach this type's
/// callers directly — they are logged in place instead.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown dialect: {0}")]
    UnknownDialect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("driver is not ready to accept commands")]
    NotReady,

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("frame-parse error: {0}")]
    FrameParse(String),

    #[error("semantic error: {0}")]
    Semantic(String),
}
