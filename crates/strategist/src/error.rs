use thiserror::Error;

/// Errors from the strategy store.
#[derive(Debug, Error)]
pub enum StrategistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("code name '{0}' must match six uppercase letters")]
    BadCodeName(String),

    #[error("version '{0}' must look like '1.0'")]
    BadVersion(String),

    #[error("a strategy with code name '{0}' already exists")]
    DuplicateCodeName(String),

    #[error("version may not decrease: stored {stored}, given {given}")]
    VersionDecreased { stored: String, given: String },

    #[error("no strategy with code name '{0}'")]
    UnknownCodeName(String),
}

/// A user script failed to compile or raised during evaluation.
///
/// Aborts the enclosing cycle; no orders are placed from a failed run.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{phase} script error at line {line}: {message}")]
pub struct ScriptError {
    /// `"indicators"` or `"decision"`.
    pub phase: &'static str,
    pub line: u32,
    pub message: String,
}

impl ScriptError {
    pub fn new(phase: &'static str, line: u32, message: impl Into<String>) -> Self {
        Self {
            phase,
            line,
            message: message.into(),
        }
    }
}
