use thiserror::Error;

/// Unrecoverable per-chunk failure; aborts the whole simulation and is
/// surfaced through the progress channel.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("simulation failed: {reason}")]
pub struct SimulationError {
    pub reason: String,
}

impl SimulationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors around a simulation run (I/O, scripts, kernel state).
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Script(#[from] strategist::ScriptError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output encode/decode error: {0}")]
    Codec(String),

    #[error("worker task died: {0}")]
    Worker(String),
}
