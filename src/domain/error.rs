use thiserror::Error;

/// Local state-machine failures. Transport errors are never wrapped in this.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainerError {
    /// The handle was removed locally and can no longer be driven.
    #[error("container {id} já foi removido")]
    Removed { id: String },

    /// The engine answered inspect without a `State` section.
    #[error("inspect de {id} não trouxe a seção State")]
    InconsistentPayload { id: String },
}

/// A command ran inside a container and exited non-zero.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{command} saiu com código {code}")]
pub struct ExecError {
    /// Program name (first argv element)
    pub command: String,
    pub args: Vec<String>,
    /// `-1` when the engine did not report an exit code
    pub code: i64,
    /// Captured stdout followed by captured stderr
    pub output: String,
}
