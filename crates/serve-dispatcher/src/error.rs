use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error(transparent)]
    Ledger(#[from] serve_ledger::LedgerError),
    #[error(transparent)]
    Executor(#[from] serve_executor::ExecutorError),
    #[error("turn `{0}` was not found")]
    TurnNotFound(String),
    #[error("turn `{0}` is already terminal")]
    TurnTerminal(String),
    #[error("session `{0}` queue is full")]
    SessionFull(String),
    #[error("thread `{0}` was not found")]
    ThreadNotFound(String),
    #[error(transparent)]
    Turn(#[from] crate::turns::TurnTableError),
}

impl DispatcherError {
    /// JSON-RPC domain error code returned to RPC callers.
    pub fn rpc_code(&self) -> i64 {
        match self {
            DispatcherError::TurnNotFound(_) => -32001,
            DispatcherError::TurnTerminal(_) => -32002,
            DispatcherError::SessionFull(_) => -32003,
            DispatcherError::ThreadNotFound(_) => -32004,
            DispatcherError::Ledger(_) | DispatcherError::Executor(_) | DispatcherError::Turn(_) => -32603,
        }
    }
}
