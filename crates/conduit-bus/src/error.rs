//! Bus error types.

use std::time::Duration;

use thiserror::Error;

use crate::handler::HandlerError;

#[derive(Debug, Error)]
pub enum BusError {
    /// Publish before `start` or after `stop`.
    #[error("message bus not started")]
    NotRunning,

    #[error("message bus already started")]
    AlreadyStarted,

    /// `start` was called outside a Tokio runtime.
    #[error("no Tokio runtime to run the dispatch loop")]
    NoRuntime,

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// First handler error of a synchronous publish.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// In-flight work outlived the shutdown deadline.
    #[error("shutdown did not complete within {0:?}")]
    Timeout(Duration),

    /// The publisher's cancellation token fired.
    #[error("publish cancelled")]
    Cancelled,

    /// The dispatch loop dropped a synchronous envelope without replying.
    #[error("dispatch aborted before completion")]
    DispatchAborted,
}
