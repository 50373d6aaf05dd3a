//! Per-publish envelopes carried by the bus queue.

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::handler::{Delivery, HandlerError};
use crate::message::SharedMessage;

pub(crate) type Completion = oneshot::Sender<Result<(), HandlerError>>;

pub(crate) struct Envelope {
    pub(crate) message: SharedMessage,
    pub(crate) delivery: Delivery,
    /// Present only for `Delivery::Sync`.
    pub(crate) completion: Option<Completion>,
    pub(crate) cancel: CancellationToken,
}

impl Envelope {
    pub(crate) fn fire_and_forget(message: SharedMessage, cancel: CancellationToken) -> Self {
        Self {
            message,
            delivery: Delivery::Async,
            completion: None,
            cancel,
        }
    }

    pub(crate) fn awaiting(
        message: SharedMessage,
        completion: Completion,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            message,
            delivery: Delivery::Sync,
            completion: Some(completion),
            cancel,
        }
    }
}
