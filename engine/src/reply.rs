//! One-shot reply endpoints supplied alongside a request.

use serde_json::Value;
use tokio::sync::oneshot;

use fledge_types::AuctionResponse;

/// A caller-supplied endpoint on which at most one reply is posted.
#[derive(Debug)]
pub struct ReplyPort {
    tx: oneshot::Sender<Value>,
}

impl ReplyPort {
    /// A fresh port and the receiver its reply arrives on.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Post the wire encoding of `response`, consuming the port.
    pub fn post(self, response: &AuctionResponse) {
        if self.tx.send(response.to_wire()).is_err() {
            tracing::debug!("Reply port receiver dropped before reply was posted");
        }
    }
}
