//! Protocol operations
//!
//! Each operation is an explicit state machine. `start` issues its signature
//! requests and performs the synchronous backend calls; replies then arrive
//! as [`SignatureEvent`]s on the operation's own channel and are applied by
//! `on_signature`. An operation resolves exactly once, either naturally or via
//! `abort`. Once resolved, its channel is closed so replies still in flight
//! at the transport are dropped on arrival.

mod decrypt;
mod generate;
mod verify;

pub(crate) use decrypt::DecryptOperation;
pub(crate) use generate::GenerateNewOperation;
pub(crate) use verify::VerifyKeyOperation;

use tokio::sync::mpsc;

use crate::transport::{ChallengeKind, SignatureEvent, SignatureResponder};

/// Result of feeding an operation an input
#[derive(Debug)]
pub(crate) enum Progress<T> {
    /// Still waiting for signatures
    Pending,
    /// Resolved with the final outcome
    Resolved(T),
}

/// Channel and cancellation flag shared by every operation kind
pub(crate) struct OperationCore {
    events_tx: mpsc::UnboundedSender<SignatureEvent>,
    events_rx: mpsc::UnboundedReceiver<SignatureEvent>,
    resolved: bool,
}

impl OperationCore {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            events_tx,
            events_rx,
            resolved: false,
        }
    }

    /// Responder for a request this operation is about to issue
    pub fn responder(&self, kind: ChallengeKind) -> SignatureResponder {
        SignatureResponder::new(kind, self.events_tx.clone())
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Mark resolved and stop accepting replies
    pub fn resolve(&mut self) {
        self.resolved = true;
        self.events_rx.close();
    }

    /// Wait for the next signature reply
    ///
    /// Never returns once the operation has resolved and its queue is drained.
    pub async fn next_event(&mut self) -> SignatureEvent {
        match self.events_rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[tokio::test]
    async fn test_resolve_closes_channel() {
        let mut core = OperationCore::new();
        let responder = core.responder(ChallengeKind::Salt);
        assert!(!responder.is_abandoned());

        core.resolve();
        assert!(core.is_resolved());
        assert!(responder.is_abandoned());
        responder.respond(Ok(vec![1]));
    }

    #[tokio::test]
    async fn test_next_event_delivers_replies_in_arrival_order() {
        let mut core = OperationCore::new();
        let salt = core.responder(ChallengeKind::Salt);
        let unseal = core.responder(ChallengeKind::Unseal);

        unseal.respond(Err(TransportError::NoSignature("declined".into())));
        salt.respond(Ok(vec![7]));

        assert_eq!(core.next_event().await.kind, ChallengeKind::Unseal);
        assert_eq!(core.next_event().await.kind, ChallengeKind::Salt);
    }
}
