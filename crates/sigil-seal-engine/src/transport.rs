//! Challenge transport abstraction
//!
//! The transport delivers a signing request to the external signing authority
//! (smart card, platform-bound key) and hands back its signature. It has no
//! cancellation primitive: once issued, a request runs to completion even if
//! the operation that issued it has been aborted. The engine only suppresses
//! the effect of such late replies.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use sigil_seal_core::{Error as SealError, SignatureAlgorithm};

/// Which challenge a signature answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// Signature over the tag-prefixed salt
    Salt,
    /// Signature over the sealing backend's unsealing challenge
    Unseal,
    /// Signature over a random key verification challenge
    Verify,
}

/// Request to sign `data` with `algorithm`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRequest {
    pub account_id: String,
    /// SubjectPublicKeyInfo DER of the key that must sign
    pub public_key_der: Vec<u8>,
    pub data: Vec<u8>,
    pub algorithm: SignatureAlgorithm,
}

/// Transport-level failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No signature is obtainable (declined, key absent, request dropped)
    #[error("No signature obtained: {0}")]
    NoSignature(String),

    /// The transport asks for the whole attempt to be retried
    #[error("Transient transport failure: {0}")]
    Transient(String),
}

impl From<TransportError> for SealError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NoSignature(reason) => SealError::SignatureUnavailable(reason),
            TransportError::Transient(reason) => SealError::TransportTransient(reason),
        }
    }
}

/// DER signature, or the reason none was obtained
pub type SignatureReply = Result<Vec<u8>, TransportError>;

/// Reply delivered to an operation
#[derive(Debug)]
pub(crate) struct SignatureEvent {
    pub kind: ChallengeKind,
    pub reply: SignatureReply,
}

/// One-shot handle through which a transport completes a request
///
/// Completing the responder after the issuing operation was aborted is a
/// silent no-op. Dropping it without responding counts as
/// [`TransportError::NoSignature`].
pub struct SignatureResponder {
    kind: ChallengeKind,
    events: Option<mpsc::UnboundedSender<SignatureEvent>>,
}

impl SignatureResponder {
    pub(crate) fn new(kind: ChallengeKind, events: mpsc::UnboundedSender<SignatureEvent>) -> Self {
        Self {
            kind,
            events: Some(events),
        }
    }

    /// Which challenge this responder answers
    pub fn kind(&self) -> ChallengeKind {
        self.kind
    }

    /// Whether the issuing operation has already resolved
    pub fn is_abandoned(&self) -> bool {
        self.events.as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Deliver the reply
    pub fn respond(mut self, reply: SignatureReply) {
        self.deliver(reply);
    }

    fn deliver(&mut self, reply: SignatureReply) {
        let Some(events) = self.events.take() else {
            return;
        };
        let event = SignatureEvent {
            kind: self.kind,
            reply,
        };
        if events.send(event).is_err() {
            debug!("Discarding {:?} signature reply for a resolved operation", self.kind);
        }
    }
}

impl Drop for SignatureResponder {
    fn drop(&mut self) {
        if self.events.is_some() {
            self.deliver(Err(TransportError::NoSignature(
                "request dropped by transport".to_string(),
            )));
        }
    }
}

impl std::fmt::Debug for SignatureResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureResponder")
            .field("kind", &self.kind)
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

/// Trait for channels to an external signing authority
///
/// Signatures MUST be deterministic (RFC6979 for ECDSA): the salt signature
/// obtained at generation time is re-obtained at every Decrypt and both must
/// hash to the same passkey.
pub trait ChallengeTransport: Send {
    /// Ask the signing authority to sign `request.data`
    ///
    /// The transport may complete `responder` synchronously or keep it and
    /// complete it later from another task.
    fn request_signature(&mut self, request: SignatureRequest, responder: SignatureResponder);
}

impl<T: ChallengeTransport + ?Sized> ChallengeTransport for Box<T> {
    fn request_signature(&mut self, request: SignatureRequest, responder: SignatureResponder) {
        (**self).request_signature(request, responder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_respond_delivers_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let responder = SignatureResponder::new(ChallengeKind::Salt, tx);
        responder.respond(Ok(vec![1, 2, 3]));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ChallengeKind::Salt);
        assert_eq!(event.reply, Ok(vec![1, 2, 3]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_reports_no_signature() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(SignatureResponder::new(ChallengeKind::Unseal, tx));

        let event = rx.try_recv().unwrap();
        assert!(matches!(event.reply, Err(TransportError::NoSignature(_))));
    }

    #[test]
    fn test_late_reply_is_discarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let responder = SignatureResponder::new(ChallengeKind::Verify, tx);
        rx.close();

        assert!(responder.is_abandoned());
        responder.respond(Ok(vec![9]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            SealError::from(TransportError::NoSignature("declined".into())),
            SealError::SignatureUnavailable("declined".into())
        );
        assert!(SealError::from(TransportError::Transient("reset".into())).is_transient());
    }
}
