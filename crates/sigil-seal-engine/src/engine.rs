//! Challenge credentials engine
//!
//! The engine is an actor: one tokio task owns the readiness gate, the live
//! operation and the transport bound to it. [`EngineHandle`] methods enqueue a
//! command and return a [`PendingResult`]. Commands are handled in submission
//! order and at most one operation is alive at a time; a new command aborts
//! the previous operation with [`Error::Superseded`] before it starts.
//!
//! Completions are sent only after the engine has dropped the finished
//! operation and its transport, so a caller awaiting a result can never
//! observe (or re-enter) a half-torn-down engine.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use sigil_seal_core::{
    ChallengeInfo, Error, GenerateOrDecryptResult, PlatformRestrictions, PublicKeyInfo, Result,
    MAX_DECRYPT_ATTEMPTS,
};

use crate::backend::SealingBackend;
use crate::operation::{DecryptOperation, GenerateNewOperation, Progress, VerifyKeyOperation};
use crate::readiness::{Capabilities, ReadinessGate};
use crate::transport::{ChallengeTransport, SignatureEvent};

/// Input of a GenerateNew call
#[derive(Debug, Clone)]
pub struct GenerateNewRequest {
    pub account_id: String,
    pub public_key_info: PublicKeyInfo,
    /// Platform states under which the secret may be unsealed
    pub restrictions: PlatformRestrictions,
    /// Obfuscated username the secret is bound to
    pub obfuscated_username: String,
}

/// Input of a Decrypt call
#[derive(Debug, Clone)]
pub struct DecryptRequest {
    pub account_id: String,
    /// Key info for the current attempt; its algorithm list drives the
    /// unsealing challenge
    pub public_key_info: PublicKeyInfo,
    /// Metadata persisted by GenerateNew
    pub challenge_info: ChallengeInfo,
    pub locked_to_single_user: bool,
}

/// Input of a VerifyKey call
#[derive(Debug, Clone)]
pub struct VerifyKeyRequest {
    pub account_id: String,
    pub public_key_info: PublicKeyInfo,
}

type GenerateOrDecryptReply = oneshot::Sender<Result<GenerateOrDecryptResult>>;
type Admitted<T> = (Box<dyn ChallengeTransport>, oneshot::Sender<Result<T>>);

enum Command {
    GenerateNew {
        request: GenerateNewRequest,
        transport: Box<dyn ChallengeTransport>,
        reply: GenerateOrDecryptReply,
    },
    Decrypt {
        request: DecryptRequest,
        transport: Box<dyn ChallengeTransport>,
        reply: GenerateOrDecryptReply,
    },
    VerifyKey {
        request: VerifyKeyRequest,
        transport: Box<dyn ChallengeTransport>,
        reply: oneshot::Sender<Result<bool>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Operation in flight together with its caller's completion slot
enum InFlight {
    GenerateNew {
        op: GenerateNewOperation,
        reply: GenerateOrDecryptReply,
    },
    Decrypt {
        op: DecryptOperation,
        reply: GenerateOrDecryptReply,
        attempt: u32,
    },
    VerifyKey {
        op: VerifyKeyOperation,
        reply: oneshot::Sender<Result<bool>>,
    },
}

/// The live operation and the transport bound to it
struct Current {
    in_flight: InFlight,
    transport: Box<dyn ChallengeTransport>,
}

/// Engine task state
pub struct ChallengeCredentialsEngine {
    backend: Arc<dyn SealingBackend>,
    readiness: ReadinessGate,
    commands: mpsc::UnboundedReceiver<Command>,
    current: Option<Current>,
}

impl ChallengeCredentialsEngine {
    /// Spawn the engine task on the current tokio runtime
    pub fn spawn(backend: Arc<dyn SealingBackend>, capabilities: Capabilities) -> EngineHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        info!(
            "Starting challenge credentials engine ({} backend)",
            backend.backend_type()
        );
        let engine = Self {
            backend,
            readiness: ReadinessGate::new(capabilities),
            commands: rx,
            current: None,
        };
        tokio::spawn(engine.run());
        EngineHandle { commands: tx }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        self.abort_current(Error::EngineStopped);
                        break;
                    }
                },
                event = next_event(&mut self.current) => self.handle_event(event),
            }
        }
        info!("Challenge credentials engine stopped");
    }

    /// Returns `false` once the engine should stop
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::GenerateNew {
                request,
                transport,
                reply,
            } => {
                if let Some((transport, reply)) = self.admit(transport, reply) {
                    self.start_generate(GenerateNewOperation::new(request), transport, reply);
                }
            }
            Command::Decrypt {
                request,
                transport,
                reply,
            } => {
                if let Some((transport, reply)) = self.admit(transport, reply) {
                    self.start_decrypt(DecryptOperation::new(request), transport, reply, 1);
                }
            }
            Command::VerifyKey {
                request,
                transport,
                reply,
            } => {
                if let Some((transport, reply)) = self.admit(transport, reply) {
                    self.start_verify(VerifyKeyOperation::new(request), transport, reply);
                }
            }
            Command::Shutdown { reply } => {
                self.abort_current(Error::EngineStopped);
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    /// Readiness check, then supersede whatever is in flight
    ///
    /// On a failed check the error is sent right away, the caller's transport
    /// is dropped and the live operation is left alone.
    fn admit<T>(
        &mut self,
        transport: Box<dyn ChallengeTransport>,
        reply: oneshot::Sender<Result<T>>,
    ) -> Option<Admitted<T>> {
        if let Err(e) = self.readiness.check(self.backend.as_ref()) {
            warn!("Refusing operation: {}", e);
            drop(transport);
            let _ = reply.send(Err(e));
            return None;
        }
        self.abort_current(Error::Superseded);
        Some((transport, reply))
    }

    fn start_generate(
        &mut self,
        mut op: GenerateNewOperation,
        mut transport: Box<dyn ChallengeTransport>,
        reply: GenerateOrDecryptReply,
    ) {
        match op.start(self.backend.as_ref(), transport.as_mut()) {
            Progress::Pending => {
                self.current = Some(Current {
                    in_flight: InFlight::GenerateNew { op, reply },
                    transport,
                });
            }
            Progress::Resolved(result) => {
                drop(op);
                drop(transport);
                let _ = reply.send(result);
            }
        }
    }

    fn start_decrypt(
        &mut self,
        mut op: DecryptOperation,
        mut transport: Box<dyn ChallengeTransport>,
        reply: GenerateOrDecryptReply,
        attempt: u32,
    ) {
        debug!("Starting Decrypt attempt {}/{}", attempt, MAX_DECRYPT_ATTEMPTS);
        match op.start(self.backend.as_ref(), transport.as_mut()) {
            Progress::Pending => {
                self.current = Some(Current {
                    in_flight: InFlight::Decrypt { op, reply, attempt },
                    transport,
                });
            }
            Progress::Resolved(result) => {
                self.finish_decrypt(op, transport, reply, attempt, result);
            }
        }
    }

    fn start_verify(
        &mut self,
        mut op: VerifyKeyOperation,
        mut transport: Box<dyn ChallengeTransport>,
        reply: oneshot::Sender<Result<bool>>,
    ) {
        match op.start(transport.as_mut()) {
            Progress::Pending => {
                self.current = Some(Current {
                    in_flight: InFlight::VerifyKey { op, reply },
                    transport,
                });
            }
            Progress::Resolved(valid) => {
                drop(op);
                drop(transport);
                let _ = reply.send(Ok(valid));
            }
        }
    }

    /// Retry a transient Decrypt failure, or deliver the outcome
    fn finish_decrypt(
        &mut self,
        op: DecryptOperation,
        transport: Box<dyn ChallengeTransport>,
        reply: GenerateOrDecryptReply,
        attempt: u32,
        result: Result<GenerateOrDecryptResult>,
    ) {
        match result {
            Err(e) if e.is_transient() && attempt < MAX_DECRYPT_ATTEMPTS => {
                warn!(
                    "Decrypt attempt {}/{} failed with a transient error, retrying: {}",
                    attempt, MAX_DECRYPT_ATTEMPTS, e
                );
                let retry = DecryptOperation::new(op.into_request());
                self.start_decrypt(retry, transport, reply, attempt + 1);
            }
            result => {
                if let Err(e) = &result {
                    if e.is_transient() {
                        warn!("Decrypt failed after {} attempts: {}", attempt, e);
                    }
                }
                drop(op);
                drop(transport);
                let _ = reply.send(result);
            }
        }
    }

    fn handle_event(&mut self, event: SignatureEvent) {
        let Some(Current {
            in_flight,
            transport,
        }) = self.current.take()
        else {
            return;
        };

        match in_flight {
            InFlight::GenerateNew { mut op, reply } => match op.on_signature(event) {
                Progress::Pending => {
                    self.current = Some(Current {
                        in_flight: InFlight::GenerateNew { op, reply },
                        transport,
                    });
                }
                Progress::Resolved(result) => {
                    drop(op);
                    drop(transport);
                    let _ = reply.send(result);
                }
            },
            InFlight::Decrypt {
                mut op,
                reply,
                attempt,
            } => match op.on_signature(event) {
                Progress::Pending => {
                    self.current = Some(Current {
                        in_flight: InFlight::Decrypt { op, reply, attempt },
                        transport,
                    });
                }
                Progress::Resolved(result) => {
                    self.finish_decrypt(op, transport, reply, attempt, result)
                }
            },
            InFlight::VerifyKey { mut op, reply } => match op.on_signature(event) {
                Progress::Pending => {
                    self.current = Some(Current {
                        in_flight: InFlight::VerifyKey { op, reply },
                        transport,
                    });
                }
                Progress::Resolved(valid) => {
                    drop(op);
                    drop(transport);
                    let _ = reply.send(Ok(valid));
                }
            },
        }
    }

    /// Abort the live operation, if any, resolving it with `error`
    fn abort_current(&mut self, error: Error) {
        let Some(Current {
            in_flight,
            transport,
        }) = self.current.take()
        else {
            return;
        };
        info!("Aborting in-flight operation: {}", error);
        match in_flight {
            InFlight::GenerateNew { mut op, reply } => {
                op.abort();
                drop(op);
                drop(transport);
                let _ = reply.send(Err(error));
            }
            InFlight::Decrypt { mut op, reply, .. } => {
                op.abort();
                drop(op);
                drop(transport);
                let _ = reply.send(Err(error));
            }
            InFlight::VerifyKey { mut op, reply } => {
                op.abort();
                drop(op);
                drop(transport);
                let _ = reply.send(Err(error));
            }
        }
    }
}

/// Next reply for the live operation; pends while nothing is in flight
async fn next_event(current: &mut Option<Current>) -> SignatureEvent {
    match current {
        Some(current) => match &mut current.in_flight {
            InFlight::GenerateNew { op, .. } => op.core_mut().next_event().await,
            InFlight::Decrypt { op, .. } => op.core_mut().next_event().await,
            InFlight::VerifyKey { op, .. } => op.core_mut().next_event().await,
        },
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    /// Seal a fresh secret and produce its passkey and challenge info
    pub fn generate_new(
        &self,
        request: GenerateNewRequest,
        transport: impl ChallengeTransport + 'static,
    ) -> PendingResult<GenerateOrDecryptResult> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GenerateNew {
            request,
            transport: Box::new(transport),
            reply,
        });
        PendingResult { rx }
    }

    /// Recover the passkey from persisted challenge info
    pub fn decrypt(
        &self,
        request: DecryptRequest,
        transport: impl ChallengeTransport + 'static,
    ) -> PendingResult<GenerateOrDecryptResult> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Decrypt {
            request,
            transport: Box::new(transport),
            reply,
        });
        PendingResult { rx }
    }

    /// Check that the signing authority answers with a valid signature
    pub fn verify_key(
        &self,
        request: VerifyKeyRequest,
        transport: impl ChallengeTransport + 'static,
    ) -> PendingResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::VerifyKey {
            request,
            transport: Box::new(transport),
            reply,
        });
        PendingResult { rx }
    }

    /// Stop the engine; an operation in flight resolves with `EngineStopped`
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply });
        let _ = rx.await;
    }

    /// Whether the engine task has stopped
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) {
        // A stopped engine drops the command and with it the reply sender
        if self.commands.send(command).is_err() {
            debug!("Command sent to a stopped engine");
        }
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Completion of an engine call
///
/// Resolves to [`Error::EngineStopped`] if the engine went away before
/// answering.
#[derive(Debug)]
#[must_use = "the engine result is only observable by awaiting it"]
pub struct PendingResult<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for PendingResult<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::EngineStopped)),
            Poll::Pending => Poll::Pending,
        }
    }
}
