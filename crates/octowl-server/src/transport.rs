//! Association transport seam.
//!
//! The server never touches sockets itself. It asks an
//! [`AssociationTransport`] to open its listen port, hands it a
//! [`CommandHandler`] to run on a background thread, and asks it to stop after
//! the association in progress. [`ChannelTransport`] is an in-process
//! implementation used by tests and embedders that feed commands from their
//! own network code through an [`AssociationSender`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::dimse::{CommandHandler, CommandOutcome, DimseError, DimseMessage, PresentationContext};

/// Association parameters handed to the transport when listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub port: u16,
    pub ae_title: String,
    pub max_receive_pdu_length: u32,
    pub connection_timeout: Duration,
    pub dimse_timeout: Duration,
    pub acse_timeout: Duration,
    pub presentation_contexts: Vec<PresentationContext>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            port: 104,
            ae_title: "WORKLIST_SCP".to_string(),
            max_receive_pdu_length: 16384,
            connection_timeout: Duration::from_secs(30),
            dimse_timeout: Duration::from_secs(30),
            acse_timeout: Duration::from_secs(30),
            presentation_contexts: vec![PresentationContext::worklist_find(1)],
        }
    }
}

impl NetworkSettings {
    pub fn presentation_context(&self, id: u8) -> Option<&PresentationContext> {
        self.presentation_contexts.iter().find(|pc| pc.id == id)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport is already listening")]
    AlreadyListening,

    #[error("Transport is not listening")]
    NotListening,

    #[error("Invalid network settings: {0}")]
    Configuration(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Command(#[from] DimseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The network layer the server drives.
pub trait AssociationTransport: Send + Sync {
    /// Bind the listen port. Fails if the port cannot be opened or the
    /// transport is already listening.
    fn open_listen_port(&self, settings: &NetworkSettings) -> Result<(), TransportError>;

    /// Accept associations and dispatch their commands to `handler` until
    /// [`stop_after_current_association`](Self::stop_after_current_association)
    /// is called. Blocks the calling thread.
    fn accept_associations(&self, handler: Arc<dyn CommandHandler>);

    /// Finish the association in progress, then make
    /// [`accept_associations`](Self::accept_associations) return.
    fn stop_after_current_association(&self);
}

struct Submission {
    context_id: u8,
    message: Option<DimseMessage>,
    reply: mpsc::Sender<Result<CommandOutcome, DimseError>>,
}

/// One open-to-stop span of listening. Each accept loop watches the flag of
/// the session it claimed, so a loop from an earlier session cannot be
/// revived by a later `open_listen_port`.
type Session = Arc<AtomicBool>;

struct ChannelInner {
    sender: mpsc::Sender<Submission>,
    receiver: Mutex<mpsc::Receiver<Submission>>,
    session: Mutex<Option<Session>>,
    // Opened but not yet picked up by an accept loop.
    unclaimed: Mutex<Option<Session>>,
    settings: Mutex<Option<NetworkSettings>>,
    poll_interval: Duration,
}

impl ChannelInner {
    fn is_listening(&self) -> bool {
        self.session.lock().is_some()
    }
}

/// In-process transport fed through [`AssociationSender`]s.
#[derive(Clone)]
pub struct ChannelTransport {
    inner: Arc<ChannelInner>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::with_poll_interval(Duration::from_millis(20))
    }

    /// `poll_interval` bounds how long a stop request waits for the accept
    /// loop to notice it.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            inner: Arc::new(ChannelInner {
                sender,
                receiver: Mutex::new(receiver),
                session: Mutex::new(None),
                unclaimed: Mutex::new(None),
                settings: Mutex::new(None),
                poll_interval,
            }),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.inner.is_listening()
    }

    /// A peer endpoint that submits commands to this transport.
    pub fn connect(&self) -> AssociationSender {
        AssociationSender {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl AssociationTransport for ChannelTransport {
    fn open_listen_port(&self, settings: &NetworkSettings) -> Result<(), TransportError> {
        if settings.presentation_contexts.is_empty() {
            return Err(TransportError::Configuration(
                "no presentation contexts configured".into(),
            ));
        }
        {
            let mut current = self.inner.session.lock();
            if current.is_some() {
                return Err(TransportError::AlreadyListening);
            }
            let session = Arc::new(AtomicBool::new(true));
            *self.inner.unclaimed.lock() = Some(Arc::clone(&session));
            *current = Some(session);
        }
        *self.inner.settings.lock() = Some(settings.clone());
        tracing::debug!(port = settings.port, ae_title = %settings.ae_title, "Channel transport listening");
        Ok(())
    }

    fn accept_associations(&self, handler: Arc<dyn CommandHandler>) {
        let Some(session) = self.inner.unclaimed.lock().take() else {
            tracing::debug!("No listen session to accept on");
            return;
        };
        while session.load(Ordering::SeqCst) {
            let next = self.inner.receiver.lock().recv_timeout(self.inner.poll_interval);
            let submission = match next {
                Ok(submission) => submission,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let context = self
                .inner
                .settings
                .lock()
                .as_ref()
                .and_then(|s| s.presentation_context(submission.context_id).cloned());
            let outcome = match context {
                Some(context) => handler.handle_incoming_command(submission.message.as_ref(), &context),
                None => Err(DimseError::illegal_call(format!(
                    "presentation context {} was not negotiated",
                    submission.context_id
                ))),
            };
            // The peer may have given up waiting.
            let _ = submission.reply.send(outcome);
        }
        tracing::debug!("Channel transport accept loop finished");
    }

    fn stop_after_current_association(&self) {
        let mut current = self.inner.session.lock();
        if let Some(session) = current.take() {
            session.store(false, Ordering::SeqCst);
        }
        *self.inner.unclaimed.lock() = None;
    }
}

/// Submits commands to a [`ChannelTransport`] and waits for the outcome.
#[derive(Clone)]
pub struct AssociationSender {
    inner: Arc<ChannelInner>,
}

impl AssociationSender {
    /// Send `message` on presentation context `context_id`. Waits at most the
    /// DIMSE timeout of the listening settings.
    pub fn send(
        &self,
        context_id: u8,
        message: Option<DimseMessage>,
    ) -> Result<CommandOutcome, TransportError> {
        if !self.inner.is_listening() {
            return Err(TransportError::NotListening);
        }
        let timeout = self
            .inner
            .settings
            .lock()
            .as_ref()
            .map(|s| s.dimse_timeout)
            .unwrap_or(Duration::from_secs(30));

        let (reply, outcome) = mpsc::channel();
        self.inner
            .sender
            .send(Submission {
                context_id,
                message,
                reply,
            })
            .map_err(|_| TransportError::NotListening)?;

        match outcome.recv_timeout(timeout) {
            Ok(result) => Ok(result?),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimse::{CFindRq, CFindRsp};
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    struct Echo {
        seen: AtomicUsize,
    }

    impl CommandHandler for Echo {
        fn handle_incoming_command(
            &self,
            message: Option<&DimseMessage>,
            context: &PresentationContext,
        ) -> Result<CommandOutcome, DimseError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            match message {
                Some(DimseMessage::CFindRq(rq)) => Ok(CommandOutcome::Respond {
                    presentation_context_id: context.id,
                    response: DimseMessage::CFindRsp(CFindRsp::success(rq)),
                }),
                Some(_) => Ok(CommandOutcome::Delegate),
                None => Err(DimseError::illegal_call("empty")),
            }
        }
    }

    fn listening() -> (ChannelTransport, Arc<Echo>, thread::JoinHandle<()>) {
        let transport = ChannelTransport::with_poll_interval(Duration::from_millis(5));
        transport
            .open_listen_port(&NetworkSettings::default())
            .unwrap();
        let handler = Arc::new(Echo {
            seen: AtomicUsize::new(0),
        });
        let accept = transport.clone();
        let dyn_handler: Arc<dyn CommandHandler> = handler.clone();
        let join = thread::spawn(move || accept.accept_associations(dyn_handler));
        wait_until_claimed(&transport);
        (transport, handler, join)
    }

    fn wait_until_claimed(transport: &ChannelTransport) {
        while transport.inner.unclaimed.lock().is_some() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_commands_reach_the_handler() {
        let (transport, handler, join) = listening();
        let peer = transport.connect();

        let outcome = peer
            .send(1, Some(DimseMessage::CFindRq(CFindRq::worklist(7))))
            .unwrap();
        assert!(matches!(
            outcome,
            CommandOutcome::Respond {
                presentation_context_id: 1,
                ..
            }
        ));
        let err = peer.send(1, None).unwrap_err();
        assert!(matches!(err, TransportError::Command(DimseError::IllegalCall(_))));
        assert_eq!(handler.seen.load(Ordering::SeqCst), 2);

        transport.stop_after_current_association();
        join.join().unwrap();
        assert!(!transport.is_listening());
    }

    #[test]
    fn test_unknown_presentation_context_is_rejected() {
        let (transport, handler, join) = listening();
        let err = transport.connect().send(9, None).unwrap_err();
        assert!(matches!(err, TransportError::Command(_)));
        assert_eq!(handler.seen.load(Ordering::SeqCst), 0);
        transport.stop_after_current_association();
        join.join().unwrap();
    }

    #[test]
    fn test_listen_twice_fails_and_send_requires_listening() {
        let transport = ChannelTransport::new();
        assert!(matches!(
            transport.connect().send(1, None),
            Err(TransportError::NotListening)
        ));
        transport
            .open_listen_port(&NetworkSettings::default())
            .unwrap();
        assert!(matches!(
            transport.open_listen_port(&NetworkSettings::default()),
            Err(TransportError::AlreadyListening)
        ));
        transport.stop_after_current_association();
        assert!(transport.open_listen_port(&NetworkSettings::default()).is_ok());
    }

    #[test]
    fn test_quick_restart_does_not_revive_the_old_loop() {
        let (transport, _first_handler, first) = listening();
        transport.stop_after_current_association();
        transport
            .open_listen_port(&NetworkSettings::default())
            .unwrap();

        // The first loop still exits although the transport listens again.
        first.join().unwrap();
        assert!(transport.is_listening());

        let handler = Arc::new(Echo {
            seen: AtomicUsize::new(0),
        });
        let accept = transport.clone();
        let dyn_handler: Arc<dyn CommandHandler> = handler.clone();
        let second = thread::spawn(move || accept.accept_associations(dyn_handler));
        transport
            .connect()
            .send(1, Some(DimseMessage::CFindRq(CFindRq::worklist(1))))
            .unwrap();
        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);

        transport.stop_after_current_association();
        second.join().unwrap();
    }

    #[test]
    fn test_one_accept_loop_per_session() {
        let transport = ChannelTransport::with_poll_interval(Duration::from_millis(5));
        transport
            .open_listen_port(&NetworkSettings::default())
            .unwrap();
        transport.stop_after_current_association();
        // The stopped session was never claimed, so there is nothing to run.
        transport.accept_associations(Arc::new(Echo {
            seen: AtomicUsize::new(0),
        }));

        transport
            .open_listen_port(&NetworkSettings::default())
            .unwrap();
        let first = transport.clone();
        let claimed = thread::spawn(move || {
            first.accept_associations(Arc::new(Echo {
                seen: AtomicUsize::new(0),
            }))
        });
        wait_until_claimed(&transport);
        // A second loop for the same session returns at once.
        transport.accept_associations(Arc::new(Echo {
            seen: AtomicUsize::new(0),
        }));
        assert!(transport.is_listening());
        transport.stop_after_current_association();
        claimed.join().unwrap();
    }

    #[test]
    fn test_settings_without_contexts_are_rejected() {
        let settings = NetworkSettings {
            presentation_contexts: Vec::new(),
            ..NetworkSettings::default()
        };
        let transport = ChannelTransport::new();
        assert!(matches!(
            transport.open_listen_port(&settings),
            Err(TransportError::Configuration(_))
        ));
        assert!(!transport.is_listening());
    }
}
