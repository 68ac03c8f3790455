//! Pairing session orchestration
//!
//! Drives one pairing attempt from connection to cleanup:
//! 1. Open a conduit connection scoped to the session directory
//! 2. If unregistered, request a pairing code and reply to the caller
//! 3. Wait for the link to open, reconnecting on transient disconnects
//! 4. Poll the session directory for credential material
//! 5. Package the credential and send it to the linked account
//! 6. Close the conduit and remove the session directory
//!
//! The reply to the caller is sent at step 2 (or on early failure); everything
//! after it runs detached from the request. A connection that drops during
//! steps 4 or 5 goes back to step 3 on the same directory.

use crate::codes::{communion_code, normalize_number, reply_timestamp};
use crate::payload::TransmissionPayload;
use crate::responder::{PairingReply, Responder};
use crate::session::{Session, SessionState};
use crate::session_id::{SessionId, SessionIdFormat};
use crate::store::{is_valid_credential, CredentialStore};
use chrono::{Local, Utc};
use futures::FutureExt;
use pairlink_core::{
    Conduit, ConduitConnector, ConduitEvent, ConduitOptions, ConduitSession, Config,
    ConnectConfig, ConnectionState, Disconnect, InteractiveMessage, MessageTemplate, RetryPolicy,
    SessionPolicy,
};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Why a pairing session ended without delivering credentials
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("Conduit transport failure: {0}")]
    Transport(#[from] pairlink_core::Error),
    #[error("Link did not open within {attempts} attempts")]
    LinkTimeout { attempts: u32 },
    #[error("Credential material not captured after {attempts} attempts")]
    CredentialTimeout { attempts: u32 },
    #[error("Transmission failed after {attempts} attempts: {last}")]
    Transmission { attempts: u32, last: String },
    #[error("Link was logged out by the account")]
    LoggedOut,
    #[error("Gave up after {0} reconnects")]
    ReconnectsExhausted(u32),
    #[error("Session is already registered")]
    AlreadyRegistered,
    #[error("Failed to package credentials: {0}")]
    Packaging(#[source] std::io::Error),
    #[error("Session driver aborted")]
    Aborted,
}

pub type PairingResult<T> = Result<T, PairingError>;

/// Final report of one session
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub state: SessionState,
    pub reconnects: u32,
    pub cleaned: bool,
    pub error: Option<PairingError>,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A started session: the pending reply and the detached lifecycle task
pub struct SessionHandle {
    pub session_id: SessionId,
    pub reply: oneshot::Receiver<PairingReply>,
    pub task: JoinHandle<SessionOutcome>,
}

/// Result of waiting on connection events
#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkStatus {
    Open,
    Closed(Option<Disconnect>),
}

/// Why delivery over an open link stopped
#[derive(Debug)]
enum Interrupt {
    /// The connection closed after the link opened
    Dropped(Option<Disconnect>),
    Failed(PairingError),
}

impl From<PairingError> for Interrupt {
    fn from(err: PairingError) -> Self {
        Interrupt::Failed(err)
    }
}

/// One open conduit connection and its event stream
struct Link {
    id: SessionId,
    conduit: Box<dyn Conduit>,
    events: mpsc::Receiver<ConduitEvent>,
    events_open: bool,
    opened: bool,
    status: Option<LinkStatus>,
}

impl Link {
    fn new(id: SessionId, session: ConduitSession) -> Self {
        Self {
            id,
            conduit: session.conduit,
            events: session.events,
            events_open: true,
            opened: false,
            status: None,
        }
    }

    /// Persist credentials or translate a connection update
    ///
    /// Saving is bounded by `deadline`, the end of the current wait.
    async fn handle(&mut self, event: ConduitEvent, deadline: Instant) -> Option<LinkStatus> {
        match event {
            ConduitEvent::CredsUpdate => {
                match timeout_at(deadline, self.conduit.save_credentials()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("[{}] Failed to persist credentials: {}", self.id, e),
                    Err(_) => warn!("[{}] Credential save outlasted the current wait", self.id),
                }
                None
            }
            ConduitEvent::ConnectionUpdate(update) => match update.connection {
                Some(ConnectionState::Open) => Some(LinkStatus::Open),
                Some(ConnectionState::Close) => Some(LinkStatus::Closed(update.last_disconnect)),
                Some(ConnectionState::Connecting) => {
                    debug!("[{}] Conduit is connecting", self.id);
                    None
                }
                _ => None,
            },
        }
    }

    fn note(&mut self, status: LinkStatus) {
        if self.opened {
            if let LinkStatus::Closed(ref disconnect) = status {
                warn!(
                    "[{}] Connection closed after link opened (status {:?})",
                    self.id,
                    disconnect.as_ref().and_then(|d| d.status_code())
                );
            }
        }
        self.status = Some(status);
    }

    /// Whether the connection closed after the link opened
    fn dropped(&self) -> bool {
        self.opened && matches!(self.status, Some(LinkStatus::Closed(_)))
    }

    /// Wait for `duration` while servicing conduit events
    ///
    /// Returns early once the link has dropped.
    async fn idle(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.dropped() {
            if !self.events_open {
                if self.opened {
                    self.note(LinkStatus::Closed(None));
                    continue;
                }
                sleep_until(deadline).await;
                return;
            }
            tokio::select! {
                _ = sleep_until(deadline) => return,
                event = self.events.recv() => match event {
                    Some(event) => {
                        if let Some(status) = self.handle(event, deadline).await {
                            self.note(status);
                        }
                    }
                    None => self.events_open = false,
                },
            }
        }
    }

    /// Surface a drop recorded while idling
    fn check(&mut self) -> Result<(), Interrupt> {
        match self.status.take() {
            Some(LinkStatus::Closed(disconnect)) if self.opened => {
                Err(Interrupt::Dropped(disconnect))
            }
            status => {
                self.status = status;
                Ok(())
            }
        }
    }

    /// Idle for `duration`, then report a drop if one happened
    async fn settle(&mut self, duration: Duration) -> Result<(), Interrupt> {
        self.idle(duration).await;
        self.check()
    }

    /// Wait for the connection to open or close, bounded by `policy`
    async fn wait_for_status(&mut self, policy: &RetryPolicy) -> PairingResult<LinkStatus> {
        if let Some(status) = self.status.take() {
            self.opened = status == LinkStatus::Open;
            return Ok(status);
        }

        let deadline = Instant::now() + policy.window();
        loop {
            if !self.events_open {
                return Err(pairlink_core::Error::ConduitClosed.into());
            }
            tokio::select! {
                _ = sleep_until(deadline) => {
                    return Err(PairingError::LinkTimeout { attempts: policy.attempts() });
                }
                event = self.events.recv() => match event {
                    Some(event) => {
                        if let Some(status) = self.handle(event, deadline).await {
                            self.opened = status == LinkStatus::Open;
                            return Ok(status);
                        }
                    }
                    None => self.events_open = false,
                },
            }
        }
    }

    /// Send `message` to the linked account itself
    async fn send(&self, message: &InteractiveMessage) -> pairlink_core::Result<()> {
        let recipient = self.conduit.self_id().await?.ok_or_else(|| {
            pairlink_core::Error::request_failed("selfId", "linked account id is not known yet")
        })?;
        self.conduit
            .send_interactive_message(&recipient, message)
            .await
    }

    /// Close the connection; errors are logged only
    async fn close(self) {
        match self.conduit.close().await {
            Ok(()) => debug!("[{}] Conduit closed", self.id),
            Err(e) => warn!("[{}] Error while closing conduit: {}", self.id, e),
        }
    }

    /// Close the connection and fail with `err`
    async fn abandon<T>(self, err: PairingError) -> PairingResult<T> {
        self.close().await;
        Err(err)
    }
}

/// Runs pairing sessions against a conduit connector
pub struct PairingOrchestrator {
    connector: Arc<dyn ConduitConnector>,
    store: CredentialStore,
    ids: SessionIdFormat,
    policy: SessionPolicy,
    options: ConduitOptions,
    template: MessageTemplate,
    active: AtomicUsize,
}

impl PairingOrchestrator {
    /// Create an orchestrator from the application configuration
    pub fn new(
        connector: Arc<dyn ConduitConnector>,
        store: CredentialStore,
        config: &Config,
    ) -> Self {
        Self {
            connector,
            store,
            ids: SessionIdFormat::new(&config.session_prefix),
            policy: config.policy.clone(),
            options: config.conduit.clone(),
            template: config.message.clone(),
            active: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Number of sessions whose lifecycle is still running
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a session for `number` on a detached task
    pub fn start(self: &Arc<Self>, number: &str) -> SessionHandle {
        let session_id = self.ids.generate();
        let dir = self.store.session_dir(session_id.as_str());
        let session = Session::new(session_id.clone(), number.to_string(), dir);
        let (responder, reply) = Responder::channel();

        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run(session, responder).await });

        SessionHandle {
            session_id,
            reply,
            task,
        }
    }

    /// Start a session and wait only for its reply
    pub async fn pair(self: &Arc<Self>, number: &str) -> PairingReply {
        let handle = self.start(number);
        match handle.reply.await {
            Ok(reply) => reply,
            Err(_) => {
                error!("[{}] Session ended without a reply", handle.session_id);
                PairingReply::dispersion()
            }
        }
    }

    /// Run a session to completion; cleanup happens exactly once on every path
    pub async fn run(&self, mut session: Session, mut responder: Responder) -> SessionOutcome {
        self.active.fetch_add(1, Ordering::SeqCst);
        info!("[{}] Pairing session started", session.id());

        let result = AssertUnwindSafe(self.drive(&mut session, &mut responder))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!("[{}] Session driver panicked", session.id());
                Err(PairingError::Aborted)
            });

        let elapsed = (Utc::now() - session.created_at()).num_seconds();
        match &result {
            Ok(()) => info!(
                "[{}] Pairing session completed in {}s",
                session.id(),
                elapsed
            ),
            Err(e) => {
                session.fail();
                warn!(
                    "[{}] Pairing session failed after {}s: {}",
                    session.id(),
                    elapsed,
                    e
                );
            }
        }

        if responder.complete_if_pending(PairingReply::dispersion()) {
            warn!("[{}] Session ended before a pairing code was issued", session.id());
        }

        let cleaned = session.cleanup(&self.store).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        SessionOutcome {
            session_id: session.id().clone(),
            state: session.state(),
            reconnects: session.reconnects(),
            cleaned,
            error: result.err(),
        }
    }

    async fn drive(&self, session: &mut Session, responder: &mut Responder) -> PairingResult<()> {
        let mut link = self.establish(session, responder).await?;
        let mut payload = None;

        loop {
            match self.deliver(session, &mut link, &mut payload).await {
                Ok(()) => break,
                Err(Interrupt::Failed(e)) => return link.abandon(e).await,
                Err(Interrupt::Dropped(disconnect)) => {
                    self.reconnect_after(session, link, disconnect).await?;
                    link = self.establish(session, responder).await?;
                }
            }
        }

        session.transition(SessionState::Closing);
        link.idle(self.policy.close_delay).await;
        link.close().await;
        info!("[{}] Conduit closed gracefully", session.id());
        Ok(())
    }

    /// Capture, package and send the credential over an open link
    ///
    /// A payload packaged before a drop is kept and sent on the next link.
    async fn deliver(
        &self,
        session: &mut Session,
        link: &mut Link,
        payload: &mut Option<TransmissionPayload>,
    ) -> Result<(), Interrupt> {
        session.transition(SessionState::LinkOpen);
        info!("[{}] Link established", session.id());
        link.settle(self.policy.link_settle).await?;

        if payload.is_none() {
            session.transition(SessionState::AwaitingCredential);
            let credential = self.capture_credential(session, link).await?;

            session.transition(SessionState::Packaging);
            let packaged = TransmissionPayload::build(&self.template.payload_prefix, &credential)
                .map_err(PairingError::Packaging)?;
            debug!("[{}] Payload packaged ({} chars)", session.id(), packaged.len());
            *payload = Some(packaged);
        } else {
            debug!("[{}] Resuming transmission of packaged credential", session.id());
        }

        session.transition(SessionState::Transmitting);
        link.settle(self.policy.transmit_settle).await?;
        if let Some(payload) = payload {
            self.transmit(session, link, payload).await?;
        }
        Ok(())
    }

    /// Connect until the link opens, following reconnects
    async fn establish(
        &self,
        session: &mut Session,
        responder: &mut Responder,
    ) -> PairingResult<Link> {
        loop {
            session.transition(SessionState::Connecting);
            let config = ConnectConfig {
                auth_dir: session.dir().clone(),
                options: self.options.clone(),
            };

            let conduit = match self.connector.connect(config).await {
                Ok(conduit) => conduit,
                Err(e) => {
                    error!("[{}] Conduit connection failed: {}", session.id(), e);
                    responder.complete_if_pending(PairingReply::sealed());
                    return Err(e.into());
                }
            };
            let mut link = Link::new(session.id().clone(), conduit);

            if let Err(e) = self.request_code(session, responder, &mut link).await {
                error!("[{}] Pairing code request failed: {}", session.id(), e);
                if matches!(e, PairingError::Transport(_)) {
                    responder.complete_if_pending(PairingReply::sealed());
                }
                return link.abandon(e).await;
            }

            let disconnect = match link.wait_for_status(&self.policy.link).await {
                Ok(LinkStatus::Open) => return Ok(link),
                Ok(LinkStatus::Closed(disconnect)) => disconnect,
                Err(e) => return link.abandon(e).await,
            };
            self.reconnect_after(session, link, disconnect).await?;
        }
    }

    /// Close a dropped link and wait before reconnecting
    ///
    /// Fails instead when the account logged out or the reconnect budget is spent.
    async fn reconnect_after(
        &self,
        session: &mut Session,
        link: Link,
        disconnect: Option<Disconnect>,
    ) -> PairingResult<()> {
        let status = disconnect.as_ref().and_then(|d| d.status_code());
        if disconnect.as_ref().is_some_and(|d| d.is_logged_out()) {
            info!("[{}] Link logged out, not reconnecting", session.id());
            return link.abandon(PairingError::LoggedOut).await;
        }

        let limit = self.policy.reconnect.attempts();
        if session.reconnects() >= limit {
            return link
                .abandon(PairingError::ReconnectsExhausted(session.reconnects()))
                .await;
        }

        link.close().await;
        let attempt = session.begin_reconnect();
        warn!(
            "[{}] Connection closed (status {:?}), reconnecting ({}/{})",
            session.id(),
            status,
            attempt,
            limit
        );
        sleep(self.policy.reconnect.delay()).await;
        Ok(())
    }

    /// Request a pairing code when the conduit is unregistered and no reply went out yet
    async fn request_code(
        &self,
        session: &mut Session,
        responder: &mut Responder,
        link: &mut Link,
    ) -> PairingResult<()> {
        if link.conduit.is_registered().await? {
            if responder.is_pending() {
                return Err(PairingError::AlreadyRegistered);
            }
            return Ok(());
        }

        if !responder.is_pending() {
            // A new code would invalidate the one the caller already holds
            debug!("[{}] Still unregistered after reconnect", session.id());
            return Ok(());
        }

        session.transition(SessionState::CodeRequested);
        link.idle(self.policy.pre_code_delay).await;

        let number = normalize_number(session.number());
        let communion = communion_code();
        let code = link
            .conduit
            .request_pairing_code(&number, &communion)
            .await?;

        info!("[{}] Pairing code issued", session.id());
        responder.complete_if_pending(PairingReply::Code {
            code,
            timestamp: reply_timestamp(Local::now()),
        });
        Ok(())
    }

    /// Poll the session directory until a complete credential file appears
    async fn capture_credential(
        &self,
        session: &Session,
        link: &mut Link,
    ) -> Result<Vec<u8>, Interrupt> {
        let path = self.store.credential_path(session.id().as_str());
        let policy = self.policy.credential_poll;
        let attempts = policy.attempts();

        for attempt in 1..=attempts {
            link.check()?;
            let wait = if self.store.exists(&path).await {
                match self.store.read_all(&path).await {
                    Ok(bytes) if is_valid_credential(&bytes) => {
                        info!(
                            "[{}] Credential captured ({} bytes, attempt {})",
                            session.id(),
                            bytes.len(),
                            attempt
                        );
                        return Ok(bytes);
                    }
                    Ok(bytes) => {
                        debug!(
                            "[{}] Credential file incomplete ({} bytes)",
                            session.id(),
                            bytes.len()
                        );
                        policy.delay()
                    }
                    Err(e) => {
                        warn!("[{}] Credential read failed: {}", session.id(), e);
                        self.policy.read_error_delay
                    }
                }
            } else {
                policy.delay()
            };
            if attempt < attempts {
                link.settle(wait).await?;
            }
        }

        warn!(
            "[{}] Credential not captured after {} attempts",
            session.id(),
            attempts
        );
        Err(PairingError::CredentialTimeout { attempts }.into())
    }

    /// Send the payload, retrying per the transmission policy
    async fn transmit(
        &self,
        session: &Session,
        link: &mut Link,
        payload: &TransmissionPayload,
    ) -> Result<(), Interrupt> {
        let message = payload.to_message(&self.template);
        let policy = self.policy.transmission;
        let attempts = policy.attempts();
        let mut last = String::new();

        for attempt in 1..=attempts {
            link.check()?;
            match link.send(&message).await {
                Ok(()) => {
                    info!(
                        "[{}] Credential transmitted (attempt {})",
                        session.id(),
                        attempt
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "[{}] Transmission attempt {}/{} failed: {}",
                        session.id(),
                        attempt,
                        attempts,
                        e
                    );
                    last = e.to_string();
                }
            }
            if attempt < attempts {
                link.settle(policy.delay()).await?;
            }
        }

        Err(PairingError::Transmission { attempts, last }.into())
    }
}
