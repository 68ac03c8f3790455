//! Scripted conduit used by the orchestrator tests

use async_trait::async_trait;
use pairlink_core::{
    Conduit, ConduitConnector, ConduitEvent, ConduitSession, ConnectConfig, Error,
    InteractiveMessage, Result,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub const FAKE_CODE: &str = "FAKECODE";
pub const FAKE_SELF_ID: &str = "15550100@s.whatsapp.net";

/// Behaviour of one connection
#[derive(Debug, Clone, Default)]
pub struct Script {
    connect_error: bool,
    registered: bool,
    code_error: bool,
    events: Vec<ConduitEvent>,
    later_events: Vec<(Duration, ConduitEvent)>,
    credential: Option<Vec<u8>>,
    late_credential: Option<(Duration, Vec<u8>)>,
    credential_dir: bool,
}

impl Script {
    pub fn with_events(mut self, events: Vec<ConduitEvent>) -> Self {
        self.events = events;
        self
    }

    /// Events delivered once their delay after connect has passed
    pub fn with_later_events(mut self, events: Vec<(Duration, ConduitEvent)>) -> Self {
        self.later_events = events;
        self
    }

    /// Credential bytes written into the auth directory on connect
    pub fn with_credential(mut self, credential: Vec<u8>) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Credential bytes written `after` the connect, replacing any earlier file
    pub fn with_late_credential(mut self, credential: Vec<u8>, after: Duration) -> Self {
        self.late_credential = Some((after, credential));
        self
    }

    /// Put a directory where the credential file belongs, so reads fail
    pub fn with_credential_dir(mut self) -> Self {
        self.credential_dir = true;
        self
    }

    pub fn registered(mut self) -> Self {
        self.registered = true;
        self
    }

    pub fn connect_error(mut self) -> Self {
        self.connect_error = true;
        self
    }

    pub fn code_error(mut self) -> Self {
        self.code_error = true;
        self
    }
}

#[derive(Default)]
struct Recorder {
    scripts: Mutex<VecDeque<Script>>,
    connects: Mutex<Vec<(PathBuf, Instant)>>,
    code_requests: Mutex<Vec<(String, String)>>,
    sent: Mutex<Vec<(String, InteractiveMessage)>>,
    send_attempts: AtomicUsize,
    failing_sends: AtomicUsize,
    saves: AtomicUsize,
    save_delay: Mutex<Duration>,
    closes: AtomicUsize,
}

#[derive(Clone)]
pub struct FakeConnector {
    recorder: Arc<Recorder>,
}

impl FakeConnector {
    pub fn new(scripts: Vec<Script>) -> Self {
        let recorder = Recorder {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        };
        Self {
            recorder: Arc::new(recorder),
        }
    }

    /// Make the first `count` sends fail
    pub fn failing_sends(self, count: usize) -> Self {
        self.recorder.failing_sends.store(count, Ordering::SeqCst);
        self
    }

    /// Make every credential save take `delay`
    pub fn slow_saves(self, delay: Duration) -> Self {
        *self.recorder.save_delay.lock().unwrap() = delay;
        self
    }

    pub fn connects(&self) -> Vec<(PathBuf, Instant)> {
        self.recorder.connects.lock().unwrap().clone()
    }

    pub fn code_requests(&self) -> Vec<(String, String)> {
        self.recorder.code_requests.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(String, InteractiveMessage)> {
        self.recorder.sent.lock().unwrap().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.recorder.send_attempts.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.recorder.saves.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.recorder.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConduitConnector for FakeConnector {
    async fn connect(&self, config: ConnectConfig) -> Result<ConduitSession> {
        self.recorder
            .connects
            .lock()
            .unwrap()
            .push((config.auth_dir.clone(), Instant::now()));

        let script = self
            .recorder
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        if script.connect_error {
            return Err(Error::Transport("connection refused".to_string()));
        }

        std::fs::create_dir_all(&config.auth_dir)?;
        let creds = config.auth_dir.join("creds.json");
        if script.credential_dir {
            std::fs::create_dir_all(&creds)?;
        }
        if let Some(credential) = &script.credential {
            std::fs::write(&creds, credential)?;
        }
        if let Some((after, credential)) = script.late_credential {
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                std::fs::write(&creds, credential).ok();
            });
        }

        let (tx, events) = mpsc::channel(config.options.event_buffer.max(script.events.len()));
        for event in script.events {
            tx.try_send(event)
                .map_err(|e| Error::Transport(e.to_string()))?;
        }
        for (after, event) in script.later_events {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                tx.send(event).await.ok();
            });
        }

        Ok(ConduitSession {
            conduit: Box::new(FakeConduit {
                recorder: Arc::clone(&self.recorder),
                registered: script.registered,
                code_error: script.code_error,
                _events: tx,
            }),
            events,
        })
    }
}

struct FakeConduit {
    recorder: Arc<Recorder>,
    registered: bool,
    code_error: bool,
    // Held so the event stream stays open for the connection's lifetime
    _events: mpsc::Sender<ConduitEvent>,
}

#[async_trait]
impl Conduit for FakeConduit {
    async fn is_registered(&self) -> Result<bool> {
        Ok(self.registered)
    }

    async fn request_pairing_code(&self, number: &str, communion_code: &str) -> Result<String> {
        if self.code_error {
            return Err(Error::request_failed("requestPairingCode", "rate limited"));
        }
        self.recorder
            .code_requests
            .lock()
            .unwrap()
            .push((number.to_string(), communion_code.to_string()));
        Ok(FAKE_CODE.to_string())
    }

    async fn save_credentials(&self) -> Result<()> {
        self.recorder.saves.fetch_add(1, Ordering::SeqCst);
        let delay = *self.recorder.save_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn self_id(&self) -> Result<Option<String>> {
        Ok(Some(FAKE_SELF_ID.to_string()))
    }

    async fn send_interactive_message(
        &self,
        recipient: &str,
        message: &InteractiveMessage,
    ) -> Result<()> {
        self.recorder.send_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .recorder
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::request_failed("sendInteractiveMessage", "not delivered"));
        }
        self.recorder
            .sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
