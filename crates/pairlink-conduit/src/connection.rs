//! Request/response correlation over a line-delimited JSON pipe
//!
//! Every request gets a sequential id and a oneshot channel; a background task
//! reads the pipe, completes pending requests by id and forwards events.
//! When the pipe closes, all pending requests fail with `ConduitClosed` and
//! the event stream ends.

use pairlink_core::{ConduitEvent, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Message {
    Response {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<ErrorPayload>,
    },
    Event {
        event: String,
        #[serde(default)]
        data: Value,
    },
}

type Pending = Arc<Mutex<HashMap<u64, (String, oneshot::Sender<Result<Value>>)>>>;

/// A JSON-lines connection to a conduit driver
pub struct BridgeConnection<W> {
    writer: Mutex<W>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl<W> BridgeConnection<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Start reading `reader` in the background; events go to `events`
    pub fn new<R>(
        writer: W,
        reader: R,
        events: mpsc::Sender<ConduitEvent>,
        request_timeout: Duration,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&closed),
            events,
        ));

        Self {
            writer: Mutex::new(writer),
            pending,
            closed,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader,
        }
    }

    /// Whether the driver's output has closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its result
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.call_with_timeout(method, params, self.request_timeout)
            .await
    }

    /// Send a request and wait up to `timeout` for its result
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(id, (method.to_string(), tx));

        if self.is_closed() {
            self.pending.lock().await.remove(&id);
            return Err(Error::ConduitClosed);
        }

        let mut line = serde_json::to_string(&Request { id, method, params })?;
        line.push('\n');

        let written = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(line.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.lock().await.remove(&id);
            return Err(Error::Transport(format!("bridge write failed: {}", e)));
        }
        debug!("Bridge request {} sent: {}", id, method);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConduitClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Timeout(method.to_string()))
            }
        }
    }
}

impl<W> Drop for BridgeConnection<W> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(
    reader: R,
    pending: Pending,
    closed: Arc<AtomicBool>,
    events: mpsc::Sender<ConduitEvent>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !line.trim().is_empty() {
                    dispatch(&line, &pending, &events).await;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Bridge read error: {}", e);
                break;
            }
        }
    }

    debug!("Bridge output closed");
    closed.store(true, Ordering::SeqCst);
    for (_, (_, tx)) in pending.lock().await.drain() {
        let _ = tx.send(Err(Error::ConduitClosed));
    }
}

async fn dispatch(line: &str, pending: &Pending, events: &mpsc::Sender<ConduitEvent>) {
    let message = match serde_json::from_str::<Message>(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Unparseable bridge message: {} - raw: {}", e, line);
            return;
        }
    };

    match message {
        Message::Response { id, result, error } => {
            let Some((method, tx)) = pending.lock().await.remove(&id) else {
                warn!("Bridge response for unknown request {}", id);
                return;
            };
            let outcome = match error {
                Some(error) => Err(Error::request_failed(method, error.message)),
                None => Ok(result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(outcome);
        }
        Message::Event { event, data } => match ConduitEvent::from_wire(&event, data) {
            Ok(Some(event)) => {
                if events.send(event).await.is_err() {
                    debug!("Event receiver dropped");
                }
            }
            Ok(None) => debug!("Ignoring bridge event {}", event),
            Err(e) => warn!("Malformed {} event: {}", event, e),
        },
    }
}
