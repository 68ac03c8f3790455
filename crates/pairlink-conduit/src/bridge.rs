//! Conduit backed by an external driver process

use crate::connection::BridgeConnection;
use async_trait::async_trait;
use pairlink_core::{
    Conduit, ConduitConnector, ConduitSession, ConnectConfig, Error, InteractiveMessage, Result,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// How long a closing driver gets before it is killed
const EXIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Registered {
    registered: bool,
}

#[derive(Debug, Deserialize)]
struct PairingCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct SelfId {
    #[serde(default)]
    id: Option<String>,
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Spawns one driver process per connection
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    program: PathBuf,
    args: Vec<String>,
}

impl BridgeConnector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

#[async_trait]
impl ConduitConnector for BridgeConnector {
    async fn connect(&self, config: ConnectConfig) -> Result<ConduitSession> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Transport(format!(
                    "failed to start driver {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("driver stdout unavailable".to_string()))?;

        let (tx, events) = mpsc::channel(config.options.event_buffer.max(1));
        let connection = BridgeConnection::new(stdin, stdout, tx, config.options.request_timeout);
        let conduit: BridgeConduit<ChildStdin> = BridgeConduit::new(connection, Some(child));

        if let Err(e) = conduit.open(&config).await {
            if let Err(shutdown) = conduit.shutdown().await {
                warn!("Failed to stop driver after connect error: {}", shutdown);
            }
            return Err(e);
        }

        Ok(ConduitSession {
            conduit: Box::new(conduit),
            events,
        })
    }
}

/// A conduit driven over a [`BridgeConnection`]
pub struct BridgeConduit<W> {
    connection: BridgeConnection<W>,
    child: Mutex<Option<Child>>,
}

impl<W> BridgeConduit<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(connection: BridgeConnection<W>, child: Option<Child>) -> Self {
        Self {
            connection,
            child: Mutex::new(child),
        }
    }

    /// Hand the auth directory and options to the driver
    pub async fn open(&self, config: &ConnectConfig) -> Result<()> {
        let params = json!({
            "authDir": config.auth_dir,
            "options": config.options,
        });
        self.connection
            .call_with_timeout("connect", params, config.options.connect_timeout)
            .await?;
        info!("Driver connected for {}", config.auth_dir.display());
        Ok(())
    }

    /// Wait for the driver to exit, killing it after the grace period
    async fn shutdown(&self) -> Result<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!("Driver exited: {}", status),
            Ok(Err(e)) => warn!("Failed to wait for driver: {}", e),
            Err(_) => {
                warn!("Driver did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<W> Conduit for BridgeConduit<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn is_registered(&self) -> Result<bool> {
        let value = self.connection.call("isRegistered", json!({})).await?;
        Ok(decode::<Registered>(value)?.registered)
    }

    async fn request_pairing_code(&self, number: &str, communion_code: &str) -> Result<String> {
        let value = self
            .connection
            .call(
                "requestPairingCode",
                json!({ "number": number, "code": communion_code }),
            )
            .await?;
        Ok(decode::<PairingCode>(value)?.code)
    }

    async fn save_credentials(&self) -> Result<()> {
        self.connection.call("saveCreds", json!({})).await?;
        Ok(())
    }

    async fn self_id(&self) -> Result<Option<String>> {
        let value = self.connection.call("selfId", json!({})).await?;
        Ok(decode::<SelfId>(value)?.id)
    }

    async fn send_interactive_message(
        &self,
        recipient: &str,
        message: &InteractiveMessage,
    ) -> Result<()> {
        self.connection
            .call(
                "sendInteractiveMessage",
                json!({ "recipient": recipient, "message": message }),
            )
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let closed = if self.connection.is_closed() {
            Ok(())
        } else {
            self.connection
                .call_with_timeout("close", json!({}), EXIT_GRACE)
                .await
                .map(|_| ())
        };
        self.shutdown().await?;
        match closed {
            Err(Error::ConduitClosed) => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_core::{Button, ConduitOptions};
    use tokio::io::{
        duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, WriteHalf,
    };

    /// Answer every request through `respond`, recording what was asked
    fn spawn_driver<F>(
        respond: F,
    ) -> (
        BridgeConduit<WriteHalf<DuplexStream>>,
        tokio::task::JoinHandle<Vec<Value>>,
    )
    where
        F: Fn(&str, &Value) -> Value + Send + 'static,
    {
        let (ours, theirs) = duplex(8192);
        let (our_read, our_write) = split(ours);
        let (their_read, mut their_write) = split(theirs);
        let (tx, _rx) = mpsc::channel(8);
        let connection = BridgeConnection::new(our_write, our_read, tx, Duration::from_secs(5));

        let driver = tokio::spawn(async move {
            let mut seen = Vec::new();
            let mut lines = BufReader::new(their_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let method = request["method"].as_str().unwrap_or_default().to_string();
                let result = respond(&method, &request["params"]);
                let reply = json!({ "id": request["id"], "result": result });
                their_write
                    .write_all(format!("{}\n", reply).as_bytes())
                    .await
                    .unwrap();
                seen.push(request);
                if method == "close" {
                    break;
                }
            }
            seen
        });

        (BridgeConduit::new(connection, None), driver)
    }

    #[tokio::test]
    async fn test_request_shapes() {
        let (conduit, driver) = spawn_driver(|method, _| match method {
            "isRegistered" => json!({ "registered": false }),
            "requestPairingCode" => json!({ "code": "ABCD1234" }),
            "selfId" => json!({ "id": "15550100@s.whatsapp.net" }),
            _ => Value::Null,
        });

        assert!(!conduit.is_registered().await.unwrap());
        let code = conduit
            .request_pairing_code("15550100", "WXYZ-1234")
            .await
            .unwrap();
        assert_eq!(code, "ABCD1234");
        assert_eq!(
            conduit.self_id().await.unwrap().as_deref(),
            Some("15550100@s.whatsapp.net")
        );

        let message = InteractiveMessage {
            title: String::new(),
            text: "PAIRLINK~abc".to_string(),
            footer: "footer".to_string(),
            buttons: vec![Button::copy("Copy Session", "PAIRLINK~abc")],
        };
        conduit
            .send_interactive_message("15550100@s.whatsapp.net", &message)
            .await
            .unwrap();
        conduit.close().await.unwrap();

        let seen = driver.await.unwrap();
        let methods: Vec<_> = seen
            .iter()
            .map(|r| r["method"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            methods,
            vec![
                "isRegistered",
                "requestPairingCode",
                "selfId",
                "sendInteractiveMessage",
                "close"
            ]
        );
        assert_eq!(seen[1]["params"]["number"], "15550100");
        assert_eq!(seen[1]["params"]["code"], "WXYZ-1234");
        assert_eq!(seen[3]["params"]["message"]["text"], "PAIRLINK~abc");
        assert_eq!(
            seen[3]["params"]["message"]["buttons"][0]["name"],
            "cta_copy"
        );
    }

    #[tokio::test]
    async fn test_open_sends_options() {
        let (conduit, driver) = spawn_driver(|_, _| json!({}));
        let config = ConnectConfig {
            auth_dir: PathBuf::from("/tmp/pairlink/PAIRLINK~abc"),
            options: ConduitOptions::default(),
        };

        conduit.open(&config).await.unwrap();
        conduit.close().await.unwrap();

        let seen = driver.await.unwrap();
        assert_eq!(seen[0]["method"], "connect");
        assert_eq!(seen[0]["params"]["authDir"], "/tmp/pairlink/PAIRLINK~abc");
        assert_eq!(seen[0]["params"]["options"]["markOnlineOnConnect"], true);
    }

    #[tokio::test]
    async fn test_unexpected_result_shape() {
        let (conduit, _driver) = spawn_driver(|_, _| json!({ "unexpected": 1 }));
        assert!(matches!(conduit.is_registered().await, Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_missing_driver_is_transport_error() {
        let connector = BridgeConnector::new("/nonexistent/pairlink-driver");
        let config = ConnectConfig {
            auth_dir: PathBuf::from("/tmp/pairlink-missing"),
            options: ConduitOptions::default(),
        };
        assert!(matches!(
            connector.connect(config).await,
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_driver_exit_during_connect() {
        let connector =
            BridgeConnector::new("sh").with_args(vec!["-c".to_string(), "exit 0".to_string()]);
        let config = ConnectConfig {
            auth_dir: PathBuf::from("/tmp/pairlink-exited"),
            options: ConduitOptions::default(),
        };

        let result = tokio::time::timeout(Duration::from_secs(3), connector.connect(config))
            .await
            .expect("connect should fail before the exit grace period");
        assert!(matches!(
            result,
            Err(Error::ConduitClosed) | Err(Error::Transport(_))
        ));
    }
}
