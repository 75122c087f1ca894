#![allow(dead_code)]

use notification_service::config::NotificationConfig;
use notification_service::services::EmailProvider;
use notification_service::startup::Application;
use service_core::config::Config as CoreConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub fn config_from(vars: &[(&str, &str)]) -> NotificationConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    // Use random port for testing (port 0)
    NotificationConfig::from_lookup(CoreConfig { port: 0 }, |key| vars.get(key).cloned())
        .expect("Failed to build test configuration")
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn(vars: &[(&str, &str)]) -> Self {
        let app = Application::build(config_from(vars))
            .await
            .expect("Failed to build test application");
        Self::start(app).await
    }

    pub async fn spawn_with_provider(
        vars: &[(&str, &str)],
        provider: Arc<dyn EmailProvider>,
    ) -> Self {
        let app = Application::build_with_provider(config_from(vars), provider)
            .await
            .expect("Failed to build test application");
        Self::start(app).await
    }

    async fn start(app: Application) -> Self {
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
        }
    }

    pub async fn post_notify(&self, body: impl Into<reqwest::Body>) -> reqwest::Response {
        self.client
            .post(format!("{}/notify", self.address))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request")
    }
}

pub fn ana_payload() -> String {
    serde_json::json!({
        "name": "Ana",
        "email": "ana@test.com",
        "phone": "555-1234"
    })
    .to_string()
}

/// One message as seen by [`MockSmtpServer`].
#[derive(Debug, Clone)]
pub struct ReceivedMail {
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpBehavior {
    /// No AUTH advertised, every transaction accepted.
    Accept,
    /// Advertises AUTH PLAIN and rejects both AUTH and MAIL FROM.
    Reject,
}

/// Minimal plaintext SMTP endpoint, enough for a lettre client to deliver a
/// message without STARTTLS.
pub struct MockSmtpServer {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    received: mpsc::UnboundedReceiver<ReceivedMail>,
}

impl MockSmtpServer {
    pub async fn start(behavior: SmtpBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock SMTP listener");
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let (tx, received) = mpsc::unbounded_channel();

        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let tx = tx.clone();
                tokio::spawn(async move {
                    handle_session(stream, behavior, tx).await.ok();
                });
            }
        });

        Self {
            port,
            connections,
            received,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn next_mail(&mut self) -> Option<ReceivedMail> {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Messages that arrive within a short grace period.
    pub async fn drain(&mut self) -> Vec<ReceivedMail> {
        let mut mails = Vec::new();
        while let Ok(Some(mail)) =
            tokio::time::timeout(Duration::from_millis(300), self.received.recv()).await
        {
            mails.push(mail);
        }
        mails
    }
}

async fn handle_session(
    stream: TcpStream,
    behavior: SmtpBehavior,
    tx: mpsc::UnboundedSender<ReceivedMail>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(b"220 mock.smtp ESMTP ready\r\n").await?;

    let mut mail_from = String::new();
    let mut rcpt_to = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end().to_string();
        let upper = command.to_ascii_uppercase();

        if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            let reply: &[u8] = match behavior {
                SmtpBehavior::Accept => b"250 mock.smtp\r\n",
                SmtpBehavior::Reject => b"250-mock.smtp\r\n250 AUTH PLAIN\r\n",
            };
            writer.write_all(reply).await?;
        } else if upper.starts_with("AUTH") {
            match behavior {
                SmtpBehavior::Accept => {
                    writer.write_all(b"235 2.7.0 Authentication successful\r\n").await?
                }
                SmtpBehavior::Reject => {
                    writer
                        .write_all(b"535 5.7.8 Authentication credentials invalid\r\n")
                        .await?
                }
            }
        } else if upper.starts_with("MAIL FROM:") {
            match behavior {
                SmtpBehavior::Accept => {
                    mail_from = extract_address(&command);
                    rcpt_to.clear();
                    writer.write_all(b"250 2.1.0 Ok\r\n").await?;
                }
                SmtpBehavior::Reject => {
                    writer.write_all(b"550 5.7.1 Sender rejected\r\n").await?;
                }
            }
        } else if upper.starts_with("RCPT TO:") {
            rcpt_to.push(extract_address(&command));
            writer.write_all(b"250 2.1.5 Ok\r\n").await?;
        } else if upper == "DATA" {
            writer
                .write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")
                .await?;
            let mut data = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Ok(());
                }
                if line == ".\r\n" || line == ".\n" {
                    break;
                }
                data.push_str(&line);
            }
            writer.write_all(b"250 2.0.0 Ok: queued as MOCK1\r\n").await?;
            tx.send(ReceivedMail {
                mail_from: mail_from.clone(),
                rcpt_to: std::mem::take(&mut rcpt_to),
                data,
            })
            .ok();
        } else if upper == "RSET" || upper == "NOOP" {
            writer.write_all(b"250 2.0.0 Ok\r\n").await?;
        } else if upper == "QUIT" {
            writer.write_all(b"221 2.0.0 Bye\r\n").await?;
            return Ok(());
        } else {
            writer.write_all(b"502 5.5.2 Command not recognized\r\n").await?;
        }
    }
}

fn extract_address(command: &str) -> String {
    command
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map(|(address, _)| address.to_string())
        .unwrap_or_default()
}

/// Accepts one connection and reports the first byte the client sends
/// without greeting it. A TLS ClientHello starts with 0x16; an SMTP client
/// waits silently for the server banner.
pub async fn first_client_byte(listener: TcpListener) -> Option<u8> {
    let (mut stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .ok()?
        .ok()?;

    let mut buf = [0u8; 1];
    match tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf)).await {
        Ok(Ok(1)) => Some(buf[0]),
        _ => None,
    }
}

/// Accepts connections and holds them open without ever sending the SMTP
/// banner, like a relay that stalls mid-handshake.
pub struct SilentSmtpServer {
    pub port: u16,
    handle: tokio::task::JoinHandle<()>,
}

impl SilentSmtpServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind silent SMTP listener");
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        Self { port, handle }
    }
}

impl Drop for SilentSmtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
