//! A single IRC session used as the relay's notifier.
//!
//! The client registers, answers PINGs, joins its channels once the server
//! welcomes it (or once NickServ confirms the login), and exposes
//! [`Notifier::deliver`] for the pollers. Losing the connection is reported
//! on an error channel that the health check consumes.

use super::message::{self, IrcMessage};
use crate::config::IrcConfig;
use crate::types::{ConnectionStatus, Notifier, RelayError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Minimum gap between two outbound messages.
pub const DEFAULT_PACING: Duration = Duration::from_secs(1);

/// Longest inbound line accepted: 8191 bytes of tags plus a 512 byte message.
pub const MAX_LINE_LENGTH: usize = 8191 + 512;

const RPL_WELCOME: &str = "001";
const ERR_NICKNAMEINUSE: &str = "433";
const RPL_LOGGEDIN: &str = "900";

trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

type BoxedStream = Box<dyn IrcStream>;

/// Receives a reason string every time an established session drops.
pub type ConnectionErrors = mpsc::UnboundedReceiver<String>;

pub struct IrcClient {
    config: IrcConfig,
    nickname: Mutex<String>,
    connected: AtomicBool,
    // Bumped on every (re)connect so a stale reader cannot report errors
    // for a session that has already been replaced.
    generation: AtomicU64,
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
    // Held across send + pacing sleep so concurrent pollers queue up.
    delivery: Mutex<()>,
    pacing: Duration,
    errors: mpsc::UnboundedSender<String>,
}

impl IrcClient {
    pub fn new(config: IrcConfig) -> (Arc<Self>, ConnectionErrors) {
        Self::with_pacing(config, DEFAULT_PACING)
    }

    pub fn with_pacing(config: IrcConfig, pacing: Duration) -> (Arc<Self>, ConnectionErrors) {
        let (errors, error_rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            nickname: Mutex::new(config.nickname.clone()),
            config,
            connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            writer: Mutex::new(None),
            delivery: Mutex::new(()),
            pacing,
            errors,
        });
        (client, error_rx)
    }

    pub async fn nickname(&self) -> String {
        self.nickname.lock().await.clone()
    }

    /// Open the socket, start the reader and send registration.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let address = self.config.address();
        info!("Connecting to {}", address);

        let tcp = TcpStream::connect(&address).await?;
        let stream: BoxedStream = if self.config.use_tls {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(self.config.tls_accept_invalid_certs)
                .build()?;
            let connector = tokio_native_tls::TlsConnector::from(connector);
            Box::new(connector.connect(&self.config.server, tcp).await?)
        } else {
            Box::new(tcp)
        };

        let (reader, writer) = tokio::io::split(stream);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.connected.store(false, Ordering::SeqCst);
        *self.nickname.lock().await = self.config.nickname.clone();
        *self.writer.lock().await = Some(writer);

        tokio::spawn(Arc::clone(self).read_loop(reader, generation));

        self.register().await
    }

    /// Drop the current session (if any) and connect again.
    pub async fn reconnect(self: &Arc<Self>) -> Result<()> {
        self.disconnect("Reconnecting").await;
        self.connect().await
    }

    /// Send QUIT and close the write side. The reader of the closed session
    /// does not report the disconnect.
    pub async fn disconnect(&self, reason: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let line = format!("{}\r\n", message::quit(reason));
            let _ = writer.write_all(line.as_bytes()).await;
            let _ = writer.shutdown().await;
        }
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.send_raw(&message::privmsg(target, text)).await
    }

    pub async fn join_channels(&self) -> Result<()> {
        for channel in &self.config.channels {
            info!(channel = %channel, "Joining channel");
            self.send_raw(&message::join(channel)).await?;
        }
        Ok(())
    }

    async fn register(&self) -> Result<()> {
        if !self.config.server_password.is_empty() {
            self.write_line(&message::pass(&self.config.server_password), true).await?;
        }
        self.send_raw(&message::nick(&self.config.nickname)).await?;
        self.send_raw(&message::user(&self.config.ident, &self.config.real_name)).await
    }

    async fn send_raw(&self, line: &str) -> Result<()> {
        self.write_line(line, false).await
    }

    async fn write_line(&self, line: &str, secret: bool) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| RelayError::NotConnected(self.config.address()))?;

        if self.config.debug && !secret {
            debug!(line = %line, ">>");
        }

        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, reader: ReadHalf<BoxedStream>, generation: u64) {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(512);

        let reason = loop {
            buf.clear();
            match (&mut reader).take(MAX_LINE_LENGTH as u64).read_until(b'\n', &mut buf).await {
                Ok(0) => break "connection closed by server".to_string(),
                Ok(n) if n >= MAX_LINE_LENGTH && buf.last() != Some(&b'\n') => {
                    break format!("line longer than {} bytes from server", MAX_LINE_LENGTH);
                }
                Ok(_) => {
                    if self.generation.load(Ordering::SeqCst) != generation {
                        return;
                    }

                    let line = String::from_utf8_lossy(&buf);
                    if self.config.verbose {
                        debug!(line = %line.trim_end(), "<<");
                    }

                    if let Some(msg) = IrcMessage::parse(&line) {
                        if let Err(e) = self.handle_message(msg).await {
                            break e.to_string();
                        }
                    }
                }
                Err(e) => break e.to_string(),
            }
        };

        if self.generation.load(Ordering::SeqCst) == generation {
            self.connected.store(false, Ordering::SeqCst);
            warn!(reason = %reason, "Lost connection to {}", self.config.address());
            let _ = self.errors.send(reason);
        }
    }

    async fn handle_message(&self, msg: IrcMessage) -> Result<()> {
        match msg.command.as_str() {
            "PING" => {
                self.send_raw(&message::pong(msg.trailing().unwrap_or_default())).await?;
            }
            RPL_WELCOME => {
                self.connected.store(true, Ordering::SeqCst);
                info!("Registered with {}", self.config.address());
                self.on_welcome().await?;
            }
            RPL_LOGGEDIN => {
                info!("Identified with NickServ");
                self.join_channels().await?;
            }
            ERR_NICKNAMEINUSE if !self.is_connected() => {
                let nickname = {
                    let mut nickname = self.nickname.lock().await;
                    nickname.push('_');
                    nickname.clone()
                };
                warn!(
                    rejected = msg.param(1).unwrap_or_default(),
                    "Nickname in use, trying {}", nickname
                );
                self.send_raw(&message::nick(&nickname)).await?;
            }
            "ERROR" => {
                warn!(reason = msg.trailing().unwrap_or_default(), "Server sent ERROR");
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_welcome(&self) -> Result<()> {
        if !self.config.modes.is_empty() {
            let nickname = self.nickname().await;
            self.send_raw(&message::mode(&nickname, &self.config.modes)).await?;
        }

        if !self.config.nickserv_password.is_empty() {
            let identify = format!("identify {}", self.config.nickserv_password);
            self.write_line(&message::privmsg("NickServ", &identify), true).await
        } else {
            self.join_channels().await
        }
    }
}

impl ConnectionStatus for IrcClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for IrcClient {
    async fn deliver(&self, channels: &[String], message: &str) {
        for channel in channels {
            let _turn = self.delivery.lock().await;

            if let Err(e) = self.privmsg(channel, message).await {
                warn!(channel = %channel, error = %e, "Failed to deliver message");
            }

            // Antispam
            tokio::time::sleep(self.pacing).await;
        }
    }
}
