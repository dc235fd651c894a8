//! Mock SMTP relay for exercising the real transport
//!
//! Speaks just enough SMTP for a plain-text client: greeting, EHLO, MAIL,
//! RCPT, DATA and QUIT. Replies to RCPT and to the end of DATA are
//! configurable so tests can make a relay reject mail.
//!
//! ```rust,no_run
//! let server = MockSmtpServer::builder()
//!     .with_rcpt_to_response(550, "User unknown")
//!     .build()
//!     .await?;
//!
//! let provider = server.provider("rejecting");
//! ```

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use outpost_delivery::ProviderConfig;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content between DATA and the terminating dot
    MessageContent(String),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct SmtpResponse {
    code: u16,
    message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Debug, Clone)]
struct MockServerConfig {
    rcpt_to_response: SmtpResponse,
    data_end_response: SmtpResponse,
    response_delay: Option<Duration>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            response_delay: None,
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// A plain-text provider pointing at this server
    pub fn provider(&self, name: &str) -> ProviderConfig {
        let mut provider = ProviderConfig::new(name, self.addr.ip().to_string());
        provider.port = self.addr.port();
        provider.timeout_secs = 5;
        provider
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Every message body accepted or rejected at the end of DATA
    pub async fn messages(&self) -> Vec<String> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer
            .write_all(&SmtpResponse::new(220, "Mock SMTP Server").to_bytes())
            .await?;
        writer.flush().await?;

        loop {
            line.clear();

            let Ok(read) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }

            let cmd_line = line.trim();
            tracing::debug!("Mock server received: {}", cmd_line);

            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));

            let (response, smtp_cmd) = match verb.to_uppercase().as_str() {
                "EHLO" => (
                    b"250-localhost\r\n250 SIZE 10000\r\n".to_vec(),
                    SmtpCommand::Ehlo(argument.to_string()),
                ),
                "MAIL" => (
                    SmtpResponse::new(250, "OK").to_bytes(),
                    SmtpCommand::MailFrom(argument.to_string()),
                ),
                "RCPT" => (
                    config.rcpt_to_response.to_bytes(),
                    SmtpCommand::RcptTo(argument.to_string()),
                ),
                "DATA" => (
                    SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>").to_bytes(),
                    SmtpCommand::Data,
                ),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer
                        .write_all(&SmtpResponse::new(221, "Bye").to_bytes())
                        .await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            let is_data = matches!(smtp_cmd, SmtpCommand::Data);
            commands.write().await.push(smtp_cmd);

            if let Some(delay) = config.response_delay {
                tokio::time::sleep(delay).await;
            }
            writer.write_all(&response).await?;
            writer.flush().await?;

            if is_data {
                let mut content = String::new();
                let mut data_line = String::new();

                loop {
                    data_line.clear();
                    if reader.read_line(&mut data_line).await? == 0 {
                        return Ok(());
                    }
                    if data_line.trim_end() == "." {
                        break;
                    }
                    content.push_str(&data_line);
                }

                commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(content));
                writer
                    .write_all(&config.data_end_response.to_bytes())
                    .await?;
                writer.flush().await?;
            }
        }
    }
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    /// Set the RCPT TO response
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Add a delay before sending each response
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Bind to a random local port and start serving
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            while !shutdown_clone.load(Ordering::Relaxed) {
                // Accept with a timeout so the shutdown flag is seen
                let accepted = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accepted {
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await
                        {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
        })
    }
}
