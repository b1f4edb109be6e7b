use std::future::Future;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use once_cell::sync::Lazy;
use regex::Regex;
use suppaftp::types::{FileType, FormatControl};
use suppaftp::{AsyncFtpStream, Mode, Status};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::errors::{BoxError, ProtocolError};
use crate::models::session_config::{Credentials, SessionConfig, TransportOptions, DEFAULT_FTP_PORT};
use crate::models::transport::{DataReader, DataWriter, FtpCommand, FtpTransport, FtpVerb};

/// `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
static PASV_REPLY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3})")
        .expect("Invalid regex pattern for PASV replies")
});

/// FTP transport built on suppaftp.
///
/// Each command gets a fresh control connection: connect, login, transfer
/// type, passive mode, the command itself, then QUIT. RETR and STOR use
/// suppaftp's data streams. suppaftp only hands out LIST output as lines
/// decoded from UTF-8, so LIST opens its data channel from the PASV reply
/// itself and returns the bytes undecoded.
#[derive(Debug, Clone)]
pub struct FtpConnectionManager {
    credentials: Credentials,
    options: TransportOptions,
}

impl FtpConnectionManager {
    pub fn new(credentials: Credentials, options: TransportOptions) -> Self {
        Self {
            credentials,
            options,
        }
    }

    /// Create a connection manager from session settings
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.credentials().clone(), config.transport().clone())
    }

    pub fn timeout(&self) -> Duration {
        self.options.timeout()
    }

    /// `host:port` of the endpoint, defaulting to port 21
    fn address(endpoint: &Url) -> Option<String> {
        let host = endpoint.host_str().filter(|host| !host.is_empty())?;
        Some(format!("{}:{}", host, endpoint.port().unwrap_or(DEFAULT_FTP_PORT)))
    }

    /// Create a new logged-in FTP connection for `command`
    async fn connect(&self, command: &FtpCommand) -> Result<AsyncFtpStream, ProtocolError> {
        let address = Self::address(&command.endpoint)
            .ok_or_else(|| command.error("endpoint URI has no host"))?;

        log::debug!("Opening FTP connection to {} for {}", address, command.verb);
        let limit = self.timeout();
        let mut ftp = bounded(limit, command, AsyncFtpStream::connect(address.as_str())).await?;
        bounded(
            limit,
            command,
            ftp.login(
                self.credentials.username.as_str(),
                self.credentials.password.as_str(),
            ),
        )
        .await?;

        ftp.set_mode(Mode::Passive);
        ftp.set_passive_nat_workaround(true);
        let file_type = if self.options.binary {
            FileType::Binary
        } else {
            FileType::Ascii(FormatControl::NonPrint)
        };
        bounded(limit, command, ftp.transfer_type(file_type)).await?;

        Ok(ftp)
    }

    /// Negotiates PASV, connects the data channel and sends LIST
    async fn open_listing_channel(
        &self,
        ftp: &mut AsyncFtpStream,
        command: &FtpCommand,
    ) -> Result<TcpStream, ProtocolError> {
        let limit = self.timeout();
        let reply = bounded(limit, command, ftp.custom_command("PASV", &[Status::PassiveMode])).await?;
        let (ip, port) = parse_pasv_reply(&String::from_utf8_lossy(&reply.body))
            .ok_or_else(|| command.error("malformed PASV reply"))?;

        // servers behind NAT advertise private or unspecified addresses
        let host = if ip.is_unspecified() || ip.is_private() {
            command.endpoint.host_str().unwrap_or_default().to_string()
        } else {
            ip.to_string()
        };
        log::debug!("Opening data channel to {}:{}", host, port);
        let data = bounded(limit, command, TcpStream::connect((host.as_str(), port))).await?;

        let wire = format!("{} {}", command.verb, command.remote_path());
        bounded(
            limit,
            command,
            ftp.custom_command(wire, &[Status::AboutToSend, Status::AlreadyOpen]),
        )
        .await?;

        Ok(data)
    }

    /// Verify the server accepts our login, without keeping the connection
    pub async fn verify_connection(&self, base: &Url) -> bool {
        let check = FtpCommand::new(FtpVerb::ListDetails, base, "");
        match self.connect(&check).await {
            Ok(mut ftp) => {
                let result = bounded(self.timeout(), &check, ftp.pwd()).await.is_ok();
                close(ftp, self.timeout()).await;
                result
            }
            Err(e) => {
                log::warn!("FTP connection verification failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl FtpTransport for FtpConnectionManager {
    async fn open_read(&self, command: FtpCommand) -> Result<Box<dyn DataReader>, ProtocolError> {
        if !matches!(command.verb, FtpVerb::ListDetails | FtpVerb::Retrieve) {
            return Err(command.error(format!("{} has no response stream", command.verb)));
        }

        let limit = self.timeout();
        let mut ftp = self.connect(&command).await?;

        if command.verb == FtpVerb::ListDetails {
            let opened = self.open_listing_channel(&mut ftp, &command).await;
            return match opened {
                Ok(data) => Ok(Box::new(ListingReader {
                    ftp,
                    data,
                    command,
                    limit,
                    received: 0,
                })),
                Err(e) => {
                    close(ftp, limit).await;
                    Err(e)
                }
            };
        }

        let path = command.remote_path().to_string();
        let opened = bounded(limit, &command, ftp.retr_as_stream(path)).await;
        match opened {
            Ok(data) => Ok(Box::new(RetrieveReader {
                ftp,
                data,
                command,
                limit,
                received: 0,
                started: Instant::now(),
            })),
            Err(e) => {
                close(ftp, limit).await;
                Err(e)
            }
        }
    }

    async fn open_write(&self, command: FtpCommand) -> Result<Box<dyn DataWriter>, ProtocolError> {
        if command.verb != FtpVerb::Store {
            return Err(command.error(format!("{} has no request stream", command.verb)));
        }

        let limit = self.timeout();
        let mut ftp = self.connect(&command).await?;
        let path = command.remote_path().to_string();
        let opened = bounded(limit, &command, ftp.put_with_stream(path)).await;
        match opened {
            Ok(data) => Ok(Box::new(StoreWriter {
                ftp,
                data,
                command,
                limit,
                sent: 0,
                started: Instant::now(),
            })),
            Err(e) => {
                close(ftp, limit).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, command: FtpCommand) -> Result<(), ProtocolError> {
        let limit = self.timeout();
        let path = command.remote_path();
        let mut ftp = self.connect(&command).await?;

        let result = match (command.verb, command.rename_to.as_deref()) {
            (FtpVerb::Delete, _) => bounded(limit, &command, ftp.rm(path)).await,
            (FtpVerb::MakeDirectory, _) => bounded(limit, &command, ftp.mkdir(path)).await,
            (FtpVerb::Rename, Some(new_name)) => {
                bounded(limit, &command, ftp.rename(path, new_name)).await
            }
            (FtpVerb::Rename, None) => Err(command.error("rename without a new name")),
            (verb, _) => Err(command.error(format!("{} needs a data channel", verb))),
        };

        close(ftp, limit).await;
        if result.is_ok() {
            log::debug!("{} {} completed", command.verb, command.location());
        }
        result
    }

    async fn verify(&self, base: &Url) -> bool {
        self.verify_connection(base).await
    }
}

/// LIST output read straight from the data channel
struct ListingReader {
    ftp: AsyncFtpStream,
    data: TcpStream,
    command: FtpCommand,
    limit: Duration,
    received: u64,
}

#[async_trait]
impl DataReader for ListingReader {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let read = bounded(self.limit, &self.command, self.data.read(buf)).await?;
        self.received += read as u64;
        Ok(read)
    }

    async fn finish(self: Box<Self>) -> Result<(), ProtocolError> {
        let ListingReader {
            mut ftp,
            data,
            command,
            limit,
            received,
        } = *self;

        // the server only sends the completion reply once the data channel is closed
        drop(data);
        let reply = bounded(
            limit,
            &command,
            ftp.read_response_in(&[Status::ClosingDataConnection, Status::RequestedFileActionOk]),
        )
        .await;
        close(ftp, limit).await;

        reply?;
        log::debug!("{} {} received {} bytes", command.verb, command.location(), received);
        Ok(())
    }
}

/// RETR data stream opened by suppaftp
struct RetrieveReader<S> {
    ftp: AsyncFtpStream,
    data: S,
    command: FtpCommand,
    limit: Duration,
    received: u64,
    started: Instant,
}

#[async_trait]
impl<S> DataReader for RetrieveReader<S>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let read = bounded(self.limit, &self.command, self.data.read(buf)).await?;
        self.received += read as u64;
        Ok(read)
    }

    async fn finish(self: Box<Self>) -> Result<(), ProtocolError> {
        let RetrieveReader {
            mut ftp,
            data,
            command,
            limit,
            received,
            started,
        } = *self;

        let reply = bounded(limit, &command, ftp.finalize_retr_stream(data)).await;
        close(ftp, limit).await;

        reply?;
        log::info!(
            "{} {} received {} bytes in {:?}",
            command.verb,
            command.location(),
            received,
            started.elapsed()
        );
        Ok(())
    }
}

/// STOR data stream opened by suppaftp
struct StoreWriter<S> {
    ftp: AsyncFtpStream,
    data: S,
    command: FtpCommand,
    limit: Duration,
    sent: u64,
    started: Instant,
}

#[async_trait]
impl<S> DataWriter for StoreWriter<S>
where
    S: AsyncWrite + Unpin + Send + 'static,
{
    async fn write_chunk(&mut self, buf: &[u8]) -> Result<(), ProtocolError> {
        bounded(self.limit, &self.command, self.data.write_all(buf)).await?;
        self.sent += buf.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), ProtocolError> {
        let StoreWriter {
            mut ftp,
            mut data,
            command,
            limit,
            sent,
            started,
        } = *self;

        let reply = match bounded(limit, &command, data.flush()).await {
            Ok(()) => bounded(limit, &command, ftp.finalize_put_stream(data)).await,
            Err(e) => Err(e),
        };
        close(ftp, limit).await;

        reply?;
        if let Some(expected) = command.content_length {
            if expected != sent {
                return Err(command.error(format!(
                    "declared content length {} but sent {} bytes",
                    expected, sent
                )));
            }
        }
        log::info!(
            "{} {} sent {} bytes in {:?}",
            command.verb,
            command.location(),
            sent,
            started.elapsed()
        );
        Ok(())
    }
}

/// Runs `future` under the transport timeout, mapping failures to a
/// `ProtocolError` for `command`
async fn bounded<T, E, F>(limit: Duration, command: &FtpCommand, future: F) -> Result<T, ProtocolError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    match timeout(limit, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(command.error(e)),
        Err(_) => Err(command.error(format!("timed out after {:?}", limit))),
    }
}

/// QUIT and drop the connection; failures are only logged
async fn close(mut ftp: AsyncFtpStream, limit: Duration) {
    match timeout(limit, ftp.quit()).await {
        Ok(Ok(())) => log::debug!("FTP connection closed"),
        Ok(Err(e)) => log::warn!("Failed to properly close FTP connection: {}", e),
        Err(_) => log::warn!("Timed out closing FTP connection"),
    }
}

/// Extracts the data channel address from a PASV reply
fn parse_pasv_reply(reply: &str) -> Option<(Ipv4Addr, u16)> {
    let captures = PASV_REPLY_PATTERN.captures(reply)?;
    let mut numbers = [0u8; 6];
    for (index, number) in numbers.iter_mut().enumerate() {
        *number = captures.get(index + 1)?.as_str().parse().ok()?;
    }
    let ip = Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]);
    let port = u16::from(numbers[4]) << 8 | u16::from(numbers[5]);
    Some((ip, port))
}
