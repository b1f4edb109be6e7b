use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::remote_path::join_remote;
use crate::errors::ProtocolError;

/// FTP verbs issued by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FtpVerb {
    ListDetails,
    Retrieve,
    Store,
    Delete,
    Rename,
    MakeDirectory,
}

impl FtpVerb {
    /// Wire command for the verb
    pub fn as_command(&self) -> &'static str {
        match self {
            Self::ListDetails => "LIST",
            Self::Retrieve => "RETR",
            Self::Store => "STOR",
            Self::Delete => "DELE",
            Self::Rename => "RNFR",
            Self::MakeDirectory => "MKD",
        }
    }

    /// Whether the verb transfers bytes over a data connection
    pub fn uses_data_channel(&self) -> bool {
        matches!(self, Self::ListDetails | Self::Retrieve | Self::Store)
    }
}

impl fmt::Display for FtpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_command())
    }
}

/// One FTP command against one remote path.
#[derive(Debug, Clone)]
pub struct FtpCommand {
    pub verb: FtpVerb,
    /// Server the command is sent to; only scheme, host and port are used
    pub endpoint: Url,
    /// Remote path, sent to the server verbatim
    pub path: String,
    /// New name for `Rename`, sent verbatim with RNTO
    pub rename_to: Option<String>,
    /// Declared upload size for `Store`
    pub content_length: Option<u64>,
}

impl FtpCommand {
    /// Command on `path` below `base`, joined as plain text
    pub fn new(verb: FtpVerb, base: &Url, path: &str) -> Self {
        Self {
            verb,
            endpoint: base.clone(),
            path: join_remote(base, path),
            rename_to: None,
            content_length: None,
        }
    }

    pub fn rename(base: &Url, path: &str, new_name: impl Into<String>) -> Self {
        Self {
            rename_to: Some(new_name.into()),
            ..Self::new(FtpVerb::Rename, base, path)
        }
    }

    pub fn store(base: &Url, path: &str, content_length: u64) -> Self {
        Self {
            content_length: Some(content_length),
            ..Self::new(FtpVerb::Store, base, path)
        }
    }

    pub fn remote_path(&self) -> &str {
        &self.path
    }

    /// `scheme://host[:port]` followed by the unescaped remote path
    pub fn location(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}://{}:{}{}", self.endpoint.scheme(), host, port, self.path),
            None => format!("{}://{}{}", self.endpoint.scheme(), host, self.path),
        }
    }

    /// Wraps `cause` into a `ProtocolError` for this command
    pub fn error<E>(&self, cause: E) -> ProtocolError
    where
        E: Into<crate::errors::BoxError>,
    {
        ProtocolError::new(self.verb, self.location(), cause)
    }
}

/// Response stream of a LIST or RETR command
#[async_trait]
pub trait DataReader: Send {
    /// Reads up to `buf.len()` bytes; `Ok(0)` signals end of stream
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError>;

    /// Reads the completion reply and closes the connection
    async fn finish(self: Box<Self>) -> Result<(), ProtocolError>;
}

/// Request stream of a STOR command
#[async_trait]
pub trait DataWriter: Send {
    async fn write_chunk(&mut self, buf: &[u8]) -> Result<(), ProtocolError>;

    /// Closes the data channel, reads the completion reply and closes the
    /// connection
    async fn finish(self: Box<Self>) -> Result<(), ProtocolError>;
}

/// Issues single FTP commands.
///
/// Every call opens its own control connection; nothing is reused between
/// calls.
#[async_trait]
pub trait FtpTransport: Send + Sync {
    /// Starts a LIST or RETR and returns its response stream
    async fn open_read(&self, command: FtpCommand) -> Result<Box<dyn DataReader>, ProtocolError>;

    /// Starts a STOR and returns its request stream
    async fn open_write(&self, command: FtpCommand)
    -> Result<Box<dyn DataWriter>, ProtocolError>;

    /// Runs a DELE, RNFR/RNTO or MKD to completion
    async fn execute(&self, command: FtpCommand) -> Result<(), ProtocolError>;

    /// Checks that the server behind `base` accepts a login
    async fn verify(&self, base: &Url) -> bool;
}

/// Drains a response stream into memory
pub async fn read_to_end(
    mut reader: Box<dyn DataReader>,
    chunk_size: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let mut body = Vec::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];
    loop {
        let read = reader.read_chunk(&mut chunk).await?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }
    reader.finish().await?;
    Ok(body)
}
