use std::fmt;
use std::path::Path;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::errors::{FtpHelperError, FtpHelperResult};

/// Default FTP control port
pub const DEFAULT_FTP_PORT: u16 = 21;
/// Chunk size used when streaming files
pub const DEFAULT_CHUNK_SIZE: usize = 2048;
/// Default transport timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Login used for every connection
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Character encoding of LIST responses.
///
/// Many older servers print listings in a local code page instead of UTF-8;
/// file names in such listings only match when the right encoding is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingEncoding(&'static Encoding);

impl Default for ListingEncoding {
    fn default() -> Self {
        Self(UTF_8)
    }
}

impl ListingEncoding {
    /// Looks up an encoding by WHATWG label (`utf-8`, `gb2312`, `gbk`,
    /// `shift_jis`, `big5`, `windows-1252`, ...)
    pub fn from_label(label: &str) -> FtpHelperResult<Self> {
        Encoding::for_label(label.trim().as_bytes())
            .map(Self)
            .ok_or_else(|| FtpHelperError::InvalidConfig(format!("unknown listing encoding '{}'", label)))
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Decodes listing bytes, replacing malformed sequences
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (text, _, had_errors) = self.0.decode(bytes);
        if had_errors {
            log::debug!("Listing contained bytes that are not valid {}", self.name());
        }
        text.into_owned()
    }

    /// Encodes text the way a server using this encoding would send it
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let (bytes, _, _) = self.0.encode(text);
        bytes.into_owned()
    }
}

impl Serialize for ListingEncoding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ListingEncoding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Self::from_label(&label).map_err(serde::de::Error::custom)
    }
}

/// Options applied to every command connection.
///
/// Data connections are always negotiated in passive mode and control
/// connections are never reused, so neither is configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Use binary (TYPE I) transfers
    pub binary: bool,
    /// Bound on connect, login and every read or write
    pub timeout_secs: u64,
    /// Buffer size when streaming files
    pub chunk_size: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            binary: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransportOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize)]
struct RawSessionConfig {
    base_uri: String,
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    encoding: Option<ListingEncoding>,
    #[serde(default)]
    transport: TransportOptions,
}

/// Endpoint, login and listing encoding of a session.
///
/// Built once and handed to the session, which never changes it.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    base_uri: Url,
    credentials: Credentials,
    encoding: ListingEncoding,
    transport: TransportOptions,
}

impl SessionConfig {
    /// # Arguments
    /// * `base_uri` - absolute `ftp://host[:port]/[path]` every remote path is appended to
    /// * `username`, `password` - login for each connection
    pub fn new(
        base_uri: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> FtpHelperResult<Self> {
        let base_uri = Url::parse(base_uri).map_err(|source| FtpHelperError::InvalidTarget {
            target: base_uri.to_string(),
            source,
        })?;

        if base_uri.scheme() != "ftp" {
            return Err(FtpHelperError::InvalidConfig(format!(
                "base URI must use the ftp scheme, got '{}'",
                base_uri.scheme()
            )));
        }
        if base_uri.host_str().is_none_or(str::is_empty) {
            return Err(FtpHelperError::InvalidConfig(format!(
                "base URI '{}' has no host",
                base_uri
            )));
        }

        if base_uri.query().is_some() || base_uri.fragment().is_some() {
            return Err(FtpHelperError::InvalidConfig(format!(
                "base URI '{}' must not carry a query or fragment",
                base_uri
            )));
        }

        Ok(Self {
            base_uri,
            credentials: Credentials::new(username, password),
            encoding: ListingEncoding::default(),
            transport: TransportOptions::default(),
        })
    }

    pub fn with_encoding(mut self, encoding: ListingEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    /// Parses a JSON document:
    ///
    /// ```json
    /// { "base_uri": "ftp://ftp.example.com/", "username": "anonymous",
    ///   "password": "guest", "encoding": "gb2312",
    ///   "transport": { "timeout_secs": 10 } }
    /// ```
    pub fn from_json_str(json: &str) -> FtpHelperResult<Self> {
        let raw: RawSessionConfig = serde_json::from_str(json)?;
        let mut config = Self::new(&raw.base_uri, raw.username, raw.password)?
            .with_transport(raw.transport);
        if let Some(encoding) = raw.encoding {
            config = config.with_encoding(encoding);
        }
        if config.transport.chunk_size == 0 {
            return Err(FtpHelperError::InvalidConfig("chunk_size must be positive".to_string()));
        }
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> FtpHelperResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn encoding(&self) -> ListingEncoding {
        self.encoding
    }

    pub fn transport(&self) -> &TransportOptions {
        &self.transport
    }
}
