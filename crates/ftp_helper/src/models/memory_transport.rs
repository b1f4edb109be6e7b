//! In-memory FTP server used by the tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use url::Url;

use super::remote_path::segments;
use super::session_config::ListingEncoding;
use super::transport::{DataReader, DataWriter, FtpCommand, FtpTransport, FtpVerb};
use crate::errors::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListingStyle {
    Unix,
    Windows,
}

#[derive(Debug, Clone)]
enum Node {
    Directory,
    File(Vec<u8>),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Canonical key of a remote path: `/a/b`, or `/` for the root
fn key(path: &str) -> String {
    format!("/{}", segments(path).join("/"))
}

fn parent_key(path: &str) -> String {
    let mut parts = segments(path);
    parts.pop();
    format!("/{}", parts.join("/"))
}

pub(crate) struct MemoryTransport {
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
    raw_listings: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<Vec<(FtpVerb, String)>>,
    commands: Mutex<Vec<(FtpVerb, String)>>,
    style: ListingStyle,
    encoding: ListingEncoding,
    reachable: bool,
    yielding: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Directory);
        Self {
            nodes: Arc::new(Mutex::new(nodes)),
            raw_listings: Mutex::new(HashMap::new()),
            failures: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            style: ListingStyle::Unix,
            encoding: ListingEncoding::default(),
            reachable: true,
            yielding: false,
        }
    }

    pub fn with_style(mut self, style: ListingStyle) -> Self {
        self.style = style;
        self
    }

    /// Encoding the server prints listings in
    pub fn with_encoding(mut self, encoding: ListingEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Yields to the scheduler between receiving a command and acting on it,
    /// so concurrent tasks interleave the way they do against a real server
    pub fn yielding(mut self) -> Self {
        self.yielding = true;
        self
    }

    /// Adds a directory and any missing ancestors
    pub fn with_directory(self, path: &str) -> Self {
        {
            let mut nodes = lock(&self.nodes);
            let mut current = String::new();
            for segment in segments(path) {
                current = format!("{}/{}", current, segment);
                nodes.entry(current.clone()).or_insert(Node::Directory);
            }
        }
        self
    }

    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        let this = self.with_directory(&parent_key(path));
        lock(&this.nodes).insert(key(path), Node::File(content.to_vec()));
        this
    }

    /// Serves `body` verbatim for LIST of `path`
    pub fn with_raw_listing(self, path: &str, body: &[u8]) -> Self {
        lock(&self.raw_listings).insert(key(path), body.to_vec());
        self
    }

    /// Makes every `verb` against `path` fail until cleared
    pub fn fail_on(&self, verb: FtpVerb, path: &str) {
        lock(&self.failures).push((verb, key(path)));
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Every command received, as verb and canonical path
    pub fn commands(&self) -> Vec<(FtpVerb, String)> {
        lock(&self.commands).clone()
    }

    pub fn count(&self, verb: FtpVerb) -> usize {
        lock(&self.commands).iter().filter(|(logged, _)| *logged == verb).count()
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match lock(&self.nodes).get(&key(path)) {
            Some(Node::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn is_directory(&self, path: &str) -> bool {
        matches!(lock(&self.nodes).get(&key(path)), Some(Node::Directory))
    }

    /// Logs the command and applies injected failures
    fn receive(&self, command: &FtpCommand) -> Result<String, ProtocolError> {
        let path = key(command.remote_path());
        lock(&self.commands).push((command.verb, path.clone()));
        let injected = lock(&self.failures)
            .iter()
            .any(|(verb, failing)| *verb == command.verb && *failing == path);
        if injected {
            return Err(command.error("421 Service not available"));
        }
        Ok(path)
    }

    async fn pause(&self) {
        if self.yielding {
            tokio::task::yield_now().await;
        }
    }

    fn render_listing(&self, directory: &str) -> Vec<u8> {
        let nodes = lock(&self.nodes);
        let prefix = if directory == "/" {
            "/".to_string()
        } else {
            format!("{}/", directory)
        };

        let mut lines = Vec::new();
        if self.style == ListingStyle::Unix {
            lines.push("total 8".to_string());
            lines.push("drwxr-xr-x 4 ftp ftp 4096 Jan 1 10:30 .".to_string());
            lines.push("drwxr-xr-x 9 ftp ftp 4096 Jan 1 10:30 ..".to_string());
        }

        for (path, node) in nodes.iter() {
            let Some(name) = path.strip_prefix(&prefix) else {
                continue;
            };
            if name.is_empty() || name.contains('/') {
                continue;
            }
            let line = match (self.style, node) {
                (ListingStyle::Unix, Node::Directory) => {
                    format!("drwxr-xr-x 2 ftp ftp 4096 Jan 1 10:30 {}", name)
                }
                (ListingStyle::Unix, Node::File(content)) => {
                    format!("-rw-r--r-- 1 ftp ftp {} Mar 14 2019 {}", content.len(), name)
                }
                (ListingStyle::Windows, Node::Directory) => {
                    format!("10-21-15  03:42PM       <DIR>          {}", name)
                }
                (ListingStyle::Windows, Node::File(content)) => {
                    format!("10-21-15  11:05AM {:>20} {}", content.len(), name)
                }
            };
            lines.push(line);
        }

        let mut text = lines.join("\r\n");
        text.push_str("\r\n");
        self.encoding.encode(&text)
    }
}

struct MemoryReader {
    body: Vec<u8>,
    position: usize,
}

#[async_trait]
impl DataReader for MemoryReader {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let remaining = &self.body[self.position..];
        let read = remaining.len().min(buf.len());
        buf[..read].copy_from_slice(&remaining[..read]);
        self.position += read;
        Ok(read)
    }

    async fn finish(self: Box<Self>) -> Result<(), ProtocolError> {
        Ok(())
    }
}

struct MemoryWriter {
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
    command: FtpCommand,
    path: String,
    body: Vec<u8>,
}

#[async_trait]
impl DataWriter for MemoryWriter {
    async fn write_chunk(&mut self, buf: &[u8]) -> Result<(), ProtocolError> {
        self.body.extend_from_slice(buf);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), ProtocolError> {
        if let Some(expected) = self.command.content_length {
            if expected != self.body.len() as u64 {
                return Err(self.command.error(format!(
                    "426 transfer aborted: declared {} bytes, sent {}",
                    expected,
                    self.body.len()
                )));
            }
        }
        let MemoryWriter { nodes, path, body, .. } = *self;
        lock(&nodes).insert(path, Node::File(body));
        Ok(())
    }
}

#[async_trait]
impl FtpTransport for MemoryTransport {
    async fn open_read(&self, command: FtpCommand) -> Result<Box<dyn DataReader>, ProtocolError> {
        let path = self.receive(&command)?;
        self.pause().await;
        let body = match command.verb {
            FtpVerb::ListDetails => {
                if let Some(raw) = lock(&self.raw_listings).get(&path) {
                    raw.clone()
                } else if self.is_directory(&path) {
                    self.render_listing(&path)
                } else {
                    return Err(command.error("550 No such directory"));
                }
            }
            FtpVerb::Retrieve => self
                .file(&path)
                .ok_or_else(|| command.error("550 No such file"))?,
            verb => return Err(command.error(format!("{} does not return data", verb))),
        };
        Ok(Box::new(MemoryReader { body, position: 0 }))
    }

    async fn open_write(&self, command: FtpCommand) -> Result<Box<dyn DataWriter>, ProtocolError> {
        let path = self.receive(&command)?;
        self.pause().await;
        if command.verb != FtpVerb::Store {
            return Err(command.error(format!("{} does not accept data", command.verb)));
        }
        if !self.is_directory(&parent_key(&path)) || self.is_directory(&path) {
            return Err(command.error("553 Could not create file"));
        }
        Ok(Box::new(MemoryWriter {
            nodes: Arc::clone(&self.nodes),
            command,
            path,
            body: Vec::new(),
        }))
    }

    async fn execute(&self, command: FtpCommand) -> Result<(), ProtocolError> {
        let path = self.receive(&command)?;
        self.pause().await;
        let mut nodes = lock(&self.nodes);
        match command.verb {
            FtpVerb::Delete => {
                if !matches!(nodes.get(&path), Some(Node::File(_))) {
                    return Err(command.error("550 No such file"));
                }
                nodes.remove(&path);
                Ok(())
            }
            FtpVerb::MakeDirectory => {
                if nodes.contains_key(&path) {
                    return Err(command.error("550 Directory already exists"));
                }
                if !matches!(nodes.get(&parent_key(&path)), Some(Node::Directory)) {
                    return Err(command.error("550 Parent directory does not exist"));
                }
                nodes.insert(path, Node::Directory);
                Ok(())
            }
            FtpVerb::Rename => {
                let destination = key(command.rename_to.as_deref().unwrap_or_default());
                if !matches!(nodes.get(&parent_key(&destination)), Some(Node::Directory)) {
                    return Err(command.error("553 Destination directory does not exist"));
                }
                match nodes.remove(&path) {
                    Some(node) => {
                        nodes.insert(destination, node);
                        Ok(())
                    }
                    None => Err(command.error("550 No such file or directory")),
                }
            }
            verb => Err(command.error(format!("{} needs a data connection", verb))),
        }
    }

    async fn verify(&self, _base: &Url) -> bool {
        self.reachable
    }
}
