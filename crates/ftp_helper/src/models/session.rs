use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::directory_plan::{DirectoryPlan, ProvisionPolicy, ProvisionReport};
use super::ftp_connection_manager::FtpConnectionManager;
use super::listing_parser::ListingParser;
use super::listing_record::ListingRecord;
use super::remote_path::split_parent;
use super::session_config::SessionConfig;
use super::transport::{FtpCommand, FtpTransport, FtpVerb, read_to_end};
use crate::errors::{
    FtpHelperError, FtpHelperResult, LastError, ProtocolError, ProvisionError, ProvisionStage,
};

/// FTP operations against one configured server.
///
/// Each operation opens its own connection through the transport, so a
/// session can be shared between tasks. Operations that report success as a
/// `bool` store what went wrong in a last-error slot; the slot is overwritten
/// by the next failure and never cleared by a success. Each of them has a
/// `try_` counterpart returning the error instead.
pub struct FtpSession<T: FtpTransport = FtpConnectionManager> {
    config: SessionConfig,
    transport: T,
    last_error: Mutex<Option<LastError>>,
}

impl FtpSession<FtpConnectionManager> {
    /// Session backed by a real FTP connection per command
    pub fn new(config: SessionConfig) -> Self {
        let transport = FtpConnectionManager::from_config(&config);
        Self::with_transport(config, transport)
    }
}

impl<T: FtpTransport> FtpSession<T> {
    pub fn with_transport(config: SessionConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            last_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Most recent failure caught by a `bool` operation
    pub fn last_error(&self) -> Option<LastError> {
        self.slot().clone()
    }

    fn slot(&self) -> MutexGuard<'_, Option<LastError>> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(&self, operation: &str, error: FtpHelperError) {
        log::warn!("{} failed: {}", operation, error);
        *self.slot() = Some(LastError::new(error));
    }

    /// Command on `path` under the base URI
    fn command(&self, verb: FtpVerb, path: &str) -> FtpCommand {
        FtpCommand::new(verb, self.config.base_uri(), path)
    }

    /// Lists `path` (relative to the base URI) and parses the result.
    ///
    /// Listings in an unrecognized format give an empty vector, not an error.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<ListingRecord>, ProtocolError> {
        let command = self.command(FtpVerb::ListDetails, path);
        log::debug!("Listing {}", command.location());

        let reader = self.transport.open_read(command).await?;
        let body = read_to_end(reader, self.config.transport().chunk_size).await?;
        let text = self.config.encoding().decode(&body);
        let records = ListingParser::new().parse_listing(&text);

        log::info!("Listed {} entries in '{}'", records.len(), path);
        Ok(records)
    }

    /// Whether `parent` contains a directory called `name` (case-sensitive)
    pub async fn directory_exists(&self, parent: &str, name: &str) -> Result<bool, ProtocolError> {
        let records = self.list_directory(parent).await?;
        Ok(records.iter().any(|record| record.is_directory_named(name)))
    }

    /// Whether a file exists at `path`.
    ///
    /// The parent is listed and searched for a non-directory entry with the
    /// leaf name. With a listing encoding that does not match the server, a
    /// file with non-ASCII characters is reported missing.
    pub async fn file_exists(&self, path: &str) -> Result<bool, ProtocolError> {
        let (parent, name) = split_parent(path);
        let records = self.list_directory(&parent).await?;
        Ok(records.iter().any(|record| record.is_file_named(&name)))
    }

    /// Runs `plan` from its cursor until every segment exists.
    ///
    /// On failure the plan keeps the segments already provisioned, so calling
    /// this again with the same plan resumes at the failing segment.
    pub async fn provision(&self, plan: &mut DirectoryPlan) -> Result<ProvisionReport, ProvisionError> {
        let mut report = ProvisionReport::default();

        while let Some(step) = plan.next_step() {
            if plan.policy() == ProvisionPolicy::CheckExistsFirst {
                let exists = self
                    .directory_exists(&step.parent, &step.name)
                    .await
                    .map_err(|source| ProvisionError {
                        stage: ProvisionStage::ExistenceCheck,
                        target: step.target.clone(),
                        completed: plan.completed(),
                        source,
                    })?;
                if exists {
                    log::debug!("Directory {} already exists", step.target);
                    report.existing.push(step.target);
                    plan.advance();
                    continue;
                }
            }

            let command = self.command(FtpVerb::MakeDirectory, &step.target);
            if let Err(source) = self.transport.execute(command).await {
                return Err(ProvisionError {
                    stage: ProvisionStage::MakeDirectory,
                    target: step.target,
                    completed: plan.completed(),
                    source,
                });
            }

            log::info!("Created directory {}", step.target);
            report.created.push(step.target);
            plan.advance();
        }

        Ok(report)
    }

    /// Creates every missing segment of `path`.
    ///
    /// With `check_exists_first` each parent is listed and existing segments
    /// are skipped, which makes the call idempotent. Without it MKD is sent
    /// for every segment and a server refusing an existing directory aborts
    /// the call with that error.
    ///
    /// A failed listing or MKD is returned as `Err` and stops at that
    /// segment; segments created before it stay on the server. Use
    /// [`FtpSession::provision`] to resume from there.
    pub async fn create_directory_recursive(
        &self,
        path: &str,
        check_exists_first: bool,
    ) -> Result<bool, ProtocolError> {
        let mut plan = DirectoryPlan::new(path, ProvisionPolicy::from(check_exists_first));
        match self.provision(&mut plan).await {
            Ok(report) => {
                log::debug!(
                    "Provisioned {}: {} created, {} existing",
                    plan.provisioned_path(),
                    report.created.len(),
                    report.existing.len()
                );
                Ok(true)
            }
            Err(err) => {
                log::warn!("{}", err);
                Err(err.source)
            }
        }
    }

    /// `create_directory_recursive` without existence checks
    pub async fn create_directory(&self, path: &str) -> Result<bool, ProtocolError> {
        self.create_directory_recursive(path, false).await
    }

    /// Uploads a local file, returning `false` and recording the error on
    /// failure
    pub async fn upload_file(&self, local: impl AsRef<Path>, remote: &str, create_dirs: bool) -> bool {
        match self.try_upload_file(local, remote, create_dirs).await {
            Ok(_) => true,
            Err(err) => {
                self.record_error("Upload", err);
                false
            }
        }
    }

    /// Uploads a local file and returns the number of bytes sent.
    ///
    /// With `create_dirs` the remote parent directory is provisioned first.
    /// Unlike [`FtpSession::create_directory`], which sends MKD for every
    /// segment, this lists each parent and skips segments that already
    /// exist, so uploads into an existing tree succeed.
    pub async fn try_upload_file(
        &self,
        local: impl AsRef<Path>,
        remote: &str,
        create_dirs: bool,
    ) -> FtpHelperResult<u64> {
        let local = local.as_ref();

        if create_dirs {
            let (parent, _) = split_parent(remote);
            let mut plan = DirectoryPlan::new(&parent, ProvisionPolicy::CheckExistsFirst);
            self.provision(&mut plan).await?;
        }

        let metadata = match tokio::fs::metadata(local).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                return Err(FtpHelperError::FileNotFound {
                    path: local.display().to_string(),
                });
            }
        };

        let mut file = tokio::fs::File::open(local).await?;
        let command = FtpCommand::store(self.config.base_uri(), remote, metadata.len());
        log::info!("Uploading {} ({} bytes) to {}", local.display(), metadata.len(), command.location());

        let mut writer = self.transport.open_write(command).await?;
        let mut buffer = vec![0u8; self.config.transport().chunk_size.max(1)];
        let mut sent = 0u64;
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            writer.write_chunk(&buffer[..read]).await?;
            sent += read as u64;
        }
        writer.finish().await?;

        log::info!("Uploaded {} bytes to '{}'", sent, remote);
        Ok(sent)
    }

    /// Downloads a remote file, returning `false` and recording the error on
    /// failure
    pub async fn download_file(&self, remote: &str, local: impl AsRef<Path>) -> bool {
        match self.try_download_file(remote, local).await {
            Ok(_) => true,
            Err(err) => {
                self.record_error("Download", err);
                false
            }
        }
    }

    /// Downloads a remote file, creating the local parent directory if
    /// needed, and returns the number of bytes written
    pub async fn try_download_file(&self, remote: &str, local: impl AsRef<Path>) -> FtpHelperResult<u64> {
        let local = local.as_ref();
        if let Some(parent) = local.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let command = self.command(FtpVerb::Retrieve, remote);
        log::info!("Downloading {} to {}", command.location(), local.display());

        let mut reader = self.transport.open_read(command).await?;
        let mut file = tokio::fs::File::create(local).await?;
        let mut buffer = vec![0u8; self.config.transport().chunk_size.max(1)];
        let mut received = 0u64;
        loop {
            let read = reader.read_chunk(&mut buffer).await?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read]).await?;
            received += read as u64;
        }
        file.flush().await?;
        reader.finish().await?;

        log::info!("Downloaded {} bytes from '{}'", received, remote);
        Ok(received)
    }

    /// Deletes a remote file, returning `false` and recording the error on
    /// failure
    pub async fn delete_file(&self, remote: &str) -> bool {
        match self.try_delete_file(remote).await {
            Ok(()) => true,
            Err(err) => {
                self.record_error("Delete", err);
                false
            }
        }
    }

    pub async fn try_delete_file(&self, remote: &str) -> FtpHelperResult<()> {
        self.transport.execute(self.command(FtpVerb::Delete, remote)).await?;
        log::info!("Deleted '{}'", remote);
        Ok(())
    }

    /// Renames `old_name` to `new_name`; equal names send nothing.
    ///
    /// `new_name` goes to the server as given, so a path moves the entry to
    /// another directory.
    pub async fn rename_or_move(&self, old_name: &str, new_name: &str) -> Result<(), ProtocolError> {
        if old_name == new_name {
            return Ok(());
        }
        let command = FtpCommand::rename(self.config.base_uri(), old_name, new_name);
        self.transport.execute(command).await?;
        log::info!("Renamed '{}' to '{}'", old_name, new_name);
        Ok(())
    }

    pub async fn move_file(&self, old_name: &str, new_name: &str) -> Result<(), ProtocolError> {
        self.rename_or_move(old_name, new_name).await
    }

    /// Whether the server accepts a connection and login
    pub async fn check_server(&self) -> bool {
        let reachable = self.transport.verify(self.config.base_uri()).await;
        if !reachable {
            log::warn!("FTP server {} is not reachable", self.config.base_uri());
        }
        reachable
    }
}
