//! Collaborators the command socket hands work to
//!
//! Firmware downloads and management-session wakeups are owned by other
//! components; these traits are the boundary. The external implementations
//! run a configured program on a background task.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result, FAULT_INTERNAL_ERROR};

/// A firmware fetch-and-install request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub command_key: String,
    /// TR-069 file type, e.g. `1 IMAGE`
    pub file_type: String,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub file_size: u64,
    pub target_filename: String,
    pub delay_seconds: u64,
}

impl DownloadRequest {
    /// Image download as issued by the `download` command
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            command_key: "rcmd".to_string(),
            file_type: "1 IMAGE".to_string(),
            url: url.into(),
            username: None,
            password: None,
            file_size: 0,
            target_filename: "rcmd.gi".to_string(),
            delay_seconds: 0,
        }
    }
}

/// Result reported once a download finishes; `fault` 0 is success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub command_key: String,
    pub fault: u32,
    pub message: String,
}

pub type DownloadCallback = Box<dyn FnOnce(DownloadOutcome) + Send>;

/// Accepts downloads; never blocks the caller on the transfer
pub trait Downloader: Send + Sync {
    fn enqueue(&self, request: DownloadRequest, done: DownloadCallback) -> Result<()>;
}

/// Starts a management session out of band
pub trait SessionTrigger: Send + Sync {
    fn new_wakeup_session(&self) -> Result<()>;
}

fn runtime() -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current()
        .map_err(|e| Error::InvalidState(format!("no async runtime: {}", e)))
}

/// Runs `<program> <url> <target_filename>` for every image download
#[derive(Debug, Clone)]
pub struct ExternalInstaller {
    program: PathBuf,
}

impl ExternalInstaller {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Downloader for ExternalInstaller {
    fn enqueue(&self, request: DownloadRequest, done: DownloadCallback) -> Result<()> {
        if !request.file_type.starts_with('1') {
            return Err(Error::Download(format!(
                "unsupported file type {:?}",
                request.file_type
            )));
        }
        let handle = runtime()?;
        let program = self.program.clone();

        tracing::info!(
            url = %request.url,
            target = %request.target_filename,
            "Download queued"
        );
        handle.spawn(async move {
            if request.delay_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(request.delay_seconds)).await;
            }
            let status = tokio::process::Command::new(&program)
                .arg(&request.url)
                .arg(&request.target_filename)
                .status()
                .await;
            let (fault, message) = match status {
                Ok(s) if s.success() => (0, "Download and install complete".to_string()),
                Ok(s) => (FAULT_INTERNAL_ERROR, format!("installer exited with {}", s)),
                Err(e) => (FAULT_INTERNAL_ERROR, format!("installer failed to start: {}", e)),
            };
            done(DownloadOutcome {
                command_key: request.command_key,
                fault,
                message,
            });
        });
        Ok(())
    }
}

/// Runs a fixed command to wake the session manager
#[derive(Debug, Clone)]
pub struct ExternalWakeup {
    argv: Vec<String>,
}

impl ExternalWakeup {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            return Err(Error::InvalidState("empty wakeup command".to_string()));
        }
        Ok(Self { argv })
    }
}

impl SessionTrigger for ExternalWakeup {
    fn new_wakeup_session(&self) -> Result<()> {
        let handle = runtime()?;
        let argv = self.argv.clone();
        handle.spawn(async move {
            let (program, args) = argv.split_at(1);
            match tokio::process::Command::new(&program[0]).args(args).status().await {
                Ok(status) if status.success() => tracing::info!("Wakeup session triggered"),
                Ok(status) => tracing::warn!(%status, "Wakeup command failed"),
                Err(e) => tracing::warn!(error = %e, "Wakeup command failed to start"),
            }
        });
        Ok(())
    }
}
