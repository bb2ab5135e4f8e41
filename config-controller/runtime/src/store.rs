//! The document-store handoff: where rendered configuration goes.
//!
//! Two implementations: `FsStore` publishes files with a same-directory
//! temp-then-rename so readers only ever observe complete documents, and
//! `ExecStore` delegates to an external handoff command with a small
//! exit-code contract.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Exit code meaning the store already held identical contents.
pub const EXIT_UNCHANGED: i32 = 30;

/// Exit code meaning the store has nothing for this document yet; it may
/// appear later.
pub const EXIT_NO_DATA_YET: i32 = 31;

/// Exit code meaning the document name was rejected.
pub const EXIT_INVALID_NAME: i32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetched {
    Document(String),
    NotModified,
    NotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Committed {
    Committed,
    /// The store already held identical contents; a no-op.
    Unchanged,
    /// Soft failure: nothing to commit against yet.
    NoDataYet,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid document name: {0:?}")]
    InvalidName(String),

    #[error("store handoff failed with exit code {0}")]
    Failed(i32),

    #[error("store handoff terminated by signal")]
    Killed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait DocumentStore {
    async fn fetch_document(
        &self,
        name: &str,
        previous: Option<&str>,
    ) -> Result<Fetched, StoreError>;

    async fn commit_document(&self, name: &str, contents: &str) -> Result<Committed, StoreError>;
}

/// Publishes documents as files in one directory.
#[derive(Clone, Debug)]
pub struct FsStore {
    dir: PathBuf,
}

/// Hands documents to an external command: `<cmd> fetch <name>` reads from
/// stdout, `<cmd> commit <name>` writes the document to the command's stdin.
#[derive(Clone, Debug)]
pub struct ExecStore {
    command: PathBuf,
}

// === impl FsStore ===

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn document_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn fetch_document(
        &self,
        name: &str,
        previous: Option<&str>,
    ) -> Result<Fetched, StoreError> {
        let path = self.document_path(name)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) if previous == Some(contents.as_str()) => Ok(Fetched::NotModified),
            Ok(contents) => Ok(Fetched::Document(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Fetched::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit_document(&self, name: &str, contents: &str) -> Result<Committed, StoreError> {
        let path = self.document_path(name)?;
        std::fs::create_dir_all(&self.dir)?;

        // The temp file must live in the destination directory: renaming
        // across filesystems is not atomic.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        std::io::Write::write_all(&mut tmp, contents.as_bytes())?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        Ok(Committed::Committed)
    }
}

// === impl ExecStore ===

impl ExecStore {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn command(&self) -> &Path {
        &self.command
    }
}

#[async_trait]
impl DocumentStore for ExecStore {
    async fn fetch_document(
        &self,
        name: &str,
        previous: Option<&str>,
    ) -> Result<Fetched, StoreError> {
        let mut cmd = Command::new(self.command());
        cmd.arg("fetch").arg(name);
        if let Some(previous) = previous {
            cmd.arg("--previous").arg(previous);
        }
        let output = cmd.stdin(Stdio::null()).output().await?;
        match output.status.code() {
            Some(0) => Ok(Fetched::Document(
                String::from_utf8_lossy(&output.stdout).into_owned(),
            )),
            Some(EXIT_UNCHANGED) => Ok(Fetched::NotModified),
            Some(EXIT_NO_DATA_YET) => Ok(Fetched::NotFound),
            code => Err(exit_error(code, name)),
        }
    }

    async fn commit_document(&self, name: &str, contents: &str) -> Result<Committed, StoreError> {
        let mut child = Command::new(self.command())
            .arg("commit")
            .arg(name)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin.write_all(contents.as_bytes()).await?;
        drop(stdin);

        let status = child.wait().await?;
        map_commit_status(status.code(), name)
    }
}

/// Maps a handoff commit exit status onto the store contract.
fn map_commit_status(code: Option<i32>, name: &str) -> Result<Committed, StoreError> {
    match code {
        Some(0) => Ok(Committed::Committed),
        Some(EXIT_UNCHANGED) => Ok(Committed::Unchanged),
        Some(EXIT_NO_DATA_YET) => Ok(Committed::NoDataYet),
        code => Err(exit_error(code, name)),
    }
}

fn exit_error(code: Option<i32>, name: &str) -> StoreError {
    match code {
        Some(EXIT_INVALID_NAME) => StoreError::InvalidName(name.to_string()),
        Some(code) => StoreError::Failed(code),
        None => StoreError::Killed,
    }
}
