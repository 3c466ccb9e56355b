//! Durable storage for the token list
//!
//! The persisted form is a JSON array of token strings in pool order. The
//! file backend writes to a temp file and renames it over the target, so a
//! failed save leaves the previously persisted list untouched. A mutex
//! serializes writers so two saves never interleave on the temp file.
//!
//! Loading never fails outright: a missing file or empty list reports
//! `NotFound`, anything unreadable reports `Corrupt`, and the pool decides
//! how to recover.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Outcome of reading the persisted token list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLoad {
    /// A non-empty list was read.
    Loaded(Vec<String>),
    /// Nothing persisted yet (missing file or empty array).
    NotFound,
    /// The backing store exists but could not be read or parsed.
    Corrupt(String),
}

/// Persistence contract for the token pool.
///
/// Uses `Pin<Box<dyn Future>>` return types so the pool can hold an
/// `Arc<dyn TokenStore>`.
pub trait TokenStore: Send + Sync {
    /// Read the persisted list.
    fn load(&self) -> Pin<Box<dyn Future<Output = StoreLoad> + Send + '_>>;

    /// Replace the persisted list. Must not corrupt the previous list on failure.
    fn save<'a>(
        &'a self,
        tokens: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Flat-file token store (`tokens.json`).
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temp file used for the write-then-rename swap: `.<file name>.tmp.<pid>`
    /// next to the target, so stores for different files never share one.
    fn temp_path(&self) -> PathBuf {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| "tokens".into());
        dir.join(format!(".{name}.tmp.{}", std::process::id()))
    }

    async fn read(&self) -> StoreLoad {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "token file not found");
                return StoreLoad::NotFound;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "token file unreadable");
                return StoreLoad::Corrupt(format!("reading token file: {e}"));
            }
        };

        match serde_json::from_str::<Vec<String>>(&contents) {
            Ok(tokens) if tokens.is_empty() => {
                info!(path = %self.path.display(), "token file is empty");
                StoreLoad::NotFound
            }
            Ok(tokens) => {
                info!(path = %self.path.display(), tokens = tokens.len(), "loaded tokens");
                StoreLoad::Loaded(tokens)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "token file is not a JSON string array");
                StoreLoad::Corrupt(format!("parsing token file: {e}"))
            }
        }
    }

    async fn write(&self, tokens: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.path, &self.temp_path(), tokens).await
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = StoreLoad> + Send + '_>> {
        Box::pin(self.read())
    }

    fn save<'a>(
        &'a self,
        tokens: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.write(tokens))
    }
}

/// Write the token list atomically with 0600 permissions.
///
/// The parent directory is created on demand so a fresh deployment can
/// self-heal its store on the first save.
async fn write_atomic(path: &Path, tmp_path: &Path, tokens: &[String]) -> Result<()> {
    let json = serde_json::to_string_pretty(tokens)
        .map_err(|e| Error::Parse(format!("serializing tokens: {e}")))?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Io(format!("creating token directory: {e}")))?;
    }

    tokio::fs::write(tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), tokens = tokens.len(), "persisted tokens");
    Ok(())
}
