//! Token Cache
//!
//! On-disk token files, one per (service, scope list).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CacheError, CacheOperation, LocalAuthResult};
use crate::types::Token;

/// File name used when no scopes are requested.
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Where a token for a (service, scopes) identity lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheLocation {
    /// Caching disabled; every acquisition runs the browser flow.
    NoCache,
    /// Token file path.
    File(PathBuf),
}

impl CacheLocation {
    /// Path of the token file, if caching is enabled.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NoCache => None,
            Self::File(path) => Some(path),
        }
    }
}

/// File-backed token cache rooted at a directory.
#[derive(Clone, Debug)]
pub struct TokenCache {
    root: PathBuf,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl TokenCache {
    /// Create a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a service and ordered scope list to a token location.
    pub fn locate(&self, service_name: &str, scopes: &[String]) -> CacheLocation {
        if service_name.is_empty() {
            return CacheLocation::NoCache;
        }

        let dir = self.root.join(service_name);
        if scopes.is_empty() {
            return CacheLocation::File(dir.join(DEFAULT_TOKEN_FILE));
        }

        CacheLocation::File(dir.join(format!(
            "token-with-scopes-{}.json",
            slug::slugify(scopes.join("-"))
        )))
    }

    /// Read the token stored at `path`.
    pub async fn read(&self, path: &Path) -> LocalAuthResult<Token> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                CacheError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CacheError::Io {
                    operation: CacheOperation::Read,
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let token = serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        debug!(path = %path.display(), "read cached token");
        Ok(token)
    }

    /// Store `token` at `path`, replacing any previous content.
    pub async fn write(&self, path: &Path, token: &Token) -> LocalAuthResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::Io {
                    operation: CacheOperation::CreateDir,
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let bytes = serde_json::to_vec(token).map_err(|e| CacheError::Serialize {
            message: e.to_string(),
        })?;

        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| CacheError::Io {
                operation: CacheOperation::Write,
                path: path.to_path_buf(),
                source: e,
            })?;

        debug!(path = %path.display(), "wrote cached token");
        Ok(())
    }

    /// Delete the token at `path`. A missing file is not an error.
    pub async fn remove(&self, path: &Path) -> LocalAuthResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed cached token");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io {
                operation: CacheOperation::Remove,
                path: path.to_path_buf(),
                source: e,
            }
            .into()),
        }
    }
}
