//! Artifact storage for screenshots.
//!
//! Local backend: content-addressed files under the configured directory,
//! retrieved through opaque tokens with a TTL (the local stand-in for
//! signed URLs). Tokens are random; expired tokens stop resolving.

use anyhow::{Context, Result};
use dashmap::DashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::StorageBackend;

#[derive(Debug, Clone)]
struct TokenEntry {
    path: PathBuf,
    expires_at: Instant,
}

/// Stores screenshot bytes and hands out TTL-limited retrieval tokens.
pub struct ArtifactStore {
    dir: PathBuf,
    token_ttl: Duration,
    tokens: DashMap<String, TokenEntry>,
}

impl ArtifactStore {
    pub fn new(backend: &StorageBackend, token_ttl_secs: u64) -> Result<Self> {
        let StorageBackend::Local { dir } = backend;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating artifact directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.clone(),
            token_ttl: Duration::from_secs(token_ttl_secs),
            tokens: DashMap::new(),
        })
    }

    /// Persist one artifact and return a retrieval token.
    pub async fn store(&self, job_id: &str, suffix: &str, bytes: &[u8]) -> Result<String> {
        let name = format!("{job_id}-{}.{suffix}", uuid::Uuid::new_v4().simple());
        let path = self.dir.join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing artifact {}", path.display()))?;

        let token = hex::encode(rand::random::<[u8; 16]>());
        self.tokens.insert(
            token.clone(),
            TokenEntry { path, expires_at: Instant::now() + self.token_ttl },
        );
        debug!(job_id, artifact = %name, "stored artifact");
        Ok(token)
    }

    /// Resolve a token to its file path while it is still valid.
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<PathBuf> {
        let entry = self.tokens.get(token)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.tokens.remove(token);
            return None;
        }
        Some(entry.path.clone())
    }

    /// Drop expired tokens (called opportunistically by the broker sweep).
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.tokens.retain(|_, entry| entry.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_resolve_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(
            &StorageBackend::Local { dir: tmp.path().to_path_buf() },
            3600,
        )
        .unwrap();

        let token = store.store("job-1", "jpeg", b"bytes").await.unwrap();
        let path = store.resolve(&token).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"bytes");
        assert!(store.resolve("missing").is_none());
    }

    #[tokio::test]
    async fn expired_tokens_stop_resolving() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(
            &StorageBackend::Local { dir: tmp.path().to_path_buf() },
            0,
        )
        .unwrap();

        let token = store.store("job-1", "jpeg", b"bytes").await.unwrap();
        assert!(store.resolve(&token).is_none());
    }
}
