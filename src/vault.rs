//! Durable artifact storage
//!
//! The vault owns the filesystem layout for materialized artifacts and
//! the signed, expiring references handed out for retrieval. Layout is
//! deterministic and partitioned per owner/family/task/item-index, so
//! concurrent unrelated tasks never collide and a re-download of the
//! same item lands on the same path.
//!
//! Write-then-link discipline: bytes go to a `.part` sibling first and
//! are renamed into place only after the write is flushed. Nothing ever
//! observes a final path with partial data behind it, and a reference to
//! an artifact is only minted after the rename returned.

use crate::config::VaultConfig;
use crate::error::MaterializeError;
use crate::types::JobKind;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// Distinguishes concurrent writers' temp files; both notification
// channels may download the same artifact at once and must not trample
// each other's half-written bytes
static PART_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed artifact store with signed retrieval references
#[derive(Clone, Debug)]
pub struct ArtifactVault {
    root: PathBuf,
    signing_secret: String,
    artifact_ttl: Duration,
}

impl ArtifactVault {
    /// Create a vault over the configured root directory
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            root: config.root_dir.clone(),
            signing_secret: config.signing_secret.clone(),
            artifact_ttl: config.artifact_ttl,
        }
    }

    /// Deterministic vault-relative path for one artifact
    ///
    /// `{owner}/{family namespace}/{provider task id}/track_{index}.{ext}`
    /// with id segments sanitized to a filesystem-safe character set.
    pub fn artifact_path(
        &self,
        owner_id: &str,
        kind: JobKind,
        provider_task_id: &str,
        index: usize,
    ) -> String {
        format!(
            "{}/{}/{}/track_{}.{}",
            sanitize_segment(owner_id),
            kind.namespace(),
            sanitize_segment(provider_task_id),
            index,
            kind.file_extension()
        )
    }

    /// Persist bytes at a vault-relative path
    ///
    /// Writes to a uniquely named `.part` sibling, fsyncs, then renames
    /// into place. Re-storing the same path is allowed and atomic (last
    /// rename wins), which makes concurrent duplicate downloads
    /// harmless.
    pub async fn store(&self, relative_path: &str, bytes: &[u8]) -> Result<(), MaterializeError> {
        let final_path = self.absolute_path(relative_path).ok_or_else(|| {
            MaterializeError::Persist {
                path: relative_path.to_string(),
                reason: "path escapes vault root".to_string(),
            }
        })?;

        let persist_err = |reason: String| MaterializeError::Persist {
            path: relative_path.to_string(),
            reason,
        };

        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persist_err(format!("failed to create directory: {}", e)))?;
        }

        let seq = PART_SEQ.fetch_add(1, Ordering::Relaxed);
        let part_path = final_path.with_extension(format!(
            "{}.{}.part",
            final_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("bin"),
            seq
        ));

        {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::File::create(&part_path)
                .await
                .map_err(|e| persist_err(format!("failed to create temp file: {}", e)))?;
            file.write_all(bytes)
                .await
                .map_err(|e| persist_err(format!("failed to write bytes: {}", e)))?;
            file.sync_all()
                .await
                .map_err(|e| persist_err(format!("failed to flush bytes: {}", e)))?;
        }

        tokio::fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| persist_err(format!("failed to link into place: {}", e)))?;

        Ok(())
    }

    /// Mint a signed, expiring retrieval reference for a stored artifact
    ///
    /// The reference is a server-relative URL:
    /// `/artifacts/{path}?expires={unix}&sig={hex}`. Validity is the
    /// configured artifact TTL (24 hours by default).
    pub fn signed_url(&self, relative_path: &str) -> String {
        let expires = chrono::Utc::now().timestamp() + self.artifact_ttl.as_secs() as i64;
        let sig = self.signature(relative_path, expires);
        format!("/artifacts/{relative_path}?expires={expires}&sig={sig}")
    }

    /// Verify a retrieval token minted by [`signed_url`](Self::signed_url)
    ///
    /// Rejects expired tokens and signature mismatches; comparison is
    /// constant-time.
    pub fn verify_token(&self, relative_path: &str, expires: i64, sig: &str) -> bool {
        if expires < chrono::Utc::now().timestamp() {
            return false;
        }
        let expected = self.signature(relative_path, expires);
        constant_time_eq(expected.as_bytes(), sig.as_bytes())
    }

    /// Absolute filesystem path for a vault-relative path
    ///
    /// Returns `None` when the relative path would escape the vault root.
    pub fn absolute_path(&self, relative_path: &str) -> Option<PathBuf> {
        let relative = Path::new(relative_path);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if escapes || relative_path.is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Read a stored artifact's bytes
    pub async fn read(&self, relative_path: &str) -> Result<Vec<u8>, std::io::Error> {
        let path = self.absolute_path(relative_path).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path escapes vault root")
        })?;
        tokio::fs::read(path).await
    }

    fn signature(&self, relative_path: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(relative_path.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        let hash_result = hasher.finalize();
        format!("{:x}", hash_result)
    }
}

/// Replace characters outside `[A-Za-z0-9._-]` so external ids cannot
/// smuggle path separators into the layout
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
/// Always compares all bytes regardless of where the first mismatch occurs.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
