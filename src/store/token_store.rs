//! Durable token storage: one JSON document, whole-file rewrite on every
//! save. Writes go through a temp file and atomic rename with 0o600
//! permissions, so concurrent readers never observe a torn file. In-process
//! access is serialized behind an `RwLock`; cross-process writers remain
//! last-writer-wins (deployment decision, see DESIGN.md).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::crypto::encryption::TokenCipher;
use crate::errors::{CryptoError, StorageError};
use crate::helpers::time::hours;
use crate::observability::metrics::get_metrics;
use crate::store::record::{StoreFile, StoredEntry, TokenKind, TokenRecord};
use crate::utils::constants::ENC_PREFIX;

#[derive(Clone)]
pub struct TokenStore {
    path: PathBuf,
    cipher: Arc<TokenCipher>,
    inner: Arc<RwLock<StoreFile>>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReEncryptCounts {
    pub total: usize,
    pub re_encrypted: usize,
    pub already_strong: usize,
    pub unreadable: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReEncryptReport {
    pub user_tokens: ReEncryptCounts,
    pub page_tokens: ReEncryptCounts,
    pub business_tokens: ReEncryptCounts,
}

impl ReEncryptReport {
    fn counts_mut(&mut self, kind: TokenKind) -> &mut ReEncryptCounts {
        match kind {
            TokenKind::User => &mut self.user_tokens,
            TokenKind::Page => &mut self.page_tokens,
            TokenKind::Business => &mut self.business_tokens,
        }
    }
}

impl TokenStore {
    /// Load the store from disk. A missing file initializes an empty schema;
    /// a malformed one is logged and re-initialized empty (accepted data
    /// loss) so the service never refuses to start over a bad store file.
    pub async fn open(path: impl AsRef<Path>, cipher: Arc<TokenCipher>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<StoreFile>(&raw) {
                Ok(data) => {
                    info!("loaded token store from {}", path.display());
                    data
                }
                Err(err) => {
                    warn!(
                        "token store at {} is malformed ({err}), re-initializing empty",
                        path.display()
                    );
                    StoreFile::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("no token store at {}, starting empty", path.display());
                StoreFile::default()
            }
            Err(err) => {
                warn!("cannot read token store at {} ({err}), starting empty", path.display());
                StoreFile::default()
            }
        };

        Self {
            path,
            cipher,
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// Look up and decrypt one record. An entry whose payload no scheme can
    /// decode is an error; callers treat the token as absent and require
    /// re-authorization.
    pub async fn get(&self, kind: TokenKind, identity: &str) -> Result<Option<TokenRecord>, CryptoError> {
        let entry = {
            let guard = self.inner.read().await;
            guard.map(kind).get(identity).cloned()
        };
        let Some(entry) = entry else {
            return Ok(None);
        };
        match self.decode_entry(&entry) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                get_metrics().await.decrypt_failures.inc();
                warn!("stored {} token for '{}' is unreadable: {err}", kind.as_str(), identity);
                Err(err)
            }
        }
    }

    /// Encrypt and persist one record; stamps `updated_at` and rewrites the
    /// whole file.
    pub async fn put(&self, kind: TokenKind, identity: &str, record: &TokenRecord) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut record = record.clone();
        record.identity = identity.to_string();
        record.token_type = kind;
        record.updated_at = now;

        let plaintext = serde_json::to_string(&record)?;
        let (token, _scheme) = self.cipher.encrypt(&plaintext);
        let entry = StoredEntry {
            encrypted: true,
            token,
            updated_at: now,
        };

        let mut guard = self.inner.write().await;
        guard.map_mut(kind).insert(identity.to_string(), entry);
        self.persist(&guard).await?;
        get_metrics()
            .await
            .stored_tokens
            .with_label_values(&[kind.as_str()])
            .set(guard.map(kind).len() as i64);
        Ok(())
    }

    pub async fn remove(&self, kind: TokenKind, identity: &str) -> Result<bool, StorageError> {
        let mut guard = self.inner.write().await;
        let removed = guard.map_mut(kind).remove(identity).is_some();
        if removed {
            self.persist(&guard).await?;
        }
        Ok(removed)
    }

    /// Linear scan for records expiring inside the horizon, across all three
    /// maps. Records without an expiry are excluded; unreadable entries are
    /// logged and skipped.
    pub async fn all_expiring(&self, within_hours: u64) -> Vec<TokenRecord> {
        let horizon = hours(within_hours);
        let guard = self.inner.read().await;
        let mut out = Vec::new();
        for kind in TokenKind::ALL {
            for (identity, entry) in guard.map(kind) {
                match self.decode_entry(entry) {
                    Ok(record) if record.expires_within(horizon) => out.push(record),
                    Ok(_) => {}
                    Err(err) => {
                        warn!(
                            "skipping unreadable {} token for '{}' during expiry scan: {err}",
                            kind.as_str(),
                            identity
                        );
                    }
                }
            }
        }
        out
    }

    /// Migration pass: re-encode every fallback or plain entry with the
    /// strong scheme. With `force`, strong entries are rewrapped too (fresh
    /// nonce). Unreadable payloads are counted and left untouched.
    pub async fn re_encrypt_all(&self, force: bool) -> Result<ReEncryptReport, StorageError> {
        let mut report = ReEncryptReport::default();
        let mut guard = self.inner.write().await;
        let mut changed = false;

        for kind in TokenKind::ALL {
            let map = guard.map_mut(kind);
            for (identity, entry) in map.iter_mut() {
                let counts = report.counts_mut(kind);
                counts.total += 1;

                if entry.token.starts_with(ENC_PREFIX) && !force {
                    counts.already_strong += 1;
                    continue;
                }

                let plaintext = match self.cipher.decrypt(&entry.token) {
                    Ok(plaintext) => plaintext,
                    Err(err) => {
                        warn!(
                            "cannot re-encrypt {} token for '{}': {err}",
                            kind.as_str(),
                            identity
                        );
                        counts.unreadable += 1;
                        continue;
                    }
                };

                match self.cipher.encrypt_strict(&plaintext) {
                    Ok(token) => {
                        entry.token = token;
                        entry.encrypted = true;
                        entry.updated_at = Utc::now();
                        counts.re_encrypted += 1;
                        changed = true;
                    }
                    Err(err) => {
                        warn!(
                            "strong re-encryption failed for {} token '{}': {err}",
                            kind.as_str(),
                            identity
                        );
                        counts.unreadable += 1;
                    }
                }
            }
        }

        if changed {
            self.persist(&guard).await?;
        }
        Ok(report)
    }

    pub async fn len(&self, kind: TokenKind) -> usize {
        self.inner.read().await.map(kind).len()
    }

    fn decode_entry(&self, entry: &StoredEntry) -> Result<TokenRecord, CryptoError> {
        let plaintext = if entry.encrypted {
            self.cipher.decrypt(&entry.token)?
        } else {
            warn!("reading unencrypted legacy entry, will migrate on next save");
            entry.token.clone()
        };
        serde_json::from_str(&plaintext)
            .map_err(|e| CryptoError::Decryption(format!("record payload: {e}")))
    }

    /// Whole-file rewrite: temp file, 0o600, atomic rename.
    async fn persist(&self, data: &StoreFile) -> Result<(), StorageError> {
        let raw = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&tmp, raw.as_bytes()).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        fs::rename(&tmp, &self.path).await?;
        get_metrics().await.store_saves.inc();
        Ok(())
    }
}
