//! Persistent registry of remote-instance identities.
//!
//! Every wrapper and kickstarter authenticates against an identity created
//! here: a UUID, a display name, and the verifying half of an Ed25519 key
//! pair. The signing half is handed back to the caller exactly once at
//! creation time and never stored server-side.
//!
//! The registry survives restarts through a JSON snapshot that is rewritten
//! wholesale after every mutation. Durability is best-effort: a failed write
//! is logged and the in-memory state stands. A stored key that fails to
//! parse on load is logged and skipped; one corrupt entry must not take the
//! rest of the table down with it.

use std::path::PathBuf;

use dashmap::DashMap;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use warden_protocol::{decode_verifying_key, encode_verifying_key};

/// One registered remote instance.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub key: VerifyingKey,
}

#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    id: Uuid,
    name: String,
    public_key: String,
}

#[derive(Default, Serialize, Deserialize)]
struct IdentitySnapshot {
    identities: Vec<IdentityRecord>,
}

/// The UUID -> (name, public key) table behind key-pair authentication.
pub struct IdentityRegistry {
    entries: DashMap<Uuid, Identity>,
    path: PathBuf,
    // Serializes snapshot rewrites relative to each other.
    persist_lock: Mutex<()>,
}

impl IdentityRegistry {
    /// Opens the registry, loading the snapshot at `path` when present.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let entries = DashMap::new();
        if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let snapshot: IdentitySnapshot = serde_json::from_str(&text)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            for record in snapshot.identities {
                match decode_verifying_key(&record.public_key) {
                    Ok(key) => {
                        entries.insert(
                            record.id,
                            Identity {
                                id: record.id,
                                name: record.name,
                                key,
                            },
                        );
                    }
                    Err(e) => warn!("Failed to read stored key for {}: {e}", record.id),
                }
            }
        }
        Ok(Self {
            entries,
            path,
            persist_lock: Mutex::new(()),
        })
    }

    /// Creates a fresh identity and returns the signing key to the caller.
    ///
    /// The signing key is not retained; losing the returned value means
    /// creating a new identity. Callers on a session's message path should
    /// run this from a spawned task.
    pub async fn create(&self, name: impl Into<String>) -> (Uuid, SigningKey) {
        let id = Uuid::new_v4();
        let signing = SigningKey::generate(&mut OsRng);
        self.entries.insert(
            id,
            Identity {
                id,
                name: name.into(),
                key: signing.verifying_key(),
            },
        );
        self.persist().await;
        (id, signing)
    }

    /// Removes an identity; returns whether it existed.
    pub async fn remove(&self, id: Uuid) -> bool {
        if self.entries.remove(&id).is_some() {
            self.persist().await;
            true
        } else {
            false
        }
    }

    /// Looks up an identity by UUID.
    pub fn get(&self, id: &Uuid) -> Option<Identity> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// All registered identities, ordered by UUID.
    pub fn list(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        identities.sort_by_key(|identity| identity.id);
        identities
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrites the whole snapshot. Best-effort: failures are logged, the
    /// in-memory table is not rolled back.
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = IdentitySnapshot {
            identities: self
                .list()
                .into_iter()
                .map(|identity| IdentityRecord {
                    id: identity.id,
                    name: identity.name,
                    public_key: encode_verifying_key(&identity.key),
                })
                .collect(),
        };
        let bytes = match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode identity snapshot: {e}");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.path, bytes).await {
            warn!("Failed to write identity snapshot: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_remove_then_get_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = IdentityRegistry::open(dir.path().join("identities.json")).unwrap();

        let (id, _signing) = registry.create("alpha").await;
        assert!(registry.get(&id).is_some());
        assert!(registry.remove(id).await);
        assert!(registry.get(&id).is_none());
        assert!(!registry.remove(id).await);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.json");

        let (id, signing) = {
            let registry = IdentityRegistry::open(&path).unwrap();
            registry.create("persisted").await
        };

        let reopened = IdentityRegistry::open(&path).unwrap();
        let identity = reopened.get(&id).expect("identity should survive restart");
        assert_eq!(identity.name, "persisted");
        assert_eq!(identity.key, signing.verifying_key());
    }

    #[tokio::test]
    async fn corrupt_entry_is_skipped_without_aborting_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.json");

        let good_id = Uuid::new_v4();
        let bad_id = Uuid::new_v4();
        let good_key = SigningKey::generate(&mut OsRng).verifying_key();
        let snapshot = json!({
            "identities": [
                {
                    "id": good_id,
                    "name": "good",
                    "public_key": encode_verifying_key(&good_key),
                },
                {
                    "id": bad_id,
                    "name": "bad",
                    "public_key": "definitely-not-a-key",
                },
            ]
        });
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let registry = IdentityRegistry::open(&path).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&good_id).is_some());
        assert!(registry.get(&bad_id).is_none());
    }

    #[tokio::test]
    async fn list_is_ordered_by_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let registry = IdentityRegistry::open(dir.path().join("identities.json")).unwrap();
        for i in 0..5 {
            registry.create(format!("instance-{i}")).await;
        }
        let listed = registry.list();
        assert_eq!(listed.len(), 5);
        assert!(listed.windows(2).all(|pair| pair[0].id < pair[1].id));
    }

    #[tokio::test]
    async fn signing_key_matches_stored_verifying_key() {
        use ed25519_dalek::{Signer, Verifier};

        let dir = tempfile::tempdir().unwrap();
        let registry = IdentityRegistry::open(dir.path().join("identities.json")).unwrap();
        let (id, signing) = registry.create("prover").await;
        let stored = registry.get(&id).unwrap();

        let signature = signing.sign(b"challenge");
        assert!(stored.key.verify(b"challenge", &signature).is_ok());
    }
}
