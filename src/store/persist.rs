//! Periodic best-effort snapshots of the keyspace.
//!
//! The snapshot is a single JSON document:
//!
//! ```json
//! {"data": [["key", value], ...], "expiration": [["key", expiry_epoch_ms], ...]}
//! ```
//!
//! Encoded buffers are written as `{"type": "Buffer", "data": [bytes]}`, containers as
//! `{"type": "List" | "Set" | "Hash" | "SortedSet" | "TimeSeries" | "Bitmap", "data": ...}` and
//! raw values as themselves.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::encoding::{Codec, DecodeError, Stored};
use super::entry::Entry;
use super::{now_ms, InnerStoreLocked, Store};

#[derive(Debug, ThisError)]
pub enum PersistError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid encoded value for key {key}: {source}")]
    Decode { key: String, source: DecodeError },
    #[error("unexpected container nested in key {key}")]
    Nested { key: String },
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: Vec<(String, Persisted)>,
    pub expiration: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Persisted {
    Tagged(Tagged),
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Tagged {
    Buffer(Vec<u8>),
    List(Vec<Persisted>),
    Set(Vec<Value>),
    Hash(BTreeMap<String, Persisted>),
    SortedSet(BTreeMap<String, Persisted>),
    TimeSeries(Vec<(Number, Persisted)>),
    Bitmap(Vec<u8>),
}

impl From<&Stored> for Persisted {
    fn from(stored: &Stored) -> Self {
        match stored {
            Stored::Encoded(bytes) => Persisted::Tagged(Tagged::Buffer(bytes.to_vec())),
            Stored::Raw(value) => Persisted::Raw(value.clone()),
        }
    }
}

impl From<&Entry> for Persisted {
    fn from(entry: &Entry) -> Self {
        let tagged = match entry {
            Entry::Scalar(stored) => return stored.into(),
            Entry::List(items) => Tagged::List(items.iter().map(Persisted::from).collect()),
            Entry::Set(members) => Tagged::Set(members.clone()),
            Entry::Hash(fields) => Tagged::Hash(
                fields
                    .iter()
                    .map(|(field, v)| (field.clone(), v.into()))
                    .collect(),
            ),
            Entry::SortedSet(scores) => Tagged::SortedSet(
                scores
                    .iter()
                    .map(|(member, v)| (member.clone(), v.into()))
                    .collect(),
            ),
            Entry::TimeSeries(points) => Tagged::TimeSeries(
                points
                    .iter()
                    .map(|(ts, v)| (ts.clone(), v.into()))
                    .collect(),
            ),
            Entry::Bitmap(bytes) => Tagged::Bitmap(bytes.to_vec()),
        };
        Persisted::Tagged(tagged)
    }
}

impl<'a> InnerStoreLocked<'a> {
    pub fn snapshot(&self) -> Snapshot {
        let data = self
            .state
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.into()))
            .collect();
        let expiration = self
            .state
            .expirations
            .iter()
            .map(|(key, expiration)| (key.clone(), expiration.at_ms))
            .collect();

        Snapshot { data, expiration }
    }

    /// Loads `snapshot` into the keyspace, replacing keys with the same name. Expirations are
    /// rescheduled relative to the current time; those already past fire right away.
    /// Nothing is loaded when any entry fails to decode.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<(), PersistError> {
        let entries = snapshot
            .data
            .into_iter()
            .map(|(key, persisted)| {
                let entry = restore_entry(&mut self.state.codec, &key, persisted)?;
                Ok((key, entry))
            })
            .collect::<Result<Vec<_>, PersistError>>()?;
        self.state.entries.extend(entries);

        let now = now_ms();
        for (key, at_ms) in snapshot.expiration {
            if !self.exists(&key) {
                continue;
            }
            let ttl = Duration::from_millis(at_ms.saturating_sub(now));
            if let Some(deadline) = Instant::now().checked_add(ttl) {
                self.schedule_expiration(&key, at_ms, deadline);
            }
        }
        Ok(())
    }
}

fn restore_entry(
    codec: &mut Codec,
    key: &str,
    persisted: Persisted,
) -> Result<Entry, PersistError> {
    let tagged = match persisted {
        Persisted::Raw(value) => return Ok(Entry::Scalar(Stored::Raw(value))),
        Persisted::Tagged(tagged) => tagged,
    };

    let entry = match tagged {
        Tagged::Buffer(bytes) => Entry::Scalar(reencode(codec, key, &bytes)?),
        Tagged::List(items) => Entry::List(
            items
                .into_iter()
                .map(|item| restore_stored(codec, key, item))
                .collect::<Result<_, _>>()?,
        ),
        Tagged::Set(members) => Entry::Set(members),
        Tagged::Hash(fields) => Entry::Hash(
            fields
                .into_iter()
                .map(|(field, v)| Ok((field, restore_stored(codec, key, v)?)))
                .collect::<Result<_, PersistError>>()?,
        ),
        Tagged::SortedSet(scores) => Entry::SortedSet(
            scores
                .into_iter()
                .map(|(member, v)| Ok((member, restore_stored(codec, key, v)?)))
                .collect::<Result<_, PersistError>>()?,
        ),
        Tagged::TimeSeries(points) => Entry::TimeSeries(
            points
                .into_iter()
                .map(|(ts, v)| Ok((ts, restore_stored(codec, key, v)?)))
                .collect::<Result<_, PersistError>>()?,
        ),
        Tagged::Bitmap(bytes) => Entry::Bitmap(BytesMut::from(&bytes[..])),
    };
    Ok(entry)
}

fn restore_stored(
    codec: &mut Codec,
    key: &str,
    persisted: Persisted,
) -> Result<Stored, PersistError> {
    match persisted {
        Persisted::Raw(value) => Ok(Stored::Raw(value)),
        Persisted::Tagged(Tagged::Buffer(bytes)) => reencode(codec, key, &bytes),
        Persisted::Tagged(_) => Err(PersistError::Nested {
            key: key.to_string(),
        }),
    }
}

fn reencode(codec: &mut Codec, key: &str, bytes: &[u8]) -> Result<Stored, PersistError> {
    codec.reencode(bytes).map_err(|source| PersistError::Decode {
        key: key.to_string(),
        source,
    })
}

/// Reads the snapshot at `path`. A missing file is not an error.
pub async fn load(path: &Path) -> Result<Option<Snapshot>, PersistError> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(serde_json::from_slice(&contents)?))
}

/// Writes the snapshot next to `path` and renames it into place.
pub async fn save(path: &Path, snapshot: &Snapshot) -> Result<(), PersistError> {
    let contents = serde_json::to_vec(snapshot)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Loads `path` into `store` if it exists. Unreadable snapshots are logged and ignored.
pub async fn restore(store: &Store, path: &Path) {
    match load(path).await {
        Ok(Some(snapshot)) => {
            let keys = snapshot.data.len();
            match store.lock().restore(snapshot) {
                Ok(()) => info!(keys, path = %path.display(), "restored snapshot"),
                Err(err) => warn!("failed to restore snapshot, starting fresh: {}", err),
            }
        }
        Ok(None) => info!(path = %path.display(), "no snapshot found, starting fresh"),
        Err(err) => warn!("failed to read snapshot, starting fresh: {}", err),
    }
}

pub async fn persist(store: &Store, path: &Path) -> Result<(), PersistError> {
    let snapshot = store.lock().snapshot();
    save(path, &snapshot).await?;
    debug!(keys = snapshot.data.len(), "snapshot written");
    Ok(())
}

/// Writes a snapshot of `store` to `path` every `period`.
pub fn spawn(store: Store, path: PathBuf, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(err) = persist(&store, &path).await {
                warn!("failed to write snapshot: {}", err);
            }
        }
    })
}
