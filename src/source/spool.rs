//! Spool Queue: durable directory queue for inbound readings
//!
//! Each message is one `*.json` file named `<nanos>-<uuid>.json`, so a
//! directory listing sorted by name is arrival order. Producers write to a
//! `.tmp` file and rename, so a worker never sees a half-written message.
//! Acknowledging deletes the file; anything left on disk at startup is
//! delivered again.

use async_trait::async_trait;
use dashmap::DashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Delivery, QueueError, QueueEvent, ReadingQueue};

pub struct SpoolQueue {
    dir: PathBuf,
    poll_interval: Duration,
    /// File names handed to a worker and not yet acknowledged.
    claimed: DashSet<String>,
    /// Report `Closed` instead of polling once the directory is empty.
    close_when_empty: AtomicBool,
}

impl SpoolQueue {
    /// Create or open a spool at the given directory.
    pub fn open<P: AsRef<Path>>(dir: P, poll_interval: Duration) -> Result<Self, QueueError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| QueueError::Io(e.to_string()))?;

        let queue = Self {
            dir,
            poll_interval,
            claimed: DashSet::new(),
            close_when_empty: AtomicBool::new(false),
        };

        let pending = queue.pending_count()?;
        if pending > 0 {
            info!(pending = pending, dir = %queue.dir.display(), "Spool opened with pending readings");
        } else {
            debug!(dir = %queue.dir.display(), "Spool opened (empty)");
        }

        Ok(queue)
    }

    /// Batch mode: drain what is on disk, then close.
    pub fn close_when_empty(self, enabled: bool) -> Self {
        self.close_when_empty.store(enabled, Ordering::SeqCst);
        self
    }

    /// Write one payload into the spool. Returns the message file name.
    pub fn enqueue(&self, payload: &[u8]) -> Result<String, QueueError> {
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let name = format!("{nanos:020}-{}.json", uuid::Uuid::new_v4());
        let tmp = self.dir.join(format!("{name}.tmp"));

        fs::write(&tmp, payload).map_err(|e| QueueError::Io(e.to_string()))?;
        fs::rename(&tmp, self.dir.join(&name)).map_err(|e| QueueError::Io(e.to_string()))?;

        debug!(file = %name, size_bytes = payload.len(), "Reading spooled");
        Ok(name)
    }

    /// Serialize a value and spool it.
    pub fn enqueue_json<T: serde::Serialize>(&self, value: &T) -> Result<String, QueueError> {
        let json =
            serde_json::to_vec(value).map_err(|e| QueueError::Serialization(e.to_string()))?;
        self.enqueue(&json)
    }

    /// Messages on disk, claimed or not.
    pub fn pending_count(&self) -> Result<usize, QueueError> {
        Ok(self.list_messages()?.len())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Message file names, oldest first.
    fn list_messages(&self) -> Result<Vec<String>, QueueError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| QueueError::Io(e.to_string()))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.ends_with(".json"))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Claim and read the oldest unclaimed message, if any.
    async fn try_claim(&self) -> Result<Option<Delivery>, QueueError> {
        for name in self.list_messages()? {
            if !self.claimed.insert(name.clone()) {
                continue;
            }
            match tokio::fs::read(self.dir.join(&name)).await {
                Ok(payload) => return Ok(Some(Delivery { id: name, payload })),
                Err(e) => {
                    // Acked by another process between listing and reading
                    warn!(file = %name, error = %e, "Could not read spooled reading");
                    self.claimed.remove(&name);
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ReadingQueue for SpoolQueue {
    async fn receive(&self) -> Result<QueueEvent, QueueError> {
        loop {
            if let Some(delivery) = self.try_claim().await? {
                return Ok(QueueEvent::Delivery(delivery));
            }
            if self.close_when_empty.load(Ordering::SeqCst) && self.claimed.is_empty() {
                return Ok(QueueEvent::Closed);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), QueueError> {
        let path = self.dir.join(delivery_id);
        let result = tokio::fs::remove_file(&path).await;
        // Released either way: a message whose file survived is delivered again
        self.claimed.remove(delivery_id);
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QueueError::Io(e.to_string())),
        }
    }

    fn queue_name(&self) -> &str {
        "spool"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &Path) -> SpoolQueue {
        SpoolQueue::open(dir, Duration::from_millis(10)).unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_receive_ack() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = open(&tmp.path().join("spool"));

        queue.enqueue(b"first").unwrap();
        queue.enqueue(b"second").unwrap();
        assert_eq!(queue.pending_count().unwrap(), 2);

        let QueueEvent::Delivery(d) = queue.receive().await.unwrap() else {
            panic!("expected delivery");
        };
        assert_eq!(d.payload, b"first"); // oldest first
        queue.ack(&d.id).await.unwrap();
        assert_eq!(queue.pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_claimed_message_not_delivered_twice() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = open(tmp.path()).close_when_empty(true);
        queue.enqueue(b"only").unwrap();

        let first = queue.receive().await.unwrap();
        assert!(matches!(first, QueueEvent::Delivery(_)));
        // Still claimed (unacked): the next receive must not hand it out again
        let second = tokio::time::timeout(Duration::from_millis(50), queue.receive()).await;
        assert!(second.is_err(), "claimed message was redelivered");
    }

    #[tokio::test]
    async fn test_unacked_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let queue = open(tmp.path());
            queue.enqueue(b"x").unwrap();
            let _ = queue.receive().await.unwrap(); // never acked
        }
        let queue = open(tmp.path()).close_when_empty(true);
        let QueueEvent::Delivery(d) = queue.receive().await.unwrap() else {
            panic!("expected redelivery after restart");
        };
        assert_eq!(d.payload, b"x");
        queue.ack(&d.id).await.unwrap();
        assert_eq!(queue.receive().await.unwrap(), QueueEvent::Closed);
    }

    #[tokio::test]
    async fn test_temp_files_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("partial.json.tmp"), b"{").unwrap();
        let queue = open(tmp.path()).close_when_empty(true);
        assert_eq!(queue.pending_count().unwrap(), 0);
        assert_eq!(queue.receive().await.unwrap(), QueueEvent::Closed);
    }

    #[tokio::test]
    async fn test_failed_ack_releases_claim() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = open(tmp.path());
        // unlink fails on a directory with something other than NotFound
        std::fs::create_dir(tmp.path().join("stuck.json")).unwrap();
        queue.claimed.insert("stuck.json".to_string());

        assert!(matches!(queue.ack("stuck.json").await, Err(QueueError::Io(_))));
        assert!(!queue.claimed.contains("stuck.json"));
    }

    #[tokio::test]
    async fn test_ack_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = open(tmp.path());
        let name = queue.enqueue(b"x").unwrap();
        queue.ack(&name).await.unwrap();
        queue.ack(&name).await.unwrap();
    }
}
