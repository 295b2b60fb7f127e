//! Stdin Queue: one JSON reading per line
//!
//! `cat readings.jsonl | aqi-pipeline run` style ingestion. There is no
//! redelivery, so acknowledgement is a no-op. Lines are handed over as raw
//! bytes; a line that is not UTF-8 reaches the decoder and is counted there.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use super::{Delivery, QueueError, QueueEvent, ReadingQueue};

type LineReader = Box<dyn AsyncBufRead + Unpin + Send>;

pub struct StdinQueue {
    reader: Mutex<LineReader>,
    line_no: AtomicU64,
}

impl StdinQueue {
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    /// Line queue over any buffered reader.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        Self {
            reader: Mutex::new(Box::new(reader)),
            line_no: AtomicU64::new(0),
        }
    }
}

impl Default for StdinQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingQueue for StdinQueue {
    async fn receive(&self) -> Result<QueueEvent, QueueError> {
        let mut reader = self.reader.lock().await;
        let mut line = Vec::with_capacity(512);
        loop {
            line.clear();
            let bytes = reader
                .read_until(b'\n', &mut line)
                .await
                .map_err(|e| QueueError::Io(e.to_string()))?;
            if bytes == 0 {
                return Ok(QueueEvent::Closed);
            }
            let n = self.line_no.fetch_add(1, Ordering::Relaxed) + 1;
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(QueueEvent::Delivery(Delivery {
                id: format!("line-{n}"),
                payload: trimmed.to_vec(),
            }));
        }
    }

    async fn ack(&self, _delivery_id: &str) -> Result<(), QueueError> {
        Ok(())
    }

    fn queue_name(&self) -> &str {
        "stdin"
    }
}
