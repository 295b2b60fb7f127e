//! In-process push queue.
//!
//! Used by tests and embedders. Unacknowledged deliveries can be put back
//! with [`MemoryQueue::redeliver_unacked`], which is how tests simulate a
//! broker redelivering after a worker crash.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify};

use super::{Delivery, QueueError, QueueEvent, ReadingQueue};

#[derive(Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<Delivery>>,
    in_flight: DashMap<String, Delivery>,
    notify: Notify,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a payload and wake one waiting worker. Returns the delivery id.
    pub async fn push(&self, payload: impl Into<Vec<u8>>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.pending.lock().await.push_back(Delivery {
            id: id.clone(),
            payload: payload.into(),
        });
        self.notify.notify_one();
        id
    }

    /// Stop accepting work. Workers drain what is pending, then see `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Put every delivered-but-unacknowledged message back at the front.
    pub async fn redeliver_unacked(&self) -> usize {
        let ids: Vec<String> = self.in_flight.iter().map(|e| e.key().clone()).collect();
        let mut pending = self.pending.lock().await;
        let mut count = 0;
        for id in ids {
            if let Some((_, delivery)) = self.in_flight.remove(&id) {
                pending.push_front(delivery);
                count += 1;
            }
        }
        drop(pending);
        for _ in 0..count {
            self.notify.notify_one();
        }
        count
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[async_trait]
impl ReadingQueue for MemoryQueue {
    async fn receive(&self) -> Result<QueueEvent, QueueError> {
        loop {
            // Register interest before checking state so a push or close
            // between the check and the await still wakes us
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.pending.lock().await.pop_front() {
                self.in_flight
                    .insert(delivery.id.clone(), delivery.clone());
                return Ok(QueueEvent::Delivery(delivery));
            }
            if self.closed.load(Ordering::SeqCst) {
                return Ok(QueueEvent::Closed);
            }
            notified.await;
        }
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), QueueError> {
        self.in_flight.remove(delivery_id);
        Ok(())
    }

    fn queue_name(&self) -> &str {
        "memory"
    }
}
