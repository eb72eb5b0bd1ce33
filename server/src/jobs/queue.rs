use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use tokio::sync::Notify;
use uuid::Uuid;

/// The background job families the service runs. Each kind owns its own
/// queue and worker so a slow thumbnail render never delays metadata
/// extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobKind {
    MetadataExtraction,
    ThumbnailGeneration,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::MetadataExtraction => write!(f, "metadata_extraction"),
            JobKind::ThumbnailGeneration => write!(f, "thumbnail_generation"),
        }
    }
}

/// Unbounded in-memory FIFO of plate ids awaiting processing.
///
/// Enqueue never blocks and the consumer polls with `try_dequeue`, which
/// keeps the worker loop free to observe cancellation between items.
/// Duplicate ids are kept; each entry is processed once.
pub(crate) struct JobQueue {
    inner: Mutex<VecDeque<Uuid>>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn enqueue(&self, plate_id: Uuid) {
        self.inner.lock().unwrap().push_back(plate_id);
        self.notify.notify_one();
    }

    pub fn try_dequeue(&self) -> Option<Uuid> {
        self.inner.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Waits until an enqueue signals new work. A permit is stored when the
    /// enqueue happens before the wait, so wake-ups are not lost.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn dequeues_in_fifo_order() {
        let queue = JobQueue::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        queue.enqueue(first);
        queue.enqueue(second);

        assert_eq!(queue.try_dequeue(), Some(first));
        assert_eq!(queue.try_dequeue(), Some(second));
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn empty_queue_polls_none() {
        let queue = JobQueue::new();
        assert_eq!(queue.try_dequeue(), None);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn duplicate_ids_are_kept() {
        let queue = JobQueue::new();
        let id = Uuid::new_v4();
        queue.enqueue(id);
        queue.enqueue(id);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_dequeue(), Some(id));
        assert_eq!(queue.try_dequeue(), Some(id));
    }

    #[tokio::test]
    async fn enqueue_stores_a_wakeup_permit() {
        let queue = JobQueue::new();
        queue.enqueue(Uuid::new_v4());

        tokio::time::timeout(Duration::from_millis(100), queue.notified())
            .await
            .expect("wakeup permit should be waiting");
    }
}
