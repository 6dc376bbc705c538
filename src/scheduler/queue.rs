use super::outcome::ScheduledTask;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Pending tasks in submission order, gated by their eligibility time.
pub struct PendingQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T: ScheduledTask> PendingQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, task: T) {
        self.items.lock().await.push_back(task);
    }

    /// Removes up to `limit` tasks eligible at `now_ms`, oldest first. Ineligible tasks keep
    /// their position.
    pub async fn take_eligible(&self, now_ms: u64, limit: usize) -> Vec<T> {
        if limit == 0 {
            return Vec::new();
        }

        let mut items = self.items.lock().await;
        let mut ready = Vec::new();
        let mut waiting = VecDeque::with_capacity(items.len());

        while let Some(task) = items.pop_front() {
            if ready.len() < limit && task.not_before_ms() <= now_ms {
                ready.push(task);
            } else {
                waiting.push_back(task);
            }
        }

        *items = waiting;
        ready
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<T> {
        self.items.lock().await.iter().cloned().collect()
    }

    pub async fn clear(&self) {
        self.items.lock().await.clear();
    }
}

impl<T: ScheduledTask> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle used to add tasks to a scheduler's pending set.
pub struct TaskSubmitter<T> {
    queue: Arc<PendingQueue<T>>,
}

impl<T> Clone for TaskSubmitter<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T: ScheduledTask> TaskSubmitter<T> {
    pub(crate) fn new(queue: Arc<PendingQueue<T>>) -> Self {
        Self { queue }
    }

    /// Adds `task` to the pending set. Submissions are not deduplicated.
    pub async fn submit(&self, task: T) {
        tracing::trace!(task = ?task, "task submitted");
        self.queue.push(task).await;
    }

    pub async fn pending(&self) -> usize {
        self.queue.len().await
    }
}
