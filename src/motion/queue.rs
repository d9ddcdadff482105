// src/motion/queue.rs - Bounded FIFO of motion commands with a bounded lock wait
use chessbot_shared::MotionCommand;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("motion queue is full")]
    Full,
    #[error("timed out waiting for the motion queue lock")]
    LockTimeout,
}

/// Statistics for the motion queue
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub length: usize,
    pub max_length: usize,
    pub total_pushed: u64,
    pub rejected: u64,
    pub last_command: Option<MotionCommand>,
}

#[derive(Debug, Default)]
struct QueueInner {
    commands: VecDeque<MotionCommand>,
    stats: QueueStats,
}

/// Multi-producer / single-consumer command queue.
///
/// `pending` counts commands pushed but not yet handed to the step timer, so
/// "queue drained" can be decided without racing the dispatcher.
#[derive(Debug)]
pub struct MotionQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    lock_timeout: Duration,
    pending: AtomicUsize,
}

impl MotionQueue {
    pub fn new(capacity: usize, lock_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                commands: VecDeque::with_capacity(capacity),
                stats: QueueStats::default(),
            }),
            capacity,
            lock_timeout,
            pending: AtomicUsize::new(0),
        }
    }

    async fn lock(&self) -> Result<MutexGuard<'_, QueueInner>, QueueError> {
        tokio::time::timeout(self.lock_timeout, self.inner.lock())
            .await
            .map_err(|_| {
                tracing::warn!("Motion queue lock not acquired within {:?}", self.lock_timeout);
                QueueError::LockTimeout
            })
    }

    /// Append a command; `Full` is backpressure and the caller should retry.
    pub async fn push(&self, cmd: MotionCommand) -> Result<(), QueueError> {
        let mut inner = self.lock().await?;
        if inner.commands.len() >= self.capacity {
            inner.stats.rejected += 1;
            return Err(QueueError::Full);
        }
        inner.commands.push_back(cmd);
        self.pending.fetch_add(1, Ordering::AcqRel);
        inner.stats.total_pushed += 1;
        inner.stats.length = inner.commands.len();
        inner.stats.max_length = inner.stats.max_length.max(inner.stats.length);
        inner.stats.last_command = Some(cmd);
        Ok(())
    }

    /// Oldest command, or `None` when empty. The caller must follow up with
    /// [`mark_dispatched`](Self::mark_dispatched) once the command is started.
    pub async fn pop(&self) -> Result<Option<MotionCommand>, QueueError> {
        let mut inner = self.lock().await?;
        let cmd = inner.commands.pop_front();
        inner.stats.length = inner.commands.len();
        Ok(cmd)
    }

    /// Return a popped command to the head of the queue. It still counts as pending
    /// and is not recorded as a new push.
    pub async fn requeue(&self, cmd: MotionCommand) -> Result<(), QueueError> {
        let mut inner = self.lock().await?;
        inner.commands.push_front(cmd);
        inner.stats.length = inner.commands.len();
        Ok(())
    }

    pub fn mark_dispatched(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Drop every queued command. Returns how many were discarded.
    pub async fn clear(&self) -> Result<usize, QueueError> {
        let mut inner = self.lock().await?;
        let dropped = inner.commands.len();
        inner.commands.clear();
        inner.stats.length = 0;
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(dropped)));
        Ok(dropped)
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.lock().await?.commands.len())
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(self.lock().await?.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(x: f64) -> MotionCommand {
        MotionCommand::new(x, 0.0, 40.0, false)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MotionQueue::new(16, Duration::from_millis(50));
        for i in 0..3 {
            queue.push(cmd(i as f64)).await.unwrap();
        }
        for i in 0..3 {
            assert_eq!(queue.pop().await.unwrap().unwrap().x_mm, i as f64);
        }
        assert_eq!(queue.pop().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let queue = MotionQueue::new(16, Duration::from_millis(50));
        for i in 0..16 {
            queue.push(cmd(i as f64)).await.unwrap();
        }
        assert_eq!(queue.push(cmd(99.0)).await, Err(QueueError::Full));
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.length, 16);
        assert_eq!(stats.max_length, 16);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.total_pushed, 16);

        queue.pop().await.unwrap();
        assert!(queue.push(cmd(99.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_pending_tracks_dispatch() {
        let queue = MotionQueue::new(4, Duration::from_millis(50));
        queue.push(cmd(1.0)).await.unwrap();
        queue.push(cmd(2.0)).await.unwrap();
        assert_eq!(queue.pending(), 2);
        queue.pop().await.unwrap();
        assert_eq!(queue.pending(), 2);
        queue.mark_dispatched();
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.clear().await.unwrap(), 1);
        assert_eq!(queue.pending(), 0);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_requeue_returns_command_to_head() {
        let queue = MotionQueue::new(2, Duration::from_millis(50));
        queue.push(cmd(1.0)).await.unwrap();
        queue.push(cmd(2.0)).await.unwrap();
        let first = queue.pop().await.unwrap().unwrap();
        queue.requeue(first).await.unwrap();
        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.stats().await.unwrap().total_pushed, 2);
        assert_eq!(queue.pop().await.unwrap().unwrap().x_mm, 1.0);
        assert_eq!(queue.pop().await.unwrap().unwrap().x_mm, 2.0);
    }

    #[tokio::test]
    async fn test_lock_wait_is_bounded() {
        let queue = MotionQueue::new(4, Duration::from_millis(20));
        let _held = queue.inner.lock().await;
        assert_eq!(queue.push(cmd(1.0)).await, Err(QueueError::LockTimeout));
    }
}
