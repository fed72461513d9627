//! Flush timer and raw message queue.

use std::time::Duration;

use tokio::time::Instant;

/// One-shot debounce timer.
///
/// Arming an armed timer does not move its deadline, so a steady stream of
/// items still flushes once per interval.
#[derive(Debug, Clone)]
pub struct FlushTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl FlushTimer {
    /// Create an unarmed timer.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Arm the timer if it is not armed. Returns `true` if this call armed it.
    pub fn arm(&mut self) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Instant::now() + self.interval);
        true
    }

    /// Release the timer.
    pub const fn clear(&mut self) {
        self.deadline = None;
    }

    /// Check if the timer is armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Get the deadline, if armed.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Get the debounce interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

/// Queue of raw messages released once per flush window, oldest first.
///
/// # Example
///
/// ```rust
/// use dashboard_sync::infrastructure::batching::MessageBatcher;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut batcher = MessageBatcher::new(Duration::from_millis(100));
///
/// // Only the first message of a window arms the timer.
/// assert!(batcher.push("a"));
/// assert!(!batcher.push("b"));
///
/// assert_eq!(batcher.take(), vec!["a", "b"]);
/// assert!(batcher.deadline().is_none());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MessageBatcher<T> {
    queue: Vec<T>,
    timer: FlushTimer,
}

impl<T> MessageBatcher<T> {
    /// Create an empty batcher.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            queue: Vec::new(),
            timer: FlushTimer::new(interval),
        }
    }

    /// Queue a message. Returns `true` if it opened a new window.
    pub fn push(&mut self, item: T) -> bool {
        self.queue.push(item);
        self.timer.arm()
    }

    /// Take the queued messages and release the timer.
    pub fn take(&mut self) -> Vec<T> {
        self.timer.clear();
        std::mem::take(&mut self.queue)
    }

    /// Get the flush deadline, if a window is open.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Get the number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_arms_once_per_window() {
        let mut timer = FlushTimer::new(Duration::from_millis(100));
        assert!(timer.arm());
        let first = timer.deadline().unwrap();

        tokio::time::advance(Duration::from_millis(40)).await;
        assert!(!timer.arm());
        assert_eq!(timer.deadline(), Some(first));

        timer.clear();
        assert!(!timer.is_armed());
        assert!(timer.arm());
        assert!(timer.deadline().unwrap() > first);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_preserves_arrival_order() {
        let mut batcher = MessageBatcher::new(Duration::from_millis(100));
        for n in 0..5 {
            batcher.push(n);
        }
        assert_eq!(batcher.len(), 5);

        tokio::time::sleep_until(batcher.deadline().unwrap()).await;

        assert_eq!(batcher.take(), vec![0, 1, 2, 3, 4]);
        assert!(batcher.is_empty());
        assert!(batcher.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn new_window_after_take() {
        let mut batcher = MessageBatcher::new(Duration::from_millis(100));
        batcher.push("a");
        let _ = batcher.take();

        assert!(batcher.push("b"));
        assert_eq!(batcher.take(), vec!["b"]);
    }
}
