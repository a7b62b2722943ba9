// src/runtime/work_queue.rs

use crate::runtime::{Command, MailboxSender};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A unit of deferred work: an async closure executed on a serialized lane.
pub struct Work(Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + 'static>);

impl Work {
  pub fn new<F, Fut>(f: F) -> Self
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    Work(Box::new(move || {
      let fut: BoxFuture<'static, ()> = Box::pin(f());
      fut
    }))
  }

  pub(crate) async fn run(self) {
    (self.0)().await;
  }
}

impl fmt::Debug for Work {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Work")
  }
}

/// A handle onto one serialized execution lane (a connection's mailbox or the
/// container-wide lane).
///
/// `schedule` enqueues work to run no earlier than `delay` from now; the lane
/// consumer executes it, so two tasks bound to the same lane never run
/// concurrently. Zero-delay work is posted directly, preserving FIFO order
/// with other posts. `cancel_all` drops every not-yet-delivered task; it is
/// invoked when the owning context reaches its terminal state.
///
/// The pending-task counter is decremented only after the lane actor executed
/// (or cancellation dropped) the task, so an idle check over the counter sees
/// scheduled-but-unrun work.
#[derive(Debug, Clone)]
pub(crate) struct WorkQueue {
  target: MailboxSender,
  cancel: CancellationToken,
  pending: Arc<AtomicUsize>,
  drained: Arc<Notify>,
}

impl WorkQueue {
  pub fn new(target: MailboxSender) -> Self {
    Self::with_counters(target, Arc::new(AtomicUsize::new(0)), Arc::new(Notify::new()))
  }

  /// Lane sharing an external pending counter + notifier (the container lane
  /// feeds its scheduled-task count into the container's drain condition).
  pub fn with_counters(target: MailboxSender, pending: Arc<AtomicUsize>, drained: Arc<Notify>) -> Self {
    Self {
      target,
      cancel: CancellationToken::new(),
      pending,
      drained,
    }
  }

  pub fn schedule(&self, delay: Duration, work: Work) {
    self.post_after(delay, Command::RunWork { work });
  }

  /// Posts an arbitrary command into the lane after `delay`. Used for the
  /// reconnect retry timer so that close/stop cancellation covers it.
  pub fn post_after(&self, delay: Duration, cmd: Command) {
    if self.cancel.is_cancelled() {
      tracing::trace!("work lane already cancelled, dropping {}", cmd.variant_name());
      return;
    }
    self.pending.fetch_add(1, Ordering::AcqRel);
    if delay.is_zero() {
      // Direct post keeps submission order with other immediate work.
      match self.target.try_send(cmd) {
        Ok(()) => {}
        Err(async_channel::TrySendError::Full(cmd)) => {
          let queue = self.clone();
          tokio::spawn(async move {
            if queue.target.send(cmd).await.is_err() {
              queue.task_done();
            }
          });
        }
        Err(async_channel::TrySendError::Closed(_)) => self.task_done(),
      }
      return;
    }
    let queue = self.clone();
    tokio::spawn(async move {
      tokio::select! {
        _ = tokio::time::sleep(delay) => {
          if queue.target.send(cmd).await.is_err() {
            queue.task_done();
          }
        }
        _ = queue.cancel.cancelled() => {
          queue.task_done();
        }
      }
    });
  }

  /// Called by the lane consumer after it executed (or discarded) a delivered
  /// task.
  pub fn task_done(&self) {
    if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
      self.drained.notify_waiters();
    }
  }

  pub fn pending(&self) -> usize {
    self.pending.load(Ordering::Acquire)
  }

  pub fn cancel_all(&self) {
    self.cancel.cancel();
  }
}
