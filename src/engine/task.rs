//! Run-once tasks shared by every caller
//!
//! [`SharedTask`] drives one in-flight execution per owner. The first caller
//! spawns the work on the tokio runtime; every caller, including ones arriving
//! while the work is still pending, waits on the same result instead of starting
//! a second execution.
//!
//! The work runs on its own task, so a caller that stops waiting (a timeout or a
//! dropped future) never cancels it. When it finishes later its result is still
//! stored for future callers.

use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Boxed, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A lazily started, memoized task.
#[derive(Debug)]
pub struct SharedTask<T> {
    slot: Mutex<Option<watch::Receiver<Option<T>>>>,
}

impl<T> Default for SharedTask<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> SharedTask<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the work was already spawned
    pub fn is_started(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// The result, if the work has finished
    pub fn peek(&self) -> Option<T> {
        let slot = self.slot.lock();
        let rx = slot.as_ref()?;
        let value = (*rx.borrow()).clone();
        value
    }

    /// Start the work on first call and wait for its result.
    ///
    /// `start` is only invoked by the first caller. Must be called from within a
    /// tokio runtime. Returns `None` if the work panicked.
    pub async fn run<F, Fut>(
        &self,
        start: F,
    ) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (mut rx, tx) = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(rx) => (rx.clone(), None),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx.clone());
                    (rx, Some(tx))
                }
            }
        };

        // `start` runs outside the slot lock: its synchronous part may peek at this task
        if let Some(tx) = tx {
            let work = start();
            tokio::spawn(async move {
                let value = work.await;
                let _ = tx.send(Some(value));
            });
        }

        let result = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        result
    }
}
