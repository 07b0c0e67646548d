//! Recurring work driven by a [`Ticker`].
//!
//! A [`PeriodicTask`] builds a fresh future on every tick and drives it to
//! completion before waiting for the next one. It runs until it is canceled
//! through its [`Cancellation`] handle or stopped by a `continue_if` predicate.

use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll, ready},
    time::Duration,
};

use futures::task::AtomicWaker;
use pin_project_lite::pin_project;
use tracing::debug;

use crate::{
    Error,
    ticker::{MissedTickBehavior, Ticker},
};

type Callback<T> = Box<dyn FnMut(&T) + Send>;
type Predicate<T> = Box<dyn FnMut(&T) -> bool + Send>;

pin_project! {
    /// A future that runs a freshly built future once per period.
    ///
    /// Runs never overlap: a tick that arrives while a run is still in flight is
    /// handled by the ticker's [`MissedTickBehavior`].
    ///
    /// Awaiting the task resolves to `None` after [`Cancellation::cancel`], or to
    /// the output of the last run when stopped by [`Cancellation::cancel_after_ready`]
    /// or by the [`continue_if`](PeriodicTask::continue_if) predicate. Otherwise it
    /// never completes.
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct PeriodicTask<G, F>
    where
        F: Future,
        G: FnMut() -> F,
    {
        make: G,
        #[pin]
        running: Option<F>,
        ticker: Ticker,
        runs: u64,
        cancellation: Cancellation,
        cb: Option<Callback<F::Output>>,
        keep_going: Option<Predicate<F::Output>>,
    }
}

impl<G, F> PeriodicTask<G, F>
where
    F: Future,
    G: FnMut() -> F,
{
    /// Creates a task that calls `make` on every tick and awaits the returned future.
    ///
    /// The first run starts one `period` after creation. The returned [`Cancellation`]
    /// stops the task.
    pub fn new(make: G, period: Duration) -> Result<(Self, Cancellation), Error> {
        let ticker = Ticker::new(period)?;
        let cancellation = Cancellation::new();
        let task = Self {
            make,
            running: None,
            ticker,
            runs: 0,
            cancellation: cancellation.clone(),
            cb: None,
            keep_going: None,
        };
        Ok((task, cancellation))
    }

    /// Registers a callback invoked with the output of every completed run.
    pub fn on_completion(&mut self, cb: impl FnMut(&F::Output) + Send + 'static) -> &mut Self {
        self.cb = Some(Box::new(cb));
        self
    }

    /// Stops the task after the first run whose output fails `should_continue`.
    ///
    /// The rejected output becomes the task's result.
    pub fn continue_if(
        &mut self,
        should_continue: impl FnMut(&F::Output) -> bool + Send + 'static,
    ) -> &mut Self {
        self.keep_going = Some(Box::new(should_continue));
        self
    }

    /// Sets how ticks missed during a long run are handled.
    pub fn missed_tick_behavior(&mut self, behavior: MissedTickBehavior) -> &mut Self {
        self.ticker.set_missed_tick_behavior(behavior);
        self
    }

    /// Number of runs completed so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }
}

impl<G, F> Future for PeriodicTask<G, F>
where
    F: Future,
    G: FnMut() -> F,
{
    type Output = Option<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        this.cancellation.waker.register(cx.waker());

        loop {
            if this.cancellation.is_cancelled() {
                debug!(runs = *this.runs, "periodic task canceled");
                this.running.set(None);
                return Poll::Ready(None);
            }

            if let Some(run) = this.running.as_mut().as_pin_mut() {
                let output = ready!(run.poll(cx));
                this.running.set(None);
                *this.runs += 1;
                debug!(runs = *this.runs, "periodic run completed");

                if let Some(cb) = this.cb.as_mut() {
                    cb(&output);
                }
                if this.cancellation.after_run.load(Ordering::Relaxed) {
                    debug!(runs = *this.runs, "periodic task canceled after run");
                    return Poll::Ready(Some(output));
                }
                if let Some(keep_going) = this.keep_going.as_mut() {
                    if !keep_going(&output) {
                        debug!(runs = *this.runs, "periodic task stopped by its predicate");
                        return Poll::Ready(Some(output));
                    }
                }
                continue;
            }

            ready!(this.ticker.poll_tick(cx));
            this.running.set(Some((this.make)()));
        }
    }
}

/// Stops a [`PeriodicTask`] from another task or thread.
///
/// Clones share the same flags, so any clone can stop the task.
#[derive(Clone)]
pub struct Cancellation {
    now: Arc<AtomicBool>,
    after_run: Arc<AtomicBool>,
    // Task to wake when `cancel` is called while it waits for a tick.
    waker: Arc<AtomicWaker>,
}

impl Cancellation {
    fn new() -> Self {
        Self {
            now: Arc::new(AtomicBool::new(false)),
            after_run: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(AtomicWaker::new()),
        }
    }

    /// Stops the task at once. A run in flight is dropped unfinished and the
    /// task resolves to `None`.
    pub fn cancel(&self) {
        self.now.store(true, Ordering::Relaxed);
        self.waker.wake();
    }

    /// Stops the task once its next run completes; it resolves to that run's output.
    pub fn cancel_after_ready(&self) {
        self.after_run.store(true, Ordering::Relaxed);
    }

    /// Whether [`cancel`](Cancellation::cancel) was called. A pending
    /// `cancel_after_ready` does not count.
    pub fn is_cancelled(&self) -> bool {
        self.now.load(Ordering::Relaxed)
    }
}
