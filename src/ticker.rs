//! A fixed-period tick source that works under any executor.
//!
//! A [`Ticker`] fires once at the end of every period, measured on a fixed grid
//! from the moment it was created, for as long as it is alive. Wake-ups come from
//! a single process-wide timer thread that sleeps until the earliest armed
//! deadline, so the ticker does not depend on a particular async runtime's timer.

use std::{
    collections::BTreeMap,
    fmt,
    future::poll_fn,
    io,
    pin::Pin,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    task::{Context, Poll},
    thread,
    time::{Duration, Instant},
};

use futures::{Stream, stream::FusedStream, task::AtomicWaker};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{trace, warn};

use crate::Error;

// Armed deadlines, keyed by (deadline, ticker id) so the earliest comes first.
type Deadlines = BTreeMap<(Instant, u64), Arc<AtomicWaker>>;

struct TimerQueue {
    deadlines: Mutex<Deadlines>,
    changed: Condvar,
    started: AtomicBool,
    next_id: AtomicU64,
}

static TIMER: OnceLock<TimerQueue> = OnceLock::new();

fn timer() -> io::Result<&'static TimerQueue> {
    let queue = TIMER.get_or_init(|| TimerQueue {
        deadlines: Mutex::new(BTreeMap::new()),
        changed: Condvar::new(),
        started: AtomicBool::new(false),
        next_id: AtomicU64::new(0),
    });
    if !queue.started.swap(true, Ordering::AcqRel) {
        let spawned = thread::Builder::new()
            .name("tickers-timer".into())
            .spawn(move || queue.run());
        if let Err(e) = spawned {
            queue.started.store(false, Ordering::Release);
            return Err(e);
        }
    }
    Ok(queue)
}

impl TimerQueue {
    fn run(&self) {
        let mut deadlines = self.deadlines.lock();
        let mut expired = Vec::new();
        loop {
            let now = Instant::now();
            while let Some(entry) = deadlines.first_entry() {
                if entry.key().0 > now {
                    break;
                }
                expired.push(entry.remove());
            }
            if !expired.is_empty() {
                // Wakers may poll inline, and polling takes this lock.
                MutexGuard::unlocked(&mut deadlines, || {
                    expired.drain(..).for_each(|waker| waker.wake());
                });
                continue;
            }
            match deadlines.keys().next() {
                Some(&(earliest, _)) => {
                    self.changed.wait_until(&mut deadlines, earliest);
                }
                None => self.changed.wait(&mut deadlines),
            }
        }
    }

    fn insert(&self, deadline: Instant, id: u64, waker: Arc<AtomicWaker>) {
        let mut deadlines = self.deadlines.lock();
        let earliest = deadlines.keys().next().is_none_or(|&(first, _)| deadline < first);
        deadlines.insert((deadline, id), waker);
        if earliest {
            self.changed.notify_one();
        }
    }

    fn remove(&self, deadline: Instant, id: u64) {
        // A removed entry only ever makes the timer sleep longer; no need to notify.
        self.deadlines.lock().remove(&(deadline, id));
    }
}

/// What a [`Ticker`] does when its consumer falls more than one period behind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissedTickBehavior {
    /// Deliver every missed tick back to back until caught up.
    Burst,

    /// Deliver one tick right away, then restart the period from that moment.
    Delay,

    /// Drop missed ticks, deliver one right away and resume on the original grid.
    #[default]
    Skip,
}

impl MissedTickBehavior {
    // Deadline following a tick that was scheduled for `fired` and observed at `now`.
    fn next_deadline(self, fired: Instant, now: Instant, period: Duration) -> Instant {
        let on_grid = fired + period;
        if on_grid > now {
            return on_grid;
        }
        match self {
            MissedTickBehavior::Burst => on_grid,
            MissedTickBehavior::Delay => now + period,
            MissedTickBehavior::Skip => {
                let missed = now.duration_since(fired).as_nanos() / period.as_nanos();
                u32::try_from(missed + 1)
                    .ok()
                    .and_then(|steps| period.checked_mul(steps))
                    .and_then(|offset| fired.checked_add(offset))
                    .unwrap_or(now + period)
            }
        }
    }
}

/// A repeating timer with a fixed period.
///
/// The first tick fires one full period after the ticker is created. Each tick
/// yields the [`Instant`] it was scheduled for. The ticker never runs out of
/// ticks; it stops when dropped, which also withdraws its pending wake-up.
///
/// `Ticker` is also a [`Stream`] of those instants.
pub struct Ticker {
    id: u64,
    period: Duration,
    deadline: Instant,
    missed: MissedTickBehavior,
    // Deadline currently registered with the timer thread.
    armed: Option<Instant>,
    waker: Arc<AtomicWaker>,
    timer: &'static TimerQueue,
}

impl Ticker {
    /// Creates a ticker that fires every `period`, starting one period from now.
    ///
    /// Returns [`Error::ZeroPeriod`] if `period` is zero, or [`Error::Io`] if the
    /// timer thread cannot be started.
    pub fn new(period: Duration) -> Result<Self, Error> {
        if period.is_zero() {
            return Err(Error::ZeroPeriod);
        }
        let timer = timer()?;
        Ok(Self {
            id: timer.next_id.fetch_add(1, Ordering::Relaxed),
            period,
            deadline: Instant::now() + period,
            missed: MissedTickBehavior::default(),
            armed: None,
            waker: Arc::new(AtomicWaker::new()),
            timer,
        })
    }

    /// The period between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// How ticks missed by a slow consumer are handled.
    pub fn missed_tick_behavior(&self) -> MissedTickBehavior {
        self.missed
    }

    /// Changes how ticks missed by a slow consumer are handled.
    pub fn set_missed_tick_behavior(&mut self, behavior: MissedTickBehavior) {
        self.missed = behavior;
    }

    /// Restarts the period from now; the next tick fires one period later.
    pub fn reset(&mut self) {
        self.disarm();
        self.deadline = Instant::now() + self.period;
    }

    /// Switches to a new period and restarts it from now.
    pub fn reset_period(&mut self, period: Duration) -> Result<(), Error> {
        if period.is_zero() {
            return Err(Error::ZeroPeriod);
        }
        self.period = period;
        self.reset();
        Ok(())
    }

    /// Waits for the next tick and returns the instant it was scheduled for.
    pub async fn tick(&mut self) -> Instant {
        poll_fn(|cx| self.poll_tick(cx)).await
    }

    /// Polls for the next tick.
    ///
    /// Once the current deadline has passed this returns the deadline and moves
    /// to the next one. Otherwise the task is woken when the deadline is reached.
    pub fn poll_tick(&mut self, cx: &mut Context<'_>) -> Poll<Instant> {
        let now = Instant::now();
        if now >= self.deadline {
            self.disarm();
            let fired = self.deadline;
            self.deadline = self.missed.next_deadline(fired, now, self.period);
            if now.duration_since(fired) >= self.period {
                warn!(
                    late = ?now.duration_since(fired),
                    behavior = ?self.missed,
                    "ticker fell behind"
                );
            }
            trace!(next = ?self.deadline.saturating_duration_since(now), "tick");
            return Poll::Ready(fired);
        }

        self.waker.register(cx.waker());
        if self.armed != Some(self.deadline) {
            self.disarm();
            trace!(due_in = ?self.deadline.saturating_duration_since(now), "arming");
            self.timer
                .insert(self.deadline, self.id, Arc::clone(&self.waker));
            self.armed = Some(self.deadline);
        }
        Poll::Pending
    }

    fn disarm(&mut self) {
        if let Some(deadline) = self.armed.take() {
            self.timer.remove(deadline, self.id);
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticker")
            .field("period", &self.period)
            .field("deadline", &self.deadline)
            .field("missed", &self.missed)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl Stream for Ticker {
    type Item = Instant;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_tick(cx).map(Some)
    }
}

impl FusedStream for Ticker {
    fn is_terminated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(100);

    #[test]
    fn on_time_tick_stays_on_grid() {
        let start = Instant::now();
        let now = start + Duration::from_millis(30);
        for behavior in [
            MissedTickBehavior::Burst,
            MissedTickBehavior::Delay,
            MissedTickBehavior::Skip,
        ] {
            assert_eq!(behavior.next_deadline(start, now, PERIOD), start + PERIOD);
        }
    }

    #[test]
    fn burst_keeps_missed_deadlines() {
        let start = Instant::now();
        let now = start + Duration::from_millis(350);
        let next = MissedTickBehavior::Burst.next_deadline(start, now, PERIOD);
        assert_eq!(next, start + PERIOD);
    }

    #[test]
    fn delay_restarts_from_now() {
        let start = Instant::now();
        let now = start + Duration::from_millis(350);
        let next = MissedTickBehavior::Delay.next_deadline(start, now, PERIOD);
        assert_eq!(next, now + PERIOD);
    }

    #[test]
    fn skip_realigns_to_grid() {
        let start = Instant::now();
        let now = start + Duration::from_millis(350);
        let next = MissedTickBehavior::Skip.next_deadline(start, now, PERIOD);
        assert_eq!(next, start + Duration::from_millis(400));
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(matches!(Ticker::new(Duration::ZERO), Err(Error::ZeroPeriod)));
    }
}
