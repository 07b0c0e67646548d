//! The ticking console printer.
//!
//! [`PeriodicPrinter`] writes a banner once and then one line per tick of a
//! [`Ticker`], forever. The only way out of its loop is an output error.

use std::{borrow::Cow, convert::Infallible, io::Write, time::Duration};

use tracing::{debug, info};

use crate::{Error, ticker::Ticker};

/// Line printed once at startup.
pub const BANNER: &str = "Go Tickers Tutorial";

/// Line printed on every tick.
pub const MESSAGE: &str = "tock";

/// Time between ticks.
pub const PERIOD: Duration = Duration::from_secs(1);

/// Where a [`PeriodicPrinter`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Printing the banner and creating the ticker.
    Starting,

    /// Waiting for ticks and printing one line for each.
    Ticking,
}

/// Prints a banner, then a fixed line once per period until the output fails.
pub struct PeriodicPrinter<W> {
    writer: W,
    banner: Cow<'static, str>,
    message: Cow<'static, str>,
    period: Duration,
    state: State,
    ticks: u64,
}

impl<W: Write> PeriodicPrinter<W> {
    /// Creates a printer over `writer` that prints [`BANNER`], then [`MESSAGE`]
    /// every [`PERIOD`].
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            banner: Cow::Borrowed(BANNER),
            message: Cow::Borrowed(MESSAGE),
            period: PERIOD,
            state: State::Starting,
            ticks: 0,
        }
    }

    /// Replaces the line printed once at startup.
    pub fn banner(&mut self, banner: impl Into<Cow<'static, str>>) -> &mut Self {
        self.banner = banner.into();
        self
    }

    /// Replaces the line printed on every tick.
    pub fn message(&mut self, message: impl Into<Cow<'static, str>>) -> &mut Self {
        self.message = message.into();
        self
    }

    /// Sets the time between ticks. A zero period makes [`run`](Self::run) fail.
    pub fn period(&mut self, period: Duration) -> &mut Self {
        self.period = period;
        self
    }

    /// Current lifecycle state; `Ticking` once the banner is out.
    pub fn state(&self) -> State {
        self.state
    }

    /// Number of tick lines written so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Prints the banner and then one line per tick, forever.
    ///
    /// Only returns if the period is zero or writing to the output fails. Every
    /// line is flushed as soon as it is written.
    pub async fn run(&mut self) -> Result<Infallible, Error> {
        if self.period.is_zero() {
            return Err(Error::ZeroPeriod);
        }

        self.state = State::Starting;
        info!(period = ?self.period, "starting periodic printer");
        write_line(&mut self.writer, &self.banner)?;
        let mut ticker = Ticker::new(self.period)?;

        self.state = State::Ticking;
        loop {
            ticker.tick().await;
            write_line(&mut self.writer, &self.message)?;
            self.ticks += 1;
            debug!(ticks = self.ticks, "printed tick");
        }
    }

    /// Consumes the printer and returns its output.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn write_line(writer: &mut impl Write, line: &str) -> Result<(), Error> {
    writeln!(writer, "{line}")?;
    writer.flush()?;
    Ok(())
}
