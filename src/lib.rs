//! Fixed-period ticking for asynchronous code.
//!
//! `tickers` provides a repeating timer and the small pieces built on it:
//! - A `Ticker` that fires at the end of every fixed period, on any executor
//! - A `PeriodicTask` for running a future once per period until canceled
//! - A `PeriodicPrinter` that prints a banner, then one line per tick, forever
//!
//! The `tickers` binary runs a `PeriodicPrinter` over standard output, printing
//! `Go Tickers Tutorial` once and then `tock` every second.

pub mod error;
pub mod periodic;
pub mod printer;
pub mod ticker;

pub use error::Error;
pub use periodic::{Cancellation, PeriodicTask};
pub use printer::{PeriodicPrinter, State};
pub use ticker::{MissedTickBehavior, Ticker};
