use std::{io, process};

use futures::executor::block_on;
use tickers::PeriodicPrinter;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut printer = PeriodicPrinter::new(io::stdout());
    match block_on(printer.run()) {
        Ok(never) => match never {},
        Err(e) => {
            error!(error = %e, "periodic printer stopped");
            process::exit(1);
        }
    }
}
