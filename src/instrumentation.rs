use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
use tracing_subscriber::{filter::LevelFilter, prelude::*};

/// Log level for a `-v` count: warnings by default, up to trace with `-vvv`.
pub fn level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Log to stderr and optionally trace to chrome://tracing or https://ui.perfetto.dev/
///
/// Make sure to store the guard in a variable in the scope to be instrumented, otherwise the trace
/// will be disabled immediately.
pub fn init(verbosity: u8, chrome: bool) -> Option<FlushGuard> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level(verbosity));

    if chrome {
        let (chrome_layer, guard) = ChromeLayerBuilder::new().build();
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(chrome_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(fmt_layer).init();
        None
    }
}
