use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Most verbose level switched on in the config, as an `EnvFilter` directive.
pub fn level_directive(config: &LoggingConfig) -> &'static str {
    let levels = &config.levels;
    if levels.debug {
        "debug"
    } else if levels.info {
        "info"
    } else if levels.warning {
        "warn"
    } else if levels.error || levels.critical {
        "error"
    } else {
        "off"
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the config levels.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(config)));

    let show_file = config.format.location.show_file;
    let show_line = config.format.location.show_line;

    // Use Layer::boxed() to unify the types of the if/else branches
    let fmt_layer = if !config.format.show_time {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(show_file)
            .with_file(show_file)
            .with_line_number(show_line)
            .without_time()
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(show_file)
            .with_file(show_file)
            .with_line_number(show_line)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
