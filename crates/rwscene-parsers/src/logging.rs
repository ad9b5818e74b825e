// rwscene-parsers/src/logging.rs
//! Tracing setup and parse instrumentation
//!
//! The codec emits `trace!` per chunk and `debug!` per container. Binaries
//! install a subscriber through [`init_with_config`]; parsers wrap whole-file
//! work in [`instrument_parse`] and batch jobs count through [`BatchProgress`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use tracing::Level;

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "warn,rwscene=info,rwscene_parsers=info";

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directives applied when `RUST_LOG` is unset
    pub default_level: String,
    /// Print the event target
    pub show_target: bool,
    /// Print thread ids, useful with rayon batches
    pub show_thread_ids: bool,
    /// Print source file names
    pub show_file: bool,
    /// Print source line numbers
    pub show_line_number: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: DEFAULT_FILTER.to_string(),
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
        }
    }
}

impl TracingConfig {
    /// Settings for a CLI `-v` count: 0 warn, 1 info, 2 debug, 3+ trace
    ///
    /// Targets appear from `-vv`, thread ids and source locations from `-vvv`.
    pub fn for_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            default_level: level.as_str().to_lowercase(),
            show_target: verbosity >= 2,
            show_thread_ids: verbosity >= 3,
            show_file: verbosity >= 3,
            show_line_number: verbosity >= 3,
        }
    }
}

/// Install the default subscriber
///
/// Only the first call installs anything.
pub fn init_default() {
    init_with_config(TracingConfig::default());
}

/// Install a subscriber built from `config`
pub fn init_with_config(config: TracingConfig) {
    if TRACING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        return;
    }

    #[cfg(feature = "tracing")]
    {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level));
        let layer = fmt::layer()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_file(config.show_file)
            .with_line_number(config.show_line_number);

        // the host may already own the global subscriber
        let _ = tracing_subscriber::registry().with(layer).with(filter).try_init();
    }
    #[cfg(not(feature = "tracing"))]
    let _ = config;
}

/// Run a whole-file parse inside a `parse` span
///
/// Success is logged at debug with the elapsed time, failure at warn with
/// the error.
pub fn instrument_parse<T, E, F>(parser: &str, bytes: usize, f: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnOnce() -> Result<T, E>,
{
    let span = tracing::info_span!("parse", parser = %parser, bytes);
    let _guard = span.enter();

    let start = Instant::now();
    let result = f();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => tracing::debug!(elapsed_ms, "parse finished"),
        Err(error) => tracing::warn!(elapsed_ms, %error, "parse failed"),
    }
    result
}

/// Span covering a batch of `total` files
pub fn progress_span(operation: &str, total: usize) -> tracing::Span {
    tracing::info_span!("progress", operation = %operation, total)
}

/// Thread-safe counter for batch jobs
///
/// Logs at debug every hundred items and once at the end.
#[derive(Debug)]
pub struct BatchProgress {
    done: AtomicUsize,
    total: usize,
}

impl BatchProgress {
    /// Counter for `total` files
    pub fn new(total: usize) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
        }
    }

    /// Count one finished item, returning how many are done
    pub fn advance(&self) -> usize {
        let current = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if current % 100 == 0 || current == self.total {
            tracing::debug!(current, total = self.total, percent = self.percent(current), "progress");
        }
        current
    }

    fn percent(&self, current: usize) -> u32 {
        if self.total == 0 {
            100
        } else {
            (current.min(self.total) * 100 / self.total) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert!(config.default_level.contains("rwscene=info"));
        assert!(config.show_target);
        assert!(!config.show_thread_ids);
    }

    #[test]
    fn test_config_for_verbosity() {
        assert_eq!(TracingConfig::for_verbosity(0).default_level, "warn");
        let debug = TracingConfig::for_verbosity(2);
        assert_eq!(debug.default_level, "debug");
        assert!(debug.show_target);
        assert!(!debug.show_file);
        let trace = TracingConfig::for_verbosity(9);
        assert_eq!(trace.default_level, "trace");
        assert!(trace.show_line_number);
    }

    #[test]
    fn test_instrument_parse_passes_result_through() {
        let ok: Result<u32, String> = instrument_parse("test", 4, || Ok(42));
        assert_eq!(ok, Ok(42));
        let err: Result<u32, String> = instrument_parse("test", 4, || Err("bad".into()));
        assert_eq!(err, Err("bad".to_string()));
    }

    #[test]
    fn test_batch_progress_counts() {
        init_default();
        init_default();
        let progress = BatchProgress::new(3);
        assert_eq!(progress.advance(), 1);
        assert_eq!(progress.advance(), 2);
        assert_eq!(progress.advance(), 3);
        assert_eq!(progress.percent(3), 100);
        assert_eq!(BatchProgress::new(0).percent(0), 100);
    }
}
