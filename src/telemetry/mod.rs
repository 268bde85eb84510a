//! Logging setup for a pipeline run.
//!
//! Messages go to stderr in a human readable form and to the configured log
//! file through a non-blocking appender. `RUST_LOG` overrides the configured
//! level when set.

use std::fs;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::Settings;

/// Install the process subscriber.
///
/// The returned guard flushes the file writer when dropped and must be held
/// until the run finishes.
pub fn init(
    settings: &Settings,
) -> Result<WorkerGuard, Box<dyn std::error::Error + Send + Sync>> {
    let log_path = settings.log_file_path();
    let directory = log_path.parent().unwrap_or(settings.project_root());
    let file_name = log_path
        .file_name()
        .ok_or("log_file_path has no file name")?;
    fs::create_dir_all(directory)?;

    let (non_blocking, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));

    let level = settings.logging.level.filter();
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter(level));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_filter(env_filter(level));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Thread-scoped log capture for tests.
#[cfg(test)]
pub(crate) mod capture {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    #[derive(Clone, Default)]
    pub struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        pub fn contents(&self) -> String {
            let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Ok(mut bytes) = self.0.lock() {
                bytes.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a subscriber that records every event at `DEBUG` and above.
    pub fn logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();

        let value = tracing::subscriber::with_default(subscriber, f);
        (value, captured.contents())
    }
}
