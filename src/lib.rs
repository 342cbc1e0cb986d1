pub mod analytics;
pub mod chat_core;
pub mod completion;
pub mod config;
pub mod server;

use config::LoggingConfig;

/// Return the platform-standard data directory for Traffic Copilot.
///
/// - macOS: `~/Library/Application Support/traffic-copilot/`
/// - Linux: `$XDG_DATA_HOME/traffic-copilot/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.traffic-copilot/` only if neither can be resolved.
pub(crate) fn data_dir() -> std::path::PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("traffic-copilot");
    }
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".traffic-copilot")
}

/// Initialize the tracing subscriber.
///
/// Always logs to stderr. When `config.file` is set, also writes to
/// `copilot.log` in the data directory:
/// 1. Rotates existing logs (copilot.log → copilot.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh copilot.log with a line-flushing writer.
///
/// `RUST_LOG` overrides the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let file_layer = if config.file {
        open_log_file().map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
        })
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %data_dir().display(),
        pid = std::process::id(),
        "=== Traffic Copilot starting ==="
    );
}

/// Rotate and open the log file. Returns `None` when the data directory is
/// not writable; the service then logs to stderr only.
fn open_log_file() -> Option<FlushingWriter> {
    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir).ok()?;

    let log_path = log_dir.join("copilot.log");
    rotate_log_file(&log_path, 3);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok()?;

    Some(FlushingWriter::new(file))
}

/// Rotate log files: `copilot.log` → `copilot.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &std::path::Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write, so a
/// crashed process never loses the lines that explain the crash.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_shifts_existing_logs() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("copilot.log");
        std::fs::write(&base, "current").unwrap();
        std::fs::write(dir.path().join("copilot.log.1"), "older").unwrap();

        rotate_log_file(&base, 3);

        assert!(!base.exists());
        let one = std::fs::read_to_string(dir.path().join("copilot.log.1")).unwrap();
        let two = std::fs::read_to_string(dir.path().join("copilot.log.2")).unwrap();
        assert_eq!(one, "current");
        assert_eq!(two, "older");
    }

    #[test]
    fn rotate_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("copilot.log");
        std::fs::write(dir.path().join("copilot.log.3"), "oldest").unwrap();

        rotate_log_file(&base, 3);

        assert!(!dir.path().join("copilot.log.3").exists());
    }
}
