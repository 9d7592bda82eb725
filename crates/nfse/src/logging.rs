use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keeps the file writer flushing until dropped.
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
    pub path: Option<PathBuf>,
}

pub fn log_file_name(stamp: &str) -> String {
    format!("nfse_emissao_{}.log", stamp)
}

/// `--verbose` forces debug; otherwise `RUST_LOG`, falling back to info.
pub fn filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Console logging on stderr, plus a run log under `log_dir` when the
/// directory can be created.
pub fn init(log_dir: &Path, verbose: bool) -> LogGuard {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let name = log_file_name(&stamp);

    let (file_layer, guard, path) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(log_dir, &name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard), Some(log_dir.join(&name)))
        }
        Err(e) => {
            eprintln!(
                "Não foi possível criar o diretório de logs {}: {}",
                log_dir.display(),
                e
            );
            (None, None, None)
        }
    };

    let _ = tracing_subscriber::registry()
        .with(filter(verbose))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();

    LogGuard {
        _guard: guard,
        path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        assert_eq!(
            log_file_name("20250510_093000"),
            "nfse_emissao_20250510_093000.log"
        );
    }

    #[test]
    fn test_init_creates_log_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");
        let guard = init(&log_dir, true);
        assert!(log_dir.is_dir());
        let path = guard.path.as_ref().unwrap();
        assert!(path.starts_with(&log_dir));
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("nfse_emissao_")
        );
    }
}
