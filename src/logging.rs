use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

/// `logs/<prefix>_YYYYmmdd_HHMMSS.log`
pub fn log_file_path(dir: &Path, prefix: &str) -> PathBuf {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{prefix}_{ts}.log"))
}

/// stderr とログファイルの両方に出す。RUST_LOG があればそちらを優先
pub fn init(config: &LogConfig, prefix: &str) -> Result<PathBuf> {
    let dir = Path::new(&config.dir);
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = log_file_path(dir, prefix);
    let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;

    let default_level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path() {
        let path = log_file_path(Path::new("logs"), "pose_match");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("pose_match_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "pose_match_".len() + 15 + ".log".len());
    }
}
