//! ## Sets up logging by reading configuration from environment variables.
//!
//! Environment variables used:
//! - LOG_MODE: "stdout" (default) or "file"
//! - LOG_LEVEL: any `tracing_subscriber::EnvFilter` directive; default is "info"
//! - LOG_FORMAT: "compact" (default), "pretty" or "json"
//! - LOG_FILE_PATH: when using file mode, the path of the log file (default "logs/submitter.log")

use chrono::Utc;
use std::{
    env,
    fs::{create_dir_all, File},
    path::Path,
    sync::Arc,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    fn from_env_value(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Appends the UTC date to the base path, replacing a trailing ".log".
fn rolled_file_path(base_file_path: &str, date: &str) -> String {
    match base_file_path.strip_suffix(".log") {
        Some(trimmed) => format!("{}-{}.log", trimmed, date),
        None => format!("{}-{}.log", base_file_path, date),
    }
}

fn open_log_file(base_file_path: &str) -> std::io::Result<(String, File)> {
    let date_str = Utc::now().format("%Y-%m-%d").to_string();
    let path = rolled_file_path(base_file_path, &date_str);
    if let Some(parent) = Path::new(&path).parent() {
        create_dir_all(parent)?;
    }
    let file = File::options().create(true).append(true).open(&path)?;
    Ok((path, file))
}

macro_rules! init_subscriber {
    ($builder:expr, $format:expr) => {
        match $format {
            LogFormat::Compact => $builder.compact().try_init(),
            LogFormat::Pretty => $builder.pretty().try_init(),
            LogFormat::Json => $builder.json().flatten_event(true).try_init(),
        }
    };
}

pub fn setup_logging() {
    let log_mode = env::var("LOG_MODE").unwrap_or_else(|_| "stdout".to_string());
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let format = LogFormat::from_env_value(
        &env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
    );
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if log_mode.to_lowercase() == "file" {
        let base_file_path =
            env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/submitter.log".to_string());
        match open_log_file(&base_file_path) {
            Ok((_, file)) => {
                let builder = fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Arc::new(file));
                init_subscriber!(builder, format)
            }
            Err(e) => {
                eprintln!("unable to open log file {base_file_path}: {e}, logging to stdout");
                init_subscriber!(fmt().with_env_filter(filter), format)
            }
        }
    } else {
        init_subscriber!(fmt().with_env_filter(filter), format)
    };

    // A global subscriber may already be installed (tests, embedding).
    if result.is_ok() {
        info!(mode = %log_mode, level = %log_level, "logging is configured");
    }
}
