//! Reporting of errors that need operator attention.
#[cfg(test)]
use mockall::automock;
use tracing::error;

use crate::metrics::CRASH_REPORTS;

#[cfg_attr(test, automock)]
pub trait CrashTracker: Send + Sync {
    fn log_and_report_errors(&self, error: &str, message: &str);
}

/// Crash tracker that reports through the log sink.
#[derive(Debug, Default, Clone)]
pub struct LoggingCrashTracker;

impl CrashTracker for LoggingCrashTracker {
    fn log_and_report_errors(&self, error: &str, message: &str) {
        CRASH_REPORTS.with_label_values(&["errors"]).inc();
        error!(error = %error, "{}", message);
    }
}
