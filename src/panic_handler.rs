//! Crash reports for the indicator.
//!
//! A panic in the tray or bus tasks would otherwise vanish with the session
//! that started us, so the hook appends a report to `crash.log` in the data
//! directory before the process goes down.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};

use crate::config::Config;

const SEPARATOR: &str = "\n\n========================================\n\n";

/// Install the panic hook. Call before spawning any task.
pub fn install() {
    if std::env::var("RUST_BACKTRACE").is_err() {
        std::env::set_var("RUST_BACKTRACE", "1");
    }

    panic::set_hook(Box::new(|info| {
        let report = CrashReport::from_panic(info);
        eprintln!("{}", report);

        if let Some(path) = crash_report_path() {
            match append_report(&path, &report) {
                Ok(()) => eprintln!("\nCrash report appended to: {}", path.display()),
                Err(e) => eprintln!("\nCould not write {}: {}", path.display(), e),
            }
        }
    }));
}

fn crash_report_path() -> Option<PathBuf> {
    Config::data_dir().ok().map(|dir| dir.join("crash.log"))
}

/// Append mode keeps earlier reports.
fn append_report(path: &Path, report: &CrashReport) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(SEPARATOR.as_bytes())?;
    file.write_all(report.to_string().as_bytes())?;
    file.flush()
}

#[derive(Debug)]
struct CrashReport {
    timestamp: String,
    thread: String,
    location: String,
    message: String,
    backtrace: String,
}

impl CrashReport {
    fn from_panic(info: &PanicHookInfo) -> Self {
        let current = std::thread::current();
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_string());

        Self {
            timestamp: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string(),
            thread: format!(
                "{} ({:?})",
                current.name().unwrap_or("<unnamed>"),
                current.id()
            ),
            location: info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown".to_string()),
            message,
            backtrace: std::backtrace::Backtrace::force_capture().to_string(),
        }
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EVERPAD-INDICATOR CRASH REPORT")?;
        writeln!(f, "Version:  {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(f, "Time:     {}", self.timestamp)?;
        writeln!(f, "Thread:   {}", self.thread)?;
        writeln!(f, "Location: {}", self.location)?;
        writeln!(f, "Message:  {}", self.message)?;
        writeln!(f)?;
        writeln!(f, "Backtrace:")?;
        writeln!(f, "{}", self.backtrace)?;
        writeln!(f)?;
        write!(
            f,
            "The tray icon is gone; everpad itself keeps running. \
             Restart everpad-indicator to bring it back."
        )
    }
}
