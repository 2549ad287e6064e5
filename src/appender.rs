//! Output sinks. An [`Appender`] accepts either a fully-rendered byte span
//! (the accelerated-mode drain path) or a [`LogEvent`] it renders itself
//! (the synchronous path), and serializes its own I/O internally so it can
//! be called concurrently from any thread.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use crate::event::LogEvent;
use crate::formatter::PatternFormatter;
use crate::level::LogLevel;

/// Reopen an open file-backed appender's handle if it has not been touched
/// in this long, so external `mv`/log-rotate of the path is picked up.
const REOPEN_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3);

/// A log output destination.
///
/// Implementations own their I/O handle and a level threshold below which
/// calls are a no-op (spec §4.5). `log_event` and `log_bytes` must both be
/// safely callable from any thread without an external lock.
pub trait Appender: Send + Sync {
    /// Renders `event` with this appender's formatter (own or inherited)
    /// and writes it, if `level` clears this appender's threshold.
    fn log_event(&self, level: LogLevel, event: &LogEvent);

    /// Writes `data` verbatim, if `level` clears this appender's threshold.
    /// This is the entry point the drain thread uses for already-rendered
    /// staging-buffer bytes.
    fn log_bytes(&self, level: LogLevel, data: &[u8]);

    fn level(&self) -> LogLevel;
    fn set_level(&self, level: LogLevel);

    /// Sets this appender's own formatter. After this call the appender no
    /// longer inherits its owning logger's formatter on future
    /// `set_formatter` calls to that logger.
    fn set_formatter(&self, formatter: PatternFormatter);
    fn formatter(&self) -> Option<PatternFormatter>;
    /// Whether this appender has its own formatter (as opposed to one
    /// inherited by reference from its owning logger).
    fn has_own_formatter(&self) -> bool;

    /// Used by `Logger::add_appender`/`set_formatter` to install the
    /// logger's formatter by reference without flipping `has_own_formatter`.
    fn inherit_formatter(&self, formatter: PatternFormatter);
}

struct FormatterSlot {
    formatter: Option<PatternFormatter>,
    has_own: bool,
}

impl FormatterSlot {
    fn new() -> Self {
        FormatterSlot {
            formatter: None,
            has_own: false,
        }
    }
}

/// Writes rendered log lines to the process's standard output.
pub struct StdoutAppender {
    level: Mutex<LogLevel>,
    slot: Mutex<FormatterSlot>,
    lock: Mutex<()>,
}

impl StdoutAppender {
    pub fn new() -> Self {
        StdoutAppender {
            level: Mutex::new(LogLevel::Debug),
            slot: Mutex::new(FormatterSlot::new()),
            lock: Mutex::new(()),
        }
    }
}

impl Default for StdoutAppender {
    fn default() -> Self {
        Self::new()
    }
}

impl Appender for StdoutAppender {
    fn log_event(&self, level: LogLevel, event: &LogEvent) {
        if level < *self.level.lock().unwrap() {
            return;
        }
        let slot = self.slot.lock().unwrap();
        let Some(formatter) = slot.formatter.as_ref() else {
            return;
        };
        let rendered = formatter.format_to_string(level, event);
        let _guard = self.lock.lock().unwrap();
        print!("{}", rendered);
        let _ = std::io::stdout().flush();
    }

    fn log_bytes(&self, level: LogLevel, data: &[u8]) {
        if level < *self.level.lock().unwrap() {
            return;
        }
        let _guard = self.lock.lock().unwrap();
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(data);
        let _ = stdout.flush();
    }

    fn level(&self) -> LogLevel {
        *self.level.lock().unwrap()
    }

    fn set_level(&self, level: LogLevel) {
        *self.level.lock().unwrap() = level;
    }

    fn set_formatter(&self, formatter: PatternFormatter) {
        let mut slot = self.slot.lock().unwrap();
        slot.formatter = Some(formatter);
        slot.has_own = true;
    }

    fn formatter(&self) -> Option<PatternFormatter> {
        self.slot.lock().unwrap().formatter.clone()
    }

    fn has_own_formatter(&self) -> bool {
        self.slot.lock().unwrap().has_own
    }

    fn inherit_formatter(&self, formatter: PatternFormatter) {
        let mut slot = self.slot.lock().unwrap();
        if !slot.has_own {
            slot.formatter = Some(formatter);
        }
    }
}

struct FileHandle {
    file: Option<File>,
    last_open: Instant,
}

/// Writes rendered log lines to a file, reopening it periodically so an
/// external `mv`/rotation of the path is survived (spec §4.5).
pub struct FileAppender {
    path: PathBuf,
    level: Mutex<LogLevel>,
    slot: Mutex<FormatterSlot>,
    handle: Mutex<FileHandle>,
}

impl FileAppender {
    /// Opens `path` in `append + create` mode immediately.
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        Ok(FileAppender {
            path,
            level: Mutex::new(LogLevel::Debug),
            slot: Mutex::new(FormatterSlot::new()),
            handle: Mutex::new(FileHandle {
                file: Some(file),
                last_open: Instant::now(),
            }),
        })
    }

    /// Re-opens the file in append mode unconditionally. Exposed for tests
    /// that want to simulate the periodic reopen deterministically.
    pub fn reopen(&self) -> std::io::Result<()> {
        let mut handle = self.handle.lock().unwrap();
        self.reopen_locked(&mut handle)
    }

    fn reopen_locked(&self, handle: &mut FileHandle) -> std::io::Result<()> {
        let file = open_append(&self.path)?;
        handle.file = Some(file);
        handle.last_open = Instant::now();
        Ok(())
    }

    fn maybe_reopen(&self, handle: &mut FileHandle) {
        if handle.file.is_none() || handle.last_open.elapsed() >= REOPEN_INTERVAL {
            if let Err(e) = self.reopen_locked(handle) {
                diagnostic(&format!(
                    "ringlog: failed to reopen {}: {}",
                    self.path.display(),
                    e
                ));
            }
        }
    }

    fn write(&self, bytes: &[u8]) {
        let mut handle = self.handle.lock().unwrap();
        self.maybe_reopen(&mut handle);
        if let Some(file) = handle.file.as_mut() {
            if let Err(e) = file.write_all(bytes) {
                diagnostic(&format!(
                    "ringlog: write to {} failed: {}",
                    self.path.display(),
                    e
                ));
            }
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// A failed appender write is, per spec §7, never surfaced to the
/// producer; it is reported here and otherwise dropped.
fn diagnostic(message: &str) {
    println!("{}", message);
}

impl Appender for FileAppender {
    fn log_event(&self, level: LogLevel, event: &LogEvent) {
        if level < *self.level.lock().unwrap() {
            return;
        }
        let slot = self.slot.lock().unwrap();
        let Some(formatter) = slot.formatter.as_ref() else {
            return;
        };
        let rendered = formatter.format_to_string(level, event);
        self.write(rendered.as_bytes());
    }

    fn log_bytes(&self, level: LogLevel, data: &[u8]) {
        if level < *self.level.lock().unwrap() {
            return;
        }
        self.write(data);
    }

    fn level(&self) -> LogLevel {
        *self.level.lock().unwrap()
    }

    fn set_level(&self, level: LogLevel) {
        *self.level.lock().unwrap() = level;
    }

    fn set_formatter(&self, formatter: PatternFormatter) {
        let mut slot = self.slot.lock().unwrap();
        slot.formatter = Some(formatter);
        slot.has_own = true;
    }

    fn formatter(&self) -> Option<PatternFormatter> {
        self.slot.lock().unwrap().formatter.clone()
    }

    fn has_own_formatter(&self) -> bool {
        self.slot.lock().unwrap().has_own
    }

    fn inherit_formatter(&self, formatter: PatternFormatter) {
        let mut slot = self.slot.lock().unwrap();
        if !slot.has_own {
            slot.formatter = Some(formatter);
        }
    }
}
