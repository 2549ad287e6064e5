use std::fmt;

use crate::clock;
use crate::level::LogLevel;

/// One log record's call-site metadata plus its rendered message body.
///
/// Call-site capture (file/line) and the convenience macros that would fill
/// them in automatically are an external collaborator (see crate docs); a
/// `LogEvent` is built explicitly by the caller, typically with `file!()`
/// and `line!()` at the call site.
#[derive(Clone, Debug)]
pub struct LogEvent {
    file: &'static str,
    line: u32,
    elapsed_ms: u64,
    thread_id: u32,
    fiber_id: u32,
    timestamp_us: u64,
    thread_name: String,
    level: LogLevel,
    message: String,
}

impl LogEvent {
    /// Builds an event, stamping elapsed time, thread id/name and timestamp
    /// from the process clock. The message body starts empty; push into it
    /// with [`LogEvent::write_str`]/`write_fmt`, or use
    /// [`LogEvent::with_message`].
    pub fn new(level: LogLevel, file: &'static str, line: u32) -> Self {
        let thread_name = std::thread::current()
            .name()
            .map(|s| s.to_owned())
            .unwrap_or_default();
        LogEvent::with_fields(
            level,
            file,
            line,
            clock::elapsed_ms_since_start(),
            clock::gettid(),
            // no fiber/coroutine concept in this runtime; preserved for format compatibility.
            0,
            clock::now_micros(),
            thread_name,
        )
    }

    /// Builds an event from caller-supplied call-site and clock fields,
    /// bypassing the process clock entirely. This is the entry point that
    /// lets a producer (or a test reproducing a fixed scenario) pin down
    /// elapsed time, thread id, fiber id, timestamp and thread name
    /// explicitly rather than sampling them at construction time.
    pub fn with_fields(
        level: LogLevel,
        file: &'static str,
        line: u32,
        elapsed_ms: u64,
        thread_id: u32,
        fiber_id: u32,
        timestamp_us: u64,
        thread_name: impl Into<String>,
    ) -> Self {
        LogEvent {
            file,
            line,
            elapsed_ms,
            thread_id,
            fiber_id,
            timestamp_us,
            thread_name: thread_name.into(),
            level,
            message: String::new(),
        }
    }

    /// Builds an event whose message body is rendered immediately from
    /// `args` (the "format-string + arguments" path of the producer API).
    pub fn with_message(level: LogLevel, file: &'static str, line: u32, args: fmt::Arguments) -> Self {
        let mut event = Self::new(level, file, line);
        // fmt::Write::write_fmt never fails for a String target.
        let _ = fmt::Write::write_fmt(&mut event, args);
        event
    }

    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    pub fn fiber_id(&self) -> u32 {
        self.fiber_id
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Enables the "streamed build-up" message path: `write!(event, "x={}", x)`.
impl fmt::Write for LogEvent {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.message.push_str(s);
        Ok(())
    }
}
