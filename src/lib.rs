//! `ringlog`: an in-process, high-throughput, asynchronous logging engine
//! for multi-threaded applications.
//!
//! Application threads produce structured log records at very low latency;
//! for an accelerated-mode logger, a single background drain thread
//! serializes and flushes them to one or more appenders (console, file).
//! Each producing thread gets its own ring buffer so the producer's
//! critical path stays free of I/O and of contention with other producers.
//!
//! This crate covers three pieces:
//!
//! 1. the per-thread [`ring_buffer::RingBuffer`] (SPSC byte transport);
//! 2. the [`logger::Logger`] engine (producer API, drain loop, appender
//!    fan-out, shutdown protocol) and the [`registry`] that hands loggers
//!    out by name;
//! 3. the [`formatter::PatternFormatter`] pipeline (pattern parsing and
//!    event-to-text rendering).
//!
//! Call-site-capturing macros, structured (key-value) records, network
//! sinks, multi-level filtering beyond one threshold per logger, sampling,
//! and crash-safe persistence are out of scope (see spec's Non-goals in
//! DESIGN.md); callers build a [`event::LogEvent`] explicitly, typically
//! with `file!()`/`line!()` at the call site.
//!
//! ```
//! use ringlog::{Logger, LogEvent, LogLevel};
//! use ringlog::appender::StdoutAppender;
//! use std::sync::Arc;
//!
//! let logger = Logger::new("example");
//! logger.add_appender(Arc::new(StdoutAppender::new()));
//!
//! let mut event = LogEvent::new(LogLevel::Info, file!(), line!());
//! std::fmt::Write::write_str(&mut event, "hello world").unwrap();
//! logger.info(event);
//!
//! logger.shutdown();
//! ```

pub mod appender;
pub mod clock;
pub mod event;
pub mod formatter;
pub mod level;
pub mod logger;
pub mod registry;
pub mod ring_buffer;

pub use appender::Appender;
pub use event::LogEvent;
pub use formatter::{Emitter, PatternFormatter, DEFAULT_PATTERN};
pub use level::LogLevel;
pub use logger::{Logger, LoggerOptions, Mode};
pub use registry::{get_logger, root_logger, shutdown};
pub use ring_buffer::RingBuffer;
