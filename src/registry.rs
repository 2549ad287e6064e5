//! Process-wide name→logger map with a singleton root logger (spec §4.6).
//!
//! Treated by spec §1 as an external collaborator specified only by
//! interface, but a publishable crate still needs one concrete
//! implementation behind that interface; this one follows spec §9's
//! "Global singleton registry" note: a lazily-initialized process-wide
//! resource plus an explicit [`shutdown`] entry point, rather than relying
//! on static destruction order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::appender::StdoutAppender;
use crate::logger::{Logger, LoggerOptions};

pub struct LoggerRegistry {
    root: Logger,
    loggers: Mutex<HashMap<String, Logger>>,
}

impl LoggerRegistry {
    fn new() -> Self {
        let root = Logger::new("root");
        root.add_appender(Arc::new(StdoutAppender::new()));
        LoggerRegistry {
            root,
            loggers: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> Logger {
        self.root.clone()
    }

    /// Idempotent per name: repeated calls return the same instance. A
    /// newly created logger links to the root as its fallback parent.
    pub fn get_logger(&self, name: &str) -> Logger {
        let mut loggers = self.loggers.lock().unwrap();
        if let Some(existing) = loggers.get(name) {
            return existing.clone();
        }
        let logger = Logger::with_options(name, LoggerOptions::default(), Some(self.root.clone()));
        loggers.insert(name.to_string(), logger.clone());
        logger
    }

    /// Drains and terminates every logger's drain thread, root last. Meant
    /// to be called explicitly by the host application before process exit
    /// (spec §9: "avoid depending on static destruction order").
    pub fn shutdown_all(&self) {
        let loggers: Vec<Logger> = {
            let guard = self.loggers.lock().unwrap();
            guard.values().cloned().collect()
        };
        for logger in loggers {
            logger.shutdown();
        }
        self.root.shutdown();
    }
}

lazy_static::lazy_static! {
    static ref REGISTRY: LoggerRegistry = LoggerRegistry::new();
}

/// The process-lifetime root logger, pre-configured with a single stdout
/// appender and the default pattern.
pub fn root_logger() -> Logger {
    REGISTRY.root()
}

/// Looks up (or creates) the named logger.
pub fn get_logger(name: &str) -> Logger {
    REGISTRY.get_logger(name)
}

/// Shuts down every logger the registry has handed out. Call once, late in
/// the host application's lifetime.
pub fn shutdown() {
    REGISTRY.shutdown_all();
}
