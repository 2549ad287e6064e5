//! End-to-end coverage of the literal seed scenarios from spec §8, driven
//! entirely through the public API with a real file appender so output can
//! be read back and asserted on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ringlog::appender::FileAppender;
use ringlog::{LogEvent, LogLevel, Logger, LoggerOptions};

static SCRATCH_SEQ: AtomicUsize = AtomicUsize::new(0);

fn scratch_dir(tag: &str) -> std::path::PathBuf {
    let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "ringlog-seed-{}-{}-{}",
        tag,
        std::process::id(),
        seq
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn s1_default_pattern_end_to_end() {
    let dir = scratch_dir("s1");
    let path = dir.join("out.log");

    let logger = Logger::new("seed-s1");
    logger.add_appender(Arc::new(FileAppender::new(&path).unwrap()));
    logger.set_level(LogLevel::Debug);

    // Thread 42 at 1_640_000_000_000_000us.
    let mut event = LogEvent::with_fields(
        LogLevel::Debug,
        "main.ext",
        7,
        0,
        42,
        0,
        1_640_000_000_000_000,
        "",
    );
    std::fmt::Write::write_str(&mut event, "hello world").unwrap();
    logger.debug(event);
    logger.shutdown();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.ends_with("42    0  [DEBUG]  main.ext:7  hello world\n"));
    // Formatted timestamp leads the line, with a `.mmm.uuu` suffix.
    let ts_field = contents.split("  ").next().unwrap();
    assert!(ts_field.matches('.').count() == 2, "timestamp field: {:?}", ts_field);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn s2_custom_pattern_end_to_end() {
    let dir = scratch_dir("s2");
    let path = dir.join("out.log");

    let logger = Logger::new("seed-s2");
    logger.add_appender(Arc::new(FileAppender::new(&path).unwrap()));
    logger.set_pattern("%p|%m%n");

    let mut event = LogEvent::new(LogLevel::Info, "x.rs", 1);
    std::fmt::Write::write_str(&mut event, "x").unwrap();
    logger.info(event);
    logger.shutdown();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "INFO|x\n");
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn s6_file_appender_survives_external_rename() {
    let dir = scratch_dir("s6");
    let path = dir.join("log1.txt");
    let moved = dir.join("log1.old");

    let appender = Arc::new(FileAppender::new(&path).unwrap());
    let logger = Logger::new("seed-s6");
    logger.add_appender(appender.clone());
    logger.set_pattern("%m%n");

    let mut first = LogEvent::new(LogLevel::Info, "f", 1);
    std::fmt::Write::write_str(&mut first, "first").unwrap();
    logger.info(first);
    logger.flush();

    std::fs::rename(&path, &moved).unwrap();
    std::thread::sleep(std::time::Duration::from_secs(4));

    let mut second = LogEvent::new(LogLevel::Info, "f", 1);
    std::fmt::Write::write_str(&mut second, "second").unwrap();
    logger.info(second);
    logger.shutdown();

    let new_file_contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(new_file_contents, "second\n");
    let moved_contents = std::fs::read_to_string(&moved).unwrap();
    assert_eq!(moved_contents, "first\n");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn s7_two_producers_yield_exactly_two_n_records() {
    let dir = scratch_dir("s7");
    let path = dir.join("out.log");

    let logger = Logger::new("seed-s7");
    logger.add_appender(Arc::new(FileAppender::new(&path).unwrap()));
    logger.set_pattern("%m%n");

    const N: usize = 5_000;
    let loggers = vec![logger.clone(), logger.clone()];
    let handles: Vec<_> = loggers
        .into_iter()
        .enumerate()
        .map(|(producer, logger)| {
            std::thread::spawn(move || {
                for i in 0..N {
                    let mut event = LogEvent::new(LogLevel::Debug, "f", 1);
                    std::fmt::Write::write_fmt(&mut event, format_args!("p{}-{}", producer, i))
                        .unwrap();
                    logger.debug(event);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    logger.shutdown();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2 * N);

    let unique: std::collections::HashSet<&str> = lines.into_iter().collect();
    assert_eq!(unique.len(), 2 * N, "no duplicate or lost records");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn logger_with_empty_appender_list_falls_back_to_parent() {
    let dir = scratch_dir("fallback");
    let path = dir.join("out.log");

    let root = Logger::new("seed-fallback-root");
    root.add_appender(Arc::new(FileAppender::new(&path).unwrap()));
    root.set_pattern("%m%n");

    let child = Logger::with_options(
        "seed-fallback-child",
        LoggerOptions::default(),
        Some(root.clone()),
    );

    let mut event = LogEvent::new(LogLevel::Info, "f", 1);
    std::fmt::Write::write_str(&mut event, "via parent").unwrap();
    child.info(event);
    root.flush();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "via parent\n");

    child.shutdown();
    root.shutdown();
    std::fs::remove_dir_all(&dir).ok();
}
