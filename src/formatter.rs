//! Pattern parser and event-to-text rendering.
//!
//! A [`PatternFormatter`] compiles a pattern string (see the module-level
//! grammar table) into an ordered list of [`Emitter`]s once, at logger
//! configuration time; rendering a [`LogEvent`] then walks that list and is
//! otherwise allocation-light (one `String`/`Vec<u8>` per call).

use std::io::{self, Write};

use crate::clock;
use crate::event::LogEvent;
use crate::level::LogLevel;

const DEFAULT_DATETIME_PATTERN: &str = "%Y-%m-%d %H:%M:%S";

/// Default pattern installed on a freshly created [`crate::Logger`].
pub const DEFAULT_PATTERN: &str = "%d{%Y-%m-%d %H:%M:%S}%T%t%T%N%T%F%T[%p]%T%f:%l%T%m%n";

/// One step of a compiled formatter. Each variant renders exactly one
/// semantic field of a [`LogEvent`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Emitter {
    Message,
    Level,
    Elapsed,
    ThreadId,
    FiberId,
    ThreadName,
    /// `None` means the default sub-pattern (`%d` with no `{...}`).
    DateTime(Option<String>),
    Filename,
    Line,
    NewLine,
    Tab,
    Literal(String),
}

impl Emitter {
    fn render(&self, out: &mut dyn Write, level: LogLevel, event: &LogEvent) -> io::Result<()> {
        match self {
            Emitter::Message => out.write_all(event.message().as_bytes()),
            Emitter::Level => out.write_all(level.as_str().as_bytes()),
            Emitter::Elapsed => write!(out, "{}", event.elapsed_ms()),
            Emitter::ThreadId => write!(out, "{}", event.thread_id()),
            Emitter::FiberId => write!(out, "{}", event.fiber_id()),
            Emitter::ThreadName => out.write_all(event.thread_name().as_bytes()),
            Emitter::DateTime(sub) => {
                let sub = sub.as_deref().unwrap_or(DEFAULT_DATETIME_PATTERN);
                let formatted = clock::format_timestamp(event.timestamp_us(), sub);
                out.write_all(formatted.as_bytes())
            }
            Emitter::Filename => out.write_all(event.file().as_bytes()),
            Emitter::Line => write!(out, "{}", event.line()),
            Emitter::NewLine => out.write_all(b"\n"),
            Emitter::Tab => out.write_all(b"  "),
            Emitter::Literal(s) => out.write_all(s.as_bytes()),
        }
    }

    /// Reconstructs the pattern fragment this emitter was compiled from
    /// (used by the round-trip property test in `tests/`).
    fn to_pattern_fragment(&self) -> String {
        match self {
            Emitter::Message => "%m".to_string(),
            Emitter::Level => "%p".to_string(),
            Emitter::Elapsed => "%r".to_string(),
            Emitter::ThreadId => "%t".to_string(),
            Emitter::FiberId => "%F".to_string(),
            Emitter::ThreadName => "%N".to_string(),
            Emitter::DateTime(None) => "%d".to_string(),
            Emitter::DateTime(Some(sub)) => format!("%d{{{}}}", sub),
            Emitter::Filename => "%f".to_string(),
            Emitter::Line => "%l".to_string(),
            Emitter::NewLine => "%n".to_string(),
            Emitter::Tab => "%T".to_string(),
            Emitter::Literal(s) => s.chars().map(escape_literal_char).collect(),
        }
    }
}

fn escape_literal_char(c: char) -> String {
    if c == '%' {
        "%%".to_string()
    } else {
        c.to_string()
    }
}

/// A compiled pattern: an ordered emitter list plus an error flag.
///
/// Compilation never fails outright — a malformed specifier is replaced by a
/// `<<error_format %X>>` literal marker and [`PatternFormatter::is_error`]
/// is set, but the formatter is still fully usable (see spec §4.4/§7).
#[derive(Clone, Debug)]
pub struct PatternFormatter {
    pattern: String,
    emitters: Vec<Emitter>,
    error: bool,
}

impl PatternFormatter {
    /// Compiles `pattern` into an ordered emitter list.
    pub fn compile(pattern: &str) -> Self {
        let (emitters, error) = parse(pattern);
        PatternFormatter {
            pattern: pattern.to_string(),
            emitters,
            error,
        }
    }

    /// The source pattern this formatter was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether any specifier failed to parse.
    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn emitters(&self) -> &[Emitter] {
        &self.emitters
    }

    /// Reconstructs a pattern string from the compiled emitter list. For any
    /// pattern without error markers, `PatternFormatter::compile(p).to_pattern_string() == p`.
    pub fn to_pattern_string(&self) -> String {
        self.emitters
            .iter()
            .map(Emitter::to_pattern_fragment)
            .collect()
    }

    /// Renders `event` (at `level`) to a freshly allocated string.
    pub fn format_to_string(&self, level: LogLevel, event: &LogEvent) -> String {
        let mut buf = Vec::new();
        // Writing into a `Vec<u8>` never fails; the formatter only ever
        // produces valid UTF-8 since every emitter source is itself `&str`.
        let _ = self.format_to_stream(&mut buf, level, event);
        String::from_utf8(buf).unwrap_or_default()
    }

    /// Renders `event` (at `level`) through a generic byte-stream sink.
    pub fn format_to_stream(
        &self,
        sink: &mut dyn Write,
        level: LogLevel,
        event: &LogEvent,
    ) -> io::Result<()> {
        for emitter in &self.emitters {
            emitter.render(sink, level, event)?;
        }
        Ok(())
    }
}

/// Scans `pattern` left to right, accumulating literal runs outside `%`
/// specifiers and emitting one typed [`Emitter`] per recognized specifier.
fn parse(pattern: &str) -> (Vec<Emitter>, bool) {
    let mut emitters = Vec::new();
    let mut literal = String::new();
    let mut error = false;

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '%' {
            literal.push(c);
            i += 1;
            continue;
        }

        // Trailing '%' with nothing after it: treat as a literal '%'.
        if i + 1 >= chars.len() {
            literal.push('%');
            i += 1;
            continue;
        }

        let spec = chars[i + 1];
        if spec == '%' {
            literal.push('%');
            i += 2;
            continue;
        }

        flush_literal(&mut emitters, &mut literal);

        if spec == 'd' {
            if i + 2 < chars.len() && chars[i + 2] == '{' {
                match find_closing_brace(&chars, i + 3) {
                    Some(end) => {
                        let sub: String = chars[i + 3..end].iter().collect();
                        emitters.push(Emitter::DateTime(Some(sub)));
                        i = end + 1;
                    }
                    None => {
                        // No closing brace anywhere in the rest of the
                        // pattern: mark just this specifier bad and resume
                        // scanning right after it, so the rest of the
                        // pattern (including a trailing `%m%n`) still compiles.
                        error = true;
                        emitters.push(Emitter::Literal(format!("<<error_format %{}>>", spec)));
                        i += 2;
                    }
                }
            } else {
                emitters.push(Emitter::DateTime(None));
                i += 2;
            }
            continue;
        }

        match spec_emitter(spec) {
            Some(emitter) => {
                emitters.push(emitter);
                i += 2;
            }
            None => {
                error = true;
                emitters.push(Emitter::Literal(format!("<<error_format %{}>>", spec)));
                i += 2;
            }
        }
    }
    flush_literal(&mut emitters, &mut literal);

    (emitters, error)
}

fn flush_literal(emitters: &mut Vec<Emitter>, literal: &mut String) {
    if !literal.is_empty() {
        emitters.push(Emitter::Literal(std::mem::take(literal)));
    }
}

fn find_closing_brace(chars: &[char], start: usize) -> Option<usize> {
    chars[start..]
        .iter()
        .position(|&c| c == '}')
        .map(|offset| start + offset)
}

fn spec_emitter(spec: char) -> Option<Emitter> {
    match spec {
        'm' => Some(Emitter::Message),
        'p' => Some(Emitter::Level),
        'r' => Some(Emitter::Elapsed),
        't' => Some(Emitter::ThreadId),
        'N' => Some(Emitter::ThreadName),
        'F' => Some(Emitter::FiberId),
        'f' => Some(Emitter::Filename),
        'l' => Some(Emitter::Line),
        'T' => Some(Emitter::Tab),
        'n' => Some(Emitter::NewLine),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> LogEvent {
        LogEvent::new(LogLevel::Debug, "main.ext", 7)
    }

    #[test]
    fn s2_seed_scenario() {
        let fmt = PatternFormatter::compile("%p|%m%n");
        let mut event = LogEvent::new(LogLevel::Info, "x.rs", 1);
        std::fmt::Write::write_str(&mut event, "x").unwrap();
        assert_eq!(fmt.format_to_string(LogLevel::Info, &event), "INFO|x\n");
    }

    #[test]
    fn s3_unknown_specifier_sets_error_flag() {
        let fmt = PatternFormatter::compile("%q");
        assert!(fmt.is_error());
        let event = sample_event();
        assert_eq!(
            fmt.format_to_string(LogLevel::Debug, &event),
            "<<error_format %q>>"
        );
    }

    #[test]
    fn unterminated_brace_sets_error_flag() {
        let fmt = PatternFormatter::compile("%d{unterminated");
        assert!(fmt.is_error());
        let event = sample_event();
        // Only the bad `%d{...` specifier is replaced; the unmatched `{...`
        // text that follows it is retained verbatim as a literal, and
        // parsing of anything further along the pattern still proceeds.
        assert_eq!(
            fmt.format_to_string(LogLevel::Debug, &event),
            "<<error_format %d>>{unterminated"
        );
    }

    #[test]
    fn unterminated_brace_does_not_swallow_rest_of_pattern() {
        let fmt = PatternFormatter::compile("%d{bad%m%n");
        assert!(fmt.is_error());
        let mut event = LogEvent::new(LogLevel::Info, "x.rs", 1);
        std::fmt::Write::write_str(&mut event, "hello").unwrap();
        assert_eq!(
            fmt.format_to_string(LogLevel::Info, &event),
            "<<error_format %d>>{badhello\n"
        );
    }

    #[test]
    fn literal_percent_escape_renders_as_single_percent() {
        let fmt = PatternFormatter::compile("100%%");
        let event = sample_event();
        assert_eq!(fmt.format_to_string(LogLevel::Debug, &event), "100%");
    }

    #[test]
    fn default_pattern_round_trips() {
        let fmt = PatternFormatter::compile(DEFAULT_PATTERN);
        assert!(!fmt.is_error());
        assert_eq!(fmt.to_pattern_string(), DEFAULT_PATTERN);
    }

    #[test]
    fn datetime_default_subpattern_round_trips_as_bare_d() {
        let fmt = PatternFormatter::compile("%d");
        assert_eq!(fmt.to_pattern_string(), "%d");
    }

    #[test]
    fn format_to_stream_matches_format_to_string() {
        let fmt = PatternFormatter::compile(DEFAULT_PATTERN);
        let event = sample_event();
        let mut buf = Vec::new();
        fmt.format_to_stream(&mut buf, LogLevel::Debug, &event)
            .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            fmt.format_to_string(LogLevel::Debug, &event)
        );
    }
}
