//! Diagnostic capture for front-end compilation
//!
//! Every message the front end produces is recorded into a [`DiagnosticSink`]
//! instead of being printed. The sink is append-only: entries are kept in
//! arrival order and never discarded, so the full transcript stays available
//! after a failed compilation.

pub mod fatal;

use std::fmt;

use crate::lexer::Span;
use crate::source::{SourceLocation, SourceMap};

pub use fatal::{BackendFault, FatalErrorScope};

/// Severity of a diagnostic, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Returns true for Error and Fatal
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal error",
        })
    }
}

/// One recorded diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub severity: Severity,
    /// `None` when the message has no position (configuration, backend faults)
    pub location: Option<SourceLocation>,
    pub message: String,
}

impl DiagnosticEntry {
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            location: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for DiagnosticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{location}: ")?;
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Append-only collection of diagnostics for one compilation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticSink {
    entries: Vec<DiagnosticEntry>,
}

impl DiagnosticSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; no deduplication
    pub fn record(&mut self, entry: DiagnosticEntry) {
        self.entries.push(entry);
    }

    /// True iff any entry is Error or Fatal
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.entries.iter().any(|e| e.severity.is_error())
    }

    #[must_use]
    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DiagnosticEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries at exactly `severity`
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|e| e.severity == severity).count()
    }

    /// Highest severity recorded, if any
    #[must_use]
    pub fn max_severity(&self) -> Option<Severity> {
        self.entries.iter().map(|e| e.severity).max()
    }

    /// The whole transcript, one entry per line
    #[must_use]
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<DiagnosticEntry> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a DiagnosticSink {
    type Item = &'a DiagnosticEntry;
    type IntoIter = std::slice::Iter<'a, DiagnosticEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.transcript())
    }
}

/// Records front-end messages into a sink, resolving spans through the
/// compilation's [`SourceMap`] and applying `-Werror`
pub struct DiagnosticReporter<'a> {
    sink: &'a mut DiagnosticSink,
    sources: &'a SourceMap,
    warnings_as_errors: bool,
}

impl<'a> DiagnosticReporter<'a> {
    pub fn new(sink: &'a mut DiagnosticSink, sources: &'a SourceMap) -> Self {
        Self {
            sink,
            sources,
            warnings_as_errors: false,
        }
    }

    #[must_use]
    pub fn warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    pub fn report(&mut self, severity: Severity, span: Option<Span>, message: impl Into<String>) {
        let severity = if self.warnings_as_errors && severity == Severity::Warning {
            Severity::Error
        } else {
            severity
        };
        let mut entry = DiagnosticEntry::new(severity, message);
        entry.location = span.and_then(|span| self.sources.resolve(span));
        self.sink.record(entry);
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Error, Some(span), message);
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Warning, Some(span), message);
    }

    pub fn note(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Note, Some(span), message);
    }

    pub fn fatal(&mut self, span: Option<Span>, message: impl Into<String>) {
        self.report(Severity::Fatal, span, message);
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.sink.has_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::INPUT_NAME;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Note < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
        assert!(!Severity::Warning.is_error());
        assert!(Severity::Fatal.is_error());
    }

    #[test]
    fn sink_keeps_every_entry_in_order() {
        let mut sink = DiagnosticSink::new();
        sink.record(DiagnosticEntry::new(Severity::Warning, "first"));
        assert!(!sink.has_error());
        sink.record(DiagnosticEntry::new(Severity::Error, "second"));
        assert!(sink.has_error());
        sink.record(DiagnosticEntry::new(Severity::Note, "third"));
        sink.record(DiagnosticEntry::new(Severity::Note, "third"));

        assert!(sink.has_error());
        let messages: Vec<_> = sink.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third", "third"]);
        assert_eq!(sink.count(Severity::Note), 2);
        assert_eq!(sink.max_severity(), Some(Severity::Error));
    }

    #[test]
    fn transcript_renders_locations() {
        let mut sources = SourceMap::new();
        let main = sources.add(INPUT_NAME, "int f(void) {\n  return x;\n}\n");
        let mut sink = DiagnosticSink::new();
        {
            let mut reporter = DiagnosticReporter::new(&mut sink, &sources);
            reporter.error(Span::in_file(main, 23, 24), "use of undeclared identifier 'x'");
            reporter.report(Severity::Fatal, None, "error in backend: boom");
        }
        assert_eq!(
            sink.transcript(),
            "<input>:2:10: error: use of undeclared identifier 'x'\n\
             fatal error: error in backend: boom\n"
        );
    }

    #[test]
    fn reporter_promotes_warnings() {
        let sources = SourceMap::new();
        let mut sink = DiagnosticSink::new();
        {
            let mut reporter = DiagnosticReporter::new(&mut sink, &sources).warnings_as_errors(true);
            reporter.report(Severity::Warning, None, "unused");
            reporter.report(Severity::Note, None, "note stays a note");
        }
        assert_eq!(sink.entries()[0].severity, Severity::Error);
        assert_eq!(sink.entries()[1].severity, Severity::Note);
    }
}
