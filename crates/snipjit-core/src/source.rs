//! Source buffers handed to the front end
//!
//! A [`SourceUnit`] is the snippet itself: text plus a language tag, with no
//! file identity. A [`SourceMap`] is built per compilation and owns every
//! buffer the front end reads (the snippet and any headers it includes) so
//! that diagnostics can be resolved to a name, line and column.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::lexer::{FileId, LineIndex, Location, Span};

/// C language standards accepted by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CStandard {
    C89,
    C99,
    C11,
    C17,
    C23,
}

/// C++ language standards accepted by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CxxStandard {
    Cxx11,
    Cxx14,
    Cxx17,
    Cxx20,
    Cxx23,
}

/// Language tag attached to a source unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Language {
    C(CStandard),
    Cxx(CxxStandard),
}

impl Language {
    /// Returns true for any C++ standard
    #[must_use]
    pub const fn is_cxx(self) -> bool {
        matches!(self, Language::Cxx(_))
    }
}

/// C17: external names match the source, so `add` is looked up as `add`
impl Default for Language {
    fn default() -> Self {
        Language::C(CStandard::C17)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::C(CStandard::C89) => "c89",
            Language::C(CStandard::C99) => "c99",
            Language::C(CStandard::C11) => "c11",
            Language::C(CStandard::C17) => "c17",
            Language::C(CStandard::C23) => "c23",
            Language::Cxx(CxxStandard::Cxx11) => "c++11",
            Language::Cxx(CxxStandard::Cxx14) => "c++14",
            Language::Cxx(CxxStandard::Cxx17) => "c++17",
            Language::Cxx(CxxStandard::Cxx20) => "c++20",
            Language::Cxx(CxxStandard::Cxx23) => "c++23",
        };
        f.write_str(name)
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let language = match s.to_ascii_lowercase().as_str() {
            "c89" | "c90" => Language::C(CStandard::C89),
            "c99" => Language::C(CStandard::C99),
            "c11" => Language::C(CStandard::C11),
            "c17" | "c18" => Language::C(CStandard::C17),
            "c23" => Language::C(CStandard::C23),
            "c++11" => Language::Cxx(CxxStandard::Cxx11),
            "c++14" => Language::Cxx(CxxStandard::Cxx14),
            "c++17" => Language::Cxx(CxxStandard::Cxx17),
            "c++20" => Language::Cxx(CxxStandard::Cxx20),
            "c++23" => Language::Cxx(CxxStandard::Cxx23),
            other => return Err(format!("unknown language standard '{other}'")),
        };
        Ok(language)
    }
}

impl TryFrom<String> for Language {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.to_string()
    }
}

/// An in-memory snippet of source text with its language tag
///
/// Immutable once constructed. Cloning is cheap; the text is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    text: Arc<str>,
    language: Language,
}

impl SourceUnit {
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>, language: Language) -> Self {
        Self {
            text: text.into(),
            language,
        }
    }

    /// A C17 snippet
    #[must_use]
    pub fn c(text: impl Into<Arc<str>>) -> Self {
        Self::new(text, Language::C(CStandard::C17))
    }

    /// A C++17 snippet
    #[must_use]
    pub fn cxx(text: impl Into<Arc<str>>) -> Self {
        Self::new(text, Language::Cxx(CxxStandard::Cxx17))
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }
}

/// Name given to the snippet buffer in diagnostics
pub const INPUT_NAME: &str = "<input>";

struct SourceFile {
    name: String,
    text: Arc<str>,
    lines: LineIndex,
}

/// All buffers read during one compilation, indexed by [`FileId`]
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer and return its id
    pub fn add(&mut self, name: impl Into<String>, text: impl Into<Arc<str>>) -> FileId {
        let text = text.into();
        let id = FileId(self.files.len() as u16);
        self.files.push(SourceFile {
            name: name.into(),
            lines: LineIndex::new(&text),
            text,
        });
        id
    }

    #[must_use]
    pub fn text(&self, file: FileId) -> Option<&str> {
        self.files.get(usize::from(file.0)).map(|f| &*f.text)
    }

    /// Shared handle to a buffer's text
    #[must_use]
    pub fn shared_text(&self, file: FileId) -> Option<Arc<str>> {
        self.files.get(usize::from(file.0)).map(|f| Arc::clone(&f.text))
    }

    #[must_use]
    pub fn name(&self, file: FileId) -> Option<&str> {
        self.files.get(usize::from(file.0)).map(|f| f.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Resolve a span's start to a named line/column location
    #[must_use]
    pub fn resolve(&self, span: Span) -> Option<SourceLocation> {
        let file = self.files.get(usize::from(span.file.0))?;
        let location = file.lines.location(span.start)?;
        Some(SourceLocation {
            file: file.name.clone(),
            line: location.line,
            column: location.column,
        })
    }
}

/// A resolved diagnostic location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    #[must_use]
    pub fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_display_and_parse() {
        for language in [
            Language::C(CStandard::C11),
            Language::Cxx(CxxStandard::Cxx20),
        ] {
            let parsed: Language = language.to_string().parse().unwrap();
            assert_eq!(parsed, language);
        }
        assert_eq!(Language::default().to_string(), "c17");
        assert!("fortran77".parse::<Language>().is_err());
    }

    #[test]
    fn source_unit_shares_text() {
        let unit = SourceUnit::c("int x;");
        let copy = unit.clone();
        assert_eq!(copy.text(), "int x;");
        assert!(!copy.language().is_cxx());
    }

    #[test]
    fn source_map_resolves_spans() {
        let mut map = SourceMap::new();
        let main = map.add(INPUT_NAME, "int a;\nint b;\n");
        let header = map.add("math.h", "double sin(double);\n");
        assert_eq!(main, FileId::MAIN);
        assert_eq!(map.len(), 2);

        let loc = map.resolve(Span::in_file(main, 11, 12)).unwrap();
        assert_eq!(loc.to_string(), "<input>:2:5");

        let loc = map.resolve(Span::in_file(header, 7, 10)).unwrap();
        assert_eq!(loc.file, "math.h");
        assert_eq!(loc.location(), Location::new(1, 8));

        assert!(map.resolve(Span::in_file(FileId(9), 0, 1)).is_none());
    }
}
