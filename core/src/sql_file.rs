//! Patches written as plain SQL files.
//!
//! A patch file holds two sections, each introduced by a marker comment:
//!
//! ```sql
//! -- +upgrade
//! CREATE TABLE users (
//!     id INTEGER PRIMARY KEY,
//!     name TEXT NOT NULL
//! );
//! CREATE INDEX users_name ON users (name);
//!
//! -- +downgrade
//! DROP INDEX users_name;
//! DROP TABLE users;
//! ```
//!
//! A statement ends at a `;` that is not inside a quoted literal, a comment,
//! or the `BEGIN ... END` body of a `CREATE TRIGGER`. Blank lines and `--`
//! comments between statements are dropped. The upgrade marker is
//! mandatory; a missing downgrade section means the step back is a no-op.

use thiserror::Error;

use crate::{Patch, Statements};

const UPGRADE_MARKER: &str = "+upgrade";
const DOWNGRADE_MARKER: &str = "+downgrade";

/// Problems found while parsing a SQL patch file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchFileError {
    #[error("missing '-- +upgrade' section marker")]
    MissingUpgradeSection,
    #[error("line {line}: duplicate '-- {marker}' section marker")]
    DuplicateSection { line: usize, marker: &'static str },
    #[error("line {line}: statement outside of any section")]
    StatementOutsideSection { line: usize },
}

/// A patch parsed from SQL source text.
///
/// # Examples
///
/// ```
/// use dbpatcher_core::SqlPatch;
///
/// let patch = SqlPatch::parse("-- +upgrade\nCREATE TABLE t (id INTEGER);\n-- +downgrade\nDROP TABLE t;\n").unwrap();
/// assert_eq!(patch.upgrade_statements(), ["CREATE TABLE t (id INTEGER)"]);
/// assert_eq!(patch.downgrade_statements(), ["DROP TABLE t"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlPatch {
    upgrade: Vec<String>,
    downgrade: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Upgrade,
    Downgrade,
}

impl SqlPatch {
    /// Parses patch source text.
    ///
    /// # Errors
    ///
    /// Returns a [`PatchFileError`] if the upgrade marker is absent, a marker
    /// repeats, or SQL appears before the first marker.
    pub fn parse(source: &str) -> Result<Self, PatchFileError> {
        let mut patch = Self::default();
        let mut section = Section::Preamble;
        let mut seen_upgrade = false;
        let mut seen_downgrade = false;
        let mut splitter = StatementSplitter::default();

        for (index, raw) in source.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();

            if let Some(marker) = section_marker(line).filter(|_| !splitter.in_literal()) {
                if let Some(statement) = splitter.finish() {
                    patch.push(section, statement);
                }
                match marker {
                    Section::Upgrade if seen_upgrade => {
                        return Err(PatchFileError::DuplicateSection {
                            line: line_no,
                            marker: UPGRADE_MARKER,
                        });
                    }
                    Section::Downgrade if seen_downgrade => {
                        return Err(PatchFileError::DuplicateSection {
                            line: line_no,
                            marker: DOWNGRADE_MARKER,
                        });
                    }
                    Section::Upgrade => seen_upgrade = true,
                    Section::Downgrade => seen_downgrade = true,
                    Section::Preamble => {}
                }
                section = marker;
                continue;
            }

            if splitter.is_idle() && (line.is_empty() || line.starts_with("--")) {
                continue;
            }
            if section == Section::Preamble {
                return Err(PatchFileError::StatementOutsideSection { line: line_no });
            }

            for statement in splitter.feed_line(raw) {
                patch.push(section, statement);
            }
        }
        if let Some(statement) = splitter.finish() {
            patch.push(section, statement);
        }

        if !seen_upgrade {
            return Err(PatchFileError::MissingUpgradeSection);
        }
        Ok(patch)
    }

    pub fn upgrade_statements(&self) -> &[String] {
        &self.upgrade
    }

    pub fn downgrade_statements(&self) -> &[String] {
        &self.downgrade
    }

    /// Renders an empty patch skeleton with both section markers.
    pub fn template() -> String {
        format!("-- {UPGRADE_MARKER}\n\n-- {DOWNGRADE_MARKER}\n")
    }

    fn push(&mut self, section: Section, statement: String) {
        match section {
            Section::Upgrade => self.upgrade.push(statement),
            Section::Downgrade => self.downgrade.push(statement),
            Section::Preamble => {}
        }
    }
}

fn section_marker(line: &str) -> Option<Section> {
    let comment = line.strip_prefix("--")?.trim();
    match comment {
        UPGRADE_MARKER => Some(Section::Upgrade),
        DOWNGRADE_MARKER => Some(Section::Downgrade),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Lexeme {
    #[default]
    Code,
    /// Inside a quoted literal or identifier, waiting for the closing char.
    Quoted(char),
    BlockComment,
}

/// Cuts section text into statements at `;` outside literals, comments and
/// trigger bodies.
#[derive(Debug, Default)]
struct StatementSplitter {
    current: String,
    lexeme: Lexeme,
    word: String,
    /// First words of the current statement, uppercased.
    head: Vec<String>,
    /// `BEGIN`/`CASE` nesting inside a `CREATE TRIGGER`.
    depth: usize,
}

impl StatementSplitter {
    fn is_idle(&self) -> bool {
        self.lexeme == Lexeme::Code && self.current.trim().is_empty()
    }

    fn in_literal(&self) -> bool {
        self.lexeme != Lexeme::Code
    }

    /// Consumes one source line and returns the statements it completes.
    fn feed_line(&mut self, line: &str) -> Vec<String> {
        let mut done = Vec::new();
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            match self.lexeme {
                Lexeme::Quoted(close) => {
                    self.current.push(c);
                    if c == close {
                        self.lexeme = Lexeme::Code;
                    }
                }
                Lexeme::BlockComment => {
                    self.current.push(c);
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        self.current.push('/');
                        self.lexeme = Lexeme::Code;
                    }
                }
                Lexeme::Code => {
                    if c.is_alphanumeric() || c == '_' {
                        self.word.push(c);
                        self.current.push(c);
                        continue;
                    }
                    self.end_word();
                    match c {
                        // Line comment: the rest of the line is dropped.
                        '-' if chars.peek() == Some(&'-') => break,
                        '/' if chars.peek() == Some(&'*') => {
                            chars.next();
                            self.current.push_str("/*");
                            self.lexeme = Lexeme::BlockComment;
                        }
                        '\'' | '"' | '`' => {
                            self.current.push(c);
                            self.lexeme = Lexeme::Quoted(c);
                        }
                        '[' => {
                            self.current.push(c);
                            self.lexeme = Lexeme::Quoted(']');
                        }
                        ';' if self.depth == 0 => done.extend(self.finish()),
                        _ => self.current.push(c),
                    }
                }
            }
        }

        self.end_word();
        self.current.push('\n');
        done
    }

    /// Closes the pending statement, if it holds anything but whitespace.
    fn finish(&mut self) -> Option<String> {
        self.end_word();
        let statement = self.current.trim().to_string();
        self.current.clear();
        self.head.clear();
        self.depth = 0;
        self.lexeme = Lexeme::Code;
        (!statement.is_empty()).then_some(statement)
    }

    fn end_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        let word = std::mem::take(&mut self.word).to_ascii_uppercase();
        if self.head.len() < 3 {
            self.head.push(word.clone());
        }
        if !self.is_trigger() {
            return;
        }
        match word.as_str() {
            "BEGIN" | "CASE" => self.depth += 1,
            "END" => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
    }

    fn is_trigger(&self) -> bool {
        self.head.first().is_some_and(|w| w == "CREATE") && self.head.iter().any(|w| w == "TRIGGER")
    }
}

impl Patch for SqlPatch {
    fn upgrade(&self, statements: &mut Statements) {
        for sql in &self.upgrade {
            statements.prepare(sql.as_str());
        }
    }

    fn downgrade(&self, statements: &mut Statements) {
        for sql in &self.downgrade {
            statements.prepare(sql.as_str());
        }
    }
}
