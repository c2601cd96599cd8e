#[allow(unused_imports)]
use log::info;

use core::ops::Range;
use lazy_static::lazy_static;
use regex::Regex;
use rhai::{self, EvalAltResult};
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt;
use string_offsets::{Pos, StringOffsets};
use thiserror::Error;

//
// ---------------- Error Generation ----------------
//

/// The range used when no more specific span is available.
pub const UNKNOWN_RANGE: Range<usize> = 0..usize::MAX;

/// The eight error kinds named by the language's error taxonomy. Every
/// `RawError` carries one, and it is what `[<Kind>] Line <n>: <message>`
/// CLI reports key off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Kind {
    LoadError,
    ValidationError,
    KeyNotFound,
    IndexNotFound,
    ArgumentMismatch,
    UndefinedName,
    TypeError,
    PathEscape,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::LoadError => "LoadError",
            Kind::ValidationError => "ValidationError",
            Kind::KeyNotFound => "KeyNotFound",
            Kind::IndexNotFound => "IndexNotFound",
            Kind::ArgumentMismatch => "ArgumentMismatch",
            Kind::UndefinedName => "UndefinedName",
            Kind::TypeError => "TypeError",
            Kind::PathEscape => "PathEscape",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Error, Clone)]
pub enum RawError {
    #[error("while parsing yaml: {0}")]
    YamlParsing(String),
    #[error("while parsing expression: {0}")]
    ExpressionParsing(#[from] rhai::ParseError),
    #[error("while serializing: {0}")]
    Serialization(String),
    #[error("while parsing regex: {0}")]
    Regex(#[from] regex::Error),
    #[error("[{kind}] {message}")]
    Kinded { kind: Kind, message: String },
    #[error("{0}")]
    Dynamic(String),
    #[error("{0}")]
    Static(&'static str),
}

impl RawError {
    pub fn kind(&self) -> Kind {
        match self {
            RawError::YamlParsing(_) => Kind::LoadError,
            RawError::Kinded { kind, .. } => *kind,
            _ => Kind::TypeError,
        }
    }

    pub fn kinded(kind: Kind, message: impl Into<String>) -> Self {
        RawError::Kinded {
            kind,
            message: message.into(),
        }
    }
}

#[macro_export]
macro_rules! err {
    ( $($x:tt)* ) => {
        $crate::error::RawError::Dynamic(format!($($x)*))
    };
}

#[macro_export]
macro_rules! kinded_err {
    ( $kind:expr, $($x:tt)* ) => {
        $crate::error::RawError::Kinded { kind: $kind, message: format!($($x)*) }
    };
}

pub fn err(msg: &'static str) -> RawError {
    RawError::Static(msg)
}

#[derive(Debug, Error, Clone)]
pub struct ParseError {
    #[source]
    pub(crate) error: RawError,
    pub(crate) contexts: SmallVec<[Context; 8]>,
    pub(crate) level: ErrorLevel,
}

impl ParseError {
    pub fn kind(&self) -> Kind {
        self.error.kind()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub enum ErrorLevel {
    #[default]
    Error,
    Warn,
    Info,
}

#[derive(Debug, Clone)]
pub enum Context {
    Message(String),
    Range(Range<usize>),
    ExpRange(Range<usize>),
    RefRange(Range<usize>),
}

/// A `Spannable` can be interpreted as a byte-range into the source.
pub trait Spannable {
    fn range(&self) -> Option<Range<usize>>;
}

impl<T> Spannable for crate::node::Spanned<T> {
    fn range(&self) -> Option<Range<usize>> {
        self.span.clone()
    }
}

impl Spannable for Range<usize> {
    fn range(&self) -> Option<Range<usize>> {
        Some(self.clone())
    }
}

impl Spannable for Option<Range<usize>> {
    fn range(&self) -> Option<Range<usize>> {
        self.clone()
    }
}

impl Spannable for &Range<usize> {
    fn range(&self) -> Option<Range<usize>> {
        Some((*self).clone())
    }
}

/// An object implementing `ErrorContext` can store additional context
/// about the error being returned.
pub trait ErrorContext<T>
where
    Self: Sized,
{
    type Error;
    fn with_context(self, context: Context) -> std::result::Result<T, Self::Error>;
    fn with_message(self, context: impl ToString) -> std::result::Result<T, Self::Error> {
        self.with_context(Context::Message(context.to_string()))
    }
    fn with_range(self, context: &impl Spannable) -> std::result::Result<T, Self::Error> {
        if let Some(range) = context.range() {
            self.with_context(Context::Range(range))
        } else {
            self.with_context(Context::Range(UNKNOWN_RANGE))
        }
    }
    fn with_exp_range(self, context: &impl Spannable) -> std::result::Result<T, Self::Error> {
        if let Some(range) = context.range() {
            self.with_context(Context::ExpRange(range))
        } else {
            self.with_context(Context::Range(UNKNOWN_RANGE))
        }
    }
    fn with_ref_range(self, context: &impl Spannable) -> std::result::Result<T, Self::Error> {
        if let Some(range) = context.range() {
            self.with_context(Context::RefRange(range))
        } else {
            self.with_context(Context::RefRange(UNKNOWN_RANGE))
        }
    }
}

impl<T> ErrorContext<T> for Result<T> {
    type Error = ParseError;
    fn with_context(self, context: Context) -> Result<T> {
        match self {
            Ok(x) => Ok(x),
            Err(mut e) => {
                e.contexts.push(context);
                Err(e)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

impl<E: Into<RawError>> From<E> for ParseError {
    fn from(error: E) -> Self {
        ParseError {
            error: error.into(),
            contexts: SmallVec::new(),
            level: ErrorLevel::default(),
        }
    }
}

impl From<Box<EvalAltResult>> for RawError {
    fn from(value: Box<EvalAltResult>) -> RawError {
        // An undefined name inside a `{{ ... }}` expression must surface as
        // `Kind::UndefinedName` (spec.md §4.E "strict mode... fails with an
        // UndefinedName error", §7 taxonomy), not fall through to the
        // catch-all `TypeError` every other rhai failure gets.
        match value.as_ref() {
            EvalAltResult::ErrorVariableNotFound(name, _) => RawError::Kinded {
                kind: Kind::UndefinedName,
                message: format!("name '{name}' is not defined"),
            },
            _ => RawError::Dynamic(value.to_string()),
        }
    }
}

//
// ---------------- ErrorSet Generation ----------------
//

// Functionality related to the generation of ErrorSets; these track
// multiple errors produced across independent phases of loading and
// interpreting a single document.

pub type ResultVec<T> = std::result::Result<T, ErrorSet>;

#[derive(Debug, Clone, Error)]
#[error("first error: {}", .errors[0])]
pub struct ErrorSet {
    pub(crate) errors: Vec<ParseError>,
}

impl ErrorSet {
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Sorts errors by the first `Range` context present, by start offset,
    /// matching the schema validator's "sorted by path" / "first error by
    /// path wins" contract (spec.md §4.C).
    pub fn sort_by_range(&mut self) {
        self.errors.sort_by_key(|e| {
            e.contexts
                .iter()
                .find_map(|c| match c {
                    Context::Range(r) => Some(r.start),
                    _ => None,
                })
                .unwrap_or(usize::MAX)
        });
    }
}

impl From<ParseError> for ErrorSet {
    fn from(value: ParseError) -> Self {
        ErrorSet {
            errors: vec![value],
        }
    }
}

/// Compile an iterable of `ResultVec<T>` to a single `ResultVec<Vec<T>>`,
/// accumulating every error across independent items rather than
/// short-circuiting on the first.
pub fn flatten_errors<T>(errs: impl Iterator<Item = ResultVec<T>>) -> ResultVec<Vec<T>>
where
    T: std::fmt::Debug,
{
    let (results, errors): (Vec<_>, Vec<_>) = errs.partition(|e| e.is_ok());
    let flat_errs = errors
        .into_iter()
        .flat_map(|x| x.unwrap_err().errors.into_iter())
        .collect::<Vec<ParseError>>();

    if !flat_errs.is_empty() {
        Err(flat_errs.into())
    } else {
        Ok(results.into_iter().map(|x| x.unwrap()).collect())
    }
}

impl<E: Into<RawError>> From<E> for ErrorSet {
    fn from(error: E) -> Self {
        let error: RawError = error.into();
        let error: ParseError = error.into();
        error.into()
    }
}

impl From<Vec<ParseError>> for ErrorSet {
    fn from(value: Vec<ParseError>) -> Self {
        ErrorSet { errors: value }
    }
}

impl<T, E: Into<RawError>> ErrorContext<T> for std::result::Result<T, E> {
    type Error = ParseError;
    fn with_context(self, context: Context) -> Result<T> {
        match self {
            Ok(x) => Ok(x),
            Err(e) => {
                let mut contexts = SmallVec::new();
                contexts.push(context);
                Err(ParseError {
                    error: e.into(),
                    contexts,
                    level: ErrorLevel::default(),
                })
            }
        }
    }
}

impl<T> ErrorContext<T> for ResultVec<T> {
    type Error = ErrorSet;
    fn with_context(self, context: Context) -> ResultVec<T> {
        match self {
            Ok(x) => Ok(x),
            Err(mut errs) => {
                errs.errors
                    .iter_mut()
                    .for_each(|e| e.contexts.push(context.clone()));
                Err(errs)
            }
        }
    }
}

//
// ---------------- Error Reporting ----------------
//

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> std::result::Result<(), fmt::Error> {
        for context in &self.contexts {
            if let Context::Message(str) = context {
                writeln!(f, "{}", str)?;
            }
        }
        self.error.fmt(f)
    }
}

fn range_to_pos(range: &Range<usize>, offsets: &StringOffsets) -> CharRange {
    let start;
    let end;
    if range == &UNKNOWN_RANGE {
        start = offsets.utf8_to_char_pos(0);
        end = offsets.utf8_to_char_pos(offsets.len());
    } else {
        start = offsets.utf8_to_char_pos(range.start.min(offsets.len()));
        end = offsets.utf8_to_char_pos(range.end.min(offsets.len()));
    }
    CharRange { start, end }
}

lazy_static! {
    static ref LINE_MESSAGE: Regex = Regex::new(r"\(line [0-9]+, position [0-9]+\)").unwrap();
}

impl ParseError {
    /// Resolve byte ranges against `content` to produce the CLI-facing
    /// `[<Kind>] Line <n>: <message>` report (spec.md §6/§7).
    pub fn report(&self, content: &[u8]) -> ErrorReport {
        let offsets: StringOffsets = StringOffsets::from_bytes(content);
        let mut message_buf = String::new();
        let mut range = UNKNOWN_RANGE;
        let mut char_line_range = None;
        match &self.error {
            RawError::ExpressionParsing(rhai) => {
                let raw_msg = self.error.to_string();
                let msg = LINE_MESSAGE.replace_all(&raw_msg, "");
                message_buf.push_str(&msg);
                let _ = rhai.position();
            }
            _ => message_buf.push_str(&self.error.to_string()),
        };
        for context in &self.contexts {
            match context {
                Context::Message(str) => message_buf.push_str(str),
                Context::Range(new_range) | Context::ExpRange(new_range) => {
                    range = new_range.clone();
                    char_line_range = Some(range_to_pos(new_range, &offsets));
                }
                Context::RefRange(_) => {}
            }
        }
        let cl_range = char_line_range.unwrap_or_else(|| range_to_pos(&range, &offsets));
        ErrorReport {
            kind: self.error.kind(),
            message: message_buf,
            range: cl_range,
            level: self.level.clone(),
        }
    }
}

impl ErrorSet {
    pub fn report(&self, content: &[u8]) -> Vec<ErrorReport> {
        self.errors.iter().map(|e| e.report(content)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct CharRange {
    pub start: Pos,
    pub end: Pos,
}

impl Default for CharRange {
    fn default() -> Self {
        CharRange {
            start: Pos { line: 0, col: 0 },
            end: Pos { line: 0, col: 0 },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub kind: Kind,
    pub message: String,
    pub range: CharRange,
    pub level: ErrorLevel,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Line {}: {}",
            self.kind,
            self.range.start.line + 1,
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn report_format_matches_cli_contract() {
        let err: ParseError = RawError::kinded(Kind::UndefinedName, "name 'x' is not defined").into();
        let report = err.report(b"a: 1\nb: {{ x }}\n");
        assert_eq!(report.kind, Kind::UndefinedName);
        assert!(format!("{report}").starts_with("[UndefinedName] Line "));
    }

    #[test]
    fn sort_by_range_orders_by_start_offset() {
        let late: ParseError = Result::<()>::Err(RawError::kinded(Kind::TypeError, "late").into())
            .with_context(Context::Range(10..11))
            .unwrap_err();
        let early: ParseError = Result::<()>::Err(RawError::kinded(Kind::TypeError, "early").into())
            .with_context(Context::Range(0..1))
            .unwrap_err();
        let mut set: ErrorSet = vec![late, early].into();
        set.sort_by_range();
        assert_eq!(set.errors[0].error.to_string(), "[TypeError] early");
    }
}
