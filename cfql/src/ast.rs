//! Predicate tree produced by the compiler

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CompileError;

/// A channel document field a leaf predicate can test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Channel name
    Name,
    /// Channel owner
    Owner,
    /// `name` of an embedded tag
    TagName,
    /// `name` of an embedded property
    PropertyName,
    /// `value` of an embedded property
    PropertyValue,
}

impl Field {
    /// Dotted document path of the field
    pub fn path(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Owner => "owner",
            Field::TagName => "tags.name",
            Field::PropertyName => "properties.name",
            Field::PropertyValue => "properties.value",
        }
    }

    /// The nested collection this field lives in, if any
    pub fn nested(&self) -> Option<NestedPath> {
        match self {
            Field::Name | Field::Owner => None,
            Field::TagName => Some(NestedPath::Tags),
            Field::PropertyName | Field::PropertyValue => Some(NestedPath::Properties),
        }
    }
}

/// Embedded collections of a channel document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NestedPath {
    Tags,
    Properties,
}

impl NestedPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            NestedPath::Tags => "tags",
            NestedPath::Properties => "properties",
        }
    }
}

/// One piece of a wildcard pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    /// Characters matched literally
    Literal(String),
    /// `?` - exactly one character
    AnyChar,
    /// `*` - zero or more characters
    AnySequence,
}

/// A parsed wildcard pattern
///
/// Adjacent literals are merged and runs of `*` collapse into one segment,
/// so two patterns that match the same strings compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pattern {
    pub segments: Vec<Segment>,
}

impl Pattern {
    /// Parse wildcard text (`*`, `?`, `\` escapes)
    pub fn parse(input: &str) -> Pattern {
        crate::parser::parse_pattern(input)
    }

    /// A pattern that matches `text` and nothing else
    pub fn literal(text: impl Into<String>) -> Pattern {
        let text = text.into();
        if text.is_empty() {
            return Pattern::default();
        }
        Pattern {
            segments: vec![Segment::Literal(text)],
        }
    }

    /// A pattern that matches every value
    pub fn any() -> Pattern {
        Pattern {
            segments: vec![Segment::AnySequence],
        }
    }

    /// Build from raw segments, normalizing as [`Pattern::parse`] does
    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Pattern {
        let mut normalized: Vec<Segment> = Vec::new();
        for segment in segments {
            match (normalized.last_mut(), segment) {
                (Some(Segment::Literal(prev)), Segment::Literal(next)) => prev.push_str(&next),
                (Some(Segment::AnySequence), Segment::AnySequence) => {}
                (_, Segment::Literal(next)) if next.is_empty() => {}
                (_, segment) => normalized.push(segment),
            }
        }
        Pattern {
            segments: normalized,
        }
    }

    /// True when the pattern is `*` (matches everything, including "")
    pub fn matches_everything(&self) -> bool {
        matches!(self.segments.as_slice(), [Segment::AnySequence])
    }

    /// True when the pattern holds no wildcards
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::AnyChar => f.write_str("?")?,
                Segment::AnySequence => f.write_str("*")?,
                Segment::Literal(text) => {
                    for c in text.chars() {
                        if matches!(c, '*' | '?' | '\\') {
                            f.write_str("\\")?;
                        }
                        write!(f, "{}", c)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Backend-independent boolean expression over channel documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Every document
    MatchAll,
    /// Exact, case-sensitive equality
    Term { field: Field, value: String },
    /// Wildcard match
    Wildcard {
        field: Field,
        pattern: Pattern,
        case_insensitive: bool,
    },
    /// Every child holds (empty = true)
    And(Vec<Predicate>),
    /// At least one child holds (empty = false)
    Or(Vec<Predicate>),
    /// Child does not hold
    Not(Box<Predicate>),
    /// Some element of the nested collection satisfies `query`
    Nested {
        path: NestedPath,
        query: Box<Predicate>,
    },
}

impl Predicate {
    /// Channels carrying a tag named exactly `name`
    pub fn has_tag(name: impl Into<String>) -> Predicate {
        Predicate::Nested {
            path: NestedPath::Tags,
            query: Box::new(Predicate::Term {
                field: Field::TagName,
                value: name.into(),
            }),
        }
    }

    /// Channels carrying a property named exactly `name`, with any value
    pub fn has_property(name: impl Into<String>) -> Predicate {
        Predicate::Nested {
            path: NestedPath::Properties,
            query: Box::new(Predicate::Term {
                field: Field::PropertyName,
                value: name.into(),
            }),
        }
    }

    /// Channel named exactly `name`
    pub fn named(name: impl Into<String>) -> Predicate {
        Predicate::Term {
            field: Field::Name,
            value: name.into(),
        }
    }

    pub fn negate(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    /// Collapse single-child AND/OR groups
    pub(crate) fn and(mut children: Vec<Predicate>) -> Predicate {
        match children.len() {
            0 => Predicate::MatchAll,
            1 => children.remove(0),
            _ => Predicate::And(children),
        }
    }

    pub(crate) fn or(mut children: Vec<Predicate>) -> Predicate {
        if children.len() == 1 {
            children.remove(0)
        } else {
            Predicate::Or(children)
        }
    }
}

/// Validated page window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub size: usize,
    pub from: usize,
}

impl Pagination {
    pub fn new(size: usize, from: usize) -> Self {
        Self { size, from }
    }

    /// Last position (exclusive) the window reaches
    pub fn end(&self) -> usize {
        self.size.saturating_add(self.from)
    }
}

/// Output of [`crate::compile`]: the predicate plus paging directives
///
/// `size`/`from` are kept raw so that counting can ignore them entirely;
/// only [`CompiledQuery::pagination`] validates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub predicate: Predicate,
    /// Largest `~size` seen, if any
    pub size: Option<i64>,
    /// Largest `~from` seen, if any
    pub from: Option<i64>,
    /// `~search_after`: resume after this channel name
    pub search_after: Option<String>,
    /// `~track_total_hits`
    pub track_total_hits: bool,
}

impl CompiledQuery {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            size: None,
            from: None,
            search_after: None,
            track_total_hits: false,
        }
    }

    /// Resolve the page window for a listing, falling back to `default_size`
    pub fn pagination(&self, default_size: usize) -> Result<Pagination, CompileError> {
        let size = match self.size {
            Some(size) if size < 0 => return Err(CompileError::NegativeSize(size)),
            Some(size) => usize::try_from(size).unwrap_or(usize::MAX),
            None => default_size,
        };
        let from = match self.from {
            Some(from) if from < 0 => return Err(CompileError::NegativeFrom(from)),
            Some(from) => usize::try_from(from).unwrap_or(usize::MAX),
            None => 0,
        };
        Ok(Pagination { size, from })
    }
}
