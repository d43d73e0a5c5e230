//! Query parameters → predicate tree
//!
//! Every value of one key lands in a single OR group; groups for
//! different keys are ANDed together. Within a value, `|`, `,` and `;`
//! separate further alternatives.

use crate::ast::{CompiledQuery, Field, NestedPath, Pattern, Predicate};
use crate::error::CompileError;
use crate::params::QueryParams;
use crate::parser::split_alternatives;

pub const NAME_KEY: &str = "~name";
pub const TAG_KEY: &str = "~tag";
pub const SIZE_KEY: &str = "~size";
pub const FROM_KEY: &str = "~from";
pub const SEARCH_AFTER_KEY: &str = "~search_after";
pub const TRACK_TOTAL_HITS_KEY: &str = "~track_total_hits";

/// A query key with its negation marker stripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Key<'a> {
    name: &'a str,
    negated: bool,
}

impl<'a> Key<'a> {
    /// `K!=` and `K!` both mean negated `K`
    fn parse(raw: &'a str) -> Key<'a> {
        let raw = raw.trim();
        let stripped = raw
            .strip_suffix("!=")
            .or_else(|| raw.strip_suffix('!'));
        match stripped {
            Some(name) => Key {
                name: name.trim_end(),
                negated: true,
            },
            None => Key {
                name: raw,
                negated: false,
            },
        }
    }
}

/// Compile query parameters into a predicate plus paging directives
pub fn compile(params: &QueryParams) -> Result<CompiledQuery, CompileError> {
    let mut groups = Vec::new();
    let mut query = CompiledQuery::new(Predicate::MatchAll);

    for (raw_key, values) in params.iter() {
        let key = Key::parse(raw_key);
        match key.name {
            "" => return Err(CompileError::EmptyKey),
            NAME_KEY => groups.push(negate_if(name_group(values), key.negated)),
            TAG_KEY => groups.push(negate_if(tag_group(values), key.negated)),
            SIZE_KEY => query.size = max_number(SIZE_KEY, values)?.or(query.size),
            FROM_KEY => query.from = max_number(FROM_KEY, values)?.or(query.from),
            SEARCH_AFTER_KEY => {
                if let Some(first) = values.first() {
                    query.search_after = Some(first.trim().to_string());
                }
            }
            TRACK_TOTAL_HITS_KEY => {
                if let Some(first) = values.first() {
                    query.track_total_hits = first.trim().eq_ignore_ascii_case("true");
                }
            }
            property if key.negated => groups.push(negated_property_group(property, values)),
            property => groups.push(property_group(property, values)),
        }
    }

    query.predicate = Predicate::and(groups);
    Ok(query)
}

fn negate_if(predicate: Predicate, negated: bool) -> Predicate {
    if negated {
        predicate.negate()
    } else {
        predicate
    }
}

/// Every alternative of every value, parsed
fn patterns(values: &[String]) -> impl Iterator<Item = Pattern> + '_ {
    values
        .iter()
        .flat_map(|value| split_alternatives(value))
        .map(|alt| Pattern::parse(&alt))
}

fn wildcard(field: Field, pattern: Pattern) -> Predicate {
    Predicate::Wildcard {
        field,
        pattern,
        case_insensitive: true,
    }
}

fn name_group(values: &[String]) -> Predicate {
    Predicate::or(patterns(values).map(|p| wildcard(Field::Name, p)).collect())
}

fn tag_group(values: &[String]) -> Predicate {
    Predicate::or(
        patterns(values)
            .map(|p| Predicate::Nested {
                path: NestedPath::Tags,
                query: Box::new(wildcard(Field::TagName, p)),
            })
            .collect(),
    )
}

fn property_name(name: &str) -> Predicate {
    wildcard(Field::PropertyName, Pattern::literal(name))
}

/// Some embedded property named `name` has a value matching any pattern
fn property_group(name: &str, values: &[String]) -> Predicate {
    Predicate::or(
        patterns(values)
            .map(|p| Predicate::Nested {
                path: NestedPath::Properties,
                query: Box::new(Predicate::and(vec![
                    property_name(name),
                    wildcard(Field::PropertyValue, p),
                ])),
            })
            .collect(),
    )
}

/// `K!=*` → channel lacks `K`; `K!=p1|p2` → channel carries `K` with a
/// value matching none of the patterns
fn negated_property_group(name: &str, values: &[String]) -> Predicate {
    let patterns: Vec<Pattern> = patterns(values).collect();
    if patterns.iter().any(Pattern::matches_everything) {
        return Predicate::Nested {
            path: NestedPath::Properties,
            query: Box::new(property_name(name)),
        }
        .negate();
    }

    let excluded = Predicate::or(
        patterns
            .into_iter()
            .map(|p| wildcard(Field::PropertyValue, p))
            .collect(),
    );
    Predicate::Nested {
        path: NestedPath::Properties,
        query: Box::new(Predicate::and(vec![property_name(name), excluded.negate()])),
    }
}

/// Largest integer among `values`; any non-integer is an error
fn max_number(key: &str, values: &[String]) -> Result<Option<i64>, CompileError> {
    let mut max: Option<i64> = None;
    for value in values {
        let parsed: i64 = value
            .trim()
            .parse()
            .map_err(|_| CompileError::InvalidNumber {
                key: key.to_string(),
                value: value.clone(),
            })?;
        max = Some(max.map_or(parsed, |m| m.max(parsed)));
    }
    Ok(max)
}
