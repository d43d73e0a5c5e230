//! Predicate evaluation over JSON channel documents
//!
//! Used by the in-memory backend. A [`Filter`] is compiled once per
//! request so wildcard regexes are not rebuilt for every document.

use cfql::{Field, NestedPath, Pattern, Predicate, Segment};
use regex::{Regex, RegexBuilder};
use serde_json::Value;

/// A predicate prepared for repeated evaluation
#[derive(Debug, Clone)]
pub struct Filter {
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    All,
    Term { field: Field, value: String },
    Wildcard { field: Field, regex: Regex },
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Nested { path: NestedPath, inner: Box<Node> },
}

/// Where field lookups happen: the channel itself, or one element of an
/// embedded tag/property collection
#[derive(Clone, Copy)]
enum Scope<'a> {
    Document(&'a Value),
    Element(NestedPath, &'a Value),
}

impl Filter {
    pub fn compile(predicate: &Predicate) -> Result<Self, regex::Error> {
        Ok(Self {
            root: compile_node(predicate)?,
        })
    }

    pub fn matches(&self, doc: &Value) -> bool {
        eval(&self.root, Scope::Document(doc))
    }
}

/// One-shot evaluation of `predicate` against `doc`
pub fn evaluate(predicate: &Predicate, doc: &Value) -> bool {
    Filter::compile(predicate)
        .map(|f| f.matches(doc))
        .unwrap_or(false)
}

/// Translate a wildcard pattern into an anchored regex
pub fn pattern_regex(pattern: &Pattern, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut source = String::from("^");
    for segment in &pattern.segments {
        match segment {
            Segment::Literal(text) => source.push_str(&regex::escape(text)),
            Segment::AnyChar => source.push('.'),
            Segment::AnySequence => source.push_str(".*"),
        }
    }
    source.push('$');

    RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
}

fn compile_node(predicate: &Predicate) -> Result<Node, regex::Error> {
    Ok(match predicate {
        Predicate::MatchAll => Node::All,
        Predicate::Term { field, value } => Node::Term {
            field: *field,
            value: value.clone(),
        },
        Predicate::Wildcard {
            field,
            pattern,
            case_insensitive,
        } => Node::Wildcard {
            field: *field,
            regex: pattern_regex(pattern, *case_insensitive)?,
        },
        Predicate::And(children) => {
            Node::And(children.iter().map(compile_node).collect::<Result<_, _>>()?)
        }
        Predicate::Or(children) => {
            Node::Or(children.iter().map(compile_node).collect::<Result<_, _>>()?)
        }
        Predicate::Not(inner) => Node::Not(Box::new(compile_node(inner)?)),
        Predicate::Nested { path, query } => Node::Nested {
            path: *path,
            inner: Box::new(compile_node(query)?),
        },
    })
}

fn eval(node: &Node, scope: Scope<'_>) -> bool {
    match node {
        Node::All => true,
        Node::Term { field, value } => field_values(*field, scope).any(|v| v == value),
        Node::Wildcard { field, regex } => field_values(*field, scope).any(|v| regex.is_match(v)),
        Node::And(children) => children.iter().all(|c| eval(c, scope)),
        Node::Or(children) => children.iter().any(|c| eval(c, scope)),
        Node::Not(inner) => !eval(inner, scope),
        Node::Nested { path, inner } => match scope {
            Scope::Document(doc) => elements(doc, *path).any(|item| eval(inner, Scope::Element(*path, item))),
            // Nested inside nested: not a shape the compiler produces
            Scope::Element(..) => false,
        },
    }
}

/// Embedded tags or properties of a channel document
fn elements(doc: &Value, path: NestedPath) -> impl Iterator<Item = &Value> {
    doc.get(path.as_str())
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Last component of a dotted path (`tags.name` → `name`)
fn leaf(field: Field) -> &'static str {
    let path = field.path();
    path.rsplit('.').next().unwrap_or(path)
}

/// String values `field` takes in `scope`
///
/// At document level a nested field yields one value per embedded
/// element, the way a flattened index would see it.
fn field_values<'a>(field: Field, scope: Scope<'a>) -> Box<dyn Iterator<Item = &'a str> + 'a> {
    match (scope, field.nested()) {
        (Scope::Document(doc), None) => Box::new(doc.get(field.path()).and_then(Value::as_str).into_iter()),
        (Scope::Document(doc), Some(path)) => Box::new(
            elements(doc, path).filter_map(move |item| item.get(leaf(field)).and_then(Value::as_str)),
        ),
        (Scope::Element(path, item), Some(nested)) if path == nested => {
            Box::new(item.get(leaf(field)).and_then(Value::as_str).into_iter())
        }
        (Scope::Element(..), _) => Box::new(std::iter::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfql::compile_str;
    use serde_json::json;

    fn make_doc() -> Value {
        json!({
            "name": "SR:C01-MG{PS:QH1A}I-I",
            "owner": "ops",
            "tags": [{"name": "archived", "owner": "ops"}],
            "properties": [
                {"name": "domain", "owner": "ops", "value": "storage ring"},
                {"name": "cell", "owner": "ops", "value": "01"}
            ]
        })
    }

    fn eval_str(query: &str, doc: &Value) -> bool {
        evaluate(&compile_str(query).unwrap().predicate, doc)
    }

    #[test]
    fn test_name_wildcards() {
        let doc = make_doc();
        assert!(eval_str("~name=SR:C01*", &doc));
        assert!(eval_str("~name=sr:c01*", &doc));
        assert!(eval_str("~name=*", &doc));
        assert!(!eval_str("~name=SR:C02*", &doc));
        assert!(!eval_str("~name=SR:C01", &doc));
    }

    #[test]
    fn test_question_mark_is_exactly_one_char() {
        let doc = json!({"name": "ab"});
        assert!(eval_str("~name=a?", &doc));
        assert!(!eval_str("~name=ab?", &doc));
        assert!(!eval_str("~name=a??", &doc));
    }

    #[test]
    fn test_tags() {
        let doc = make_doc();
        assert!(eval_str("~tag=arch*", &doc));
        assert!(!eval_str("~tag=active", &doc));
        assert!(eval_str("~tag!=active", &doc));
        assert!(!eval_str("~tag!=archived", &doc));
    }

    #[test]
    fn test_property_value_bound_to_name() {
        let doc = make_doc();
        assert!(eval_str("domain=storage*", &doc));
        // `01` belongs to `cell`, not `domain`
        assert!(!eval_str("domain=01", &doc));
        assert!(eval_str("domain=storage*&cell=01", &doc));
        assert!(!eval_str("domain=storage*&cell=02", &doc));
    }

    #[test]
    fn test_negated_property() {
        let doc = make_doc();
        assert!(eval_str("domain!=booster", &doc));
        assert!(!eval_str("domain!=storage*", &doc));
        // Missing property never satisfies `K!=v`
        assert!(!eval_str("type!=write", &doc));
        assert!(eval_str("type!=*", &doc));
        assert!(!eval_str("domain!=*", &doc));
    }

    #[test]
    fn test_term_is_case_sensitive() {
        let doc = make_doc();
        assert!(evaluate(&Predicate::has_tag("archived"), &doc));
        assert!(!evaluate(&Predicate::has_tag("Archived"), &doc));
        assert!(evaluate(&Predicate::named("SR:C01-MG{PS:QH1A}I-I"), &doc));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let doc = make_doc();
        assert!(eval_str("~name=SR:C01-MG{PS:QH1A}I-I", &doc));
        assert!(!eval_str("~name=SR.C01*", &doc));
    }
}
