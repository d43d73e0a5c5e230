//! Wildcard pattern parser using nom
//!
//! Splits raw parameter values into OR'd alternatives and parses each
//! alternative into [`Segment`]s.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::is_not,
    character::complete::{anychar, char, one_of},
    combinator::{map, value},
    multi::{many0, separated_list0},
    sequence::preceded,
};

use crate::ast::{Pattern, Segment};

/// Characters that separate alternatives inside one value
pub const ALTERNATIVE_SEPARATORS: &str = "|,;";

/// Split a raw value on `|`, `,` or `;`, trimming each alternative
///
/// Blank alternatives are dropped. A value with no non-blank alternative
/// yields a single empty pattern text, which matches only empty fields.
pub fn split_alternatives(input: &str) -> Vec<String> {
    let parts: Vec<&str> = match alternatives(input) {
        Ok((_, parts)) => parts,
        Err(_) => vec![input],
    };

    let cleaned: Vec<String> = parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if cleaned.is_empty() {
        vec![String::new()]
    } else {
        cleaned
    }
}

/// Parse one (already trimmed) alternative into a pattern
pub fn parse_pattern(input: &str) -> Pattern {
    match many0(segment)(input) {
        Ok((rest, segments)) => {
            // Only a dangling `\` can be left over; keep it literally.
            let tail = (!rest.is_empty()).then(|| Segment::Literal(rest.to_string()));
            Pattern::from_segments(segments.into_iter().chain(tail))
        }
        Err(_) => Pattern::literal(input),
    }
}

// ============================================================================
// Combinators
// ============================================================================

fn alternatives(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list0(one_of(ALTERNATIVE_SEPARATORS), alternative)(input)
}

fn alternative(input: &str) -> IResult<&str, &str> {
    alt((is_not(ALTERNATIVE_SEPARATORS), empty))(input)
}

fn empty(input: &str) -> IResult<&str, &str> {
    Ok((input, ""))
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        value(Segment::AnySequence, char('*')),
        value(Segment::AnyChar, char('?')),
        map(preceded(char('\\'), anychar), |c| Segment::Literal(c.to_string())),
        map(is_not("*?\\"), |s: &str| Segment::Literal(s.to_string())),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_all_separators() {
        assert_eq!(split_alternatives("a|b,c;d"), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_split_trims_and_drops_blanks() {
        assert_eq!(split_alternatives(" SR* , ,BR:? "), vec!["SR*", "BR:?"]);
        assert_eq!(split_alternatives(""), vec![""]);
        assert_eq!(split_alternatives(" ; "), vec![""]);
    }

    #[test]
    fn test_parse_wildcards() {
        let pattern = parse_pattern("SR:C?-*");
        assert_eq!(
            pattern.segments,
            vec![
                Segment::Literal("SR:C".into()),
                Segment::AnyChar,
                Segment::Literal("-".into()),
                Segment::AnySequence,
            ]
        );
    }

    #[test]
    fn test_parse_escapes() {
        let pattern = parse_pattern("a\\*b\\?");
        assert!(pattern.is_literal());
        assert_eq!(pattern.segments, vec![Segment::Literal("a*b?".into())]);
    }

    #[test]
    fn test_dangling_backslash_is_literal() {
        let pattern = parse_pattern("abc\\");
        assert_eq!(pattern.segments, vec![Segment::Literal("abc\\".into())]);
    }

    #[test]
    fn test_star_runs_collapse() {
        assert!(parse_pattern("**").matches_everything());
        assert!(parse_pattern("*").matches_everything());
        assert!(!parse_pattern("*a").matches_everything());
    }
}
