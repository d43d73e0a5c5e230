//! CFQL - Channel Finder Query Language
//!
//! Compiles the multi-valued query parameters used to look up channels
//! into a backend-independent [`Predicate`] tree plus paging directives.
//!
//! # Syntax Overview
//!
//! ```text
//! ~name=SR:C01*              channel name pattern
//! ~name=A&~name=B            repeated key: A OR B
//! ~name=A|B,C;D              separators inside a value: also OR
//! ~tag=archived              channel carries a matching tag
//! ~tag!=archived             ... does not carry one
//! domain=cryo&type=write     property patterns, ANDed across keys
//! domain!=cryo               carries `domain`, value not matching
//! domain!=*                  does not carry `domain` at all
//! ~size=50&~from=100         page window (max value wins)
//! ~search_after=SR:C02-MG    resume a name-ordered listing
//! ~track_total_hits=true     report the full match count
//! ```
//!
//! # Patterns
//!
//! - `?` - exactly one character
//! - `*` - zero or more characters
//! - `\` - escapes the next character
//!
//! Matching is case-insensitive and whitespace around each alternative is
//! trimmed.

mod ast;
mod compile;
mod error;
mod params;
mod parser;

pub use ast::*;
pub use compile::{
    FROM_KEY, NAME_KEY, SEARCH_AFTER_KEY, SIZE_KEY, TAG_KEY, TRACK_TOTAL_HITS_KEY,
};
pub use error::CompileError;
pub use params::QueryParams;
pub use parser::{split_alternatives, ALTERNATIVE_SEPARATORS};

/// Compile query parameters into a predicate and paging directives
pub fn compile(params: &QueryParams) -> Result<CompiledQuery, CompileError> {
    compile::compile(params)
}

/// Decode a URL query string and compile it
pub fn compile_str(query: &str) -> Result<CompiledQuery, CompileError> {
    compile(&QueryParams::parse(query))
}
