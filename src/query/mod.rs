//! Query execution for chanfind
//!
//! Runs CFQL-compiled predicates against the channel index, either as
//! bounded listings/counts or as resumable scrolls.

mod executor;
pub mod filter;
mod scroll;

pub use executor::{ResultExecutor, SearchResult};
pub use scroll::{ScrollManager, ScrollPage};
