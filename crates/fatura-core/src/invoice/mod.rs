//! Invoice field recognition without a language model.

mod parser;
pub mod rules;

pub use parser::{RULES_MODEL, RuleBasedProducer};
