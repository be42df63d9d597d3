//! Expense extraction domain module.
//!
//! The extraction service is a black box that turns free text or a receipt
//! into candidate transactions. This module owns the typed shape of its
//! output and the validation that guards the sync core from bad data.

mod errors;
mod transaction;

pub use errors::ExtractionError;
pub use transaction::{
    parse_extraction_response, validate_extraction_value, BudgetCandidate, ExtractedTransaction,
    ExtractionInput,
};
