//! Aggregation engine.
//!
//! Extraction of per-record statistics, aggregation across annotators and
//! documents, and curated-document views.

pub mod aggregator;
pub mod curation;
pub mod extractor;

pub use aggregator::get_type_counts;
pub use curation::{filter_type_counts_to_documents, get_curated_document_names};
pub use extractor::compute_cas_stats;
