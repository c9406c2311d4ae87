//! Document numbering.
//!
//! Numbers are deterministic per (tenant, document type, series), where the
//! series is the calendar year of the transaction date. The sequence is the
//! count of already-numbered documents of that series plus one, computed in
//! the same serializable transaction as the status flip — the isolation
//! level, not application locking, is what keeps two concurrent postings
//! from taking the same number.

use tradebook_model::DocumentType;

/// Format `{3-letter prefix}-{year}-{4-digit sequence}`.
///
/// Sequences past 9999 widen naturally; the padding is a display floor,
/// not a ceiling.
pub fn format_document_number(doc_type: DocumentType, series: i32, sequence: i64) -> String {
    format!("{}-{}-{:04}", doc_type.number_prefix(), series, sequence)
}
