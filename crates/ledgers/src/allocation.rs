//! Allocation ledger (payment-to-invoice settlement links).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradebook_core::{DocumentId, EntryId, TenantId};

/// One settlement link: amount X of a payment/return document applied to a
/// specific invoice document. Append-only.
///
/// Self-settlement is the degenerate case where `payment_document_id` equals
/// `invoice_document_id` (an invoice paying itself at posting time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: EntryId,
    pub tenant_id: TenantId,
    pub payment_document_id: DocumentId,
    pub invoice_document_id: DocumentId,
    /// Strictly positive.
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Total already allocated against an invoice.
pub fn allocated_total<'a>(
    invoice_id: DocumentId,
    allocations: impl IntoIterator<Item = &'a Allocation>,
) -> i64 {
    allocations
        .into_iter()
        .filter(|a| a.invoice_document_id == invoice_id)
        .map(|a| a.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_only_the_requested_invoice() {
        let invoice = DocumentId::new();
        let tenant = TenantId::new();
        let mk = |inv: DocumentId, amount: i64| Allocation {
            id: EntryId::new(),
            tenant_id: tenant,
            payment_document_id: DocumentId::new(),
            invoice_document_id: inv,
            amount,
            occurred_at: Utc::now(),
        };
        let rows = vec![mk(invoice, 4_000), mk(invoice, 1_500), mk(DocumentId::new(), 9_000)];
        assert_eq!(allocated_total(invoice, &rows), 5_500);
    }
}
