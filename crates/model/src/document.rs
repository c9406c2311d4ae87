//! Commercial documents.
//!
//! A document is one commercial transaction. The kind is a closed tagged
//! union: each variant carries only the fields its kind uses, so a payment
//! never drags sale totals around and a transfer has no party at all.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradebook_core::{AccountId, CustomerId, DocumentId, PartyRef, SupplierId, TenantId};

use crate::line::{DocumentLine, LineDetail};

/// Document lifecycle. `Posted` is terminal; corrections happen through new
/// compensating documents, never by editing a posted one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Posted,
}

/// Discriminant of [`DocumentKind`], used for dispatch, numbering and series
/// scoping without pattern-matching on payloads.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Purchase,
    Sale,
    SupplierPayment,
    CustomerPayment,
    SupplierReturn,
    CustomerReturn,
    InternalTransfer,
    Adjustment,
}

impl DocumentType {
    /// Three-letter prefix used in human-readable document numbers.
    pub fn number_prefix(&self) -> &'static str {
        match self {
            DocumentType::Purchase => "PUR",
            DocumentType::Sale => "SAL",
            DocumentType::SupplierPayment => "SPY",
            DocumentType::CustomerPayment => "CPY",
            DocumentType::SupplierReturn => "SRT",
            DocumentType::CustomerReturn => "CRT",
            DocumentType::InternalTransfer => "TRF",
            DocumentType::Adjustment => "ADJ",
        }
    }

    /// Whether this kind carries document lines.
    pub fn has_lines(&self) -> bool {
        matches!(
            self,
            DocumentType::Purchase
                | DocumentType::Sale
                | DocumentType::SupplierReturn
                | DocumentType::CustomerReturn
                | DocumentType::Adjustment
        )
    }
}

/// A purchase from a supplier (stock in, AP up).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseDetails {
    pub supplier_id: SupplierId,
    pub subtotal: i64,
    pub discount_total: i64,
    pub delivery_fee: i64,
    pub total_amount: i64,
    /// Amount settled at posting time; written by the engine.
    pub paid_now: i64,
}

/// A sale to a customer (stock out, AR up).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDetails {
    pub customer_id: CustomerId,
    pub subtotal: i64,
    pub discount_total: i64,
    pub delivery_fee: i64,
    pub total_amount: i64,
    /// Amount received at posting time; written by the engine.
    pub paid_now: i64,
}

/// One requested settlement of a payment against a target invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub invoice_id: DocumentId,
    pub amount: i64,
}

/// Money paid out to a supplier (AP down).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierPaymentDetails {
    pub supplier_id: SupplierId,
    pub account_id: AccountId,
    pub amount: i64,
    /// Caller-specified invoice split, supplied by the draft layer.
    pub allocations: Vec<AllocationRequest>,
}

/// Money received from a customer (AR down).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPaymentDetails {
    pub customer_id: CustomerId,
    pub account_id: AccountId,
    pub amount: i64,
    pub allocations: Vec<AllocationRequest>,
}

/// Stock returned to a supplier (stock out, AP down).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierReturnDetails {
    pub supplier_id: SupplierId,
    pub total_amount: i64,
}

/// Stock returned by a customer (stock in, AR down).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerReturnDetails {
    pub customer_id: CustomerId,
    pub total_amount: i64,
}

/// Money moved between two payment accounts of the same tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDetails {
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: i64,
}

/// A pure stock quantity correction (no money movement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentDetails {
    pub reason: Option<String>,
}

/// Kind of a commercial document, with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "details")]
pub enum DocumentKind {
    Purchase(PurchaseDetails),
    Sale(SaleDetails),
    SupplierPayment(SupplierPaymentDetails),
    CustomerPayment(CustomerPaymentDetails),
    SupplierReturn(SupplierReturnDetails),
    CustomerReturn(CustomerReturnDetails),
    InternalTransfer(TransferDetails),
    Adjustment(AdjustmentDetails),
}

impl DocumentKind {
    pub fn doc_type(&self) -> DocumentType {
        match self {
            DocumentKind::Purchase(_) => DocumentType::Purchase,
            DocumentKind::Sale(_) => DocumentType::Sale,
            DocumentKind::SupplierPayment(_) => DocumentType::SupplierPayment,
            DocumentKind::CustomerPayment(_) => DocumentType::CustomerPayment,
            DocumentKind::SupplierReturn(_) => DocumentType::SupplierReturn,
            DocumentKind::CustomerReturn(_) => DocumentType::CustomerReturn,
            DocumentKind::InternalTransfer(_) => DocumentType::InternalTransfer,
            DocumentKind::Adjustment(_) => DocumentType::Adjustment,
        }
    }

    /// The party this document moves a balance against, if any.
    pub fn party(&self) -> Option<PartyRef> {
        match self {
            DocumentKind::Purchase(d) => Some(PartyRef::Supplier(d.supplier_id)),
            DocumentKind::Sale(d) => Some(PartyRef::Customer(d.customer_id)),
            DocumentKind::SupplierPayment(d) => Some(PartyRef::Supplier(d.supplier_id)),
            DocumentKind::CustomerPayment(d) => Some(PartyRef::Customer(d.customer_id)),
            DocumentKind::SupplierReturn(d) => Some(PartyRef::Supplier(d.supplier_id)),
            DocumentKind::CustomerReturn(d) => Some(PartyRef::Customer(d.customer_id)),
            DocumentKind::InternalTransfer(_) | DocumentKind::Adjustment(_) => None,
        }
    }

    /// Commercial total for trade kinds, single amount for the rest.
    pub fn amount(&self) -> i64 {
        match self {
            DocumentKind::Purchase(d) => d.total_amount,
            DocumentKind::Sale(d) => d.total_amount,
            DocumentKind::SupplierPayment(d) => d.amount,
            DocumentKind::CustomerPayment(d) => d.amount,
            DocumentKind::SupplierReturn(d) => d.total_amount,
            DocumentKind::CustomerReturn(d) => d.total_amount,
            DocumentKind::InternalTransfer(d) => d.amount,
            DocumentKind::Adjustment(_) => 0,
        }
    }
}

/// A business rule a draft violates, discovered at the posting boundary.
///
/// These are deterministic arithmetic/shape failures of the document itself;
/// the posting engine maps them onto its `InvalidArgument` taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentRuleViolation {
    #[error("total {total} != subtotal {subtotal} - discount {discount} + delivery {delivery}")]
    TotalMismatch {
        total: i64,
        subtotal: i64,
        discount: i64,
        delivery: i64,
    },

    #[error("document kind requires at least one line")]
    NoLines,

    #[error("document kind carries no lines but {0} were supplied")]
    UnexpectedLines(usize),

    #[error("line {0} has non-positive quantity")]
    NonPositiveQuantity(tradebook_core::LineId),

    #[error("line {0} discount exceeds quantity x unit amount")]
    DiscountExceedsGross(tradebook_core::LineId),

    #[error("line {0} payload does not match the document kind")]
    LineKindMismatch(tradebook_core::LineId),

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("transfer source and destination account are the same")]
    SameAccountTransfer,

    #[error("allocation amount must be positive, got {0}")]
    NonPositiveAllocation(i64),
}

/// One commercial transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub status: DocumentStatus,
    pub transaction_date: NaiveDate,
    pub kind: DocumentKind,
    /// Assigned at posting time, `{PREFIX}-{year}-{seq:04}`.
    pub document_number: Option<String>,
    /// Calendar year of the transaction date; set together with the number.
    pub series: Option<i32>,
    /// Unique per tenant once set.
    pub idempotency_key: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Document {
    /// Create a draft. Mirrors what the draft layer persists.
    pub fn draft(
        id: DocumentId,
        tenant_id: TenantId,
        transaction_date: NaiveDate,
        kind: DocumentKind,
    ) -> Self {
        Self {
            id,
            tenant_id,
            status: DocumentStatus::Draft,
            transaction_date,
            kind,
            document_number: None,
            series: None,
            idempotency_key: None,
            posted_at: None,
            notes: None,
        }
    }

    pub fn doc_type(&self) -> DocumentType {
        self.kind.doc_type()
    }

    /// Check the document's own arithmetic and shape against its lines.
    ///
    /// Referential existence of long-lived entities (parties, variants) is
    /// the draft layer's guarantee and is not re-checked here.
    pub fn validate_for_posting(
        &self,
        lines: &[DocumentLine],
    ) -> Result<(), DocumentRuleViolation> {
        let doc_type = self.doc_type();
        if doc_type.has_lines() {
            if lines.is_empty() {
                return Err(DocumentRuleViolation::NoLines);
            }
        } else if !lines.is_empty() {
            return Err(DocumentRuleViolation::UnexpectedLines(lines.len()));
        }

        for line in lines {
            if line.quantity <= 0 {
                return Err(DocumentRuleViolation::NonPositiveQuantity(line.id));
            }
            let matches_kind = matches!(
                (&line.detail, doc_type),
                (LineDetail::Purchase { .. }, DocumentType::Purchase)
                    | (LineDetail::Sale { .. }, DocumentType::Sale)
                    | (LineDetail::Return { .. }, DocumentType::SupplierReturn)
                    | (LineDetail::Return { .. }, DocumentType::CustomerReturn)
                    | (LineDetail::Adjustment { .. }, DocumentType::Adjustment)
            );
            if !matches_kind {
                return Err(DocumentRuleViolation::LineKindMismatch(line.id));
            }
            if let Some(unit) = line.unit_amount() {
                if line.discount() > line.quantity.saturating_mul(unit) {
                    return Err(DocumentRuleViolation::DiscountExceedsGross(line.id));
                }
            }
        }

        match &self.kind {
            DocumentKind::Purchase(PurchaseDetails {
                subtotal,
                discount_total,
                delivery_fee,
                total_amount,
                ..
            })
            | DocumentKind::Sale(SaleDetails {
                subtotal,
                discount_total,
                delivery_fee,
                total_amount,
                ..
            }) => {
                if *total_amount != subtotal - discount_total + delivery_fee {
                    return Err(DocumentRuleViolation::TotalMismatch {
                        total: *total_amount,
                        subtotal: *subtotal,
                        discount: *discount_total,
                        delivery: *delivery_fee,
                    });
                }
            }
            DocumentKind::SupplierPayment(d) => {
                if d.amount <= 0 {
                    return Err(DocumentRuleViolation::NonPositiveAmount(d.amount));
                }
                if let Some(bad) = d.allocations.iter().find(|a| a.amount <= 0) {
                    return Err(DocumentRuleViolation::NonPositiveAllocation(bad.amount));
                }
            }
            DocumentKind::CustomerPayment(d) => {
                if d.amount <= 0 {
                    return Err(DocumentRuleViolation::NonPositiveAmount(d.amount));
                }
                if let Some(bad) = d.allocations.iter().find(|a| a.amount <= 0) {
                    return Err(DocumentRuleViolation::NonPositiveAllocation(bad.amount));
                }
            }
            DocumentKind::SupplierReturn(d) => {
                if d.total_amount <= 0 {
                    return Err(DocumentRuleViolation::NonPositiveAmount(d.total_amount));
                }
            }
            DocumentKind::CustomerReturn(d) => {
                if d.total_amount <= 0 {
                    return Err(DocumentRuleViolation::NonPositiveAmount(d.total_amount));
                }
            }
            DocumentKind::InternalTransfer(d) => {
                if d.from_account == d.to_account {
                    return Err(DocumentRuleViolation::SameAccountTransfer);
                }
                if d.amount <= 0 {
                    return Err(DocumentRuleViolation::NonPositiveAmount(d.amount));
                }
            }
            DocumentKind::Adjustment(_) => {}
        }

        Ok(())
    }

    /// Flip the document to `Posted`, recording everything only the posting
    /// engine is allowed to write.
    pub fn flip_to_posted(
        &mut self,
        document_number: String,
        series: i32,
        idempotency_key: String,
        paid_now: i64,
        posted_at: DateTime<Utc>,
    ) {
        self.status = DocumentStatus::Posted;
        self.document_number = Some(document_number);
        self.series = Some(series);
        self.idempotency_key = Some(idempotency_key);
        self.posted_at = Some(posted_at);
        match &mut self.kind {
            DocumentKind::Purchase(d) => d.paid_now = paid_now,
            DocumentKind::Sale(d) => d.paid_now = paid_now,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::AdjustmentDirection;
    use proptest::prelude::*;
    use tradebook_core::{LineId, VariantId};

    fn purchase_doc(total: i64) -> Document {
        Document::draft(
            DocumentId::new(),
            TenantId::new(),
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            DocumentKind::Purchase(PurchaseDetails {
                supplier_id: SupplierId::new(),
                subtotal: 10_000,
                discount_total: 500,
                delivery_fee: 250,
                total_amount: total,
                paid_now: 0,
            }),
        )
    }

    fn purchase_line(doc: &Document, quantity: i64, unit_cost: i64) -> DocumentLine {
        DocumentLine {
            id: LineId::new(),
            document_id: doc.id,
            tenant_id: doc.tenant_id,
            variant_id: VariantId::new(),
            quantity,
            line_total: quantity * unit_cost,
            detail: LineDetail::Purchase {
                unit_cost,
                discount: 0,
                cost_total: quantity * unit_cost,
            },
        }
    }

    #[test]
    fn accepts_consistent_totals() {
        let doc = purchase_doc(9_750);
        let line = purchase_line(&doc, 5, 1_950);
        assert!(doc.validate_for_posting(&[line]).is_ok());
    }

    #[test]
    fn rejects_total_mismatch() {
        let doc = purchase_doc(9_999);
        let line = purchase_line(&doc, 5, 1_950);
        assert!(matches!(
            doc.validate_for_posting(&[line]),
            Err(DocumentRuleViolation::TotalMismatch { .. })
        ));
    }

    #[test]
    fn rejects_zero_quantity() {
        let doc = purchase_doc(9_750);
        let mut line = purchase_line(&doc, 5, 1_950);
        line.quantity = 0;
        assert!(matches!(
            doc.validate_for_posting(&[line]),
            Err(DocumentRuleViolation::NonPositiveQuantity(_))
        ));
    }

    #[test]
    fn rejects_line_of_wrong_kind() {
        let doc = purchase_doc(9_750);
        let mut line = purchase_line(&doc, 5, 1_950);
        line.detail = LineDetail::Sale {
            unit_price: 1_950,
            discount: 0,
            cost_total: 0,
        };
        assert!(matches!(
            doc.validate_for_posting(&[line]),
            Err(DocumentRuleViolation::LineKindMismatch(_))
        ));
    }

    #[test]
    fn rejects_same_account_transfer() {
        let account = AccountId::new();
        let doc = Document::draft(
            DocumentId::new(),
            TenantId::new(),
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            DocumentKind::InternalTransfer(TransferDetails {
                from_account: account,
                to_account: account,
                amount: 5_000,
            }),
        );
        assert_eq!(
            doc.validate_for_posting(&[]),
            Err(DocumentRuleViolation::SameAccountTransfer)
        );
    }

    #[test]
    fn payments_carry_no_lines() {
        let doc = Document::draft(
            DocumentId::new(),
            TenantId::new(),
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            DocumentKind::SupplierPayment(SupplierPaymentDetails {
                supplier_id: SupplierId::new(),
                account_id: AccountId::new(),
                amount: 1_000,
                allocations: vec![],
            }),
        );
        let stray = DocumentLine {
            id: LineId::new(),
            document_id: doc.id,
            tenant_id: doc.tenant_id,
            variant_id: VariantId::new(),
            quantity: 1,
            line_total: 0,
            detail: LineDetail::Adjustment {
                direction: AdjustmentDirection::In,
                unit_cost: 0,
                reason: None,
            },
        };
        assert_eq!(
            doc.validate_for_posting(&[stray]),
            Err(DocumentRuleViolation::UnexpectedLines(1))
        );
    }

    proptest! {
        /// The total invariant accepts exactly the computed total and
        /// rejects every perturbation of it.
        #[test]
        fn total_invariant_is_exact(
            subtotal in 0i64..1_000_000_000i64,
            discount in 0i64..1_000i64,
            delivery in 0i64..1_000i64,
            off_by in 1i64..100i64,
        ) {
            let make = |total: i64| Document::draft(
                DocumentId::new(),
                TenantId::new(),
                NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                DocumentKind::Purchase(PurchaseDetails {
                    supplier_id: SupplierId::new(),
                    subtotal,
                    discount_total: discount,
                    delivery_fee: delivery,
                    total_amount: total,
                    paid_now: 0,
                }),
            );
            let line = DocumentLine {
                id: LineId::new(),
                document_id: DocumentId::new(),
                tenant_id: TenantId::new(),
                variant_id: VariantId::new(),
                quantity: 1,
                line_total: subtotal,
                detail: LineDetail::Purchase {
                    unit_cost: subtotal,
                    discount: 0,
                    cost_total: subtotal,
                },
            };

            let exact = subtotal - discount + delivery;
            prop_assert!(make(exact).validate_for_posting(std::slice::from_ref(&line)).is_ok());
            prop_assert!(
                matches!(
                    make(exact + off_by).validate_for_posting(std::slice::from_ref(&line)),
                    Err(DocumentRuleViolation::TotalMismatch { .. })
                ),
                "expected TotalMismatch"
            );
        }
    }
}
