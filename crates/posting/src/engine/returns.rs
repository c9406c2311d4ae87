//! SUPPLIER_RETURN / CUSTOMER_RETURN posting.
//!
//! Returns are priced at the *original* line's cost (the `unit_cost_at`
//! captured on its inventory movement), not the current average. A supplier
//! return additionally re-blends the average: returning stock removes both
//! quantity and cost from the pool. Cumulative returns against one source
//! line can never exceed its original quantity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use tradebook_core::{CustomerId, EntryId, LineId, PartyRef, SupplierId, TenantId, VariantId};
use tradebook_ledgers::{FinancialEntryType, FinancialLedgerEntry, InventoryMovement, MovementType};
use tradebook_model::{
    CustomerReturnDetails, Document, DocumentKind, DocumentLine, DocumentStatus, LineDetail,
    SupplierReturnDetails,
};
use tradebook_store::PostingTx;

use crate::average::CostPool;
use crate::engine::{flip_and_number, StockGuard};
use crate::error::{PostingError, UnprocessableReason};

/// Which original document kind a return reduces.
#[derive(Debug, Copy, Clone)]
enum ReturnSide {
    Supplier(SupplierId),
    Customer(CustomerId),
}

/// One return line resolved against its source.
struct ResolvedLine {
    line_id: LineId,
    variant_id: VariantId,
    quantity: i64,
    /// The original line's unit cost, from its inventory movement.
    unit_cost: i64,
}

pub(crate) async fn post_supplier<T: PostingTx>(
    tx: &mut T,
    document: &mut Document,
    lines: &[DocumentLine],
    details: &SupplierReturnDetails,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    let resolved = resolve_lines(
        tx,
        document.tenant_id,
        lines,
        ReturnSide::Supplier(details.supplier_id),
    )
    .await?;

    // Returning stock to the supplier moves it out; the on-hand floor holds
    // here exactly as it does for a sale.
    let mut guard = StockGuard::new();
    for r in &resolved {
        guard
            .reserve(tx, document.tenant_id, r.line_id, r.variant_id, r.quantity)
            .await?;
    }
    guard.finish()?;

    // Pre-movement pools for the average adjustment.
    let mut pools: HashMap<VariantId, CostPool> = HashMap::new();
    for r in &resolved {
        if !pools.contains_key(&r.variant_id) {
            let on_hand = tx.on_hand(document.tenant_id, r.variant_id).await?;
            let variant = tx
                .variant(document.tenant_id, r.variant_id)
                .await?
                .ok_or_else(|| PostingError::not_found(format!("variant {}", r.variant_id)))?;
            pools.insert(r.variant_id, CostPool::new(on_hand, variant.avg_cost));
        }
    }

    flip_and_number(tx, document, idempotency_key, 0, now).await?;

    for r in &resolved {
        tx.insert_movement(&InventoryMovement {
            id: EntryId::new(),
            tenant_id: document.tenant_id,
            document_id: document.id,
            line_id: r.line_id,
            variant_id: r.variant_id,
            movement_type: MovementType::SupplierReturnOut,
            quantity: r.quantity,
            unit_cost_at: r.unit_cost,
            occurred_at: now,
        })
        .await?;

        if let Some(pool) = pools.get_mut(&r.variant_id) {
            pool.blend(-r.quantity, r.unit_cost);
        }
    }

    for (variant_id, pool) in &pools {
        tx.set_avg_cost(document.tenant_id, *variant_id, pool.avg_cost)
            .await?;
    }

    tx.insert_financial_entry(&FinancialLedgerEntry {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        entry_type: FinancialEntryType::ApDecrease,
        party: PartyRef::Supplier(details.supplier_id),
        amount: details.total_amount,
        occurred_at: now,
    })
    .await?;

    Ok(())
}

pub(crate) async fn post_customer<T: PostingTx>(
    tx: &mut T,
    document: &mut Document,
    lines: &[DocumentLine],
    details: &CustomerReturnDetails,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    let resolved = resolve_lines(
        tx,
        document.tenant_id,
        lines,
        ReturnSide::Customer(details.customer_id),
    )
    .await?;

    flip_and_number(tx, document, idempotency_key, 0, now).await?;

    for r in &resolved {
        tx.insert_movement(&InventoryMovement {
            id: EntryId::new(),
            tenant_id: document.tenant_id,
            document_id: document.id,
            line_id: r.line_id,
            variant_id: r.variant_id,
            movement_type: MovementType::CustomerReturnIn,
            quantity: r.quantity,
            unit_cost_at: r.unit_cost,
            occurred_at: now,
        })
        .await?;
    }

    tx.insert_financial_entry(&FinancialLedgerEntry {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        entry_type: FinancialEntryType::ArDecrease,
        party: PartyRef::Customer(details.customer_id),
        amount: details.total_amount,
        occurred_at: now,
    })
    .await?;

    Ok(())
}

/// Resolve each return line against its source line, enforcing the return
/// ceiling and the source's kind/party/variant consistency.
async fn resolve_lines<T: PostingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    lines: &[DocumentLine],
    side: ReturnSide,
) -> Result<Vec<ResolvedLine>, PostingError> {
    let mut resolved = Vec::with_capacity(lines.len());

    for line in lines {
        let LineDetail::Return { source_line_id } = line.detail else {
            continue; // excluded by validate_for_posting
        };

        let invalid = |detail: &str| {
            PostingError::Unprocessable(UnprocessableReason::ReturnSourceInvalid {
                line_id: line.id,
                source_line_id,
                detail: detail.to_string(),
            })
        };

        let Some(source) = tx.line(tenant_id, source_line_id).await? else {
            return Err(invalid("source line not found"));
        };
        if source.variant_id != line.variant_id {
            return Err(invalid("source line is for a different variant"));
        }

        let Some(source_doc) = tx.document(tenant_id, source.document_id).await? else {
            return Err(invalid("source document not found"));
        };
        if source_doc.status != DocumentStatus::Posted {
            return Err(invalid("source document is not posted"));
        }
        match (side, &source_doc.kind) {
            (ReturnSide::Supplier(supplier_id), DocumentKind::Purchase(d))
                if d.supplier_id == supplier_id => {}
            (ReturnSide::Customer(customer_id), DocumentKind::Sale(d))
                if d.customer_id == customer_id => {}
            _ => return Err(invalid("source document kind or party does not match")),
        }

        let already_returned = tx.returned_against(tenant_id, source_line_id).await?;
        if already_returned + line.quantity > source.quantity {
            return Err(PostingError::Unprocessable(UnprocessableReason::OverReturn {
                line_id: line.id,
                source_line_id,
                original_quantity: source.quantity,
                already_returned,
                requested: line.quantity,
            }));
        }

        let Some(movement) = tx.movement_for_line(tenant_id, source_line_id).await? else {
            return Err(invalid("source line has no inventory movement"));
        };

        resolved.push(ResolvedLine {
            line_id: line.id,
            variant_id: line.variant_id,
            quantity: line.quantity,
            unit_cost: movement.unit_cost_at,
        });
    }

    Ok(resolved)
}
