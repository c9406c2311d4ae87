//! PURCHASE posting: stock in at purchase cost, AP up, average recomputed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use tradebook_core::{EntryId, PartyRef, VariantId};
use tradebook_ledgers::{FinancialEntryType, FinancialLedgerEntry, InventoryMovement, MovementType};
use tradebook_model::{Document, DocumentLine, LineDetail, PurchaseDetails};
use tradebook_store::PostingTx;

use crate::average::CostPool;
use crate::engine::{flip_and_number, write_settlement, Settlement};
use crate::error::PostingError;

pub(crate) async fn post<T: PostingTx>(
    tx: &mut T,
    document: &mut Document,
    lines: &[DocumentLine],
    details: &PurchaseDetails,
    settlement: Option<&Settlement>,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    // Pre-movement snapshot per variant, read before any write. This is the
    // basis of the weighted-average recomputation; it must come from the
    // same transaction as the writes below, or a concurrent purchase of the
    // same variant would blend against a stale pool.
    let mut pools: HashMap<VariantId, CostPool> = HashMap::new();
    for line in lines {
        if !pools.contains_key(&line.variant_id) {
            let on_hand = tx.on_hand(document.tenant_id, line.variant_id).await?;
            let variant = tx
                .variant(document.tenant_id, line.variant_id)
                .await?
                .ok_or_else(|| {
                    PostingError::not_found(format!("variant {}", line.variant_id))
                })?;
            pools.insert(line.variant_id, CostPool::new(on_hand, variant.avg_cost));
        }
    }

    let paid_now = settlement.map(|s| s.amount).unwrap_or(0);
    flip_and_number(tx, document, idempotency_key, paid_now, now).await?;

    for line in lines {
        let LineDetail::Purchase { unit_cost, .. } = line.detail else {
            continue; // excluded by validate_for_posting
        };
        tx.insert_movement(&InventoryMovement {
            id: EntryId::new(),
            tenant_id: document.tenant_id,
            document_id: document.id,
            line_id: line.id,
            variant_id: line.variant_id,
            movement_type: MovementType::PurchaseIn,
            quantity: line.quantity,
            unit_cost_at: unit_cost,
            occurred_at: now,
        })
        .await?;

        if let Some(pool) = pools.get_mut(&line.variant_id) {
            pool.blend(line.quantity, unit_cost);
        }
    }

    for (variant_id, pool) in &pools {
        tx.set_avg_cost(document.tenant_id, *variant_id, pool.avg_cost)
            .await?;
    }

    let party = PartyRef::Supplier(details.supplier_id);
    tx.insert_financial_entry(&FinancialLedgerEntry {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        entry_type: FinancialEntryType::ApIncrease,
        party,
        amount: details.total_amount,
        occurred_at: now,
    })
    .await?;

    if let Some(settlement) = settlement {
        write_settlement(tx, document, party, settlement, now).await?;
    }

    Ok(())
}
