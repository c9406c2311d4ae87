//! In-memory ledger store.
//!
//! Intended for tests, local development, and the api's in-memory mode.
//!
//! Isolation model: `begin` takes an exclusive async lock on the whole store
//! state and holds it until the transaction commits or drops. One open
//! transaction at a time means every unit of work is strictly serializable
//! by construction. Abort is exact: the transaction keeps an undo snapshot
//! taken at `begin` and restores it on drop unless committed.
//!
//! The store also exposes the draft-layer seam (`seed_*`) and the read-only
//! reporting seam (`stock_on_hand`, `balance_of_*`, `*_of`); neither touches
//! the posting unit of work.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use tradebook_core::{AccountId, DocumentId, LineId, PartyRef, TenantId, VariantId};
use tradebook_ledgers::{
    account_balance, on_hand, party_balance, Allocation, CashLedgerEntry, FinancialLedgerEntry,
    InventoryMovement,
};
use tradebook_model::{
    Document, DocumentLine, DocumentStatus, DocumentType, LineDetail, PaymentAccount,
    ProductVariant,
};

use crate::error::StoreError;
use crate::tx::{LedgerStore, PostingTx};

#[derive(Debug, Default, Clone)]
struct MemState {
    documents: HashMap<DocumentId, Document>,
    lines: Vec<DocumentLine>,
    variants: HashMap<VariantId, ProductVariant>,
    accounts: HashMap<AccountId, PaymentAccount>,
    movements: Vec<InventoryMovement>,
    financial_entries: Vec<FinancialLedgerEntry>,
    cash_entries: Vec<CashLedgerEntry>,
    allocations: Vec<Allocation>,
}

impl MemState {
    fn document_scoped(&self, tenant_id: TenantId, id: DocumentId) -> Option<&Document> {
        self.documents.get(&id).filter(|d| d.tenant_id == tenant_id)
    }

    /// Ledger rows may only reference an already-posted document of the same
    /// tenant; this is the single write boundary the invariant is checked at.
    fn check_ledger_target(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<(), StoreError> {
        match self.documents.get(&document_id) {
            None => Err(StoreError::backend(format!(
                "ledger row references unknown document {document_id}"
            ))),
            Some(d) if d.tenant_id != tenant_id => Err(StoreError::TenantIsolation(format!(
                "ledger row tenant does not match document {document_id}"
            ))),
            Some(d) if d.status != DocumentStatus::Posted => Err(StoreError::backend(format!(
                "ledger row references draft document {document_id}"
            ))),
            Some(_) => Ok(()),
        }
    }
}

/// In-memory, strictly serializable ledger store.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<MemState>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- draft-layer seam ----------------------------------------------------

    pub async fn seed_document(&self, document: Document) {
        self.state
            .lock()
            .await
            .documents
            .insert(document.id, document);
    }

    pub async fn seed_line(&self, line: DocumentLine) {
        self.state.lock().await.lines.push(line);
    }

    pub async fn seed_variant(&self, variant: ProductVariant) {
        self.state.lock().await.variants.insert(variant.id, variant);
    }

    pub async fn seed_account(&self, account: PaymentAccount) {
        self.state.lock().await.accounts.insert(account.id, account);
    }

    // -- read-only reporting seam -------------------------------------------

    pub async fn get_document(&self, tenant_id: TenantId, id: DocumentId) -> Option<Document> {
        self.state
            .lock()
            .await
            .document_scoped(tenant_id, id)
            .cloned()
    }

    pub async fn get_variant(&self, tenant_id: TenantId, id: VariantId) -> Option<ProductVariant> {
        self.state
            .lock()
            .await
            .variants
            .get(&id)
            .filter(|v| v.tenant_id == tenant_id)
            .cloned()
    }

    pub async fn get_account(&self, tenant_id: TenantId, id: AccountId) -> Option<PaymentAccount> {
        self.state
            .lock()
            .await
            .accounts
            .get(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
    }

    pub async fn stock_on_hand(&self, tenant_id: TenantId, variant_id: VariantId) -> i64 {
        let state = self.state.lock().await;
        on_hand(
            state
                .movements
                .iter()
                .filter(|m| m.tenant_id == tenant_id && m.variant_id == variant_id),
        )
    }

    pub async fn balance_of_account(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Option<i64> {
        let state = self.state.lock().await;
        let account = state
            .accounts
            .get(&account_id)
            .filter(|a| a.tenant_id == tenant_id)?;
        Some(account_balance(
            account_id,
            account.opening_balance,
            state.cash_entries.iter().filter(|e| e.tenant_id == tenant_id),
        ))
    }

    pub async fn balance_of_party(&self, tenant_id: TenantId, party: PartyRef) -> i64 {
        let state = self.state.lock().await;
        party_balance(
            party,
            state
                .financial_entries
                .iter()
                .filter(|e| e.tenant_id == tenant_id),
        )
    }

    pub async fn movements_of(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Vec<InventoryMovement> {
        let state = self.state.lock().await;
        state
            .movements
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.document_id == document_id)
            .cloned()
            .collect()
    }

    pub async fn financial_entries_of(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Vec<FinancialLedgerEntry> {
        let state = self.state.lock().await;
        state
            .financial_entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.document_id == document_id)
            .cloned()
            .collect()
    }

    pub async fn cash_entries_of(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Vec<CashLedgerEntry> {
        let state = self.state.lock().await;
        state
            .cash_entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.document_id == document_id)
            .cloned()
            .collect()
    }

    pub async fn allocations_of(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Vec<Allocation> {
        let state = self.state.lock().await;
        state
            .allocations
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.payment_document_id == document_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemStore {
    type Tx = MemTx;

    async fn begin(&self) -> Result<MemTx, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let undo = guard.clone();
        Ok(MemTx {
            guard,
            undo: Some(undo),
        })
    }
}

/// One open transaction against a [`MemStore`].
///
/// Holds the store lock for its lifetime; restores the undo snapshot on drop
/// unless committed.
pub struct MemTx {
    guard: OwnedMutexGuard<MemState>,
    undo: Option<MemState>,
}

impl Drop for MemTx {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            *self.guard = undo;
        }
    }
}

#[async_trait]
impl PostingTx for MemTx {
    async fn document(
        &mut self,
        tenant_id: TenantId,
        id: DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.guard.document_scoped(tenant_id, id).cloned())
    }

    async fn document_by_idempotency_key(
        &mut self,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .guard
            .documents
            .values()
            .find(|d| d.tenant_id == tenant_id && d.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn lines(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<DocumentLine>, StoreError> {
        Ok(self
            .guard
            .lines
            .iter()
            .filter(|l| l.tenant_id == tenant_id && l.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn line(
        &mut self,
        tenant_id: TenantId,
        id: LineId,
    ) -> Result<Option<DocumentLine>, StoreError> {
        Ok(self
            .guard
            .lines
            .iter()
            .find(|l| l.tenant_id == tenant_id && l.id == id)
            .cloned())
    }

    async fn update_document(&mut self, document: &Document) -> Result<(), StoreError> {
        let Some(existing) = self.guard.documents.get(&document.id) else {
            return Err(StoreError::backend(format!(
                "update of unknown document {}",
                document.id
            )));
        };
        if existing.tenant_id != document.tenant_id {
            return Err(StoreError::TenantIsolation(format!(
                "update of document {} crosses tenants",
                document.id
            )));
        }
        self.guard.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn update_line(&mut self, line: &DocumentLine) -> Result<(), StoreError> {
        match self
            .guard
            .lines
            .iter_mut()
            .find(|l| l.id == line.id)
        {
            None => Err(StoreError::backend(format!(
                "update of unknown line {}",
                line.id
            ))),
            Some(existing) if existing.tenant_id != line.tenant_id => {
                Err(StoreError::TenantIsolation(format!(
                    "update of line {} crosses tenants",
                    line.id
                )))
            }
            Some(existing) => {
                *existing = line.clone();
                Ok(())
            }
        }
    }

    async fn numbered_count(
        &mut self,
        tenant_id: TenantId,
        doc_type: DocumentType,
        series: i32,
    ) -> Result<i64, StoreError> {
        Ok(self
            .guard
            .documents
            .values()
            .filter(|d| {
                d.tenant_id == tenant_id
                    && d.doc_type() == doc_type
                    && d.series == Some(series)
                    && d.document_number.is_some()
            })
            .count() as i64)
    }

    async fn variant(
        &mut self,
        tenant_id: TenantId,
        id: VariantId,
    ) -> Result<Option<ProductVariant>, StoreError> {
        Ok(self
            .guard
            .variants
            .get(&id)
            .filter(|v| v.tenant_id == tenant_id)
            .cloned())
    }

    async fn set_avg_cost(
        &mut self,
        tenant_id: TenantId,
        id: VariantId,
        avg_cost: i64,
    ) -> Result<(), StoreError> {
        match self.guard.variants.get_mut(&id) {
            Some(v) if v.tenant_id == tenant_id => {
                v.avg_cost = avg_cost;
                Ok(())
            }
            Some(_) => Err(StoreError::TenantIsolation(format!(
                "avg_cost write on variant {id} crosses tenants"
            ))),
            None => Err(StoreError::backend(format!(
                "avg_cost write on unknown variant {id}"
            ))),
        }
    }

    async fn account(
        &mut self,
        tenant_id: TenantId,
        id: AccountId,
    ) -> Result<Option<PaymentAccount>, StoreError> {
        Ok(self
            .guard
            .accounts
            .get(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned())
    }

    async fn on_hand(
        &mut self,
        tenant_id: TenantId,
        variant_id: VariantId,
    ) -> Result<i64, StoreError> {
        Ok(on_hand(self.guard.movements.iter().filter(|m| {
            m.tenant_id == tenant_id && m.variant_id == variant_id
        })))
    }

    async fn movement_for_line(
        &mut self,
        tenant_id: TenantId,
        line_id: LineId,
    ) -> Result<Option<InventoryMovement>, StoreError> {
        Ok(self
            .guard
            .movements
            .iter()
            .find(|m| m.tenant_id == tenant_id && m.line_id == line_id)
            .cloned())
    }

    async fn returned_against(
        &mut self,
        tenant_id: TenantId,
        source_line_id: LineId,
    ) -> Result<i64, StoreError> {
        let state = &*self.guard;
        Ok(state
            .lines
            .iter()
            .filter(|l| {
                l.tenant_id == tenant_id
                    && matches!(
                        &l.detail,
                        LineDetail::Return { source_line_id: src } if *src == source_line_id
                    )
                    && state
                        .documents
                        .get(&l.document_id)
                        .is_some_and(|d| d.status == DocumentStatus::Posted)
            })
            .map(|l| l.quantity)
            .sum())
    }

    async fn allocated_against(
        &mut self,
        tenant_id: TenantId,
        invoice_id: DocumentId,
    ) -> Result<i64, StoreError> {
        Ok(self
            .guard
            .allocations
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.invoice_document_id == invoice_id)
            .map(|a| a.amount)
            .sum())
    }

    async fn insert_movement(&mut self, movement: &InventoryMovement) -> Result<(), StoreError> {
        self.guard
            .check_ledger_target(movement.tenant_id, movement.document_id)?;
        self.guard.movements.push(movement.clone());
        Ok(())
    }

    async fn insert_financial_entry(
        &mut self,
        entry: &FinancialLedgerEntry,
    ) -> Result<(), StoreError> {
        self.guard
            .check_ledger_target(entry.tenant_id, entry.document_id)?;
        self.guard.financial_entries.push(entry.clone());
        Ok(())
    }

    async fn insert_cash_entry(&mut self, entry: &CashLedgerEntry) -> Result<(), StoreError> {
        self.guard
            .check_ledger_target(entry.tenant_id, entry.document_id)?;
        self.guard.cash_entries.push(entry.clone());
        Ok(())
    }

    async fn insert_allocation(&mut self, allocation: &Allocation) -> Result<(), StoreError> {
        self.guard
            .check_ledger_target(allocation.tenant_id, allocation.payment_document_id)?;
        self.guard.allocations.push(allocation.clone());
        Ok(())
    }

    async fn movements_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        Ok(self
            .guard
            .movements
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn financial_entries_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<FinancialLedgerEntry>, StoreError> {
        Ok(self
            .guard
            .financial_entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn cash_entries_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<CashLedgerEntry>, StoreError> {
        Ok(self
            .guard
            .cash_entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn allocations_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<Allocation>, StoreError> {
        Ok(self
            .guard
            .allocations
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.payment_document_id == document_id)
            .cloned()
            .collect())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.undo = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use tradebook_core::EntryId;
    use tradebook_ledgers::MovementType;
    use tradebook_model::{AdjustmentDetails, DocumentKind};

    fn adjustment_doc(tenant_id: TenantId) -> Document {
        let mut doc = Document::draft(
            DocumentId::new(),
            tenant_id,
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            DocumentKind::Adjustment(AdjustmentDetails { reason: None }),
        );
        doc.flip_to_posted("ADJ-2026-0001".into(), 2026, "key".into(), 0, Utc::now());
        doc
    }

    fn movement(doc: &Document, variant_id: VariantId, quantity: i64) -> InventoryMovement {
        InventoryMovement {
            id: EntryId::new(),
            tenant_id: doc.tenant_id,
            document_id: doc.id,
            line_id: LineId::new(),
            variant_id,
            movement_type: MovementType::AdjustmentIn,
            quantity,
            unit_cost_at: 0,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemStore::new();
        let tenant_id = TenantId::new();
        let variant_id = VariantId::new();
        let doc = adjustment_doc(tenant_id);
        store.seed_document(doc.clone()).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_movement(&movement(&doc, variant_id, 10))
                .await
                .unwrap();
            // dropped without commit
        }

        assert_eq!(store.stock_on_hand(tenant_id, variant_id).await, 0);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemStore::new();
        let tenant_id = TenantId::new();
        let variant_id = VariantId::new();
        let doc = adjustment_doc(tenant_id);
        store.seed_document(doc.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_movement(&movement(&doc, variant_id, 10))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.stock_on_hand(tenant_id, variant_id).await, 10);
    }

    #[tokio::test]
    async fn ledger_write_against_draft_document_is_rejected() {
        let store = MemStore::new();
        let tenant_id = TenantId::new();
        let draft = Document::draft(
            DocumentId::new(),
            tenant_id,
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            DocumentKind::Adjustment(AdjustmentDetails { reason: None }),
        );
        store.seed_document(draft.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_movement(&movement(&draft, VariantId::new(), 5))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn reads_are_tenant_scoped() {
        let store = MemStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let doc = adjustment_doc(tenant_a);
        store.seed_document(doc.clone()).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.document(tenant_b, doc.id).await.unwrap().is_none());
        assert!(tx.document(tenant_a, doc.id).await.unwrap().is_some());
    }
}
