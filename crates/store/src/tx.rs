//! The unit-of-work traits the posting engine is generic over.

use async_trait::async_trait;

use tradebook_core::{AccountId, DocumentId, LineId, TenantId, VariantId};
use tradebook_ledgers::{Allocation, CashLedgerEntry, FinancialLedgerEntry, InventoryMovement};
use tradebook_model::{Document, DocumentLine, DocumentType, PaymentAccount, ProductVariant};

use crate::error::StoreError;

/// A transactional ledger store.
///
/// `begin` opens one serializable unit of work; everything the posting engine
/// reads and writes for a single `post` call goes through that one
/// transaction, so the weighted-average snapshot and the writes that follow
/// it observe the same state.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: PostingTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// One open serializable transaction.
///
/// All reads are tenant-scoped: a row owned by another tenant is
/// indistinguishable from an absent row. Dropping an uncommitted transaction
/// aborts it; none of its writes become visible.
#[async_trait]
pub trait PostingTx: Send {
    // -- documents -----------------------------------------------------------

    async fn document(
        &mut self,
        tenant_id: TenantId,
        id: DocumentId,
    ) -> Result<Option<Document>, StoreError>;

    /// Find the document (if any) already holding this idempotency key.
    async fn document_by_idempotency_key(
        &mut self,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Lines of a document, in draft insertion order.
    async fn lines(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<DocumentLine>, StoreError>;

    async fn line(
        &mut self,
        tenant_id: TenantId,
        id: LineId,
    ) -> Result<Option<DocumentLine>, StoreError>;

    /// Write back a mutated document (the status flip and the fields that
    /// come with it). The row must already exist under the same tenant.
    async fn update_document(&mut self, document: &Document) -> Result<(), StoreError>;

    /// Write back a mutated line (e.g. the cost-of-goods capture a sale
    /// posting performs). The row must already exist under the same tenant.
    async fn update_line(&mut self, line: &DocumentLine) -> Result<(), StoreError>;

    /// How many documents of this (tenant, type, series) already carry a
    /// document number. The next sequence is this count plus one.
    async fn numbered_count(
        &mut self,
        tenant_id: TenantId,
        doc_type: DocumentType,
        series: i32,
    ) -> Result<i64, StoreError>;

    // -- catalog -------------------------------------------------------------

    async fn variant(
        &mut self,
        tenant_id: TenantId,
        id: VariantId,
    ) -> Result<Option<ProductVariant>, StoreError>;

    async fn set_avg_cost(
        &mut self,
        tenant_id: TenantId,
        id: VariantId,
        avg_cost: i64,
    ) -> Result<(), StoreError>;

    async fn account(
        &mut self,
        tenant_id: TenantId,
        id: AccountId,
    ) -> Result<Option<PaymentAccount>, StoreError>;

    // -- ledger reads --------------------------------------------------------

    /// On-hand quantity of a variant: signed sum of its movements.
    async fn on_hand(
        &mut self,
        tenant_id: TenantId,
        variant_id: VariantId,
    ) -> Result<i64, StoreError>;

    /// The inventory movement written for a given (source) line, if any.
    async fn movement_for_line(
        &mut self,
        tenant_id: TenantId,
        line_id: LineId,
    ) -> Result<Option<InventoryMovement>, StoreError>;

    /// Total quantity already returned against a source line, summed over
    /// posted return documents only.
    async fn returned_against(
        &mut self,
        tenant_id: TenantId,
        source_line_id: LineId,
    ) -> Result<i64, StoreError>;

    /// Total already allocated against an invoice document.
    async fn allocated_against(
        &mut self,
        tenant_id: TenantId,
        invoice_id: DocumentId,
    ) -> Result<i64, StoreError>;

    // -- ledger writes -------------------------------------------------------

    async fn insert_movement(&mut self, movement: &InventoryMovement) -> Result<(), StoreError>;

    async fn insert_financial_entry(
        &mut self,
        entry: &FinancialLedgerEntry,
    ) -> Result<(), StoreError>;

    async fn insert_cash_entry(&mut self, entry: &CashLedgerEntry) -> Result<(), StoreError>;

    async fn insert_allocation(&mut self, allocation: &Allocation) -> Result<(), StoreError>;

    // -- hydration reads (for the posted result) -----------------------------

    async fn movements_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<InventoryMovement>, StoreError>;

    async fn financial_entries_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<FinancialLedgerEntry>, StoreError>;

    async fn cash_entries_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<CashLedgerEntry>, StoreError>;

    /// Allocations written *by* this document (as the paying side).
    async fn allocations_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<Allocation>, StoreError>;

    // -- lifecycle -----------------------------------------------------------

    /// Commit the unit of work. Consumes the transaction; a serialization
    /// failure detected at commit surfaces as [`StoreError::Serialization`].
    async fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;
}
