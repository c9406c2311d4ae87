//! The posting engine entry contract.
//!
//! `post` is the single write boundary of the system: everything it does for
//! one document happens inside one serializable store transaction, so either
//! the document flips to `Posted` together with every ledger row it implies,
//! or nothing becomes visible at all.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::instrument;

use tradebook_core::{AccountId, DocumentId, EntryId, LineId, PartyRef, TenantId, VariantId};
use tradebook_ledgers::{
    Allocation, CashDirection, CashEntryType, CashLedgerEntry, FinancialEntryType,
    FinancialLedgerEntry, InventoryMovement,
};
use tradebook_model::{Document, DocumentKind, DocumentLine, DocumentStatus, PaymentAccount};
use tradebook_store::{LedgerStore, PostingTx, StoreError};

use crate::error::{PostingError, StockShortfall, UnprocessableReason};
use crate::number::format_document_number;

mod adjustment;
mod payment;
mod purchase;
mod returns;
mod sale;
mod transfer;

/// One posting request.
///
/// The idempotency key is required and opaque; a retried request must carry
/// the same key. The settlement pair is only meaningful for purchases and
/// sales (`paid_now`/`received_now`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    pub document_id: DocumentId,
    pub idempotency_key: String,
    pub settlement_amount: Option<i64>,
    pub settlement_account_id: Option<AccountId>,
}

impl PostRequest {
    pub fn new(document_id: DocumentId, idempotency_key: impl Into<String>) -> Self {
        Self {
            document_id,
            idempotency_key: idempotency_key.into(),
            settlement_amount: None,
            settlement_account_id: None,
        }
    }

    pub fn with_settlement(mut self, amount: i64, account_id: AccountId) -> Self {
        self.settlement_amount = Some(amount);
        self.settlement_account_id = Some(account_id);
        self
    }
}

/// The fully hydrated result of a successful (or replayed) posting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostedDocument {
    pub document: Document,
    pub lines: Vec<DocumentLine>,
    pub movements: Vec<InventoryMovement>,
    pub financial_entries: Vec<FinancialLedgerEntry>,
    pub cash_entries: Vec<CashLedgerEntry>,
    pub allocations: Vec<Allocation>,
}

/// The posting engine. Cheap to clone if the store is.
#[derive(Debug, Clone)]
pub struct PostingEngine<S> {
    store: S,
}

impl<S: LedgerStore> PostingEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Post one draft document.
    ///
    /// Runs the whole entry contract inside one serializable unit of work.
    /// A replay with the document's own idempotency key returns the
    /// existing posted result without writing anything.
    #[instrument(
        skip(self, request),
        fields(
            tenant_id = %tenant_id,
            document_id = %request.document_id,
        ),
        err
    )]
    pub async fn post(
        &self,
        tenant_id: TenantId,
        request: PostRequest,
    ) -> Result<PostedDocument, PostingError> {
        let mut tx = self.store.begin().await?;
        match post_in_tx(&mut tx, tenant_id, &request).await {
            Ok(posted) => {
                tx.commit().await?;
                Ok(posted)
            }
            // Dropping the transaction aborts it; no partial writes remain.
            Err(e) => Err(e),
        }
    }

    /// Post with bounded retries on serialization conflicts.
    ///
    /// Retries re-submit the *same* request (same idempotency key), so a
    /// retry that lands after a competing commit resolves to either an
    /// idempotent replay or a typed conflict, never a double posting.
    pub async fn post_with_retry(
        &self,
        tenant_id: TenantId,
        request: PostRequest,
        max_attempts: u32,
    ) -> Result<PostedDocument, PostingError> {
        let max_attempts = max_attempts.max(1);
        let mut attempt: u32 = 1;
        loop {
            match self.post(tenant_id, request.clone()).await {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(attempt, "serialization conflict, retrying posting");
                    tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt))).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

async fn post_in_tx<T: PostingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    request: &PostRequest,
) -> Result<PostedDocument, PostingError> {
    if request.idempotency_key.trim().is_empty() {
        return Err(PostingError::invalid_argument(
            "idempotency key must not be empty",
        ));
    }

    let Some(mut document) = tx.document(tenant_id, request.document_id).await? else {
        return Err(PostingError::not_found(format!(
            "document {}",
            request.document_id
        )));
    };

    match document.status {
        DocumentStatus::Posted => {
            return if document.idempotency_key.as_deref() == Some(request.idempotency_key.as_str())
            {
                // Idempotent replay: same key, same result, zero new rows.
                hydrate(tx, tenant_id, document).await
            } else {
                Err(PostingError::conflict(
                    "document already posted under a different idempotency key",
                ))
            };
        }
        DocumentStatus::Draft => {}
    }

    if let Some(holder) = tx
        .document_by_idempotency_key(tenant_id, &request.idempotency_key)
        .await?
    {
        if holder.id != document.id {
            return Err(PostingError::conflict(format!(
                "idempotency key already used by document {}",
                holder.id
            )));
        }
    }

    let lines = tx.lines(tenant_id, document.id).await?;
    document
        .validate_for_posting(&lines)
        .map_err(|v| PostingError::InvalidArgument(v.to_string()))?;

    let settlement = resolve_settlement(tx, tenant_id, &document, request).await?;
    let now = Utc::now();
    let key = request.idempotency_key.as_str();

    match document.kind.clone() {
        DocumentKind::Purchase(details) => {
            purchase::post(tx, &mut document, &lines, &details, settlement.as_ref(), key, now)
                .await?;
        }
        DocumentKind::Sale(details) => {
            sale::post(tx, &mut document, &lines, &details, settlement.as_ref(), key, now).await?;
        }
        DocumentKind::SupplierPayment(details) => {
            payment::post_supplier(tx, &mut document, &details, key, now).await?;
        }
        DocumentKind::CustomerPayment(details) => {
            payment::post_customer(tx, &mut document, &details, key, now).await?;
        }
        DocumentKind::SupplierReturn(details) => {
            returns::post_supplier(tx, &mut document, &lines, &details, key, now).await?;
        }
        DocumentKind::CustomerReturn(details) => {
            returns::post_customer(tx, &mut document, &lines, &details, key, now).await?;
        }
        DocumentKind::InternalTransfer(details) => {
            transfer::post(tx, &mut document, &details, key, now).await?;
        }
        DocumentKind::Adjustment(_) => {
            adjustment::post(tx, &mut document, &lines, key, now).await?;
        }
    }

    hydrate(tx, tenant_id, document).await
}

/// A validated settlement: positive amount against an existing active account.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Settlement {
    pub amount: i64,
    pub account_id: AccountId,
}

async fn resolve_settlement<T: PostingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    document: &Document,
    request: &PostRequest,
) -> Result<Option<Settlement>, PostingError> {
    let amount = match request.settlement_amount {
        None | Some(0) => return Ok(None),
        Some(a) if a < 0 => {
            return Err(PostingError::invalid_argument(
                "settlement amount cannot be negative",
            ));
        }
        Some(a) => a,
    };

    let total = match &document.kind {
        DocumentKind::Purchase(d) => d.total_amount,
        DocumentKind::Sale(d) => d.total_amount,
        _ => {
            return Err(PostingError::invalid_argument(
                "settlement is only valid when posting a purchase or sale",
            ));
        }
    };

    let Some(account_id) = request.settlement_account_id else {
        return Err(PostingError::invalid_argument(
            "settlement amount requires a payment account",
        ));
    };
    if amount > total {
        return Err(PostingError::invalid_argument(format!(
            "settlement {amount} exceeds document total {total}"
        )));
    }

    load_active_account(tx, tenant_id, account_id).await?;
    Ok(Some(Settlement { amount, account_id }))
}

/// Load a payment account, requiring it to exist in the tenant and be active.
pub(crate) async fn load_active_account<T: PostingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    account_id: AccountId,
) -> Result<PaymentAccount, PostingError> {
    let Some(account) = tx.account(tenant_id, account_id).await? else {
        return Err(PostingError::not_found(format!(
            "payment account {account_id}"
        )));
    };
    if !account.active {
        return Err(PostingError::Unprocessable(
            UnprocessableReason::InactiveAccount { account_id },
        ));
    }
    Ok(account)
}

/// Assign the document number and flip to `Posted`, inside the transaction.
///
/// Sequence = count of already-numbered documents of the (tenant, type,
/// year) series plus one. The serializable isolation level is what prevents
/// two concurrent postings from computing the same sequence.
pub(crate) async fn flip_and_number<T: PostingTx>(
    tx: &mut T,
    document: &mut Document,
    idempotency_key: &str,
    paid_now: i64,
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    let series = document.transaction_date.year();
    let sequence = tx
        .numbered_count(document.tenant_id, document.doc_type(), series)
        .await?
        + 1;
    let number = format_document_number(document.doc_type(), series, sequence);
    document.flip_to_posted(number, series, idempotency_key.to_owned(), paid_now, now);
    tx.update_document(document).await?;
    Ok(())
}

/// Write the cash leg, the balance decrease, and the self-settlement
/// allocation for a purchase/sale settled (partially) at posting time.
pub(crate) async fn write_settlement<T: PostingTx>(
    tx: &mut T,
    document: &Document,
    party: PartyRef,
    settlement: &Settlement,
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    let (cash_type, direction, entry_type) = match party {
        PartyRef::Supplier(_) => (
            CashEntryType::MoneyOut,
            CashDirection::Out,
            FinancialEntryType::ApDecrease,
        ),
        PartyRef::Customer(_) => (
            CashEntryType::MoneyIn,
            CashDirection::In,
            FinancialEntryType::ArDecrease,
        ),
    };

    tx.insert_cash_entry(&CashLedgerEntry {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        account_id: settlement.account_id,
        entry_type: cash_type,
        direction,
        amount: settlement.amount,
        counterparty: Some(party),
        transfer_group_id: None,
        occurred_at: now,
    })
    .await?;

    tx.insert_financial_entry(&FinancialLedgerEntry {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        entry_type,
        party,
        amount: settlement.amount,
        occurred_at: now,
    })
    .await?;

    // Self-settlement: the payment document and the invoice are the same row.
    tx.insert_allocation(&Allocation {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        payment_document_id: document.id,
        invoice_document_id: document.id,
        amount: settlement.amount,
        occurred_at: now,
    })
    .await?;

    Ok(())
}

/// Running stock reservation for one document's check pass.
///
/// Collects every failing line instead of stopping at the first, and makes
/// later lines of the same document see earlier lines' reservations, so two
/// lines cannot both claim the same units.
pub(crate) struct StockGuard {
    available: HashMap<VariantId, i64>,
    shortfalls: Vec<StockShortfall>,
}

impl StockGuard {
    pub(crate) fn new() -> Self {
        Self {
            available: HashMap::new(),
            shortfalls: Vec::new(),
        }
    }

    async fn load<T: PostingTx>(
        &mut self,
        tx: &mut T,
        tenant_id: TenantId,
        variant_id: VariantId,
    ) -> Result<(), StoreError> {
        if !self.available.contains_key(&variant_id) {
            let on_hand = tx.on_hand(tenant_id, variant_id).await?;
            self.available.insert(variant_id, on_hand);
        }
        Ok(())
    }

    pub(crate) async fn reserve<T: PostingTx>(
        &mut self,
        tx: &mut T,
        tenant_id: TenantId,
        line_id: LineId,
        variant_id: VariantId,
        quantity: i64,
    ) -> Result<(), StoreError> {
        self.load(tx, tenant_id, variant_id).await?;
        let available = self.available.entry(variant_id).or_insert(0);
        if *available < quantity {
            self.shortfalls.push(StockShortfall {
                line_id,
                variant_id,
                available: *available,
                required: quantity,
            });
        } else {
            *available -= quantity;
        }
        Ok(())
    }

    pub(crate) async fn credit<T: PostingTx>(
        &mut self,
        tx: &mut T,
        tenant_id: TenantId,
        variant_id: VariantId,
        quantity: i64,
    ) -> Result<(), StoreError> {
        self.load(tx, tenant_id, variant_id).await?;
        *self.available.entry(variant_id).or_insert(0) += quantity;
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<(), PostingError> {
        if self.shortfalls.is_empty() {
            Ok(())
        } else {
            Err(PostingError::Unprocessable(
                UnprocessableReason::InsufficientStock {
                    shortfalls: self.shortfalls,
                },
            ))
        }
    }
}

async fn hydrate<T: PostingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    document: Document,
) -> Result<PostedDocument, PostingError> {
    let lines = tx.lines(tenant_id, document.id).await?;
    let movements = tx.movements_for_document(tenant_id, document.id).await?;
    let financial_entries = tx
        .financial_entries_for_document(tenant_id, document.id)
        .await?;
    let cash_entries = tx.cash_entries_for_document(tenant_id, document.id).await?;
    let allocations = tx.allocations_for_document(tenant_id, document.id).await?;
    Ok(PostedDocument {
        document,
        lines,
        movements,
        financial_entries,
        cash_entries,
        allocations,
    })
}
