//! SUPPLIER_PAYMENT / CUSTOMER_PAYMENT posting.
//!
//! No inventory effect: a payment is one cash leg plus one AP/AR decrease,
//! optionally split across target invoices by caller-supplied allocations.
//! The allocation contract enforced here: the sum must not exceed the
//! payment's amount, each target must be a posted invoice of the same party
//! and tenant, and no allocation may exceed the target's outstanding balance.

use chrono::{DateTime, Utc};

use tradebook_core::{EntryId, PartyRef, TenantId};
use tradebook_ledgers::{
    Allocation, CashDirection, CashEntryType, CashLedgerEntry, FinancialEntryType,
    FinancialLedgerEntry,
};
use tradebook_model::{
    AllocationRequest, CustomerPaymentDetails, Document, DocumentKind, DocumentStatus,
    SupplierPaymentDetails,
};
use tradebook_store::PostingTx;

use crate::engine::{flip_and_number, load_active_account};
use crate::error::{PostingError, UnprocessableReason};

pub(crate) async fn post_supplier<T: PostingTx>(
    tx: &mut T,
    document: &mut Document,
    details: &SupplierPaymentDetails,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    let party = PartyRef::Supplier(details.supplier_id);
    load_active_account(tx, document.tenant_id, details.account_id).await?;
    validate_allocations(tx, document.tenant_id, party, details.amount, &details.allocations)
        .await?;

    flip_and_number(tx, document, idempotency_key, 0, now).await?;

    tx.insert_cash_entry(&CashLedgerEntry {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        account_id: details.account_id,
        entry_type: CashEntryType::MoneyOut,
        direction: CashDirection::Out,
        amount: details.amount,
        counterparty: Some(party),
        transfer_group_id: None,
        occurred_at: now,
    })
    .await?;

    tx.insert_financial_entry(&FinancialLedgerEntry {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        entry_type: FinancialEntryType::ApDecrease,
        party,
        amount: details.amount,
        occurred_at: now,
    })
    .await?;

    write_allocations(tx, document, &details.allocations, now).await
}

pub(crate) async fn post_customer<T: PostingTx>(
    tx: &mut T,
    document: &mut Document,
    details: &CustomerPaymentDetails,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    let party = PartyRef::Customer(details.customer_id);
    load_active_account(tx, document.tenant_id, details.account_id).await?;
    validate_allocations(tx, document.tenant_id, party, details.amount, &details.allocations)
        .await?;

    flip_and_number(tx, document, idempotency_key, 0, now).await?;

    tx.insert_cash_entry(&CashLedgerEntry {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        account_id: details.account_id,
        entry_type: CashEntryType::MoneyIn,
        direction: CashDirection::In,
        amount: details.amount,
        counterparty: Some(party),
        transfer_group_id: None,
        occurred_at: now,
    })
    .await?;

    tx.insert_financial_entry(&FinancialLedgerEntry {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        entry_type: FinancialEntryType::ArDecrease,
        party,
        amount: details.amount,
        occurred_at: now,
    })
    .await?;

    write_allocations(tx, document, &details.allocations, now).await
}

async fn validate_allocations<T: PostingTx>(
    tx: &mut T,
    tenant_id: TenantId,
    party: PartyRef,
    payment_amount: i64,
    allocations: &[AllocationRequest],
) -> Result<(), PostingError> {
    if allocations.is_empty() {
        return Ok(());
    }

    let allocated: i64 = allocations.iter().map(|a| a.amount).sum();
    if allocated > payment_amount {
        return Err(PostingError::Unprocessable(
            UnprocessableReason::AllocationExceedsPayment {
                allocated,
                payment_amount,
            },
        ));
    }

    for request in allocations {
        let invoice_id = request.invoice_id;
        // A tenant-scoped miss covers both absent and cross-tenant targets.
        let Some(invoice) = tx.document(tenant_id, invoice_id).await? else {
            return Err(PostingError::Unprocessable(
                UnprocessableReason::AllocationTargetInvalid { invoice_id },
            ));
        };
        if invoice.status != DocumentStatus::Posted {
            return Err(PostingError::Unprocessable(
                UnprocessableReason::AllocationTargetInvalid { invoice_id },
            ));
        }

        let matches_party = match (&party, &invoice.kind) {
            (PartyRef::Supplier(supplier_id), DocumentKind::Purchase(d)) => {
                d.supplier_id == *supplier_id
            }
            (PartyRef::Customer(customer_id), DocumentKind::Sale(d)) => {
                d.customer_id == *customer_id
            }
            _ => false,
        };
        if !matches_party {
            return Err(PostingError::Unprocessable(
                UnprocessableReason::AllocationPartyMismatch { invoice_id },
            ));
        }

        let outstanding =
            invoice.kind.amount() - tx.allocated_against(tenant_id, invoice_id).await?;
        if request.amount > outstanding {
            return Err(PostingError::Unprocessable(
                UnprocessableReason::AllocationExceedsInvoiceBalance {
                    invoice_id,
                    amount: request.amount,
                    outstanding,
                },
            ));
        }
    }

    Ok(())
}

async fn write_allocations<T: PostingTx>(
    tx: &mut T,
    document: &Document,
    allocations: &[AllocationRequest],
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    for request in allocations {
        tx.insert_allocation(&Allocation {
            id: EntryId::new(),
            tenant_id: document.tenant_id,
            payment_document_id: document.id,
            invoice_document_id: request.invoice_id,
            amount: request.amount,
            occurred_at: now,
        })
        .await?;
    }
    Ok(())
}
