//! End-to-end posting engine tests against the in-memory store.

use chrono::NaiveDate;

use tradebook_core::{
    AccountId, CustomerId, DocumentId, LineId, PartyRef, SupplierId, TenantId, VariantId,
};
use tradebook_ledgers::{CashDirection, CashEntryType, FinancialEntryType, MovementType};
use tradebook_model::{
    AdjustmentDetails, AdjustmentDirection, AllocationRequest, CustomerPaymentDetails,
    CustomerReturnDetails, Document, DocumentKind, DocumentLine, DocumentStatus, LineDetail,
    PaymentAccount, ProductVariant, PurchaseDetails, SaleDetails, SupplierPaymentDetails,
    SupplierReturnDetails, TransferDetails,
};
use tradebook_posting::{PostRequest, PostingEngine, PostingError, UnprocessableReason};
use tradebook_store::MemStore;

struct Fixture {
    engine: PostingEngine<MemStore>,
    tenant_id: TenantId,
    supplier_id: SupplierId,
    customer_id: CustomerId,
    account_id: AccountId,
    variant_id: VariantId,
}

impl Fixture {
    fn store(&self) -> &MemStore {
        self.engine.store()
    }
}

async fn fixture() -> Fixture {
    let store = MemStore::new();
    let tenant_id = TenantId::new();
    let variant_id = VariantId::new();
    let account_id = AccountId::new();

    store
        .seed_variant(ProductVariant {
            id: variant_id,
            tenant_id,
            sku: "SKU-0001".into(),
            name: "Widget".into(),
            avg_cost: 0,
        })
        .await;
    store
        .seed_account(PaymentAccount {
            id: account_id,
            tenant_id,
            name: "Main till".into(),
            active: true,
            opening_balance: 0,
        })
        .await;

    Fixture {
        engine: PostingEngine::new(store),
        tenant_id,
        supplier_id: SupplierId::new(),
        customer_id: CustomerId::new(),
        account_id,
        variant_id,
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 20).unwrap()
}

async fn seed_variant(fx: &Fixture) -> VariantId {
    let variant_id = VariantId::new();
    fx.store()
        .seed_variant(ProductVariant {
            id: variant_id,
            tenant_id: fx.tenant_id,
            sku: format!("SKU-{variant_id}"),
            name: "Extra widget".into(),
            avg_cost: 0,
        })
        .await;
    variant_id
}

/// Seed a purchase draft; one line per `(variant, quantity, unit_cost)`.
async fn seed_purchase(fx: &Fixture, batches: &[(VariantId, i64, i64)]) -> (DocumentId, Vec<LineId>) {
    let subtotal: i64 = batches.iter().map(|(_, q, c)| q * c).sum();
    let doc = Document::draft(
        DocumentId::new(),
        fx.tenant_id,
        date(),
        DocumentKind::Purchase(PurchaseDetails {
            supplier_id: fx.supplier_id,
            subtotal,
            discount_total: 0,
            delivery_fee: 0,
            total_amount: subtotal,
            paid_now: 0,
        }),
    );
    fx.store().seed_document(doc.clone()).await;

    let mut line_ids = Vec::new();
    for (variant_id, quantity, unit_cost) in batches {
        let line = DocumentLine {
            id: LineId::new(),
            document_id: doc.id,
            tenant_id: fx.tenant_id,
            variant_id: *variant_id,
            quantity: *quantity,
            line_total: quantity * unit_cost,
            detail: LineDetail::Purchase {
                unit_cost: *unit_cost,
                discount: 0,
                cost_total: quantity * unit_cost,
            },
        };
        line_ids.push(line.id);
        fx.store().seed_line(line).await;
    }
    (doc.id, line_ids)
}

/// Seed a sale draft; one line per `(variant, quantity, unit_price)`.
async fn seed_sale(fx: &Fixture, items: &[(VariantId, i64, i64)]) -> (DocumentId, Vec<LineId>) {
    let subtotal: i64 = items.iter().map(|(_, q, p)| q * p).sum();
    let doc = Document::draft(
        DocumentId::new(),
        fx.tenant_id,
        date(),
        DocumentKind::Sale(SaleDetails {
            customer_id: fx.customer_id,
            subtotal,
            discount_total: 0,
            delivery_fee: 0,
            total_amount: subtotal,
            paid_now: 0,
        }),
    );
    fx.store().seed_document(doc.clone()).await;

    let mut line_ids = Vec::new();
    for (variant_id, quantity, unit_price) in items {
        let line = DocumentLine {
            id: LineId::new(),
            document_id: doc.id,
            tenant_id: fx.tenant_id,
            variant_id: *variant_id,
            quantity: *quantity,
            line_total: quantity * unit_price,
            detail: LineDetail::Sale {
                unit_price: *unit_price,
                discount: 0,
                cost_total: 0,
            },
        };
        line_ids.push(line.id);
        fx.store().seed_line(line).await;
    }
    (doc.id, line_ids)
}

async fn seed_supplier_return(
    fx: &Fixture,
    returns: &[(VariantId, LineId, i64)],
    total_amount: i64,
) -> DocumentId {
    let doc = Document::draft(
        DocumentId::new(),
        fx.tenant_id,
        date(),
        DocumentKind::SupplierReturn(SupplierReturnDetails {
            supplier_id: fx.supplier_id,
            total_amount,
        }),
    );
    fx.store().seed_document(doc.clone()).await;
    for (variant_id, source_line_id, quantity) in returns {
        fx.store()
            .seed_line(DocumentLine {
                id: LineId::new(),
                document_id: doc.id,
                tenant_id: fx.tenant_id,
                variant_id: *variant_id,
                quantity: *quantity,
                line_total: 0,
                detail: LineDetail::Return {
                    source_line_id: *source_line_id,
                },
            })
            .await;
    }
    doc.id
}

async fn seed_customer_return(
    fx: &Fixture,
    returns: &[(VariantId, LineId, i64)],
    total_amount: i64,
) -> DocumentId {
    let doc = Document::draft(
        DocumentId::new(),
        fx.tenant_id,
        date(),
        DocumentKind::CustomerReturn(CustomerReturnDetails {
            customer_id: fx.customer_id,
            total_amount,
        }),
    );
    fx.store().seed_document(doc.clone()).await;
    for (variant_id, source_line_id, quantity) in returns {
        fx.store()
            .seed_line(DocumentLine {
                id: LineId::new(),
                document_id: doc.id,
                tenant_id: fx.tenant_id,
                variant_id: *variant_id,
                quantity: *quantity,
                line_total: 0,
                detail: LineDetail::Return {
                    source_line_id: *source_line_id,
                },
            })
            .await;
    }
    doc.id
}

async fn seed_supplier_payment(
    fx: &Fixture,
    amount: i64,
    allocations: Vec<AllocationRequest>,
) -> DocumentId {
    let doc = Document::draft(
        DocumentId::new(),
        fx.tenant_id,
        date(),
        DocumentKind::SupplierPayment(SupplierPaymentDetails {
            supplier_id: fx.supplier_id,
            account_id: fx.account_id,
            amount,
            allocations,
        }),
    );
    fx.store().seed_document(doc.clone()).await;
    doc.id
}

async fn seed_transfer(fx: &Fixture, from: AccountId, to: AccountId, amount: i64) -> DocumentId {
    let doc = Document::draft(
        DocumentId::new(),
        fx.tenant_id,
        date(),
        DocumentKind::InternalTransfer(TransferDetails {
            from_account: from,
            to_account: to,
            amount,
        }),
    );
    fx.store().seed_document(doc.clone()).await;
    doc.id
}

async fn seed_adjustment(
    fx: &Fixture,
    lines: &[(VariantId, AdjustmentDirection, i64, i64)],
) -> DocumentId {
    let doc = Document::draft(
        DocumentId::new(),
        fx.tenant_id,
        date(),
        DocumentKind::Adjustment(AdjustmentDetails { reason: None }),
    );
    fx.store().seed_document(doc.clone()).await;
    for (variant_id, direction, quantity, unit_cost) in lines {
        fx.store()
            .seed_line(DocumentLine {
                id: LineId::new(),
                document_id: doc.id,
                tenant_id: fx.tenant_id,
                variant_id: *variant_id,
                quantity: *quantity,
                line_total: 0,
                detail: LineDetail::Adjustment {
                    direction: *direction,
                    unit_cost: *unit_cost,
                    reason: None,
                },
            })
            .await;
    }
    doc.id
}

async fn avg_cost(fx: &Fixture) -> i64 {
    fx.store()
        .get_variant(fx.tenant_id, fx.variant_id)
        .await
        .map(|v| v.avg_cost)
        .unwrap_or(-1)
}

fn unprocessable(err: PostingError) -> UnprocessableReason {
    match err {
        PostingError::Unprocessable(reason) => reason,
        other => panic!("expected Unprocessable, got {other:?}"),
    }
}

// -- basic purchase flow -----------------------------------------------------

#[tokio::test]
async fn purchase_posts_stock_ledger_and_number() {
    let fx = fixture().await;
    let (doc_id, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;

    let posted = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(doc_id, "key-1"))
        .await
        .unwrap();

    assert_eq!(posted.document.status, DocumentStatus::Posted);
    assert_eq!(posted.document.document_number.as_deref(), Some("PUR-2026-0001"));
    assert_eq!(posted.document.series, Some(2026));
    assert_eq!(posted.document.idempotency_key.as_deref(), Some("key-1"));
    assert!(posted.document.posted_at.is_some());

    assert_eq!(posted.movements.len(), 1);
    assert_eq!(posted.movements[0].movement_type, MovementType::PurchaseIn);
    assert_eq!(posted.movements[0].quantity, 10);
    assert_eq!(posted.movements[0].unit_cost_at, 1_000);

    assert_eq!(posted.financial_entries.len(), 1);
    assert_eq!(
        posted.financial_entries[0].entry_type,
        FinancialEntryType::ApIncrease
    );
    assert_eq!(posted.financial_entries[0].amount, 10_000);

    assert_eq!(fx.store().stock_on_hand(fx.tenant_id, fx.variant_id).await, 10);
    assert_eq!(avg_cost(&fx).await, 1_000);
    assert_eq!(
        fx.store()
            .balance_of_party(fx.tenant_id, PartyRef::Supplier(fx.supplier_id))
            .await,
        10_000
    );
}

#[tokio::test]
async fn weighted_average_worked_example() {
    let fx = fixture().await;

    let (first, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(first, "k-1"))
        .await
        .unwrap();
    assert_eq!(avg_cost(&fx).await, 1_000);

    let (second, _) = seed_purchase(&fx, &[(fx.variant_id, 5, 2_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(second, "k-2"))
        .await
        .unwrap();

    // round((10*1000 + 5*2000) / 15) = 1333
    assert_eq!(avg_cost(&fx).await, 1_333);
    assert_eq!(fx.store().stock_on_hand(fx.tenant_id, fx.variant_id).await, 15);
}

// -- idempotency -------------------------------------------------------------

#[tokio::test]
async fn idempotent_replay_returns_same_result_and_writes_nothing() {
    let fx = fixture().await;
    let (doc_id, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    let request = PostRequest::new(doc_id, "replay-key");

    let first = fx.engine.post(fx.tenant_id, request.clone()).await.unwrap();
    let second = fx.engine.post(fx.tenant_id, request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fx.store().movements_of(fx.tenant_id, doc_id).await.len(), 1);
    assert_eq!(
        fx.store()
            .financial_entries_of(fx.tenant_id, doc_id)
            .await
            .len(),
        1
    );
    assert_eq!(fx.store().stock_on_hand(fx.tenant_id, fx.variant_id).await, 10);
}

#[tokio::test]
async fn replay_with_a_different_key_is_a_conflict() {
    let fx = fixture().await;
    let (doc_id, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;

    fx.engine
        .post(fx.tenant_id, PostRequest::new(doc_id, "key-a"))
        .await
        .unwrap();
    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(doc_id, "key-b"))
        .await
        .unwrap_err();

    assert!(matches!(err, PostingError::Conflict { retryable: false, .. }));
    assert_eq!(fx.store().movements_of(fx.tenant_id, doc_id).await.len(), 1);
}

#[tokio::test]
async fn key_already_used_by_another_document_is_a_conflict() {
    let fx = fixture().await;
    let (first, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    let (second, _) = seed_purchase(&fx, &[(fx.variant_id, 5, 1_000)]).await;

    fx.engine
        .post(fx.tenant_id, PostRequest::new(first, "shared-key"))
        .await
        .unwrap();
    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(second, "shared-key"))
        .await
        .unwrap_err();

    assert!(matches!(err, PostingError::Conflict { retryable: false, .. }));
    let second_doc = fx.store().get_document(fx.tenant_id, second).await.unwrap();
    assert_eq!(second_doc.status, DocumentStatus::Draft);
}

#[tokio::test]
async fn empty_idempotency_key_is_rejected() {
    let fx = fixture().await;
    let (doc_id, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;

    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(doc_id, "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, PostingError::InvalidArgument(_)));
}

// -- sales -------------------------------------------------------------------

#[tokio::test]
async fn sale_uses_snapshot_cost_and_never_recomputes() {
    let fx = fixture().await;
    let (purchase, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(purchase, "k-p"))
        .await
        .unwrap();

    let (sale, _) = seed_sale(&fx, &[(fx.variant_id, 5, 3_000)]).await;
    let posted = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(sale, "k-s"))
        .await
        .unwrap();

    assert_eq!(posted.movements.len(), 1);
    assert_eq!(posted.movements[0].movement_type, MovementType::SaleOut);
    assert_eq!(posted.movements[0].unit_cost_at, 1_000);
    assert_eq!(avg_cost(&fx).await, 1_000);
    assert_eq!(fx.store().stock_on_hand(fx.tenant_id, fx.variant_id).await, 5);

    // COGS captured on the line at the snapshot average.
    match &posted.lines[0].detail {
        LineDetail::Sale { cost_total, .. } => assert_eq!(*cost_total, 5_000),
        other => panic!("expected sale line, got {other:?}"),
    }

    assert_eq!(
        fx.store()
            .balance_of_party(fx.tenant_id, PartyRef::Customer(fx.customer_id))
            .await,
        15_000
    );
}

#[tokio::test]
async fn sale_reports_every_shortfall_not_just_the_first() {
    let fx = fixture().await;
    let scarce = fx.variant_id; // stock 5
    let plenty = seed_variant(&fx).await; // stock 10
    let empty = seed_variant(&fx).await; // stock 0

    let (p1, _) = seed_purchase(&fx, &[(scarce, 5, 1_000), (plenty, 10, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(p1, "k-p"))
        .await
        .unwrap();

    let (sale, line_ids) = seed_sale(
        &fx,
        &[(scarce, 10, 2_000), (plenty, 4, 2_000), (empty, 2, 2_000)],
    )
    .await;
    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(sale, "k-s"))
        .await
        .unwrap_err();

    match unprocessable(err) {
        UnprocessableReason::InsufficientStock { shortfalls } => {
            assert_eq!(shortfalls.len(), 2);
            assert_eq!(shortfalls[0].line_id, line_ids[0]);
            assert_eq!(shortfalls[0].available, 5);
            assert_eq!(shortfalls[0].required, 10);
            assert_eq!(shortfalls[1].line_id, line_ids[2]);
            assert_eq!(shortfalls[1].available, 0);
            assert_eq!(shortfalls[1].required, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // Nothing from the failed posting is visible.
    let doc = fx.store().get_document(fx.tenant_id, sale).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Draft);
    assert!(doc.document_number.is_none());
    assert!(fx.store().movements_of(fx.tenant_id, sale).await.is_empty());
    assert!(fx
        .store()
        .financial_entries_of(fx.tenant_id, sale)
        .await
        .is_empty());
}

#[tokio::test]
async fn two_lines_of_one_sale_cannot_claim_the_same_units() {
    let fx = fixture().await;
    let (purchase, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(purchase, "k-p"))
        .await
        .unwrap();

    let (sale, line_ids) = seed_sale(&fx, &[(fx.variant_id, 6, 2_000), (fx.variant_id, 6, 2_000)]).await;
    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(sale, "k-s"))
        .await
        .unwrap_err();

    match unprocessable(err) {
        UnprocessableReason::InsufficientStock { shortfalls } => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].line_id, line_ids[1]);
            assert_eq!(shortfalls[0].available, 4);
            assert_eq!(shortfalls[0].required, 6);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
}

// -- settlement --------------------------------------------------------------

#[tokio::test]
async fn purchase_self_settlement_invariant() {
    let fx = fixture().await;
    let (doc_id, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;

    let posted = fx
        .engine
        .post(
            fx.tenant_id,
            PostRequest::new(doc_id, "k-1").with_settlement(4_000, fx.account_id),
        )
        .await
        .unwrap();

    match &posted.document.kind {
        DocumentKind::Purchase(d) => assert_eq!(d.paid_now, 4_000),
        other => panic!("expected purchase, got {other:?}"),
    }

    let increases: Vec<_> = posted
        .financial_entries
        .iter()
        .filter(|e| e.entry_type == FinancialEntryType::ApIncrease)
        .collect();
    let decreases: Vec<_> = posted
        .financial_entries
        .iter()
        .filter(|e| e.entry_type == FinancialEntryType::ApDecrease)
        .collect();
    assert_eq!(increases.len(), 1);
    assert_eq!(increases[0].amount, 10_000);
    assert_eq!(decreases.len(), 1);
    assert_eq!(decreases[0].amount, 4_000);

    assert_eq!(posted.cash_entries.len(), 1);
    assert_eq!(posted.cash_entries[0].entry_type, CashEntryType::MoneyOut);
    assert_eq!(posted.cash_entries[0].direction, CashDirection::Out);
    assert_eq!(posted.cash_entries[0].amount, 4_000);
    assert_eq!(
        posted.cash_entries[0].counterparty,
        Some(PartyRef::Supplier(fx.supplier_id))
    );

    assert_eq!(posted.allocations.len(), 1);
    assert_eq!(posted.allocations[0].payment_document_id, doc_id);
    assert_eq!(posted.allocations[0].invoice_document_id, doc_id);
    assert_eq!(posted.allocations[0].amount, 4_000);

    assert_eq!(
        fx.store()
            .balance_of_party(fx.tenant_id, PartyRef::Supplier(fx.supplier_id))
            .await,
        6_000
    );
    assert_eq!(
        fx.store()
            .balance_of_account(fx.tenant_id, fx.account_id)
            .await,
        Some(-4_000)
    );
}

#[tokio::test]
async fn settlement_without_account_is_rejected() {
    let fx = fixture().await;
    let (doc_id, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;

    let mut request = PostRequest::new(doc_id, "k-1");
    request.settlement_amount = Some(4_000);
    let err = fx.engine.post(fx.tenant_id, request).await.unwrap_err();
    assert!(matches!(err, PostingError::InvalidArgument(_)));
}

#[tokio::test]
async fn settlement_over_total_is_rejected() {
    let fx = fixture().await;
    let (doc_id, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;

    let err = fx
        .engine
        .post(
            fx.tenant_id,
            PostRequest::new(doc_id, "k-1").with_settlement(10_001, fx.account_id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PostingError::InvalidArgument(_)));
}

#[tokio::test]
async fn settlement_against_inactive_account_is_unprocessable() {
    let fx = fixture().await;
    let inactive = AccountId::new();
    fx.store()
        .seed_account(PaymentAccount {
            id: inactive,
            tenant_id: fx.tenant_id,
            name: "Frozen".into(),
            active: false,
            opening_balance: 0,
        })
        .await;
    let (doc_id, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;

    let err = fx
        .engine
        .post(
            fx.tenant_id,
            PostRequest::new(doc_id, "k-1").with_settlement(1_000, inactive),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        unprocessable(err),
        UnprocessableReason::InactiveAccount { .. }
    ));
}

// -- returns -----------------------------------------------------------------

#[tokio::test]
async fn return_ceiling_is_cumulative_and_exact() {
    let fx = fixture().await;
    let (purchase, line_ids) = seed_purchase(&fx, &[(fx.variant_id, 5, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(purchase, "k-p"))
        .await
        .unwrap();
    let source = line_ids[0];

    // First return of 3 succeeds.
    let first = seed_supplier_return(&fx, &[(fx.variant_id, source, 3)], 3_000).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(first, "k-r1"))
        .await
        .unwrap();

    // A second return of 3 would exceed the original quantity.
    let second = seed_supplier_return(&fx, &[(fx.variant_id, source, 3)], 3_000).await;
    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(second, "k-r2"))
        .await
        .unwrap_err();
    match unprocessable(err) {
        UnprocessableReason::OverReturn {
            already_returned,
            requested,
            original_quantity,
            ..
        } => {
            assert_eq!(already_returned, 3);
            assert_eq!(requested, 3);
            assert_eq!(original_quantity, 5);
        }
        other => panic!("expected OverReturn, got {other:?}"),
    }

    // A second return of 2 lands exactly at the ceiling.
    let third = seed_supplier_return(&fx, &[(fx.variant_id, source, 2)], 2_000).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(third, "k-r3"))
        .await
        .unwrap();

    assert_eq!(fx.store().stock_on_hand(fx.tenant_id, fx.variant_id).await, 0);
    assert_eq!(
        fx.store()
            .balance_of_party(fx.tenant_id, PartyRef::Supplier(fx.supplier_id))
            .await,
        0
    );
}

#[tokio::test]
async fn supplier_return_removes_cost_from_the_average() {
    let fx = fixture().await;
    let (first, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(first, "k-1"))
        .await
        .unwrap();
    let (second, line_ids) = seed_purchase(&fx, &[(fx.variant_id, 5, 2_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(second, "k-2"))
        .await
        .unwrap();
    assert_eq!(avg_cost(&fx).await, 1_333);

    // Return the whole expensive batch at its original cost.
    let ret = seed_supplier_return(&fx, &[(fx.variant_id, line_ids[0], 5)], 10_000).await;
    let posted = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(ret, "k-r"))
        .await
        .unwrap();

    assert_eq!(posted.movements[0].movement_type, MovementType::SupplierReturnOut);
    assert_eq!(posted.movements[0].unit_cost_at, 2_000);
    assert_eq!(fx.store().stock_on_hand(fx.tenant_id, fx.variant_id).await, 10);
    // round((15*1333 - 5*2000) / 10) = 1000
    assert_eq!(avg_cost(&fx).await, 1_000);
}

#[tokio::test]
async fn customer_return_uses_original_sale_cost_and_leaves_average_alone() {
    let fx = fixture().await;
    let (purchase, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(purchase, "k-p"))
        .await
        .unwrap();
    let (sale, sale_lines) = seed_sale(&fx, &[(fx.variant_id, 4, 3_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(sale, "k-s"))
        .await
        .unwrap();

    // Bump the average afterwards so the return cost is visibly historical.
    let (pricier, _) = seed_purchase(&fx, &[(fx.variant_id, 6, 4_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(pricier, "k-p2"))
        .await
        .unwrap();
    let avg_before = avg_cost(&fx).await;

    let ret = seed_customer_return(&fx, &[(fx.variant_id, sale_lines[0], 2)], 6_000).await;
    let posted = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(ret, "k-r"))
        .await
        .unwrap();

    assert_eq!(posted.movements[0].movement_type, MovementType::CustomerReturnIn);
    // The sale movement carried the then-current average of 1000.
    assert_eq!(posted.movements[0].unit_cost_at, 1_000);
    assert_eq!(avg_cost(&fx).await, avg_before);
    assert_eq!(
        posted.financial_entries[0].entry_type,
        FinancialEntryType::ArDecrease
    );
    assert_eq!(posted.financial_entries[0].amount, 6_000);
}

#[tokio::test]
async fn return_against_foreign_source_is_unprocessable() {
    let fx = fixture().await;
    let (purchase, line_ids) = seed_purchase(&fx, &[(fx.variant_id, 5, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(purchase, "k-p"))
        .await
        .unwrap();

    // A customer return pointing at a purchase line.
    let ret = seed_customer_return(&fx, &[(fx.variant_id, line_ids[0], 1)], 1_000).await;
    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(ret, "k-r"))
        .await
        .unwrap_err();
    assert!(matches!(
        unprocessable(err),
        UnprocessableReason::ReturnSourceInvalid { .. }
    ));
}

// -- payments and allocations ------------------------------------------------

#[tokio::test]
async fn supplier_payment_decreases_ap_and_cash() {
    let fx = fixture().await;
    let (invoice, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(invoice, "k-p"))
        .await
        .unwrap();

    let payment = seed_supplier_payment(
        &fx,
        6_000,
        vec![AllocationRequest {
            invoice_id: invoice,
            amount: 6_000,
        }],
    )
    .await;
    let posted = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(payment, "k-pay"))
        .await
        .unwrap();

    assert!(posted.movements.is_empty());
    assert_eq!(posted.cash_entries.len(), 1);
    assert_eq!(posted.cash_entries[0].entry_type, CashEntryType::MoneyOut);
    assert_eq!(posted.allocations.len(), 1);
    assert_eq!(posted.allocations[0].invoice_document_id, invoice);

    assert_eq!(
        fx.store()
            .balance_of_party(fx.tenant_id, PartyRef::Supplier(fx.supplier_id))
            .await,
        4_000
    );
    assert_eq!(
        fx.store()
            .balance_of_account(fx.tenant_id, fx.account_id)
            .await,
        Some(-6_000)
    );
}

#[tokio::test]
async fn allocations_exceeding_the_payment_are_rejected() {
    let fx = fixture().await;
    let (invoice, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(invoice, "k-p"))
        .await
        .unwrap();

    let payment = seed_supplier_payment(
        &fx,
        6_000,
        vec![
            AllocationRequest {
                invoice_id: invoice,
                amount: 4_000,
            },
            AllocationRequest {
                invoice_id: invoice,
                amount: 3_000,
            },
        ],
    )
    .await;
    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(payment, "k-pay"))
        .await
        .unwrap_err();
    match unprocessable(err) {
        UnprocessableReason::AllocationExceedsPayment {
            allocated,
            payment_amount,
        } => {
            assert_eq!(allocated, 7_000);
            assert_eq!(payment_amount, 6_000);
        }
        other => panic!("expected AllocationExceedsPayment, got {other:?}"),
    }
}

#[tokio::test]
async fn allocation_against_another_partys_invoice_is_rejected() {
    let fx = fixture().await;
    let (invoice, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(invoice, "k-p"))
        .await
        .unwrap();

    // Payment drafted for a different supplier.
    let other_supplier = SupplierId::new();
    let doc = Document::draft(
        DocumentId::new(),
        fx.tenant_id,
        date(),
        DocumentKind::SupplierPayment(SupplierPaymentDetails {
            supplier_id: other_supplier,
            account_id: fx.account_id,
            amount: 1_000,
            allocations: vec![AllocationRequest {
                invoice_id: invoice,
                amount: 1_000,
            }],
        }),
    );
    fx.store().seed_document(doc.clone()).await;

    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(doc.id, "k-pay"))
        .await
        .unwrap_err();
    assert!(matches!(
        unprocessable(err),
        UnprocessableReason::AllocationPartyMismatch { .. }
    ));
}

#[tokio::test]
async fn allocation_beyond_outstanding_balance_is_rejected() {
    let fx = fixture().await;
    // Invoice of 10000, 4000 already self-settled at posting time.
    let (invoice, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    fx.engine
        .post(
            fx.tenant_id,
            PostRequest::new(invoice, "k-p").with_settlement(4_000, fx.account_id),
        )
        .await
        .unwrap();

    let payment = seed_supplier_payment(
        &fx,
        7_000,
        vec![AllocationRequest {
            invoice_id: invoice,
            amount: 7_000,
        }],
    )
    .await;
    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(payment, "k-pay"))
        .await
        .unwrap_err();
    match unprocessable(err) {
        UnprocessableReason::AllocationExceedsInvoiceBalance {
            amount,
            outstanding,
            ..
        } => {
            assert_eq!(amount, 7_000);
            assert_eq!(outstanding, 6_000);
        }
        other => panic!("expected AllocationExceedsInvoiceBalance, got {other:?}"),
    }
}

// -- transfers ---------------------------------------------------------------

#[tokio::test]
async fn transfer_writes_two_paired_legs_and_no_financial_entries() {
    let fx = fixture().await;
    let destination = AccountId::new();
    fx.store()
        .seed_account(PaymentAccount {
            id: destination,
            tenant_id: fx.tenant_id,
            name: "Bank".into(),
            active: true,
            opening_balance: 0,
        })
        .await;

    let doc_id = seed_transfer(&fx, fx.account_id, destination, 5_000).await;
    let posted = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(doc_id, "k-t"))
        .await
        .unwrap();

    assert!(posted.financial_entries.is_empty());
    assert_eq!(posted.cash_entries.len(), 2);

    let group = posted.cash_entries[0].transfer_group_id;
    assert!(group.is_some());
    assert!(posted
        .cash_entries
        .iter()
        .all(|e| e.transfer_group_id == group
            && e.entry_type == CashEntryType::Transfer
            && e.amount == 5_000));

    let out_leg = posted
        .cash_entries
        .iter()
        .find(|e| e.direction == CashDirection::Out)
        .unwrap();
    let in_leg = posted
        .cash_entries
        .iter()
        .find(|e| e.direction == CashDirection::In)
        .unwrap();
    assert_eq!(out_leg.account_id, fx.account_id);
    assert_eq!(in_leg.account_id, destination);

    assert_eq!(
        fx.store()
            .balance_of_account(fx.tenant_id, fx.account_id)
            .await,
        Some(-5_000)
    );
    assert_eq!(
        fx.store()
            .balance_of_account(fx.tenant_id, destination)
            .await,
        Some(5_000)
    );
}

#[tokio::test]
async fn transfer_between_the_same_account_is_rejected() {
    let fx = fixture().await;
    let doc_id = seed_transfer(&fx, fx.account_id, fx.account_id, 5_000).await;
    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(doc_id, "k-t"))
        .await
        .unwrap_err();
    assert!(matches!(err, PostingError::InvalidArgument(_)));
}

// -- adjustments -------------------------------------------------------------

#[tokio::test]
async fn adjustment_moves_stock_without_money() {
    let fx = fixture().await;
    let doc_id = seed_adjustment(
        &fx,
        &[
            (fx.variant_id, AdjustmentDirection::In, 10, 500),
            (fx.variant_id, AdjustmentDirection::Out, 3, 0),
        ],
    )
    .await;

    let posted = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(doc_id, "k-a"))
        .await
        .unwrap();

    assert!(posted.financial_entries.is_empty());
    assert!(posted.cash_entries.is_empty());
    assert_eq!(posted.movements.len(), 2);
    assert_eq!(posted.movements[0].movement_type, MovementType::AdjustmentIn);
    assert_eq!(posted.movements[1].movement_type, MovementType::AdjustmentOut);
    assert_eq!(fx.store().stock_on_hand(fx.tenant_id, fx.variant_id).await, 7);
}

#[tokio::test]
async fn adjustment_out_cannot_take_stock_negative() {
    let fx = fixture().await;
    let doc_id = seed_adjustment(&fx, &[(fx.variant_id, AdjustmentDirection::Out, 5, 0)]).await;

    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(doc_id, "k-a"))
        .await
        .unwrap_err();
    assert!(matches!(
        unprocessable(err),
        UnprocessableReason::InsufficientStock { .. }
    ));
    assert_eq!(fx.store().stock_on_hand(fx.tenant_id, fx.variant_id).await, 0);
}

// -- numbering ---------------------------------------------------------------

#[tokio::test]
async fn numbering_is_scoped_per_type_and_year() {
    let fx = fixture().await;

    let (p1, _) = seed_purchase(&fx, &[(fx.variant_id, 1, 1_000)]).await;
    let (p2, _) = seed_purchase(&fx, &[(fx.variant_id, 1, 1_000)]).await;
    let first = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(p1, "k-1"))
        .await
        .unwrap();
    let second = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(p2, "k-2"))
        .await
        .unwrap();
    assert_eq!(first.document.document_number.as_deref(), Some("PUR-2026-0001"));
    assert_eq!(second.document.document_number.as_deref(), Some("PUR-2026-0002"));

    let (sale, _) = seed_sale(&fx, &[(fx.variant_id, 1, 2_000)]).await;
    let posted_sale = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(sale, "k-3"))
        .await
        .unwrap();
    assert_eq!(
        posted_sale.document.document_number.as_deref(),
        Some("SAL-2026-0001")
    );

    // A different transaction year opens a fresh series.
    let mut old = Document::draft(
        DocumentId::new(),
        fx.tenant_id,
        NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
        DocumentKind::Purchase(PurchaseDetails {
            supplier_id: fx.supplier_id,
            subtotal: 1_000,
            discount_total: 0,
            delivery_fee: 0,
            total_amount: 1_000,
            paid_now: 0,
        }),
    );
    old.notes = Some("late entry".into());
    fx.store().seed_document(old.clone()).await;
    fx.store()
        .seed_line(DocumentLine {
            id: LineId::new(),
            document_id: old.id,
            tenant_id: fx.tenant_id,
            variant_id: fx.variant_id,
            quantity: 1,
            line_total: 1_000,
            detail: LineDetail::Purchase {
                unit_cost: 1_000,
                discount: 0,
                cost_total: 1_000,
            },
        })
        .await;
    let posted_old = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(old.id, "k-4"))
        .await
        .unwrap();
    assert_eq!(
        posted_old.document.document_number.as_deref(),
        Some("PUR-2025-0001")
    );
}

// -- scoping and misc --------------------------------------------------------

#[tokio::test]
async fn unknown_document_is_not_found() {
    let fx = fixture().await;
    let err = fx
        .engine
        .post(fx.tenant_id, PostRequest::new(DocumentId::new(), "k"))
        .await
        .unwrap_err();
    assert!(matches!(err, PostingError::NotFound(_)));
}

#[tokio::test]
async fn documents_are_invisible_across_tenants() {
    let fx = fixture().await;
    let (doc_id, _) = seed_purchase(&fx, &[(fx.variant_id, 1, 1_000)]).await;

    let err = fx
        .engine
        .post(TenantId::new(), PostRequest::new(doc_id, "k"))
        .await
        .unwrap_err();
    assert!(matches!(err, PostingError::NotFound(_)));
}

#[tokio::test]
async fn post_with_retry_passes_through_non_retryable_errors() {
    let fx = fixture().await;
    let (doc_id, _) = seed_purchase(&fx, &[(fx.variant_id, 1, 1_000)]).await;
    fx.engine
        .post(fx.tenant_id, PostRequest::new(doc_id, "k-a"))
        .await
        .unwrap();

    let err = fx
        .engine
        .post_with_retry(fx.tenant_id, PostRequest::new(doc_id, "k-b"), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, PostingError::Conflict { retryable: false, .. }));
}

#[tokio::test]
async fn concurrent_posts_of_different_documents_both_succeed() {
    let fx = fixture().await;
    let other_variant = seed_variant(&fx).await;
    let (a, _) = seed_purchase(&fx, &[(fx.variant_id, 10, 1_000)]).await;
    let (b, _) = seed_purchase(&fx, &[(other_variant, 5, 2_000)]).await;

    let engine = fx.engine.clone();
    let tenant_id = fx.tenant_id;
    let post_a = tokio::spawn({
        let engine = engine.clone();
        async move { engine.post(tenant_id, PostRequest::new(a, "k-a")).await }
    });
    let post_b = tokio::spawn({
        let engine = engine.clone();
        async move { engine.post(tenant_id, PostRequest::new(b, "k-b")).await }
    });

    post_a.await.unwrap().unwrap();
    post_b.await.unwrap().unwrap();

    assert_eq!(fx.store().stock_on_hand(fx.tenant_id, fx.variant_id).await, 10);
    assert_eq!(fx.store().stock_on_hand(fx.tenant_id, other_variant).await, 5);
}
