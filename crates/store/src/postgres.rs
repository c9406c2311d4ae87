//! Postgres-backed ledger store.
//!
//! Every posting unit of work runs in one transaction at
//! `ISOLATION LEVEL SERIALIZABLE`; the database, not application locking, is
//! what makes two postings racing on the same variant or the same number
//! series end with one of them aborted instead of corrupted state.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to [`StoreError`] as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (serialization failure) | `40001` | `Serialization` | Serializable conflict between concurrent postings; retry with the same idempotency key |
//! | Database (unique violation) | `23505` | `Serialization` | Idempotency-key unique index race at commit; retry resolves to replay or a typed conflict |
//! | Database (other) | Any other | `Backend` | Constraint/data errors |
//! | PoolClosed / network / decode | N/A | `Backend` | Infrastructure failures |
//!
//! ## Tenant Isolation
//!
//! Every statement carries `tenant_id` in its WHERE clause; a row owned by a
//! different tenant is indistinguishable from an absent row.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use tradebook_core::{AccountId, CustomerId, DocumentId, LineId, PartyRef, SupplierId, TenantId, VariantId};
use tradebook_ledgers::{
    Allocation, CashDirection, CashEntryType, CashLedgerEntry, FinancialEntryType,
    FinancialLedgerEntry, InventoryMovement, MovementType,
};
use tradebook_model::{
    Document, DocumentKind, DocumentLine, DocumentStatus, DocumentType, LineDetail,
    PaymentAccount, ProductVariant,
};

use crate::error::StoreError;
use crate::tx::{LedgerStore, PostingTx};

/// Postgres-backed ledger store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool; posting transactions are short-lived and
    /// a caller blocked more than a few seconds should see a retryable
    /// failure rather than queue indefinitely.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    ///
    /// The partial unique index on `(tenant_id, idempotency_key)` is the CAS
    /// backstop behind the engine's idempotency check: even if two
    /// serializable transactions slip past each other, at most one commit can
    /// claim a key.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for ddl in SCHEMA.iter().copied() {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        doc_type TEXT NOT NULL,
        status TEXT NOT NULL,
        transaction_date DATE NOT NULL,
        kind JSONB NOT NULL,
        document_number TEXT,
        series INT,
        idempotency_key TEXT,
        posted_at TIMESTAMPTZ,
        notes TEXT
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS documents_tenant_idempotency_key
        ON documents (tenant_id, idempotency_key)
        WHERE idempotency_key IS NOT NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS documents_tenant_type_series
        ON documents (tenant_id, doc_type, series)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS document_lines (
        id UUID PRIMARY KEY,
        seq BIGSERIAL,
        document_id UUID NOT NULL,
        tenant_id UUID NOT NULL,
        variant_id UUID NOT NULL,
        quantity BIGINT NOT NULL,
        line_total BIGINT NOT NULL,
        detail JSONB NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS document_lines_tenant_document
        ON document_lines (tenant_id, document_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS product_variants (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        sku TEXT NOT NULL,
        name TEXT NOT NULL,
        avg_cost BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS payment_accounts (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        name TEXT NOT NULL,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        opening_balance BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_movements (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        document_id UUID NOT NULL,
        line_id UUID NOT NULL,
        variant_id UUID NOT NULL,
        movement_type TEXT NOT NULL,
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        unit_cost_at BIGINT NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS inventory_movements_tenant_variant
        ON inventory_movements (tenant_id, variant_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS financial_ledger_entries (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        document_id UUID NOT NULL,
        entry_type TEXT NOT NULL,
        party_kind TEXT NOT NULL,
        party_id UUID NOT NULL,
        amount BIGINT NOT NULL CHECK (amount > 0),
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS financial_ledger_entries_tenant_party
        ON financial_ledger_entries (tenant_id, party_kind, party_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cash_ledger_entries (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        document_id UUID NOT NULL,
        account_id UUID NOT NULL,
        entry_type TEXT NOT NULL,
        direction TEXT NOT NULL,
        amount BIGINT NOT NULL CHECK (amount > 0),
        counterparty_kind TEXT,
        counterparty_id UUID,
        transfer_group_id UUID,
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS cash_ledger_entries_tenant_account
        ON cash_ledger_entries (tenant_id, account_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS allocations (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        payment_document_id UUID NOT NULL,
        invoice_document_id UUID NOT NULL,
        amount BIGINT NOT NULL CHECK (amount > 0),
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS allocations_tenant_invoice
        ON allocations (tenant_id, invoice_document_id)
    "#,
];

#[async_trait]
impl LedgerStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;
        Ok(PgTx { tx })
    }
}

/// One open serializable Postgres transaction.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PostingTx for PgTx {
    async fn document(
        &mut self,
        tenant_id: TenantId,
        id: DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM documents WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("document", e))?;
        row.map(|r| document_from_row(&r)).transpose()
    }

    async fn document_by_idempotency_key(
        &mut self,
        tenant_id: TenantId,
        key: &str,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM documents WHERE tenant_id = $1 AND idempotency_key = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("document_by_idempotency_key", e))?;
        row.map(|r| document_from_row(&r)).transpose()
    }

    async fn lines(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<DocumentLine>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM document_lines WHERE tenant_id = $1 AND document_id = $2 ORDER BY seq",
        )
        .bind(tenant_id.as_uuid())
        .bind(document_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lines", e))?;
        rows.iter().map(line_from_row).collect()
    }

    async fn line(
        &mut self,
        tenant_id: TenantId,
        id: LineId,
    ) -> Result<Option<DocumentLine>, StoreError> {
        let row = sqlx::query("SELECT * FROM document_lines WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("line", e))?;
        row.map(|r| line_from_row(&r)).transpose()
    }

    async fn update_document(&mut self, document: &Document) -> Result<(), StoreError> {
        let kind = serde_json::to_value(&document.kind)
            .map_err(|e| StoreError::backend(format!("kind serialization failed: {e}")))?;
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET status = $3, kind = $4, document_number = $5, series = $6,
                idempotency_key = $7, posted_at = $8, notes = $9
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(document.tenant_id.as_uuid())
        .bind(document.id.as_uuid())
        .bind(status_str(document.status))
        .bind(kind)
        .bind(document.document_number.as_deref())
        .bind(document.series)
        .bind(document.idempotency_key.as_deref())
        .bind(document.posted_at)
        .bind(document.notes.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_document", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::backend(format!(
                "update of document {} touched {} rows",
                document.id,
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn update_line(&mut self, line: &DocumentLine) -> Result<(), StoreError> {
        let detail = serde_json::to_value(&line.detail)
            .map_err(|e| StoreError::backend(format!("line detail serialization failed: {e}")))?;
        let result = sqlx::query(
            r#"
            UPDATE document_lines
            SET quantity = $3, line_total = $4, detail = $5
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(line.tenant_id.as_uuid())
        .bind(line.id.as_uuid())
        .bind(line.quantity)
        .bind(line.line_total)
        .bind(detail)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_line", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::backend(format!(
                "update of line {} touched {} rows",
                line.id,
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn numbered_count(
        &mut self,
        tenant_id: TenantId,
        doc_type: DocumentType,
        series: i32,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) FROM documents
            WHERE tenant_id = $1 AND doc_type = $2 AND series = $3
              AND document_number IS NOT NULL
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(doc_type_str(doc_type))
        .bind(series)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("numbered_count", e))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| map_sqlx_error("numbered_count", e))
    }

    async fn variant(
        &mut self,
        tenant_id: TenantId,
        id: VariantId,
    ) -> Result<Option<ProductVariant>, StoreError> {
        let row = sqlx::query("SELECT * FROM product_variants WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("variant", e))?;
        row.map(|r| variant_from_row(&r)).transpose()
    }

    async fn set_avg_cost(
        &mut self,
        tenant_id: TenantId,
        id: VariantId,
        avg_cost: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE product_variants SET avg_cost = $3 WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .bind(avg_cost)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("set_avg_cost", e))?;
        if result.rows_affected() != 1 {
            return Err(StoreError::backend(format!(
                "avg_cost write on unknown variant {id}"
            )));
        }
        Ok(())
    }

    async fn account(
        &mut self,
        tenant_id: TenantId,
        id: AccountId,
    ) -> Result<Option<PaymentAccount>, StoreError> {
        let row = sqlx::query("SELECT * FROM payment_accounts WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("account", e))?;
        row.map(|r| account_from_row(&r)).transpose()
    }

    async fn on_hand(
        &mut self,
        tenant_id: TenantId,
        variant_id: VariantId,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT CAST(COALESCE(SUM(
                CASE WHEN movement_type IN ('purchase_in', 'customer_return_in', 'adjustment_in')
                     THEN quantity ELSE -quantity END), 0) AS BIGINT)
            FROM inventory_movements
            WHERE tenant_id = $1 AND variant_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(variant_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("on_hand", e))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| map_sqlx_error("on_hand", e))
    }

    async fn movement_for_line(
        &mut self,
        tenant_id: TenantId,
        line_id: LineId,
    ) -> Result<Option<InventoryMovement>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM inventory_movements WHERE tenant_id = $1 AND line_id = $2 LIMIT 1",
        )
        .bind(tenant_id.as_uuid())
        .bind(line_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("movement_for_line", e))?;
        row.map(|r| movement_from_row(&r)).transpose()
    }

    async fn returned_against(
        &mut self,
        tenant_id: TenantId,
        source_line_id: LineId,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT CAST(COALESCE(SUM(l.quantity), 0) AS BIGINT)
            FROM document_lines l
            JOIN documents d ON d.id = l.document_id AND d.tenant_id = l.tenant_id
            WHERE l.tenant_id = $1
              AND d.status = 'posted'
              AND (l.detail -> 'return' ->> 'source_line_id') = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(source_line_id.as_uuid().to_string())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("returned_against", e))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| map_sqlx_error("returned_against", e))
    }

    async fn allocated_against(
        &mut self,
        tenant_id: TenantId,
        invoice_id: DocumentId,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT CAST(COALESCE(SUM(amount), 0) AS BIGINT)
            FROM allocations
            WHERE tenant_id = $1 AND invoice_document_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(invoice_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("allocated_against", e))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| map_sqlx_error("allocated_against", e))
    }

    async fn insert_movement(&mut self, movement: &InventoryMovement) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_movements
                (id, tenant_id, document_id, line_id, variant_id, movement_type,
                 quantity, unit_cost_at, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.tenant_id.as_uuid())
        .bind(movement.document_id.as_uuid())
        .bind(movement.line_id.as_uuid())
        .bind(movement.variant_id.as_uuid())
        .bind(movement_type_str(movement.movement_type))
        .bind(movement.quantity)
        .bind(movement.unit_cost_at)
        .bind(movement.occurred_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
        Ok(())
    }

    async fn insert_financial_entry(
        &mut self,
        entry: &FinancialLedgerEntry,
    ) -> Result<(), StoreError> {
        let (party_kind, party_id) = party_columns(entry.party);
        sqlx::query(
            r#"
            INSERT INTO financial_ledger_entries
                (id, tenant_id, document_id, entry_type, party_kind, party_id,
                 amount, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.tenant_id.as_uuid())
        .bind(entry.document_id.as_uuid())
        .bind(financial_type_str(entry.entry_type))
        .bind(party_kind)
        .bind(party_id)
        .bind(entry.amount)
        .bind(entry.occurred_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_financial_entry", e))?;
        Ok(())
    }

    async fn insert_cash_entry(&mut self, entry: &CashLedgerEntry) -> Result<(), StoreError> {
        let (counterparty_kind, counterparty_id) = match entry.counterparty {
            Some(party) => {
                let (kind, id) = party_columns(party);
                (Some(kind), Some(id))
            }
            None => (None, None),
        };
        sqlx::query(
            r#"
            INSERT INTO cash_ledger_entries
                (id, tenant_id, document_id, account_id, entry_type, direction,
                 amount, counterparty_kind, counterparty_id, transfer_group_id, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.tenant_id.as_uuid())
        .bind(entry.document_id.as_uuid())
        .bind(entry.account_id.as_uuid())
        .bind(cash_type_str(entry.entry_type))
        .bind(cash_direction_str(entry.direction))
        .bind(entry.amount)
        .bind(counterparty_kind)
        .bind(counterparty_id)
        .bind(entry.transfer_group_id)
        .bind(entry.occurred_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_cash_entry", e))?;
        Ok(())
    }

    async fn insert_allocation(&mut self, allocation: &Allocation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO allocations
                (id, tenant_id, payment_document_id, invoice_document_id, amount, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(allocation.id.as_uuid())
        .bind(allocation.tenant_id.as_uuid())
        .bind(allocation.payment_document_id.as_uuid())
        .bind(allocation.invoice_document_id.as_uuid())
        .bind(allocation.amount)
        .bind(allocation.occurred_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_allocation", e))?;
        Ok(())
    }

    async fn movements_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM inventory_movements WHERE tenant_id = $1 AND document_id = $2 ORDER BY id",
        )
        .bind(tenant_id.as_uuid())
        .bind(document_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("movements_for_document", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    async fn financial_entries_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<FinancialLedgerEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM financial_ledger_entries WHERE tenant_id = $1 AND document_id = $2 ORDER BY id",
        )
        .bind(tenant_id.as_uuid())
        .bind(document_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("financial_entries_for_document", e))?;
        rows.iter().map(financial_from_row).collect()
    }

    async fn cash_entries_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<CashLedgerEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM cash_ledger_entries WHERE tenant_id = $1 AND document_id = $2 ORDER BY id",
        )
        .bind(tenant_id.as_uuid())
        .bind(document_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("cash_entries_for_document", e))?;
        rows.iter().map(cash_from_row).collect()
    }

    async fn allocations_for_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> Result<Vec<Allocation>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM allocations WHERE tenant_id = $1 AND payment_document_id = $2 ORDER BY id",
        )
        .bind(tenant_id.as_uuid())
        .bind(document_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("allocations_for_document", e))?;
        rows.iter().map(allocation_from_row).collect()
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

// -- row decoding ------------------------------------------------------------

fn decode<T>(op: &str, result: Result<T, sqlx::Error>) -> Result<T, StoreError> {
    result.map_err(|e| StoreError::backend(format!("{op}: row decode failed: {e}")))
}

fn document_from_row(row: &PgRow) -> Result<Document, StoreError> {
    let kind_json: JsonValue = decode("document", row.try_get("kind"))?;
    let kind: DocumentKind = serde_json::from_value(kind_json)
        .map_err(|e| StoreError::backend(format!("document kind decode failed: {e}")))?;
    let status: String = decode("document", row.try_get("status"))?;
    Ok(Document {
        id: DocumentId::from_uuid(decode("document", row.try_get::<Uuid, _>("id"))?),
        tenant_id: TenantId::from_uuid(decode("document", row.try_get::<Uuid, _>("tenant_id"))?),
        status: status_from_str(&status)?,
        transaction_date: decode("document", row.try_get::<NaiveDate, _>("transaction_date"))?,
        kind,
        document_number: decode("document", row.try_get("document_number"))?,
        series: decode("document", row.try_get("series"))?,
        idempotency_key: decode("document", row.try_get("idempotency_key"))?,
        posted_at: decode("document", row.try_get::<Option<DateTime<Utc>>, _>("posted_at"))?,
        notes: decode("document", row.try_get("notes"))?,
    })
}

fn line_from_row(row: &PgRow) -> Result<DocumentLine, StoreError> {
    let detail_json: JsonValue = decode("line", row.try_get("detail"))?;
    let detail: LineDetail = serde_json::from_value(detail_json)
        .map_err(|e| StoreError::backend(format!("line detail decode failed: {e}")))?;
    Ok(DocumentLine {
        id: LineId::from_uuid(decode("line", row.try_get::<Uuid, _>("id"))?),
        document_id: DocumentId::from_uuid(decode("line", row.try_get::<Uuid, _>("document_id"))?),
        tenant_id: TenantId::from_uuid(decode("line", row.try_get::<Uuid, _>("tenant_id"))?),
        variant_id: VariantId::from_uuid(decode("line", row.try_get::<Uuid, _>("variant_id"))?),
        quantity: decode("line", row.try_get("quantity"))?,
        line_total: decode("line", row.try_get("line_total"))?,
        detail,
    })
}

fn variant_from_row(row: &PgRow) -> Result<ProductVariant, StoreError> {
    Ok(ProductVariant {
        id: VariantId::from_uuid(decode("variant", row.try_get::<Uuid, _>("id"))?),
        tenant_id: TenantId::from_uuid(decode("variant", row.try_get::<Uuid, _>("tenant_id"))?),
        sku: decode("variant", row.try_get("sku"))?,
        name: decode("variant", row.try_get("name"))?,
        avg_cost: decode("variant", row.try_get("avg_cost"))?,
    })
}

fn account_from_row(row: &PgRow) -> Result<PaymentAccount, StoreError> {
    Ok(PaymentAccount {
        id: AccountId::from_uuid(decode("account", row.try_get::<Uuid, _>("id"))?),
        tenant_id: TenantId::from_uuid(decode("account", row.try_get::<Uuid, _>("tenant_id"))?),
        name: decode("account", row.try_get("name"))?,
        active: decode("account", row.try_get("active"))?,
        opening_balance: decode("account", row.try_get("opening_balance"))?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<InventoryMovement, StoreError> {
    let movement_type: String = decode("movement", row.try_get("movement_type"))?;
    Ok(InventoryMovement {
        id: decode("movement", row.try_get::<Uuid, _>("id"))?.into(),
        tenant_id: TenantId::from_uuid(decode("movement", row.try_get::<Uuid, _>("tenant_id"))?),
        document_id: DocumentId::from_uuid(decode(
            "movement",
            row.try_get::<Uuid, _>("document_id"),
        )?),
        line_id: LineId::from_uuid(decode("movement", row.try_get::<Uuid, _>("line_id"))?),
        variant_id: VariantId::from_uuid(decode("movement", row.try_get::<Uuid, _>("variant_id"))?),
        movement_type: movement_type_from_str(&movement_type)?,
        quantity: decode("movement", row.try_get("quantity"))?,
        unit_cost_at: decode("movement", row.try_get("unit_cost_at"))?,
        occurred_at: decode("movement", row.try_get("occurred_at"))?,
    })
}

fn financial_from_row(row: &PgRow) -> Result<FinancialLedgerEntry, StoreError> {
    let entry_type: String = decode("financial_entry", row.try_get("entry_type"))?;
    let party_kind: String = decode("financial_entry", row.try_get("party_kind"))?;
    let party_id: Uuid = decode("financial_entry", row.try_get("party_id"))?;
    Ok(FinancialLedgerEntry {
        id: decode("financial_entry", row.try_get::<Uuid, _>("id"))?.into(),
        tenant_id: TenantId::from_uuid(decode(
            "financial_entry",
            row.try_get::<Uuid, _>("tenant_id"),
        )?),
        document_id: DocumentId::from_uuid(decode(
            "financial_entry",
            row.try_get::<Uuid, _>("document_id"),
        )?),
        entry_type: financial_type_from_str(&entry_type)?,
        party: party_from_columns(&party_kind, party_id)?,
        amount: decode("financial_entry", row.try_get("amount"))?,
        occurred_at: decode("financial_entry", row.try_get("occurred_at"))?,
    })
}

fn cash_from_row(row: &PgRow) -> Result<CashLedgerEntry, StoreError> {
    let entry_type: String = decode("cash_entry", row.try_get("entry_type"))?;
    let direction: String = decode("cash_entry", row.try_get("direction"))?;
    let counterparty_kind: Option<String> = decode("cash_entry", row.try_get("counterparty_kind"))?;
    let counterparty_id: Option<Uuid> = decode("cash_entry", row.try_get("counterparty_id"))?;
    let counterparty = match (counterparty_kind, counterparty_id) {
        (Some(kind), Some(id)) => Some(party_from_columns(&kind, id)?),
        _ => None,
    };
    Ok(CashLedgerEntry {
        id: decode("cash_entry", row.try_get::<Uuid, _>("id"))?.into(),
        tenant_id: TenantId::from_uuid(decode("cash_entry", row.try_get::<Uuid, _>("tenant_id"))?),
        document_id: DocumentId::from_uuid(decode(
            "cash_entry",
            row.try_get::<Uuid, _>("document_id"),
        )?),
        account_id: AccountId::from_uuid(decode(
            "cash_entry",
            row.try_get::<Uuid, _>("account_id"),
        )?),
        entry_type: cash_type_from_str(&entry_type)?,
        direction: cash_direction_from_str(&direction)?,
        amount: decode("cash_entry", row.try_get("amount"))?,
        counterparty,
        transfer_group_id: decode("cash_entry", row.try_get("transfer_group_id"))?,
        occurred_at: decode("cash_entry", row.try_get("occurred_at"))?,
    })
}

fn allocation_from_row(row: &PgRow) -> Result<Allocation, StoreError> {
    Ok(Allocation {
        id: decode("allocation", row.try_get::<Uuid, _>("id"))?.into(),
        tenant_id: TenantId::from_uuid(decode("allocation", row.try_get::<Uuid, _>("tenant_id"))?),
        payment_document_id: DocumentId::from_uuid(decode(
            "allocation",
            row.try_get::<Uuid, _>("payment_document_id"),
        )?),
        invoice_document_id: DocumentId::from_uuid(decode(
            "allocation",
            row.try_get::<Uuid, _>("invoice_document_id"),
        )?),
        amount: decode("allocation", row.try_get("amount"))?,
        occurred_at: decode("allocation", row.try_get("occurred_at"))?,
    })
}

// -- enum <-> text -----------------------------------------------------------

fn status_str(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Draft => "draft",
        DocumentStatus::Posted => "posted",
    }
}

fn status_from_str(s: &str) -> Result<DocumentStatus, StoreError> {
    match s {
        "draft" => Ok(DocumentStatus::Draft),
        "posted" => Ok(DocumentStatus::Posted),
        other => Err(StoreError::backend(format!("unknown status '{other}'"))),
    }
}

fn doc_type_str(t: DocumentType) -> &'static str {
    match t {
        DocumentType::Purchase => "purchase",
        DocumentType::Sale => "sale",
        DocumentType::SupplierPayment => "supplier_payment",
        DocumentType::CustomerPayment => "customer_payment",
        DocumentType::SupplierReturn => "supplier_return",
        DocumentType::CustomerReturn => "customer_return",
        DocumentType::InternalTransfer => "internal_transfer",
        DocumentType::Adjustment => "adjustment",
    }
}

fn movement_type_str(t: MovementType) -> &'static str {
    match t {
        MovementType::PurchaseIn => "purchase_in",
        MovementType::SaleOut => "sale_out",
        MovementType::SupplierReturnOut => "supplier_return_out",
        MovementType::CustomerReturnIn => "customer_return_in",
        MovementType::AdjustmentIn => "adjustment_in",
        MovementType::AdjustmentOut => "adjustment_out",
    }
}

fn movement_type_from_str(s: &str) -> Result<MovementType, StoreError> {
    match s {
        "purchase_in" => Ok(MovementType::PurchaseIn),
        "sale_out" => Ok(MovementType::SaleOut),
        "supplier_return_out" => Ok(MovementType::SupplierReturnOut),
        "customer_return_in" => Ok(MovementType::CustomerReturnIn),
        "adjustment_in" => Ok(MovementType::AdjustmentIn),
        "adjustment_out" => Ok(MovementType::AdjustmentOut),
        other => Err(StoreError::backend(format!(
            "unknown movement type '{other}'"
        ))),
    }
}

fn financial_type_str(t: FinancialEntryType) -> &'static str {
    match t {
        FinancialEntryType::ApIncrease => "ap_increase",
        FinancialEntryType::ApDecrease => "ap_decrease",
        FinancialEntryType::ArIncrease => "ar_increase",
        FinancialEntryType::ArDecrease => "ar_decrease",
    }
}

fn financial_type_from_str(s: &str) -> Result<FinancialEntryType, StoreError> {
    match s {
        "ap_increase" => Ok(FinancialEntryType::ApIncrease),
        "ap_decrease" => Ok(FinancialEntryType::ApDecrease),
        "ar_increase" => Ok(FinancialEntryType::ArIncrease),
        "ar_decrease" => Ok(FinancialEntryType::ArDecrease),
        other => Err(StoreError::backend(format!("unknown entry type '{other}'"))),
    }
}

fn cash_type_str(t: CashEntryType) -> &'static str {
    match t {
        CashEntryType::MoneyIn => "money_in",
        CashEntryType::MoneyOut => "money_out",
        CashEntryType::Transfer => "transfer",
    }
}

fn cash_type_from_str(s: &str) -> Result<CashEntryType, StoreError> {
    match s {
        "money_in" => Ok(CashEntryType::MoneyIn),
        "money_out" => Ok(CashEntryType::MoneyOut),
        "transfer" => Ok(CashEntryType::Transfer),
        other => Err(StoreError::backend(format!(
            "unknown cash entry type '{other}'"
        ))),
    }
}

fn cash_direction_str(d: CashDirection) -> &'static str {
    match d {
        CashDirection::In => "in",
        CashDirection::Out => "out",
    }
}

fn cash_direction_from_str(s: &str) -> Result<CashDirection, StoreError> {
    match s {
        "in" => Ok(CashDirection::In),
        "out" => Ok(CashDirection::Out),
        other => Err(StoreError::backend(format!("unknown direction '{other}'"))),
    }
}

fn party_columns(party: PartyRef) -> (&'static str, Uuid) {
    match party {
        PartyRef::Supplier(id) => ("supplier", *id.as_uuid()),
        PartyRef::Customer(id) => ("customer", *id.as_uuid()),
    }
}

fn party_from_columns(kind: &str, id: Uuid) -> Result<PartyRef, StoreError> {
    match kind {
        "supplier" => Ok(PartyRef::Supplier(SupplierId::from_uuid(id))),
        "customer" => Ok(PartyRef::Customer(CustomerId::from_uuid(id))),
        other => Err(StoreError::backend(format!(
            "unknown party kind '{other}'"
        ))),
    }
}

fn map_sqlx_error(op: &str, e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some("40001") => {
                return StoreError::serialization(format!("{op}: {}", db.message()));
            }
            Some("23505") => {
                return StoreError::serialization(format!(
                    "{op}: unique constraint race: {}",
                    db.message()
                ));
            }
            _ => {}
        }
    }
    StoreError::backend(format!("{op}: {e}"))
}
