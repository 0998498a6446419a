//! Initial schema.
//!
//! Ledger records (users, payments, refunds, payouts) carry their own sync
//! state columns. Payout links and webhook dedup keys are unique so that
//! the database enforces single ownership and at-most-once intake.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(SCHEMA_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS webhook_events, payout_links, payouts, refunds, \
             payment_components, payments, users CASCADE;",
        )
        .await?;
        Ok(())
    }
}

const SCHEMA_SQL: &str = r"
CREATE TABLE users (
    id UUID PRIMARY KEY,
    display_name VARCHAR(255) NOT NULL,
    email VARCHAR(255),
    external_customer_id VARCHAR(64),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE payments (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users(id),
    amount_minor BIGINT NOT NULL,
    currency CHAR(3) NOT NULL,
    entity_type VARCHAR(64) NOT NULL,
    property VARCHAR(64),
    description TEXT,
    processor_reference VARCHAR(128),
    txn_date DATE NOT NULL,
    sync_status VARCHAR(16) NOT NULL DEFAULT 'pending',
    external_id VARCHAR(64),
    external_response JSONB,
    sync_error JSONB,
    last_sync_attempt_at TIMESTAMPTZ,
    synced_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_payments_status CHECK (sync_status IN ('pending', 'synced', 'failed')),
    CONSTRAINT chk_payments_synced_has_external
        CHECK (sync_status <> 'synced' OR external_id IS NOT NULL)
);

CREATE INDEX idx_payments_failed ON payments(last_sync_attempt_at DESC)
    WHERE sync_status = 'failed';

CREATE TABLE payment_components (
    id BIGSERIAL PRIMARY KEY,
    payment_id UUID NOT NULL REFERENCES payments(id) ON DELETE CASCADE,
    entity_type VARCHAR(64) NOT NULL,
    property VARCHAR(64),
    amount_minor BIGINT NOT NULL CHECK (amount_minor > 0),
    description TEXT
);

CREATE INDEX idx_payment_components_payment ON payment_components(payment_id, id);

CREATE TABLE refunds (
    id UUID PRIMARY KEY,
    payment_id UUID NOT NULL REFERENCES payments(id),
    amount_minor BIGINT NOT NULL,
    currency CHAR(3) NOT NULL,
    entity_type VARCHAR(64),
    property VARCHAR(64),
    reason TEXT,
    processor_reference VARCHAR(128),
    txn_date DATE NOT NULL,
    sync_status VARCHAR(16) NOT NULL DEFAULT 'pending',
    external_id VARCHAR(64),
    external_response JSONB,
    sync_error JSONB,
    last_sync_attempt_at TIMESTAMPTZ,
    synced_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_refunds_status CHECK (sync_status IN ('pending', 'synced', 'failed')),
    CONSTRAINT chk_refunds_synced_has_external
        CHECK (sync_status <> 'synced' OR external_id IS NOT NULL)
);

CREATE INDEX idx_refunds_failed ON refunds(last_sync_attempt_at DESC)
    WHERE sync_status = 'failed';

CREATE TABLE payouts (
    id UUID PRIMARY KEY,
    amount_minor BIGINT NOT NULL,
    currency CHAR(3) NOT NULL,
    fee_total_minor BIGINT NOT NULL DEFAULT 0,
    processor_reference VARCHAR(128),
    arrival_date DATE NOT NULL,
    sync_status VARCHAR(16) NOT NULL DEFAULT 'pending',
    external_id VARCHAR(64),
    external_response JSONB,
    sync_error JSONB,
    last_sync_attempt_at TIMESTAMPTZ,
    synced_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_payouts_status CHECK (sync_status IN ('pending', 'synced', 'failed')),
    CONSTRAINT chk_payouts_synced_has_external
        CHECK (sync_status <> 'synced' OR external_id IS NOT NULL)
);

CREATE INDEX idx_payouts_failed ON payouts(last_sync_attempt_at DESC)
    WHERE sync_status = 'failed';

-- A payment or refund settles in exactly one payout
CREATE TABLE payout_links (
    id BIGSERIAL PRIMARY KEY,
    payout_id UUID NOT NULL REFERENCES payouts(id) ON DELETE CASCADE,
    transaction_kind VARCHAR(16) NOT NULL,
    transaction_id UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_payout_links_kind CHECK (transaction_kind IN ('payment', 'refund')),
    CONSTRAINT uq_payout_links_transaction UNIQUE (transaction_kind, transaction_id)
);

CREATE INDEX idx_payout_links_payout ON payout_links(payout_id, id);

CREATE TABLE webhook_events (
    id UUID PRIMARY KEY,
    dedup_key VARCHAR(255) NOT NULL,
    realm_id VARCHAR(64) NOT NULL,
    entity_name VARCHAR(64) NOT NULL,
    entity_id VARCHAR(64) NOT NULL,
    operation VARCHAR(32) NOT NULL,
    last_updated VARCHAR(64),
    received_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_webhook_events_dedup UNIQUE (dedup_key)
);
";
