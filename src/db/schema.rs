//! PostgreSQL schema for the ledger
//!
//! Non-negativity and the warehouse collateral bound are CHECK
//! constraints (SQLSTATE 23514 on violation).

use sqlx::PgPool;

/// Initialize the ledger schema (idempotent)
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing ledger schema...");

    for (name, ddl) in [
        ("accounts", CREATE_ACCOUNTS_TABLE),
        ("account_balances", CREATE_BALANCES_TABLE),
        ("warehouse_deposit_locks", CREATE_DEPOSIT_LOCKS_TABLE),
        ("warehouse_members", CREATE_MEMBERS_TABLE),
        ("warehouse_transfers", CREATE_TRANSFERS_TABLE),
        ("asset_prices", CREATE_PRICES_TABLE),
    ] {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            tracing::error!(table = name, error = %e, "Failed to create table");
            e
        })?;
    }

    tracing::info!("Ledger schema ready");
    Ok(())
}

/// Wallets and warehouse inventories share one id space
pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id                   BIGSERIAL PRIMARY KEY,
    kind                 SMALLINT NOT NULL,
    address              VARCHAR(24) UNIQUE,
    name                 VARCHAR(64),
    owner_id             BIGINT REFERENCES accounts(id),
    webhook              TEXT,
    collateral           BIGINT NOT NULL DEFAULT 0,
    collateral_available BIGINT NOT NULL DEFAULT 0,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT accounts_collateral_bound
        CHECK (collateral_available >= 0 AND collateral_available <= collateral)
)
"#;

pub const CREATE_BALANCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS account_balances (
    account_id BIGINT NOT NULL REFERENCES accounts(id),
    asset      VARCHAR(32) NOT NULL,
    quantity   BIGINT NOT NULL CHECK (quantity >= 0),
    PRIMARY KEY (account_id, asset)
)
"#;

/// Collateral each warehouse deposit locked, per deposited asset
pub const CREATE_DEPOSIT_LOCKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS warehouse_deposit_locks (
    account_id BIGINT NOT NULL REFERENCES accounts(id),
    asset      VARCHAR(32) NOT NULL,
    quantity   BIGINT NOT NULL CHECK (quantity >= 0),
    PRIMARY KEY (account_id, asset)
)
"#;

pub const CREATE_MEMBERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS warehouse_members (
    warehouse_id BIGINT NOT NULL REFERENCES accounts(id),
    wallet_id    BIGINT NOT NULL REFERENCES accounts(id),
    role         SMALLINT NOT NULL,
    PRIMARY KEY (warehouse_id, wallet_id)
)
"#;

pub const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS warehouse_transfers (
    transfer_id     VARCHAR(26) PRIMARY KEY,
    status          SMALLINT NOT NULL,
    sending_id      BIGINT NOT NULL REFERENCES accounts(id),
    receiving_id    BIGINT NOT NULL REFERENCES accounts(id),
    assets          JSONB NOT NULL,
    collateral_used BIGINT NOT NULL CHECK (collateral_used >= 0),
    created_at      TIMESTAMPTZ NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_PRICES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS asset_prices (
    asset      VARCHAR(32) PRIMARY KEY,
    value      NUMERIC(30, 10) NOT NULL CHECK (value >= 0),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;
