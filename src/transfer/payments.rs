//! Peer payments, warehouse deposit/withdraw and treasury grants
//!
//! # Peer transaction order
//!
//! ```text
//! credit recipient -> webhook (smart wallets) -> debit sender -> commit
//!                                                                  |
//!                                         activity + real-time event
//! ```
//!
//! The first failing step aborts the unit, so a missing recipient is
//! reported before a webhook failure, which is reported before
//! insufficient funds. Nothing is written to the activity log or hub
//! unless the unit commits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::access;
use super::unit;
use super::webhook::{WebhookNotifier, WebhookPayload};
use crate::account::validation::validate_memo;
use crate::account::{Account, ValidationError, WalletAddress};
use crate::activity::{ActivityKind, ActivityRecord, ActivitySink, NotificationHub};
use crate::clock::Clock;
use crate::core_types::{AccountId, Assets, Quantity};
use crate::error::EngineError;
use crate::ledger::{AccountSelector, ConditionalMutation, LedgerStore};
use crate::pricing::{Valuator, validate_quantities};

/// Peer payment request
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Wallet owned by the caller to pay from; `None` for the primary wallet
    pub from: Option<String>,
    /// Recipient address or username
    pub to: String,
    pub assets: Assets,
    pub memo: Option<String>,
}

/// Wallet <-> warehouse inventory movement
#[derive(Debug, Clone)]
pub struct WarehouseMove {
    pub warehouse: AccountId,
    /// Wallet owned by the caller; `None` for the primary wallet
    pub wallet: Option<String>,
    pub assets: Assets,
}

/// Committed peer payment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub sender: String,
    pub recipient: String,
    pub assets: Assets,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub struct PaymentService {
    store: Arc<dyn LedgerStore>,
    valuator: Arc<Valuator>,
    webhook: Arc<dyn WebhookNotifier>,
    activity: Arc<dyn ActivitySink>,
    hub: Arc<NotificationHub>,
    clock: Arc<dyn Clock>,
    treasury: Option<String>,
}

impl PaymentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        valuator: Arc<Valuator>,
        webhook: Arc<dyn WebhookNotifier>,
        activity: Arc<dyn ActivitySink>,
        hub: Arc<NotificationHub>,
        clock: Arc<dyn Clock>,
        treasury: Option<String>,
    ) -> Self {
        Self {
            store,
            valuator,
            webhook,
            activity,
            hub,
            clock,
            treasury,
        }
    }

    /// Pay another wallet from the caller's primary or an owned wallet
    pub async fn send(
        &self,
        caller: AccountId,
        req: SendRequest,
    ) -> Result<PaymentReceipt, EngineError> {
        validate_quantities(&req.assets)?;
        if let Some(memo) = &req.memo {
            validate_memo(memo)?;
        }
        let to = WalletAddress::new(&req.to)?;
        let sender = access::caller_wallet(self.store.as_ref(), caller, req.from.as_deref()).await?;

        self.execute(sender, to, req.assets, req.memo).await
    }

    /// Pay `recipient` out of the treasury wallet
    pub async fn grant(
        &self,
        recipient: &str,
        assets: Assets,
        memo: Option<String>,
    ) -> Result<PaymentReceipt, EngineError> {
        validate_quantities(&assets)?;
        if let Some(memo) = &memo {
            validate_memo(memo)?;
        }
        let to = WalletAddress::new(recipient)?;

        let Some(address) = self.treasury.as_deref() else {
            error!("Treasury grant requested but no treasury wallet is configured");
            return Err(EngineError::InvariantViolation(
                "treasury wallet not configured".into(),
            ));
        };
        let treasury = self
            .store
            .account(&AccountSelector::Address(address.to_string()))
            .await?
            .ok_or_else(|| {
                error!(treasury = address, "Treasury wallet missing from the ledger");
                EngineError::InvariantViolation(format!("treasury wallet '{}' not found", address))
            })?;

        self.execute(treasury, to, assets, memo).await
    }

    async fn execute(
        &self,
        sender: Account,
        to: WalletAddress,
        assets: Assets,
        memo: Option<String>,
    ) -> Result<PaymentReceipt, EngineError> {
        let sender_address = sender.display_name();
        if sender_address == to.as_str() {
            return Err(ValidationError::SameAccount.into());
        }
        let recipient = AccountSelector::Address(to.to_string());

        let mut tx = self.store.begin().await?;
        let result = async {
            let recipient_id = unit::apply(
                tx.as_mut(),
                &ConditionalMutation::credit_assets(recipient.clone(), &assets),
            )
            .await?;

            let account = tx
                .resolve(&AccountSelector::Id(recipient_id))
                .await?
                .ok_or_else(|| EngineError::not_found(&recipient))?;
            if let Some(url) = account.webhook.as_deref() {
                let payload = WebhookPayload {
                    sender: sender_address.clone(),
                    wallet: to.to_string(),
                    assets: assets.clone(),
                    memo: memo.clone(),
                };
                self.webhook.notify(url, &payload).await.map_err(|e| {
                    warn!(wallet = %to, error = %e, "Smart wallet webhook failed");
                    EngineError::WebhookFailed(e.to_string())
                })?;
            }

            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::debit_assets(AccountSelector::Id(sender.id), &assets),
            )
            .await?;
            Ok::<_, EngineError>(recipient_id)
        }
        .await;
        let recipient_id = unit::finish(tx, result).await?;

        let timestamp = self.clock.now();
        info!(sender = %sender_address, recipient = %to, "Payment committed");

        self.activity
            .push(
                sender.id,
                ActivityRecord {
                    kind: ActivityKind::Send,
                    interactant: to.to_string(),
                    assets: assets.clone(),
                    memo: memo.clone(),
                    timestamp,
                },
            )
            .await;
        let received = ActivityRecord {
            kind: ActivityKind::Receive,
            interactant: sender_address.clone(),
            assets: assets.clone(),
            memo: memo.clone(),
            timestamp,
        };
        self.activity.push(recipient_id, received.clone()).await;
        self.hub.publish(to.as_str(), received);

        Ok(PaymentReceipt {
            sender: sender_address,
            recipient: to.into_string(),
            assets,
            memo,
            timestamp,
        })
    }

    /// Move assets from a wallet into warehouse inventory
    ///
    /// Locks collateral worth the assets on the warehouse and records the
    /// lock against each deposited asset. Returns the amount locked.
    pub async fn deposit(&self, caller: AccountId, req: WarehouseMove) -> Result<Quantity, EngineError> {
        validate_quantities(&req.assets)?;
        let wallet = access::caller_wallet(self.store.as_ref(), caller, req.wallet.as_deref()).await?;
        let warehouse = access::warehouse(self.store.as_ref(), req.warehouse).await?;
        access::require_member(self.store.as_ref(), warehouse.id, caller).await?;

        let shares = self.valuator.collateral_shares(&req.assets).await?;
        let needed = shares.values().sum::<Quantity>();

        let mut tx = self.store.begin().await?;
        let result = async {
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::lock_for_deposit(warehouse.id, &shares),
            )
            .await?;
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::debit_assets(AccountSelector::Id(wallet.id), &req.assets),
            )
            .await?;
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::credit_assets(
                    AccountSelector::Warehouse(warehouse.id),
                    &req.assets,
                ),
            )
            .await
        }
        .await;
        unit::finish(tx, result).await?;

        info!(warehouse = warehouse.id, wallet = wallet.id, collateral = needed, "Deposit committed");
        self.record(wallet.id, ActivityKind::Deposit, &warehouse, req.assets)
            .await;
        Ok(needed)
    }

    /// Move assets from warehouse inventory back into a wallet
    ///
    /// Releases the deposit locks of each withdrawn asset in proportion
    /// to the share of that asset's inventory leaving, or all of them
    /// when the inventory is emptied. Prices play no part, so collateral
    /// held by transfers is never touched. Returns the amount released.
    pub async fn withdraw(&self, caller: AccountId, req: WarehouseMove) -> Result<Quantity, EngineError> {
        validate_quantities(&req.assets)?;
        let wallet = access::caller_wallet(self.store.as_ref(), caller, req.wallet.as_deref()).await?;
        let warehouse = access::warehouse(self.store.as_ref(), req.warehouse).await?;
        access::require_member(self.store.as_ref(), warehouse.id, caller).await?;

        let mut tx = self.store.begin().await?;
        let result = async {
            let selector = AccountSelector::Warehouse(warehouse.id);
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::debit_assets(selector.clone(), &req.assets),
            )
            .await?;
            unit::apply(
                tx.as_mut(),
                &ConditionalMutation::credit_assets(AccountSelector::Id(wallet.id), &req.assets),
            )
            .await?;

            let after = tx
                .resolve(&selector)
                .await?
                .ok_or_else(|| EngineError::not_found(&selector))?;
            let releases = deposit_releases(&after, &req.assets);
            let released = releases.values().sum::<Quantity>();
            if released > 0 {
                unit::apply(
                    tx.as_mut(),
                    &ConditionalMutation::release_deposit_locks(warehouse.id, &releases),
                )
                .await?;
            }
            Ok::<_, EngineError>(released)
        }
        .await;
        let released = unit::finish(tx, result).await?;

        info!(warehouse = warehouse.id, wallet = wallet.id, released, "Withdrawal committed");
        self.record(wallet.id, ActivityKind::Withdrawal, &warehouse, req.assets)
            .await;
        Ok(released)
    }

    async fn record(&self, wallet: AccountId, kind: ActivityKind, warehouse: &Account, assets: Assets) {
        self.activity
            .push(
                wallet,
                ActivityRecord {
                    kind,
                    interactant: warehouse.display_name(),
                    assets,
                    memo: None,
                    timestamp: self.clock.now(),
                },
            )
            .await;
    }
}

/// Deposit locks freed by taking `withdrawn` out of a warehouse whose
/// state after the debit is `after`
fn deposit_releases(after: &Account, withdrawn: &Assets) -> Assets {
    withdrawn
        .iter()
        .filter_map(|(symbol, taken)| {
            let locked = after.deposit_lock(symbol.as_str());
            let remaining = after.balance(symbol.as_str());
            let release = if remaining == 0 {
                locked
            } else {
                let held = i128::from(remaining) + i128::from(*taken);
                // At most `locked`, so it fits back into a Quantity
                (i128::from(locked) * i128::from(*taken) / held) as Quantity
            };
            (release > 0).then(|| (symbol.clone(), release))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountKind, AssetSymbol};
    use chrono::Utc;

    fn assets(pairs: &[(&str, i64)]) -> Assets {
        pairs
            .iter()
            .map(|(s, q)| (AssetSymbol::new(s).unwrap(), *q))
            .collect()
    }

    fn depot(balances: Assets, deposit_locks: Assets) -> Account {
        Account {
            id: 7,
            kind: AccountKind::Warehouse,
            address: None,
            name: Some("depot".to_string()),
            owner: None,
            webhook: None,
            balances,
            collateral: 1000,
            collateral_available: 0,
            deposit_locks,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_deposit_releases_pro_rata() {
        // 3 of 10 wood leave; 7 remain against a 200 lock
        let after = depot(assets(&[("wood", 7)]), assets(&[("wood", 200)]));
        assert_eq!(
            deposit_releases(&after, &assets(&[("wood", 3)])),
            assets(&[("wood", 60)])
        );

        // Rounds down; the remainder goes out with the last unit
        let after = depot(assets(&[("silk", 2)]), assets(&[("silk", 4)]));
        assert_eq!(
            deposit_releases(&after, &assets(&[("silk", 1)])),
            assets(&[("silk", 1)])
        );
    }

    #[test]
    fn test_emptied_inventory_releases_whole_lock() {
        let after = depot(Assets::new(), assets(&[("wood", 200), ("silk", 4)]));
        assert_eq!(
            deposit_releases(&after, &assets(&[("wood", 10), ("silk", 11)])),
            assets(&[("wood", 200), ("silk", 4)])
        );
    }

    #[test]
    fn test_inventory_without_deposit_lock_releases_nothing() {
        // Received through a transfer, never deposited
        let after = depot(assets(&[("gold", 5)]), Assets::new());
        assert!(deposit_releases(&after, &assets(&[("gold", 5)])).is_empty());
    }
}
