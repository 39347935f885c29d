//! Ledger Engine - the operations request handlers call
//!
//! Wires the store, price cache, webhook notifier, activity sink and
//! notification hub into the transfer services, and adds account
//! administration on top.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::info;

use crate::account::validation::{validate_warehouse_name, validate_webhook};
use crate::account::{Account, AssetSymbol, NewAccount, WalletAddress, WarehouseRole};
use crate::activity::{ActivityRecord, ActivitySink, LedgerEvent, NotificationHub, SubscriptionId};
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::core_types::{AccountId, Assets, Quantity};
use crate::error::EngineError;
use crate::ledger::{AccountSelector, LedgerStore, StoreError};
use crate::pricing::{PriceCache, Valuator};
use crate::transfer::access;
use crate::transfer::{
    CollateralService, CreateTransfer, PaymentReceipt, PaymentService, SendRequest, TransferCoordinator,
    TransferId, TransferRecord, WarehouseMove, WebhookNotifier,
};

/// Collaborators the engine is built from
pub struct EngineParts {
    pub store: Arc<dyn LedgerStore>,
    pub prices: Arc<PriceCache>,
    pub webhook: Arc<dyn WebhookNotifier>,
    pub activity: Arc<dyn ActivitySink>,
    pub hub: Arc<NotificationHub>,
    pub clock: Arc<dyn Clock>,
}

/// Live event stream for one wallet
pub struct Subscription {
    pub channel: String,
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<LedgerEvent>,
}

pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    valuator: Arc<Valuator>,
    activity: Arc<dyn ActivitySink>,
    hub: Arc<NotificationHub>,
    payments: PaymentService,
    transfers: TransferCoordinator,
    collateral: CollateralService,
}

impl LedgerEngine {
    pub fn new(parts: EngineParts, config: &LedgerConfig) -> Result<Self, EngineError> {
        let reserve = AssetSymbol::new(&config.reserve_asset)?;
        let valuator = Arc::new(Valuator::new(parts.prices, reserve.clone()));

        let payments = PaymentService::new(
            parts.store.clone(),
            valuator.clone(),
            parts.webhook,
            parts.activity.clone(),
            parts.hub.clone(),
            parts.clock.clone(),
            config.treasury_address.clone(),
        );
        let transfers = TransferCoordinator::new(parts.store.clone(), valuator.clone(), parts.clock);
        let collateral = CollateralService::new(parts.store.clone(), reserve);

        Ok(Self {
            store: parts.store,
            valuator,
            activity: parts.activity,
            hub: parts.hub,
            payments,
            transfers,
            collateral,
        })
    }

    pub fn valuator(&self) -> &Arc<Valuator> {
        &self.valuator
    }

    // ========================================================================
    // Account administration
    // ========================================================================

    /// Create a wallet; with `owner`, a custodial wallet owned by that wallet
    pub async fn create_wallet(
        &self,
        owner: Option<AccountId>,
        address: &str,
        webhook: Option<&str>,
    ) -> Result<Account, EngineError> {
        let address = WalletAddress::new(address)?;
        let webhook = webhook.map(validate_webhook).transpose()?;
        if let Some(owner) = owner {
            access::caller_wallet(self.store.as_ref(), owner, None).await?;
        }

        let mut new = NewAccount::wallet(address.as_str());
        new.owner = owner;
        new.webhook = webhook;

        let account = self.store.create_account(new).await.map_err(|e| match e {
            StoreError::Duplicate(_) => EngineError::AddressTaken(address.to_string()),
            other => other.into(),
        })?;
        info!(account = account.id, address = %address, custodial = owner.is_some(), "Wallet created");
        Ok(account)
    }

    /// Create a warehouse with the caller as its owner
    pub async fn create_warehouse(&self, caller: AccountId, name: &str) -> Result<Account, EngineError> {
        let name = validate_warehouse_name(name)?;
        access::caller_wallet(self.store.as_ref(), caller, None).await?;

        let warehouse = self.store.create_account(NewAccount::warehouse(name)).await?;
        self.store
            .set_member(warehouse.id, caller, WarehouseRole::Owner)
            .await?;
        info!(warehouse = warehouse.id, owner = caller, "Warehouse created");
        Ok(warehouse)
    }

    /// Assign a wallet to a warehouse as a worker (owner only)
    pub async fn assign_worker(
        &self,
        caller: AccountId,
        warehouse: AccountId,
        worker: &str,
    ) -> Result<(), EngineError> {
        let address = WalletAddress::new(worker)?;
        let target = access::warehouse(self.store.as_ref(), warehouse).await?;
        access::require_owner(self.store.as_ref(), target.id, caller).await?;

        let selector = AccountSelector::Address(address.into_string());
        let wallet = self
            .store
            .account(&selector)
            .await?
            .ok_or_else(|| EngineError::AccountNotFound(selector.to_string()))?;

        if self.store.role(target.id, wallet.id).await? == Some(WarehouseRole::Owner) {
            return Ok(());
        }
        self.store
            .set_member(target.id, wallet.id, WarehouseRole::Worker)
            .await?;
        info!(warehouse = target.id, worker = wallet.id, "Worker assigned");
        Ok(())
    }

    /// Balances of the caller's primary wallet or a wallet it owns
    pub async fn balances(&self, caller: AccountId, wallet: Option<&str>) -> Result<Assets, EngineError> {
        let account = access::caller_wallet(self.store.as_ref(), caller, wallet).await?;
        Ok(account.balances)
    }

    pub async fn warehouse(&self, caller: AccountId, id: AccountId) -> Result<Account, EngineError> {
        let warehouse = access::warehouse(self.store.as_ref(), id).await?;
        access::require_member(self.store.as_ref(), warehouse.id, caller).await?;
        Ok(warehouse)
    }

    pub async fn recent_activity(
        &self,
        caller: AccountId,
        wallet: Option<&str>,
    ) -> Result<Vec<ActivityRecord>, EngineError> {
        let account = access::caller_wallet(self.store.as_ref(), caller, wallet).await?;
        Ok(self.activity.recent(account.id).await)
    }

    /// Real-time events for the caller's wallet (or one it owns)
    pub async fn subscribe(
        &self,
        caller: AccountId,
        wallet: Option<&str>,
    ) -> Result<Subscription, EngineError> {
        let account = access::caller_wallet(self.store.as_ref(), caller, wallet).await?;
        let channel = account.display_name();
        let (id, events) = self.hub.subscribe(&channel);
        Ok(Subscription {
            channel,
            id,
            events,
        })
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.hub.unsubscribe(&subscription.channel, subscription.id);
    }

    /// Value of `assets` in reserve units at current prices
    pub async fn valuate(&self, assets: &Assets) -> Result<Decimal, EngineError> {
        Ok(self.valuator.valuate(assets, true).await?)
    }

    // ========================================================================
    // Payments
    // ========================================================================

    pub async fn send(&self, caller: AccountId, req: SendRequest) -> Result<PaymentReceipt, EngineError> {
        self.payments.send(caller, req).await
    }

    pub async fn grant(
        &self,
        recipient: &str,
        assets: Assets,
        memo: Option<String>,
    ) -> Result<PaymentReceipt, EngineError> {
        self.payments.grant(recipient, assets, memo).await
    }

    pub async fn deposit(&self, caller: AccountId, req: WarehouseMove) -> Result<Quantity, EngineError> {
        self.payments.deposit(caller, req).await
    }

    pub async fn withdraw(&self, caller: AccountId, req: WarehouseMove) -> Result<Quantity, EngineError> {
        self.payments.withdraw(caller, req).await
    }

    // ========================================================================
    // Warehouse transfers
    // ========================================================================

    pub async fn create_transfer(
        &self,
        caller: AccountId,
        req: CreateTransfer,
    ) -> Result<TransferRecord, EngineError> {
        self.transfers.create(caller, req).await
    }

    pub async fn cancel_transfer(&self, caller: AccountId, id: TransferId) -> Result<(), EngineError> {
        self.transfers.cancel(caller, id).await
    }

    pub async fn advance_transfer(
        &self,
        caller: AccountId,
        id: TransferId,
    ) -> Result<TransferRecord, EngineError> {
        self.transfers.advance(caller, id).await
    }

    pub async fn confirm_transfer(&self, caller: AccountId, id: TransferId) -> Result<(), EngineError> {
        self.transfers.confirm(caller, id).await
    }

    pub async fn transfer(&self, caller: AccountId, id: TransferId) -> Result<TransferRecord, EngineError> {
        self.transfers.get(caller, id).await
    }

    // ========================================================================
    // Collateral
    // ========================================================================

    pub async fn adjust_collateral(
        &self,
        caller: AccountId,
        warehouse: AccountId,
        amount: Quantity,
    ) -> Result<Account, EngineError> {
        self.collateral.adjust(caller, warehouse, amount).await
    }
}
