//! Atomic unit helpers
//!
//! A service opens a [`LedgerTx`], runs its body against it, then hands
//! the body's result to [`finish`]: success commits, failure rolls back.
//! A commit can still abort when a staged write no longer holds.

use crate::core_types::AccountId;
use crate::error::EngineError;
use crate::ledger::{ConditionalMutation, LedgerTx, MutationOutcome, UnitOutcome};

/// Commit on `Ok`, roll back on `Err`
pub async fn finish<T>(
    tx: Box<dyn LedgerTx>,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    match result {
        Ok(value) => match tx.commit().await? {
            UnitOutcome::Committed(()) => Ok(value),
            UnitOutcome::Aborted(reason) => {
                let err = EngineError::from(reason);
                if matches!(err, EngineError::InvariantViolation(_)) {
                    tracing::error!(error = %err, "Unit aborted at commit");
                } else {
                    tracing::info!(error = %err, "Unit aborted at commit");
                }
                Err(err)
            }
        },
        Err(err) => {
            if let Err(e) = tx.rollback().await {
                tracing::warn!(error = %e, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// Apply `mutation`, turning anything but `Applied` into the matching error
pub async fn apply(
    tx: &mut dyn LedgerTx,
    mutation: &ConditionalMutation,
) -> Result<AccountId, EngineError> {
    match tx.apply(mutation).await? {
        MutationOutcome::Applied(id) => Ok(id),
        MutationOutcome::NotFound => Err(EngineError::not_found(&mutation.selector)),
        MutationOutcome::InsufficientBalance { account, field } => {
            Err(EngineError::insufficient(account, &field))
        }
        MutationOutcome::InvariantViolation(msg) => {
            tracing::error!(selector = %mutation.selector, %msg, "Invariant violation");
            Err(EngineError::InvariantViolation(msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AssetSymbol, NewAccount};
    use crate::core_types::Assets;
    use crate::ledger::{AccountSelector, LedgerStore, MemoryLedger};

    fn gold(q: i64) -> Assets {
        [(AssetSymbol::new("gold").unwrap(), q)].into_iter().collect()
    }

    #[tokio::test]
    async fn test_failed_body_rolls_back() {
        let ledger = MemoryLedger::default();
        let alice = ledger
            .create_account(NewAccount::wallet("alice"))
            .await
            .unwrap();
        let selector = AccountSelector::Id(alice.id);

        let mut tx = ledger.begin().await.unwrap();
        let credit = ConditionalMutation::credit_assets(selector.clone(), &gold(5));
        let debit = ConditionalMutation::debit_assets(selector.clone(), &gold(6));
        let result = async {
            apply(tx.as_mut(), &credit).await?;
            apply(tx.as_mut(), &debit).await
        }
        .await;
        assert_eq!(
            finish(tx, result).await,
            Err(EngineError::InsufficientBalance("gold".into()))
        );

        let after = ledger.account(&selector).await.unwrap().unwrap();
        assert!(after.balances.is_empty());
    }

    #[tokio::test]
    async fn test_missing_account_maps_to_not_found() {
        let ledger = MemoryLedger::default();
        let mut tx = ledger.begin().await.unwrap();

        let credit = ConditionalMutation::credit_assets(AccountSelector::Warehouse(42), &gold(1));
        assert_eq!(
            apply(tx.as_mut(), &credit).await,
            Err(EngineError::WarehouseNotFound(42))
        );

        let credit = ConditionalMutation::credit_assets(
            AccountSelector::Address("nobody".into()),
            &gold(1),
        );
        assert!(matches!(
            apply(tx.as_mut(), &credit).await,
            Err(EngineError::AccountNotFound(_))
        ));
    }
}
