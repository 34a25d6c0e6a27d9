//! Credit cost policy and the debit/refund path. Balances are only ever
//! mutated through the store's atomic update.

use std::sync::Arc;
use std::time::Duration;

use esg_core::{
    ActivityKind, ActivityRecord, AnalysisKind, AnalysisStore, EsgError, EsgResult, UserId,
};

/// Bound on the atomic balance update.
const CREDIT_OP_TIMEOUT: Duration = Duration::from_millis(500);

pub const QUICK_COST: i64 = 1;
pub const FULL_COST: i64 = 5;
pub const URL_FETCH_SURCHARGE: i64 = 2;
/// A cache hit still debits the quick cost to meter usage.
pub const CACHE_HIT_COST: i64 = 1;

/// Cost of a fresh analysis run.
pub fn analysis_cost(kind: AnalysisKind, fetches_url: bool) -> i64 {
    let base = match kind {
        AnalysisKind::Quick => QUICK_COST,
        AnalysisKind::Full => FULL_COST,
    };
    base + if fetches_url { URL_FETCH_SURCHARGE } else { 0 }
}

pub struct CreditGovernor {
    store: Arc<dyn AnalysisStore>,
}

impl CreditGovernor {
    pub fn new(store: Arc<dyn AnalysisStore>) -> Self {
        Self { store }
    }

    /// Atomically debits `amount` credits and returns the new balance.
    /// Anonymous principals carry no balance and are not metered here.
    /// A refused debit is recorded as `credit_denied` activity.
    pub async fn debit(&self, user: &UserId, amount: i64) -> EsgResult<i64> {
        if user.is_anonymous() || amount == 0 {
            return Ok(0);
        }
        match self.update_credits_bounded(user, -amount).await {
            Ok(balance) => Ok(balance),
            Err(err @ EsgError::InsufficientCredits { .. }) => {
                let record = ActivityRecord::new(
                    user.clone(),
                    ActivityKind::CreditDenied,
                    serde_json::json!({ "requested": amount }),
                );
                if let Err(activity_err) = self.store.record_activity(record).await {
                    tracing::warn!(error = %activity_err, "failed to record credit denial");
                }
                Err(err)
            }
            Err(other) => Err(other),
        }
    }

    /// Compensating refund after a post-debit failure, recorded in the
    /// activity trail.
    pub async fn refund(&self, user: &UserId, amount: i64) -> EsgResult<i64> {
        if user.is_anonymous() || amount == 0 {
            return Ok(0);
        }
        let balance = self.update_credits_bounded(user, amount).await?;
        let record = ActivityRecord::new(
            user.clone(),
            ActivityKind::CreditRefund,
            serde_json::json!({ "refunded": amount }),
        );
        if let Err(err) = self.store.record_activity(record).await {
            tracing::warn!(error = %err, "failed to record credit refund");
        }
        Ok(balance)
    }

    async fn update_credits_bounded(&self, user: &UserId, delta: i64) -> EsgResult<i64> {
        tokio::time::timeout(CREDIT_OP_TIMEOUT, self.store.update_user_credits(user, delta))
            .await
            .map_err(|_| EsgError::Timeout {
                operation: "update_user_credits".to_string(),
                duration_ms: CREDIT_OP_TIMEOUT.as_millis() as u64,
            })?
    }

    pub async fn balance(&self, user: &UserId) -> EsgResult<i64> {
        if user.is_anonymous() {
            return Ok(0);
        }
        Ok(self
            .store
            .get_user(user)
            .await?
            .map(|u| u.credits)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esg_core::{Tier, User};
    use esg_db::MemoryStore;

    async fn store_with_credits(credits: i64) -> (Arc<MemoryStore>, UserId) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(User::register("credits@example.com", Tier::Free, credits))
            .await
            .unwrap();
        (store, user.id)
    }

    #[test]
    fn cost_policy_matches_contract() {
        assert_eq!(analysis_cost(AnalysisKind::Quick, false), 1);
        assert_eq!(analysis_cost(AnalysisKind::Full, false), 5);
        assert_eq!(analysis_cost(AnalysisKind::Full, true), 7);
        assert_eq!(analysis_cost(AnalysisKind::Quick, true), 3);
        assert_eq!(CACHE_HIT_COST, 1);
    }

    #[tokio::test]
    async fn debit_and_refund_round_trip() {
        let (store, user) = store_with_credits(10).await;
        let governor = CreditGovernor::new(store.clone());

        assert_eq!(governor.debit(&user, 7).await.unwrap(), 3);
        assert_eq!(governor.refund(&user, 7).await.unwrap(), 10);

        let activity = store.list_activity(&user, 10).await.unwrap();
        assert!(activity
            .iter()
            .any(|a| a.kind == ActivityKind::CreditRefund));
    }

    #[tokio::test]
    async fn refused_debit_records_denial_and_keeps_balance() {
        let (store, user) = store_with_credits(3).await;
        let governor = CreditGovernor::new(store.clone());

        let err = governor.debit(&user, 5).await.unwrap_err();
        assert_eq!(err.error_kind(), "insufficient_credits");
        assert_eq!(governor.balance(&user).await.unwrap(), 3);

        let activity = store.list_activity(&user, 10).await.unwrap();
        assert!(activity
            .iter()
            .any(|a| a.kind == ActivityKind::CreditDenied));
    }

    #[tokio::test]
    async fn anonymous_users_are_not_metered() {
        let store = Arc::new(MemoryStore::new());
        let governor = CreditGovernor::new(store);
        assert_eq!(governor.debit(&UserId::anonymous(), 5).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_for_the_last_credit_succeed_once() {
        let (store, user) = store_with_credits(1).await;
        let governor = Arc::new(CreditGovernor::new(store));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let governor = governor.clone();
            let user = user.clone();
            tasks.push(tokio::spawn(async move { governor.debit(&user, 1).await }));
        }

        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(governor.balance(&user).await.unwrap(), 0);
    }
}
