//! Checkout session initiation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::domain::money::commission_minor;
use crate::domain::NewTransaction;
use crate::error::GatewayError;
use crate::persistence::PledgeStore;
use crate::provider::{CheckoutProvider, CheckoutSession, SessionRequest};

/// Initiates hosted checkout sessions for payable challenges.
///
/// Order of operations: rate limit, ownership and status checks, amount
/// bounds, atomic reservation of the single in-flight transaction slot,
/// provider session creation, session-id attachment. The slot is reserved
/// *before* the provider call so two payable attempts can never both
/// persist; a provider failure releases the slot again.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    store: Arc<dyn PledgeStore>,
    provider: Arc<dyn CheckoutProvider>,
    config: Arc<GatewayConfig>,
}

impl CheckoutService {
    /// Creates a new `CheckoutService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn PledgeStore>,
        provider: Arc<dyn CheckoutProvider>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Initiates a checkout session for `challenge_id` on behalf of
    /// `user_id`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::RateLimited`] past the per-user attempt budget,
    /// [`GatewayError::ChallengeNotFound`] when the challenge is absent or
    /// owned by someone else, [`GatewayError::InvalidTransition`] when the
    /// challenge is not in a payable status,
    /// [`GatewayError::AmountOutOfRange`] for an out-of-bounds stake,
    /// [`GatewayError::AlreadyPaid`] when a settled payment already exists,
    /// [`GatewayError::Provider`] when session creation fails,
    /// [`GatewayError::Datastore`] on storage failure.
    pub async fn initiate(
        &self,
        user_id: &str,
        challenge_id: Uuid,
        amount_minor: i64,
    ) -> Result<CheckoutSession, GatewayError> {
        let now = Utc::now();

        let window = Duration::seconds(self.config.checkout_rate_limit_window_secs);
        let attempts = self
            .store
            .record_checkout_attempt(user_id, window, now)
            .await?;
        if attempts > self.config.checkout_rate_limit_max {
            return Err(GatewayError::RateLimited {
                retry_after_ms: self
                    .config
                    .checkout_rate_limit_window_secs
                    .unsigned_abs()
                    .saturating_mul(1_000),
            });
        }

        let Some((challenge, _)) = self.store.challenge_for_user(challenge_id, user_id).await?
        else {
            return Err(GatewayError::ChallengeNotFound(challenge_id));
        };

        if !challenge.status.is_payable() {
            return Err(GatewayError::InvalidTransition(format!(
                "challenge in status {} is not payable",
                challenge.status
            )));
        }

        if amount_minor < self.config.min_stake_minor || amount_minor > self.config.max_stake_minor
        {
            return Err(GatewayError::AmountOutOfRange {
                amount_minor,
                min_minor: self.config.min_stake_minor,
                max_minor: self.config.max_stake_minor,
            });
        }

        let transaction = self
            .store
            .reserve_transaction(NewTransaction {
                challenge_id,
                user_id: user_id.to_string(),
                amount_minor,
                commission_minor: commission_minor(amount_minor, self.config.commission_rate),
                created_at: now,
            })
            .await?;

        let request = SessionRequest {
            challenge_id,
            user_id: user_id.to_string(),
            title: challenge.title.clone(),
            amount_minor,
            currency: self.config.currency.clone(),
            expires_at: now + Duration::seconds(self.config.checkout_expiry_secs),
            success_url: format!(
                "{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}",
                self.config.app_base_url
            ),
            cancel_url: format!(
                "{}/payment/cancel?challenge_id={challenge_id}",
                self.config.app_base_url
            ),
        };

        let session = match self.provider.create_session(&request).await {
            Ok(session) => session,
            Err(e) => {
                // Release the in-flight slot so the user can retry.
                if let Err(release) = self.store.abandon_transaction(transaction.id, now).await {
                    tracing::error!(
                        transaction_id = %transaction.id,
                        error = %release,
                        "failed to release reservation after provider error"
                    );
                }
                return Err(e);
            }
        };

        self.store
            .attach_session(transaction.id, &session.session_id)
            .await?;

        tracing::info!(
            %challenge_id,
            transaction_id = %transaction.id,
            session_id = %session.session_id,
            "checkout session initiated"
        );
        Ok(session)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ChallengeStatus, NewChallenge, TransactionStatus};
    use crate::persistence::{ApplyOutcome, EventEffect, MemoryStore};
    use crate::ingress::EventRecord;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct MockProvider {
        fail: AtomicBool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CheckoutProvider for MockProvider {
        async fn create_session(
            &self,
            request: &SessionRequest,
        ) -> Result<CheckoutSession, GatewayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(GatewayError::Provider("session creation refused".to_string()));
            }
            Ok(CheckoutSession {
                session_id: format!("cs_{call}"),
                redirect_url: format!("https://pay.example/{}", request.challenge_id),
            })
        }
    }

    struct Fixture {
        service: CheckoutService,
        store: Arc<MemoryStore>,
        provider: Arc<MockProvider>,
        challenge_id: Uuid,
    }

    fn test_config() -> GatewayConfig {
        use rust_decimal_macros::dec;
        GatewayConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap_or_else(|_| panic!("addr")),
            store_backend: crate::config::StoreBackend::Memory,
            database_url: String::new(),
            database_max_connections: 1,
            database_min_connections: 0,
            database_connect_timeout_secs: 1,
            webhook_signing_secret: "whsec_test".to_string(),
            signature_tolerance_secs: 300,
            commission_rate: dec!(0.15),
            min_stake_minor: 1_000,
            max_stake_minor: 50_000,
            currency: "eur".to_string(),
            checkout_expiry_secs: 1_800,
            checkout_rate_limit_max: 3,
            checkout_rate_limit_window_secs: 300,
            provider_api_base: "https://api.payments.example".to_string(),
            provider_secret_key: "sk_test".to_string(),
            app_base_url: "http://localhost:3000".to_string(),
        }
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(MockProvider::default());
        let config = Arc::new(test_config());
        let Ok(challenge) = store
            .insert_challenge(NewChallenge {
                user_id: "user_1".to_string(),
                title: "no sugar for a month".to_string(),
                description: None,
                amount_minor: 5_000,
                duration_days: 30,
                start_date: Utc::now(),
                association_id: Uuid::new_v4(),
            })
            .await
        else {
            panic!("seed challenge failed");
        };
        let service = CheckoutService::new(
            Arc::clone(&store) as Arc<dyn PledgeStore>,
            Arc::clone(&provider) as Arc<dyn CheckoutProvider>,
            config,
        );
        Fixture {
            service,
            store,
            provider,
            challenge_id: challenge.id,
        }
    }

    #[tokio::test]
    async fn initiates_session_and_persists_reservation() {
        let f = fixture().await;
        let Ok(session) = f.service.initiate("user_1", f.challenge_id, 5_000).await else {
            panic!("initiate failed");
        };
        assert_eq!(session.session_id, "cs_0");

        let Ok(Some((_, Some(t)))) = f.store.challenge_for_user(f.challenge_id, "user_1").await
        else {
            panic!("fetch failed");
        };
        assert_eq!(t.status, TransactionStatus::Initiated);
        assert_eq!(t.session_id.as_deref(), Some("cs_0"));
        assert_eq!(t.commission_minor, 750); // 15% of 50.00
    }

    #[tokio::test]
    async fn unknown_challenge_is_not_found() {
        let f = fixture().await;
        let result = f.service.initiate("user_1", Uuid::new_v4(), 5_000).await;
        assert!(matches!(result, Err(GatewayError::ChallengeNotFound(_))));
    }

    #[tokio::test]
    async fn foreign_challenge_is_not_found() {
        let f = fixture().await;
        let result = f.service.initiate("user_2", f.challenge_id, 5_000).await;
        assert!(matches!(result, Err(GatewayError::ChallengeNotFound(_))));
    }

    #[tokio::test]
    async fn out_of_range_amount_is_rejected() {
        let f = fixture().await;
        for amount in [0, 999, 50_001] {
            let result = f.service.initiate("user_1", f.challenge_id, amount).await;
            assert!(
                matches!(result, Err(GatewayError::AmountOutOfRange { .. })),
                "amount {amount} should be out of range"
            );
        }
    }

    #[tokio::test]
    async fn settled_challenge_is_not_payable() {
        let f = fixture().await;
        let Ok(_) = f.service.initiate("user_1", f.challenge_id, 5_000).await else {
            panic!("initiate failed");
        };
        let Ok(outcome) = f
            .store
            .claim_and_apply(
                &EventRecord {
                    event_id: "evt_pay".to_string(),
                    event_type: "payment_intent.succeeded".to_string(),
                    occurred_at: Utc::now(),
                    payload: serde_json::json!({}),
                },
                EventEffect::ConfirmPayment {
                    challenge_id: f.challenge_id,
                    payment_intent_id: "pi_1".to_string(),
                    reported_amount_minor: 5_000,
                    received_at: Utc::now(),
                },
            )
            .await
        else {
            panic!("confirm failed");
        };
        assert_eq!(outcome, ApplyOutcome::Applied);

        let result = f.service.initiate("user_1", f.challenge_id, 5_000).await;
        assert!(matches!(result, Err(GatewayError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn provider_failure_releases_the_slot() {
        let f = fixture().await;
        f.provider.fail.store(true, Ordering::SeqCst);
        let result = f.service.initiate("user_1", f.challenge_id, 5_000).await;
        assert!(matches!(result, Err(GatewayError::Provider(_))));

        let Ok(Some((c, Some(t)))) = f.store.challenge_for_user(f.challenge_id, "user_1").await
        else {
            panic!("fetch failed");
        };
        assert_eq!(c.status, ChallengeStatus::Draft);
        assert_eq!(t.status, TransactionStatus::Failed);

        // The slot is free again: a retry succeeds.
        f.provider.fail.store(false, Ordering::SeqCst);
        let Ok(_) = f.service.initiate("user_1", f.challenge_id, 5_000).await else {
            panic!("retry failed");
        };
    }

    #[tokio::test]
    async fn retries_reuse_the_single_in_flight_slot() {
        let f = fixture().await;
        let Ok(first) = f.service.initiate("user_1", f.challenge_id, 5_000).await else {
            panic!("first initiate failed");
        };
        let Ok(second) = f.service.initiate("user_1", f.challenge_id, 6_000).await else {
            panic!("second initiate failed");
        };
        assert_ne!(first.session_id, second.session_id);

        let rows = f.store.transactions_for_challenge(f.challenge_id).await;
        assert_eq!(rows.len(), 1, "one non-terminal attempt at a time");
        let Some(row) = rows.first() else {
            panic!("missing reservation");
        };
        assert_eq!(row.amount_minor, 6_000);
        assert_eq!(row.session_id.as_deref(), Some(second.session_id.as_str()));
    }

    #[tokio::test]
    async fn rate_limit_kicks_in_after_budget() {
        let f = fixture().await;
        // Budget is 3 attempts per window in the default config.
        for _ in 0..3 {
            let Ok(_) = f.service.initiate("user_1", f.challenge_id, 5_000).await else {
                panic!("initiate within budget failed");
            };
        }
        let result = f.service.initiate("user_1", f.challenge_id, 5_000).await;
        assert!(matches!(result, Err(GatewayError::RateLimited { .. })));
    }
}
