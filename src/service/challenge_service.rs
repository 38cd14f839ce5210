//! Challenge lifecycle: creation, retrieval, draft deletion, and outcome
//! declarations.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::domain::{Challenge, NewChallenge, Transaction};
use crate::error::GatewayError;
use crate::persistence::{DeclaredOutcome, PledgeStore};

/// Upper bound on challenge duration; a year-long commitment is the
/// longest the product supports.
const MAX_DURATION_DAYS: i32 = 365;

/// Input for challenge creation, validated by the service.
#[derive(Debug, Clone)]
pub struct CreateChallenge {
    /// Short title.
    pub title: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Stake in currency minor units.
    pub amount_minor: i64,
    /// Duration in days.
    pub duration_days: i32,
    /// Start date.
    pub start_date: chrono::DateTime<Utc>,
    /// Beneficiary association.
    pub association_id: Uuid,
}

/// Orchestrates challenge operations against the store.
#[derive(Debug, Clone)]
pub struct ChallengeService {
    store: Arc<dyn PledgeStore>,
    config: Arc<GatewayConfig>,
}

impl ChallengeService {
    /// Creates a new `ChallengeService`.
    #[must_use]
    pub fn new(store: Arc<dyn PledgeStore>, config: Arc<GatewayConfig>) -> Self {
        Self { store, config }
    }

    /// Creates a draft challenge owned by `user_id`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidRequest`] on an empty title or non-positive
    /// duration, [`GatewayError::AmountOutOfRange`] for an out-of-bounds
    /// stake, [`GatewayError::Datastore`] on storage failure.
    pub async fn create(
        &self,
        user_id: &str,
        input: CreateChallenge,
    ) -> Result<Challenge, GatewayError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "title must not be empty".to_string(),
            ));
        }
        if input.duration_days < 1 || input.duration_days > MAX_DURATION_DAYS {
            return Err(GatewayError::InvalidRequest(format!(
                "duration must be between 1 and {MAX_DURATION_DAYS} days"
            )));
        }
        if input.amount_minor < self.config.min_stake_minor
            || input.amount_minor > self.config.max_stake_minor
        {
            return Err(GatewayError::AmountOutOfRange {
                amount_minor: input.amount_minor,
                min_minor: self.config.min_stake_minor,
                max_minor: self.config.max_stake_minor,
            });
        }

        let challenge = self
            .store
            .insert_challenge(NewChallenge {
                user_id: user_id.to_string(),
                title: title.to_string(),
                description: input.description,
                amount_minor: input.amount_minor,
                duration_days: input.duration_days,
                start_date: input.start_date,
                association_id: input.association_id,
            })
            .await?;

        tracing::info!(challenge_id = %challenge.id, "challenge created");
        Ok(challenge)
    }

    /// Fetches a challenge owned by `user_id`, with its latest transaction.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ChallengeNotFound`] when absent or owned by another
    /// user, [`GatewayError::Datastore`] on storage failure.
    pub async fn get(
        &self,
        user_id: &str,
        challenge_id: Uuid,
    ) -> Result<(Challenge, Option<Transaction>), GatewayError> {
        self.store
            .challenge_for_user(challenge_id, user_id)
            .await?
            .ok_or(GatewayError::ChallengeNotFound(challenge_id))
    }

    /// Deletes a draft challenge owned by `user_id`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ChallengeNotFound`], [`GatewayError::InvalidTransition`]
    /// when the challenge is past draft, [`GatewayError::Datastore`] on
    /// storage failure.
    pub async fn delete_draft(&self, user_id: &str, challenge_id: Uuid) -> Result<(), GatewayError> {
        self.store.delete_draft(challenge_id, user_id).await?;
        tracing::info!(%challenge_id, "draft challenge deleted");
        Ok(())
    }

    /// Declares the challenge successfully completed before its deadline.
    /// The settled stake is refunded minus commission, or donated in full
    /// minus commission when `donate_anyway` is set.
    ///
    /// # Errors
    ///
    /// See [`PledgeStore::declare_success`].
    pub async fn declare_success(
        &self,
        user_id: &str,
        challenge_id: Uuid,
        note: Option<String>,
        donate_anyway: bool,
    ) -> Result<DeclaredOutcome, GatewayError> {
        let outcome = self
            .store
            .declare_success(challenge_id, user_id, note, donate_anyway, Utc::now())
            .await?;
        tracing::info!(
            %challenge_id,
            disposition = %outcome.transaction_status,
            payout_minor = outcome.payout_minor,
            "challenge declared successful"
        );
        Ok(outcome)
    }

    /// Declares the challenge failed; the stake is donated to the chosen
    /// association minus commission.
    ///
    /// # Errors
    ///
    /// See [`PledgeStore::declare_failure`].
    pub async fn declare_failure(
        &self,
        user_id: &str,
        challenge_id: Uuid,
        note: Option<String>,
    ) -> Result<DeclaredOutcome, GatewayError> {
        let outcome = self
            .store
            .declare_failure(challenge_id, user_id, note, Utc::now())
            .await?;
        tracing::info!(
            %challenge_id,
            payout_minor = outcome.payout_minor,
            "challenge declared failed; stake routed to association"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ChallengeStatus, NewTransaction, TransactionStatus};
    use crate::ingress::EventRecord;
    use crate::persistence::{EventEffect, MemoryStore};
    use rust_decimal_macros::dec;

    fn test_config() -> Arc<GatewayConfig> {
        Arc::new(GatewayConfig {
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
        })
    }

    fn create_input(amount_minor: i64) -> CreateChallenge {
        CreateChallenge {
            title: "cold showers only".to_string(),
            description: Some("every morning".to_string()),
            amount_minor,
            duration_days: 30,
            start_date: Utc::now(),
            association_id: Uuid::new_v4(),
        }
    }

    fn service() -> (ChallengeService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service =
            ChallengeService::new(Arc::clone(&store) as Arc<dyn PledgeStore>, test_config());
        (service, store)
    }

    /// Seeds an active challenge with a settled 100.00 payment at 15%
    /// commission.
    async fn activated(service: &ChallengeService, store: &MemoryStore) -> Uuid {
        let Ok(challenge) = service.create("user_1", create_input(10_000)).await else {
            panic!("create failed");
        };
        let Ok(_) = store
            .reserve_transaction(NewTransaction {
                challenge_id: challenge.id,
                user_id: "user_1".to_string(),
                amount_minor: 10_000,
                commission_minor: 1_500,
                created_at: Utc::now(),
            })
            .await
        else {
            panic!("reserve failed");
        };
        let Ok(_) = store
            .claim_and_apply(
                &EventRecord {
                    event_id: "evt_pay".to_string(),
                    event_type: "payment_intent.succeeded".to_string(),
                    occurred_at: Utc::now(),
                    payload: serde_json::json!({}),
                },
                EventEffect::ConfirmPayment {
                    challenge_id: challenge.id,
                    payment_intent_id: "pi_1".to_string(),
                    reported_amount_minor: 10_000,
                    received_at: Utc::now(),
                },
            )
            .await
        else {
            panic!("confirm failed");
        };
        challenge.id
    }

    #[tokio::test]
    async fn create_starts_in_draft() {
        let (service, _) = service();
        let Ok(challenge) = service.create("user_1", create_input(5_000)).await else {
            panic!("create failed");
        };
        assert_eq!(challenge.status, ChallengeStatus::Draft);
        assert!(challenge.end_date.is_none());
    }

    #[tokio::test]
    async fn create_validates_input() {
        let (service, _) = service();

        let mut empty_title = create_input(5_000);
        empty_title.title = "   ".to_string();
        assert!(matches!(
            service.create("user_1", empty_title).await,
            Err(GatewayError::InvalidRequest(_))
        ));

        let mut bad_duration = create_input(5_000);
        bad_duration.duration_days = 0;
        assert!(matches!(
            service.create("user_1", bad_duration).await,
            Err(GatewayError::InvalidRequest(_))
        ));

        assert!(matches!(
            service.create("user_1", create_input(500)).await,
            Err(GatewayError::AmountOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn success_without_donation_refunds_net_of_commission() {
        let (service, store) = service();
        let id = activated(&service, &store).await;

        let Ok(outcome) = service
            .declare_success("user_1", id, Some("done".to_string()), false)
            .await
        else {
            panic!("declare failed");
        };

        assert_eq!(outcome.challenge_status, ChallengeStatus::Validated);
        assert_eq!(outcome.transaction_status, TransactionStatus::Refunded);
        assert_eq!(outcome.payout_minor, 8_500);
    }

    #[tokio::test]
    async fn success_with_donation_routes_stake_to_association() {
        let (service, store) = service();
        let id = activated(&service, &store).await;

        let Ok(outcome) = service.declare_success("user_1", id, None, true).await else {
            panic!("declare failed");
        };
        assert_eq!(outcome.transaction_status, TransactionStatus::Donated);
        assert_eq!(outcome.payout_minor, 8_500);
    }

    #[tokio::test]
    async fn failure_donates_net_of_commission() {
        let (service, store) = service();
        let id = activated(&service, &store).await;

        let Ok(outcome) = service
            .declare_failure("user_1", id, Some("gave up".to_string()))
            .await
        else {
            panic!("declare failed");
        };

        assert_eq!(outcome.challenge_status, ChallengeStatus::Failed);
        assert_eq!(outcome.transaction_status, TransactionStatus::Donated);
        assert_eq!(outcome.payout_minor, 8_500);

        let Ok((challenge, _)) = service.get("user_1", id).await else {
            panic!("get failed");
        };
        assert_eq!(challenge.outcome_note.as_deref(), Some("gave up"));
    }

    #[tokio::test]
    async fn declaring_on_a_draft_is_rejected() {
        let (service, _) = service();
        let Ok(challenge) = service.create("user_1", create_input(5_000)).await else {
            panic!("create failed");
        };
        let result = service.declare_success("user_1", challenge.id, None, false).await;
        assert!(matches!(result, Err(GatewayError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn second_declaration_is_rejected() {
        let (service, store) = service();
        let id = activated(&service, &store).await;

        let Ok(_) = service.declare_success("user_1", id, None, false).await else {
            panic!("first declaration failed");
        };
        let result = service.declare_failure("user_1", id, None).await;
        assert!(matches!(result, Err(GatewayError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn delete_draft_removes_challenge() {
        let (service, _) = service();
        let Ok(challenge) = service.create("user_1", create_input(5_000)).await else {
            panic!("create failed");
        };
        let Ok(()) = service.delete_draft("user_1", challenge.id).await else {
            panic!("delete failed");
        };
        assert!(matches!(
            service.get("user_1", challenge.id).await,
            Err(GatewayError::ChallengeNotFound(_))
        ));
    }
}
