//! Credit check in front of content generation

use crate::api::ContentApi;

/// Whether a generation may start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateGate {
    /// Go ahead
    Allowed,
    /// Out of credits; show the upgrade prompt
    Paywall,
}

/// Checks the user's credits before spending one
#[derive(Debug, Clone, Copy, Default)]
pub struct CreditGuard;

impl CreditGuard {
    /// Ask the backend whether a generation may start
    ///
    /// A failed credit lookup does not block the user: the backend enforces
    /// the limit again when the generation request arrives.
    pub async fn check(&self, api: &dyn ContentApi) -> GenerateGate {
        match api.user_credits().await {
            Ok(credits) if credits.can_generate() => GenerateGate::Allowed,
            Ok(credits) => {
                tracing::info!(available = credits.available_credits, "generation blocked by paywall");
                GenerateGate::Paywall
            }
            Err(e) => {
                tracing::warn!("credit lookup failed, allowing generation: {e}");
                GenerateGate::Allowed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, MockContentApi, UserCredits};

    fn api_with(result: Result<UserCredits, ApiError>) -> MockContentApi {
        let mut api = MockContentApi::new();
        api.expect_user_credits()
            .times(1)
            .return_once(move || result);
        api
    }

    #[tokio::test]
    async fn zero_credits_hit_the_paywall() {
        let api = api_with(Ok(UserCredits::default()));
        assert_eq!(CreditGuard.check(&api).await, GenerateGate::Paywall);
    }

    #[tokio::test]
    async fn unlimited_plan_is_allowed() {
        let api = api_with(Ok(UserCredits {
            available_credits: 0,
            is_unlimited: true,
        }));
        assert_eq!(CreditGuard.check(&api).await, GenerateGate::Allowed);
    }

    #[tokio::test]
    async fn lookup_failure_fails_open() {
        let api = api_with(Err(ApiError::Transport("timeout".into())));
        assert_eq!(CreditGuard.check(&api).await, GenerateGate::Allowed);
    }
}
