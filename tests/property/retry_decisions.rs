use std::time::Duration;

use feedflow_pull::{Backoff, FetchError, RetryDecision, RetryPolicy};
use proptest::prelude::*;

fn arbitrary_error() -> impl Strategy<Value = FetchError> {
    prop_oneof![
        Just(FetchError::Timeout),
        Just(FetchError::Transport("connection refused".to_string())),
        (400u16..600).prop_map(FetchError::Status),
    ]
}

proptest! {
    #[test]
    fn attempts_at_or_beyond_the_cap_always_give_up(
        max_attempts in 1u32..10,
        beyond in 0u32..5,
        error in arbitrary_error(),
    ) {
        let policy = RetryPolicy::builder()
            .max_attempts(max_attempts)
            .backoff(Backoff::constant(Duration::from_millis(1)))
            .build();
        prop_assert_eq!(
            policy.decide(max_attempts + beyond, &error),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn client_errors_never_retry_under_the_default_predicate(
        attempts in 1u32..4,
        code in 400u16..500,
    ) {
        let policy = RetryPolicy::builder().max_attempts(5).build();
        prop_assert_eq!(
            policy.decide(attempts, &FetchError::Status(code)),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn retryable_errors_under_the_cap_always_wait(
        attempts in 1u32..5,
        code in 500u16..600,
    ) {
        let policy = RetryPolicy::builder()
            .max_attempts(6)
            .backoff(Backoff::constant(Duration::from_millis(10)))
            .build();
        prop_assert_eq!(
            policy.decide(attempts, &FetchError::Status(code)),
            RetryDecision::RetryAfter(Duration::from_millis(10))
        );
    }
}
