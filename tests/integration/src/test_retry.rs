//! Retry behavior against injected store failures.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use dynopage_core::{Error, RetryPolicy, retry};
    use dynopage_model::{StoreError, StoreErrorCode};

    use crate::{make_table, widget, widget_key};

    fn throttled() -> StoreError {
        StoreError::new(StoreErrorCode::Throttling, "Throughput exceeded")
    }

    #[tokio::test]
    async fn test_should_recover_from_transient_failures() {
        let (store, table) = make_table("retry-recover");
        table.insert(widget("app", "id-1", 1)).await.unwrap();
        store.inject_failure(throttled());
        store.inject_failure(StoreError::connection("socket closed"));

        let key = widget_key("app", "id-1");
        let found = retry(&RetryPolicy::Count(3), || table.get(&key))
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_should_propagate_after_exhausting_the_policy() {
        let (store, table) = make_table("retry-exhaust");
        table.insert(widget("app", "id-1", 1)).await.unwrap();
        for _ in 0..3 {
            store.inject_failure(throttled());
        }

        let key = widget_key("app", "id-1");
        let err = retry(&RetryPolicy::Count(1), || table.get(&key))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        // Two attempts drained two faults; one remains for the next call.
        assert!(table.get(&key).await.is_err());
        assert!(table.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_should_let_policies_refuse_precondition_failures() {
        let (_store, table) = make_table("retry-precondition");
        table.insert(widget("app", "id-1", 1)).await.unwrap();

        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::custom(|error, _attempt| {
            if error.is_precondition_failed() {
                None
            } else {
                Some(Duration::ZERO)
            }
        });
        let err = retry(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            table.insert(widget("app", "id-1", 2))
        })
        .await
        .unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_drop_tables_and_pending_faults_on_reset() {
        let (store, table) = make_table("retry-reset");
        table.insert(widget("app", "id-1", 1)).await.unwrap();
        store.inject_failure(throttled());

        store.reset();
        let err = table.get(&widget_key("app", "id-1")).await.unwrap_err();
        // The injected fault is gone too; what remains is the missing table.
        assert!(err.to_string().contains("not found"));
    }
}
