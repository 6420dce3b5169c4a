//! Bulk utilities: multi-key reads, partition clears, and re-keying.

#[cfg(test)]
mod tests {
    use dynopage_core::{CREATED_AT, Record, UPDATED_AT, Value};
    use futures::future::join_all;

    use crate::{ids, make_table, seed_widgets, widget, widget_key};

    #[tokio::test]
    async fn test_should_fetch_many_by_key_skipping_missing() {
        let (_store, table) = make_table("bulk-get");
        seed_widgets(&table, "app", 5).await;

        let found = table
            .multi_get(&[
                widget_key("app", "id-01"),
                widget_key("app", "ghost"),
                widget_key("app", "id-04"),
            ])
            .await
            .unwrap();
        assert_eq!(ids(&found), ["id-01", "id-04"]);
        assert!(found[0].contains_key(CREATED_AT));
    }

    #[tokio::test]
    async fn test_should_clear_a_partition_in_pages() {
        let (_store, table) = make_table("bulk-clear");
        seed_widgets(&table, "app", 12).await;
        seed_widgets(&table, "other", 3).await;

        let deleted = table.clear("app", None).await.unwrap();
        assert_eq!(deleted, 12);
        let out = table.fetch("app").run().await.unwrap();
        assert!(out.items.is_empty());

        // Neighboring partitions are untouched.
        let out = table.fetch("other").run().await.unwrap();
        assert_eq!(out.items.len(), 3);
    }

    #[tokio::test]
    async fn test_should_clear_only_a_sort_prefix() {
        let (_store, table) = make_table("bulk-prefix");
        for id in ["a#1", "a#2", "b#1"] {
            table.insert(widget("app", id, 0)).await.unwrap();
        }

        let deleted = table
            .clear("app", Some(Value::from("a#")))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        let out = table.fetch("app").run().await.unwrap();
        assert_eq!(ids(&out.items), ["b#1"]);
    }

    #[tokio::test]
    async fn test_should_re_key_records_preserving_created_at() {
        let (_store, table) = make_table("bulk-rekey");
        let original = table.insert(widget("app", "old", 7)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let moved = table
            .update_primary_keys(
                widget_key("app", "old"),
                Record::from([("id".to_owned(), Value::from("new"))]),
            )
            .await
            .unwrap();
        assert_eq!(moved["id"], Value::from("new"));
        assert_eq!(moved["rank"], Value::from(7_i64));
        assert_eq!(moved[CREATED_AT], original[CREATED_AT]);
        let bumped = moved[UPDATED_AT].as_num().unwrap();
        assert!(bumped > original[UPDATED_AT].as_num().unwrap());

        assert!(table.get(&widget_key("app", "old")).await.unwrap().is_none());
        assert!(table.get(&widget_key("app", "new")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_should_fail_re_keying_a_missing_record() {
        let (_store, table) = make_table("bulk-rekey-missing");
        let err = table
            .update_primary_keys(
                widget_key("app", "ghost"),
                Record::from([("id".to_owned(), Value::from("new"))]),
            )
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn test_should_fail_re_keying_onto_an_occupied_key() {
        let (_store, table) = make_table("bulk-rekey-occupied");
        table.insert(widget("app", "old", 1)).await.unwrap();
        table.insert(widget("app", "new", 2)).await.unwrap();

        let err = table
            .update_primary_keys(
                widget_key("app", "old"),
                Record::from([("id".to_owned(), Value::from("new"))]),
            )
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn test_should_absorb_concurrent_inserts() {
        let (_store, table) = make_table("bulk-concurrent");
        let inserts = (0..20).map(|n| table.insert(widget("app", &format!("id-{n:02}"), n)));
        for written in join_all(inserts).await {
            written.unwrap();
        }

        let out = table.fetch("app").run().await.unwrap();
        assert_eq!(out.items.len(), 20);
    }
}
