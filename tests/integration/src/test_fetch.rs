//! Fetch behavior: key conditions, ordering, filters, and projections.

#[cfg(test)]
mod tests {
    use dynopage_core::{Error, Value};
    use dynopage_model::Select;

    use crate::{ids, make_table, seed_widgets, widget};

    #[tokio::test]
    async fn test_should_fetch_all_items_under_a_partition() {
        let (_store, table) = make_table("fetch-all");
        seed_widgets(&table, "app", 10).await;
        seed_widgets(&table, "other", 3).await;

        let out = table.fetch("app").run().await.unwrap();
        assert_eq!(out.items.len(), 10);
        assert_eq!(out.count, 10);
        assert_eq!(out.scanned_count, 10);
        assert_eq!(out.iteractions, 1);
        assert_eq!(out.after, None);
        assert_eq!(ids(&out.items)[0], "id-00");
        assert_eq!(ids(&out.items)[9], "id-09");
    }

    #[tokio::test]
    async fn test_should_match_string_sort_values_by_prefix() {
        let (_store, table) = make_table("fetch-prefix");
        for id in ["user#1", "user#2", "admin#1"] {
            table.insert(widget("app", id, 0)).await.unwrap();
        }

        let out = table.fetch("app").sort("user#").run().await.unwrap();
        assert_eq!(ids(&out.items), ["user#1", "user#2"]);

        let out = table
            .fetch("app")
            .sort("user#1")
            .exact()
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&out.items), ["user#1"]);
    }

    #[tokio::test]
    async fn test_should_fetch_descending() {
        let (_store, table) = make_table("fetch-desc");
        seed_widgets(&table, "app", 4).await;

        let out = table.fetch("app").desc().run().await.unwrap();
        assert_eq!(ids(&out.items), ["id-03", "id-02", "id-01", "id-00"]);
    }

    #[tokio::test]
    async fn test_should_filter_items_in_the_store() {
        let (_store, table) = make_table("fetch-filter");
        seed_widgets(&table, "app", 10).await;

        let out = table
            .fetch("app")
            .limit(3)
            .filter(|exprs| {
                let name = exprs.add_name("rank");
                let min = exprs.add_value_auto("min", &Value::from(5_i64));
                format!("{name} >= {min}")
            })
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&out.items), ["id-05", "id-06", "id-07"]);
        assert_eq!(out.count, 3);
        // The store examined the whole partition to fill the page.
        assert_eq!(out.scanned_count, 10);
        assert!(out.after.is_some());
    }

    #[tokio::test]
    async fn test_should_project_requested_attributes_plus_keys() {
        let (_store, table) = make_table("fetch-project");
        seed_widgets(&table, "app", 3).await;

        let out = table
            .fetch("app")
            .attributes("rank")
            .run()
            .await
            .unwrap();
        assert_eq!(out.items.len(), 3);
        for item in &out.items {
            assert!(item.contains_key("rank"));
            // Key attributes ride along so cursors stay constructible.
            assert!(item.contains_key("namespace"));
            assert!(item.contains_key("id"));
            assert!(!item.contains_key("createdAt"));
        }
    }

    #[tokio::test]
    async fn test_should_count_without_materializing_items() {
        let (_store, table) = make_table("fetch-count");
        seed_widgets(&table, "app", 7).await;

        let out = table
            .fetch("app")
            .select(Select::Count)
            .run()
            .await
            .unwrap();
        assert!(out.items.is_empty());
        assert_eq!(out.count, 7);
    }

    #[tokio::test]
    async fn test_should_fetch_through_a_secondary_index() {
        let (_store, table) = make_table("fetch-index");
        for (id, owner) in [("id-1", "alice"), ("id-2", "bob"), ("id-3", "alice")] {
            let mut record = widget("app", id, 0);
            record.insert("owner".to_owned(), Value::from(owner));
            table.insert(record).await.unwrap();
        }

        let out = table
            .fetch("alice")
            .index("byOwner")
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&out.items), ["id-1", "id-3"]);

        let err = table
            .fetch("alice")
            .index("nope")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_should_skip_unindexed_items_in_index_fetches() {
        let (_store, table) = make_table("fetch-sparse");
        let mut owned = widget("app", "id-1", 0);
        owned.insert("owner".to_owned(), Value::from("alice"));
        table.insert(owned).await.unwrap();
        // No owner attribute, so the index never sees it.
        table.insert(widget("app", "id-2", 0)).await.unwrap();

        let out = table
            .fetch("alice")
            .index("byOwner")
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&out.items), ["id-1"]);
    }
}
