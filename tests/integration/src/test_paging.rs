//! Cursor pagination: forward walks, backward walks, and token symmetry.

#[cfg(test)]
mod tests {
    use dynopage_core::{CURSOR_FIRST, CURSOR_LAST, FetchOutput, Table};

    use crate::{ids, make_table, seed_widgets};

    async fn page_after(table: &Table, token: Option<String>) -> FetchOutput {
        let mut fetch = table.fetch("app").limit(2);
        if let Some(token) = token {
            fetch = fetch.after(token);
        }
        fetch.run().await.unwrap()
    }

    #[tokio::test]
    async fn test_should_walk_forward_in_stable_pages() {
        let (_store, table) = make_table("page-forward");
        seed_widgets(&table, "app", 10).await;

        let mut token = None;
        let mut seen = Vec::new();
        let mut pages = 0;
        loop {
            let out = page_after(&table, token.take()).await;
            assert!(out.items.len() <= 2);
            seen.extend(ids(&out.items));
            pages += 1;
            match out.after {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(pages, 5);
        let expected: Vec<String> = (0..10).map(|n| format!("id-{n:02}")).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_should_page_backward_with_the_same_page_boundaries() {
        let (_store, table) = make_table("page-backward");
        seed_widgets(&table, "app", 10).await;

        let first = page_after(&table, None).await;
        let second = page_after(&table, first.after.clone()).await;
        let third = page_after(&table, second.after.clone()).await;
        assert_eq!(ids(&third.items), ["id-04", "id-05"]);

        // Walking back from the third page lands on the second, intact.
        let back = table
            .fetch("app")
            .limit(2)
            .before(third.before.unwrap())
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&back.items), ids(&second.items));

        // And its "after" token returns to the third page.
        let forward = table
            .fetch("app")
            .limit(2)
            .after(back.after.unwrap())
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&forward.items), ids(&third.items));
    }

    #[tokio::test]
    async fn test_should_stop_paging_backward_at_the_first_page() {
        let (_store, table) = make_table("page-edge");
        seed_widgets(&table, "app", 6).await;

        let first = page_after(&table, None).await;
        let second = page_after(&table, first.after.clone()).await;
        let back = table
            .fetch("app")
            .limit(2)
            .before(second.before.unwrap())
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&back.items), ["id-00", "id-01"]);
        // Nothing precedes the first page.
        assert_eq!(back.before, None);
    }

    #[tokio::test]
    async fn test_should_treat_edge_sentinels_as_fresh_pages() {
        let (_store, table) = make_table("page-sentinel");
        seed_widgets(&table, "app", 3).await;

        let from_first = table
            .fetch("app")
            .limit(2)
            .after(CURSOR_FIRST)
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&from_first.items), ["id-00", "id-01"]);

        let from_last = table
            .fetch("app")
            .limit(2)
            .before(CURSOR_LAST)
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&from_last.items), ["id-01", "id-02"]);
    }

    #[tokio::test]
    async fn test_should_resume_like_a_forward_page() {
        let (_store, table) = make_table("page-resume");
        seed_widgets(&table, "app", 6).await;

        let first = page_after(&table, None).await;
        let resumed = table
            .fetch("app")
            .limit(2)
            .resume(first.after.clone().unwrap())
            .run()
            .await
            .unwrap();
        let chained = page_after(&table, first.after).await;
        assert_eq!(ids(&resumed.items), ids(&chained.items));
        assert!(resumed.before.is_some());
    }

    #[tokio::test]
    async fn test_should_survive_a_deleted_boundary_item() {
        let (_store, table) = make_table("page-deleted");
        seed_widgets(&table, "app", 6).await;

        let first = page_after(&table, None).await;
        // The boundary item vanishes between pages.
        table
            .delete(crate::widget_key("app", "id-01"))
            .await
            .unwrap();
        let second = page_after(&table, first.after).await;
        assert_eq!(ids(&second.items), ["id-02", "id-03"]);
    }

    #[tokio::test]
    async fn test_should_keep_paging_under_a_sort_prefix() {
        let (_store, table) = make_table("page-prefix");
        for id in ["a#1", "a#2", "a#3", "b#1", "b#2"] {
            table.insert(crate::widget("app", id, 0)).await.unwrap();
        }

        let first = table
            .fetch("app")
            .sort("a#")
            .limit(2)
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&first.items), ["a#1", "a#2"]);

        let second = table
            .fetch("app")
            .sort("a#")
            .limit(2)
            .after(first.after.unwrap())
            .run()
            .await
            .unwrap();
        assert_eq!(ids(&second.items), ["a#3"]);
        assert_eq!(second.after, None);
    }
}
