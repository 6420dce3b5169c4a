//! List and set mutations applied through the expression pipeline.

#[cfg(test)]
mod tests {
    use dynopage_core::{Error, Record, Value};

    use crate::{make_table, widget, widget_key};

    fn list_strs(record: &Record, attr: &str) -> Vec<String> {
        record[attr]
            .as_list()
            .unwrap_or_default()
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_should_append_and_prepend_to_lists() {
        let (_store, table) = make_table("list-append");
        table.insert(widget("app", "id-1", 0)).await.unwrap();
        let key = widget_key("app", "id-1");

        // The first append creates the list.
        table
            .append_to_list(key.clone(), "tags", "a")
            .await
            .unwrap();
        table
            .append_to_list(key.clone(), "tags", "b")
            .await
            .unwrap();
        let updated = table
            .prepend_to_list(key, "tags", "z")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(list_strs(&updated, "tags"), ["z", "a", "b"]);
    }

    #[tokio::test]
    async fn test_should_create_nested_lists_on_first_append() {
        let (_store, table) = make_table("list-nested");
        table.insert(widget("app", "id-1", 0)).await.unwrap();

        let updated = table
            .append_to_list(widget_key("app", "id-1"), "deep.items", "x")
            .await
            .unwrap()
            .unwrap();
        let deep = updated["deep"].as_map().unwrap();
        assert_eq!(list_strs(deep, "items"), ["x"]);
    }

    #[tokio::test]
    async fn test_should_replace_list_elements_in_place() {
        let (_store, table) = make_table("list-update");
        let mut record = widget("app", "id-1", 0);
        record.insert(
            "tags".to_owned(),
            Value::from(vec![
                Value::from("a"),
                Value::from("b"),
                Value::from("c"),
            ]),
        );
        table.insert(record).await.unwrap();

        let updated = table
            .update_at_list(widget_key("app", "id-1"), "tags", 1, "B")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(list_strs(&updated, "tags"), ["a", "B", "c"]);

        // An index past the end appends.
        let updated = table
            .update_at_list(widget_key("app", "id-1"), "tags", 9, "d")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(list_strs(&updated, "tags"), ["a", "B", "c", "d"]);
    }

    #[tokio::test]
    async fn test_should_remove_list_positions_as_given() {
        let (_store, table) = make_table("list-remove");
        let mut record = widget("app", "id-1", 0);
        record.insert(
            "tags".to_owned(),
            Value::from(vec![
                Value::from("a"),
                Value::from("b"),
                Value::from("c"),
                Value::from("d"),
                Value::from("e"),
            ]),
        );
        table.insert(record).await.unwrap();

        // Positions name the list as it was before the removal.
        let updated = table
            .remove_from_list(widget_key("app", "id-1"), "tags", &[1, 3])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(list_strs(&updated, "tags"), ["a", "c", "e"]);
    }

    #[tokio::test]
    async fn test_should_merge_set_additions_without_duplicates() {
        let (_store, table) = make_table("set-add");
        table.insert(widget("app", "id-1", 0)).await.unwrap();
        let key = widget_key("app", "id-1");

        table
            .add_to_set(
                key.clone(),
                vec![(
                    "colors".to_owned(),
                    vec![Value::from("red"), Value::from("blue")],
                )],
            )
            .await
            .unwrap();
        let updated = table
            .add_to_set(
                key,
                vec![(
                    "colors".to_owned(),
                    vec![Value::from("blue"), Value::from("green")],
                )],
            )
            .await
            .unwrap()
            .unwrap();
        let mut colors = updated["colors"].as_str_set().unwrap().to_vec();
        colors.sort();
        assert_eq!(colors, ["blue", "green", "red"]);
    }

    #[tokio::test]
    async fn test_should_drop_a_set_emptied_by_removal() {
        let (_store, table) = make_table("set-remove");
        table.insert(widget("app", "id-1", 0)).await.unwrap();
        let key = widget_key("app", "id-1");

        table
            .add_to_set(
                key.clone(),
                vec![(
                    "colors".to_owned(),
                    vec![Value::from("red"), Value::from("blue")],
                )],
            )
            .await
            .unwrap();
        let updated = table
            .remove_from_set(
                key.clone(),
                vec![("colors".to_owned(), vec![Value::from("red")])],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            updated["colors"].as_str_set().unwrap(),
            ["blue".to_owned()]
        );

        let updated = table
            .remove_from_set(
                key,
                vec![("colors".to_owned(), vec![Value::from("blue")])],
            )
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.contains_key("colors"));
    }

    #[tokio::test]
    async fn test_should_merge_numeric_sets() {
        let (_store, table) = make_table("set-num");
        table.insert(widget("app", "id-1", 0)).await.unwrap();
        let key = widget_key("app", "id-1");

        table
            .add_to_set(
                key.clone(),
                vec![(
                    "scores".to_owned(),
                    vec![Value::from(1_i64), Value::from(2_i64)],
                )],
            )
            .await
            .unwrap();
        let updated = table
            .add_to_set(
                key,
                vec![(
                    "scores".to_owned(),
                    vec![Value::from(2_i64), Value::from(3_i64)],
                )],
            )
            .await
            .unwrap()
            .unwrap();
        let mut scores = updated["scores"].as_num_set().unwrap().to_vec();
        scores.sort_by(f64::total_cmp);
        assert_eq!(scores, [1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_should_surface_the_store_rejection_of_empty_clauses() {
        let (_store, table) = make_table("set-empty");
        table.insert(widget("app", "id-1", 0)).await.unwrap();

        // Mixed scalar types cannot form a wire set, so every entry is
        // skipped and the bare verb reaches the store.
        let err = table
            .add_to_set(
                widget_key("app", "id-1"),
                vec![(
                    "mixed".to_owned(),
                    vec![Value::from("a"), Value::from(1_i64)],
                )],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("Invalid UpdateExpression"));
    }

    #[tokio::test]
    async fn test_should_remove_nested_attributes() {
        let (_store, table) = make_table("attr-remove");
        let mut record = widget("app", "id-1", 3);
        record.insert(
            "meta".to_owned(),
            Value::from(Record::from([
                ("flag".to_owned(), Value::from(true)),
                ("keep".to_owned(), Value::from("yes")),
            ])),
        );
        table.insert(record).await.unwrap();

        let updated = table
            .remove_attributes(widget_key("app", "id-1"), &["rank", "meta.flag"])
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.contains_key("rank"));
        let meta = updated["meta"].as_map().unwrap();
        assert!(!meta.contains_key("flag"));
        assert_eq!(meta["keep"], Value::from("yes"));
    }

    #[tokio::test]
    async fn test_should_refuse_mutations_of_missing_items() {
        let (_store, table) = make_table("mutate-missing");
        let err = table
            .append_to_list(widget_key("app", "ghost"), "tags", "a")
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
    }
}
