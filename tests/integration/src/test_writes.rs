//! Write paths: guarded inserts, replacement, updates, and timestamps.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dynopage_core::{CREATED_AT, Record, UPDATED_AT, Value};
    use tokio::time::sleep;

    use crate::{make_table, widget, widget_key};

    fn millis(record: &Record, attr: &str) -> f64 {
        record[attr].as_num().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_should_stamp_matching_timestamps_on_insert() {
        let (_store, table) = make_table("write-insert");
        let written = table.insert(widget("app", "id-1", 1)).await.unwrap();
        assert_eq!(written[CREATED_AT], written[UPDATED_AT]);
        assert!(millis(&written, CREATED_AT) > 1.6e12);

        let stored = table.get(&widget_key("app", "id-1")).await.unwrap().unwrap();
        assert_eq!(stored["rank"], Value::from(1_i64));
        assert_eq!(stored[CREATED_AT], written[CREATED_AT]);
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_inserts() {
        let (_store, table) = make_table("write-duplicate");
        table.insert(widget("app", "id-1", 1)).await.unwrap();
        let err = table.insert(widget("app", "id-1", 2)).await.unwrap_err();
        assert!(err.is_precondition_failed());

        // The original record is untouched.
        let stored = table.get(&widget_key("app", "id-1")).await.unwrap().unwrap();
        assert_eq!(stored["rank"], Value::from(1_i64));
    }

    #[tokio::test]
    async fn test_should_generate_a_sort_key_when_missing() {
        let (_store, table) = make_table("write-genkey");
        let record = Record::from([
            ("namespace".to_owned(), Value::from("app")),
            ("rank".to_owned(), Value::from(1_i64)),
        ]);
        let written = table.insert(record).await.unwrap();
        let id = written["id"].as_str().unwrap().to_owned();
        assert_eq!(id.len(), 36);
        assert!(table.get(&widget_key("app", &id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_should_bump_updated_at_and_keep_created_at_on_update() {
        let (_store, table) = make_table("write-update");
        let written = table.insert(widget("app", "id-1", 1)).await.unwrap();
        sleep(Duration::from_millis(5)).await;

        let updated = table
            .update(widget("app", "id-1", 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["rank"], Value::from(2_i64));
        assert_eq!(updated[CREATED_AT], written[CREATED_AT]);
        assert!(millis(&updated, UPDATED_AT) > millis(&updated, CREATED_AT));
    }

    #[tokio::test]
    async fn test_should_refuse_updates_of_missing_items() {
        let (_store, table) = make_table("write-missing");
        let err = table.update(widget("app", "ghost", 1)).await.unwrap_err();
        assert!(err.is_precondition_failed());
        assert!(table.get(&widget_key("app", "ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_create_missing_items_on_insert_or_update() {
        let (_store, table) = make_table("write-upsert");
        let created = table
            .insert_or_update(widget("app", "id-1", 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created["rank"], Value::from(1_i64));
        assert!(created.contains_key(CREATED_AT));

        sleep(Duration::from_millis(5)).await;
        let updated = table
            .insert_or_update(widget("app", "id-1", 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["rank"], Value::from(2_i64));
        assert_eq!(updated[CREATED_AT], created[CREATED_AT]);
    }

    #[tokio::test]
    async fn test_should_reset_timestamps_on_insert_or_replace() {
        let (_store, table) = make_table("write-replace");
        let first = table.insert(widget("app", "id-1", 1)).await.unwrap();
        sleep(Duration::from_millis(5)).await;

        let replaced = table
            .insert_or_replace(widget("app", "id-1", 9))
            .await
            .unwrap();
        assert!(millis(&replaced, CREATED_AT) > millis(&first, CREATED_AT));

        let stored = table.get(&widget_key("app", "id-1")).await.unwrap().unwrap();
        assert_eq!(stored["rank"], Value::from(9_i64));
    }

    #[tokio::test]
    async fn test_should_return_the_old_image_on_delete() {
        let (_store, table) = make_table("write-delete");
        table.insert(widget("app", "id-1", 7)).await.unwrap();

        let old = table
            .delete(widget_key("app", "id-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old["rank"], Value::from(7_i64));
        assert!(table.get(&widget_key("app", "id-1")).await.unwrap().is_none());

        // Deleting again is a no-op with no image.
        let none = table.delete(widget_key("app", "id-1")).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_should_update_under_a_different_key() {
        let (_store, table) = make_table("write-where");
        table.insert(widget("app", "id-1", 1)).await.unwrap();

        let changes = Record::from([("note".to_owned(), Value::from("touched"))]);
        let updated = table
            .update_where(changes, widget_key("app", "id-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["note"], Value::from("touched"));
        assert_eq!(updated["rank"], Value::from(1_i64));
    }
}
