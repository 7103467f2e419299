use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::mapping::EntityMapping;
use super::report::ItemFailure;
use crate::database::{quote_identifier, SqlParam, SqlQuery};

#[derive(Debug, Default)]
pub struct UpsertOutcome {
    pub upserted: usize,
    pub failures: Vec<ItemFailure>,
}

/// `INSERT ... ON CONFLICT (node_id, external_id) DO UPDATE` for one mapping.
/// Params: $1 node_id, $2 external_id, $3 payload, then one per mapped column.
pub fn build_upsert_sql(mapping: &EntityMapping) -> String {
    let mut columns = vec!["node_id".to_string(), "external_id".to_string(), "payload".to_string()];
    let mut values = vec!["$1".to_string(), "$2".to_string(), "$3::jsonb".to_string()];
    let mut updates = vec!["payload = EXCLUDED.payload".to_string()];

    for (i, (column, _, kind)) in mapping.columns.iter().enumerate() {
        let col = quote_identifier(column);
        values.push(format!("${}::text::{}", i + 4, kind.sql_type()));
        updates.push(format!("{col} = EXCLUDED.{col}"));
        columns.push(col);
    }

    columns.push("synced_at".to_string());
    values.push("now()".to_string());
    updates.push("synced_at = EXCLUDED.synced_at".to_string());

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT (node_id, external_id) DO UPDATE SET {}",
        quote_identifier(mapping.table),
        columns.join(", "),
        values.join(", "),
        updates.join(", ")
    )
}

/// Upsert each item on its own; bad items are recorded and the batch continues
pub async fn upsert_items(pool: &PgPool, mapping: &EntityMapping, node_id: Uuid, items: &[Value]) -> UpsertOutcome {
    let sql = build_upsert_sql(mapping);
    let mut outcome = UpsertOutcome::default();

    for (index, item) in items.iter().enumerate() {
        let Some(external_id) = mapping.external_id_of(item) else {
            outcome.failures.push(ItemFailure::new(
                Some(format!("#{}", index)),
                format!("missing external id at '{}'", mapping.external_id),
            ));
            continue;
        };

        let mut query = SqlQuery::new(sql.as_str())
            .bind(node_id)
            .bind(external_id.as_str())
            .bind(SqlParam::Text(item.to_string()));
        for value in mapping.values_of(item) {
            query = query.bind(value);
        }

        match query.execute(pool).await {
            Ok(_) => outcome.upserted += 1,
            Err(e) => {
                warn!("{}: upsert of {} failed: {}", mapping.table, external_id, e);
                outcome.failures.push(ItemFailure::new(Some(external_id), e.to_string()));
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mapping::{LMS_YEAR_GROUPS, SIS_ATTENDANCE};

    #[test]
    fn builds_upsert_with_casts() {
        let sql = build_upsert_sql(&SIS_ATTENDANCE);
        assert!(sql.starts_with("INSERT INTO \"sis_attendance\" (node_id, external_id, payload, \"student_external_id\""));
        assert!(sql.contains("$5::text::date"));
        assert!(sql.contains("$8::text::bigint"));
        assert!(sql.contains("ON CONFLICT (node_id, external_id) DO UPDATE SET payload = EXCLUDED.payload"));
        assert!(sql.contains("\"minutes_absent\" = EXCLUDED.\"minutes_absent\""));
        assert!(sql.ends_with("synced_at = EXCLUDED.synced_at"));
    }

    #[test]
    fn param_count_matches_columns() {
        let sql = build_upsert_sql(&LMS_YEAR_GROUPS);
        let highest = 3 + LMS_YEAR_GROUPS.columns.len();
        assert!(sql.contains(&format!("${}::", highest)));
        assert!(!sql.contains(&format!("${}", highest + 1)));
    }
}
