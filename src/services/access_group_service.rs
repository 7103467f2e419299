use serde::Deserialize;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use super::{required_text, ServiceError};
use crate::database::models::{AccessGroup, AccessGroupDetail};

#[derive(Debug, Clone, Deserialize)]
pub struct AccessGroupInput {
    pub name: String,
    pub description: Option<String>,
}

const DETAIL_SQL: &str = "SELECT g.id, g.name, g.description, \
       COALESCE((SELECT array_agg(m.user_id ORDER BY m.user_id) FROM access_group_members m WHERE m.group_id = g.id), '{}') AS member_ids, \
       COALESCE((SELECT array_agg(n.node_id ORDER BY n.node_id) FROM access_group_nodes n WHERE n.group_id = g.id), '{}') AS node_ids, \
       g.created_at, g.updated_at \
     FROM access_groups g";

/// Ids in `wanted` that are absent from `table`
async fn missing_ids(pool: &PgPool, table: &str, wanted: &[Uuid]) -> Result<Vec<Uuid>, ServiceError> {
    if wanted.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!("SELECT id FROM {} WHERE id = ANY($1)", table);
    let found: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(&sql)
        .bind(wanted)
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();
    Ok(wanted.iter().filter(|id| !found.contains(id)).copied().collect())
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(**id)).copied().collect()
}

pub struct AccessGroupService {
    pool: PgPool,
}

impl AccessGroupService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn select_all(&self) -> Result<Vec<AccessGroupDetail>, ServiceError> {
        let groups = sqlx::query_as::<_, AccessGroupDetail>(&format!("{} ORDER BY g.name", DETAIL_SQL))
            .fetch_all(&self.pool)
            .await?;
        Ok(groups)
    }

    pub async fn select_404(&self, id: Uuid) -> Result<AccessGroupDetail, ServiceError> {
        sqlx::query_as::<_, AccessGroupDetail>(&format!("{} WHERE g.id = $1", DETAIL_SQL))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Access group".to_string()))
    }

    pub async fn create_one(&self, input: &AccessGroupInput) -> Result<AccessGroup, ServiceError> {
        let name = required_text("name", &input.name)?;
        let group = sqlx::query_as::<_, AccessGroup>(
            "INSERT INTO access_groups (name, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(name)
        .bind(input.description.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(group)
    }

    pub async fn update_404(&self, id: Uuid, input: &AccessGroupInput) -> Result<AccessGroup, ServiceError> {
        let name = required_text("name", &input.name)?;
        sqlx::query_as::<_, AccessGroup>(
            "UPDATE access_groups SET name = $2, description = $3, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(input.description.as_deref())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Access group".to_string()))
    }

    pub async fn delete_404(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM access_groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Access group".to_string()));
        }
        Ok(())
    }

    /// Replace the member list
    pub async fn set_members(&self, id: Uuid, user_ids: &[Uuid]) -> Result<AccessGroupDetail, ServiceError> {
        self.replace_links(id, "user_ids", "users", "access_group_members", "user_id", user_ids)
            .await
    }

    /// Replace the granted nodes
    pub async fn set_nodes(&self, id: Uuid, node_ids: &[Uuid]) -> Result<AccessGroupDetail, ServiceError> {
        self.replace_links(id, "node_ids", "nodes", "access_group_nodes", "node_id", node_ids)
            .await
    }

    async fn replace_links(
        &self,
        id: Uuid,
        field: &str,
        target_table: &str,
        link_table: &str,
        link_column: &str,
        ids: &[Uuid],
    ) -> Result<AccessGroupDetail, ServiceError> {
        self.select_404(id).await?;

        let ids = dedup(ids);
        let missing = missing_ids(&self.pool, target_table, &ids).await?;
        if !missing.is_empty() {
            let list: Vec<String> = missing.iter().map(Uuid::to_string).collect();
            return Err(ServiceError::invalid(field, format!("unknown ids: {}", list.join(", "))));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {} WHERE group_id = $1", link_table))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "INSERT INTO {} (group_id, {}) SELECT $1, unnest($2::uuid[])",
            link_table, link_column
        ))
        .bind(id)
        .bind(&ids)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE access_groups SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.select_404(id).await
    }
}
