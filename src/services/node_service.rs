use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{required_text, ServiceError};
use crate::database::models::{Node, NodeKind};
use crate::rbac::{self, would_create_cycle};

/// Body for node create and full update
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInput {
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub kind: String,
    pub code: Option<String>,
}

impl NodeInput {
    fn validated(&self) -> Result<(String, NodeKind), ServiceError> {
        let name = required_text("name", &self.name)?;
        let kind = self
            .kind
            .parse::<NodeKind>()
            .map_err(|e| ServiceError::invalid("kind", e))?;
        Ok((name, kind))
    }
}

pub struct NodeService {
    pool: PgPool,
}

impl NodeService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn select_all(&self) -> Result<Vec<Node>, ServiceError> {
        let nodes = sqlx::query_as::<_, Node>("SELECT * FROM nodes ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(nodes)
    }

    pub async fn select_one(&self, id: Uuid) -> Result<Option<Node>, ServiceError> {
        let node = sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(node)
    }

    pub async fn select_404(&self, id: Uuid) -> Result<Node, ServiceError> {
        self.select_one(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Node".to_string()))
    }

    /// Schools are leaves, so a school can never be a parent
    async fn ensure_parent(&self, parent_id: Option<Uuid>) -> Result<(), ServiceError> {
        if let Some(parent) = parent_id {
            let node = self
                .select_one(parent)
                .await?
                .ok_or_else(|| ServiceError::invalid("parent_id", "parent node does not exist"))?;
            check_parent_kind(&node.kind)?;
        }
        Ok(())
    }

    async fn has_tenant_config(&self, id: Uuid) -> Result<bool, ServiceError> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenant_configs WHERE node_id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    async fn child_count(&self, id: Uuid) -> Result<i64, ServiceError> {
        let children: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM nodes WHERE parent_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(children)
    }

    pub async fn create_one(&self, input: &NodeInput) -> Result<Node, ServiceError> {
        let (name, kind) = input.validated()?;
        self.ensure_parent(input.parent_id).await?;

        let node = sqlx::query_as::<_, Node>(
            "INSERT INTO nodes (parent_id, name, kind, code) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(input.parent_id)
        .bind(name)
        .bind(kind.as_str())
        .bind(input.code.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(node)
    }

    pub async fn update_404(&self, id: Uuid, input: &NodeInput) -> Result<Node, ServiceError> {
        let (name, kind) = input.validated()?;
        let existing = self.select_404(id).await?;

        if existing.kind != kind.as_str() {
            let has_config = self.has_tenant_config(id).await?;
            let children = self.child_count(id).await?;
            check_kind_change(kind, has_config, children)?;
        }

        if input.parent_id != existing.parent_id {
            if let Some(parent) = input.parent_id {
                self.ensure_parent(Some(parent)).await?;
                let links = rbac::load_node_links(&self.pool).await?;
                if would_create_cycle(&links, id, parent) {
                    return Err(ServiceError::invalid("parent_id", "a node cannot be moved under itself"));
                }
            }
        }

        let node = sqlx::query_as::<_, Node>(
            "UPDATE nodes SET parent_id = $2, name = $3, kind = $4, code = $5, updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(input.parent_id)
        .bind(name)
        .bind(kind.as_str())
        .bind(input.code.as_deref())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Node".to_string()))?;
        Ok(node)
    }

    pub async fn delete_404(&self, id: Uuid) -> Result<(), ServiceError> {
        self.select_404(id).await?;

        let children = self.child_count(id).await?;
        if children > 0 {
            return Err(ServiceError::Conflict(format!(
                "Node has {} child nodes; move or delete them first",
                children
            )));
        }

        sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn check_parent_kind(parent_kind: &str) -> Result<(), ServiceError> {
    if parent_kind == NodeKind::School.as_str() {
        return Err(ServiceError::invalid("parent_id", "a school cannot have child nodes"));
    }
    Ok(())
}

/// Tenant configs only hang off schools, and schools have no children
fn check_kind_change(kind: NodeKind, has_config: bool, children: i64) -> Result<(), ServiceError> {
    if kind != NodeKind::School && has_config {
        return Err(ServiceError::invalid(
            "kind",
            "node has a tenant config; delete it before changing the kind",
        ));
    }
    if kind == NodeKind::School && children > 0 {
        return Err(ServiceError::invalid("kind", "a node with children cannot become a school"));
    }
    Ok(())
}
