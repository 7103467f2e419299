//! Role checks and node-tree access resolution.
//!
//! A user reaches a node when they are `super_admin`, or when one of their
//! access groups grants that node or any of its ancestors.

pub mod access;
pub mod roles;

use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::middleware::AuthUser;

pub use access::{ancestors, resolve_accessible, would_create_cycle};
pub use roles::Role;

/// Reject callers below `required`
pub fn require_role(user: &AuthUser, required: Role) -> Result<(), ApiError> {
    if user.role.at_least(required) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("Requires role {} or higher", required)))
    }
}

/// Parent links for the whole tree
pub async fn load_node_links(pool: &PgPool) -> Result<Vec<(Uuid, Option<Uuid>)>, DatabaseError> {
    let links = sqlx::query_as::<_, (Uuid, Option<Uuid>)>("SELECT id, parent_id FROM nodes")
        .fetch_all(pool)
        .await?;
    Ok(links)
}

/// Nodes granted directly to `user_id` through any access group
pub async fn granted_node_ids(pool: &PgPool, user_id: Uuid) -> Result<HashSet<Uuid>, DatabaseError> {
    let rows = sqlx::query_scalar::<_, Uuid>(
        "SELECT DISTINCT n.node_id \
         FROM access_group_nodes n \
         JOIN access_group_members m ON m.group_id = n.group_id \
         WHERE m.user_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Every node the user can see: grants plus descendants, or the whole tree for super_admin
pub async fn accessible_node_ids(pool: &PgPool, user: &AuthUser) -> Result<HashSet<Uuid>, DatabaseError> {
    let links = load_node_links(pool).await?;
    if user.role == Role::SuperAdmin {
        return Ok(links.into_iter().map(|(id, _)| id).collect());
    }
    let grants = granted_node_ids(pool, user.id).await?;
    Ok(resolve_accessible(&links, &grants))
}

/// Accessible school nodes only (used for dashboard row-level security)
pub async fn accessible_school_ids(pool: &PgPool, user: &AuthUser) -> Result<Vec<Uuid>, DatabaseError> {
    let accessible = accessible_node_ids(pool, user).await?;
    let schools = sqlx::query_scalar::<_, Uuid>("SELECT id FROM nodes WHERE kind = 'school' ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(schools.into_iter().filter(|id| accessible.contains(id)).collect())
}

/// Inaccessible nodes read as 404, same as missing ones
pub async fn ensure_node_access(pool: &PgPool, user: &AuthUser, node_id: Uuid) -> Result<(), ApiError> {
    if user.role == Role::SuperAdmin {
        return Ok(());
    }
    let accessible = accessible_node_ids(pool, user).await?;
    if accessible.contains(&node_id) {
        Ok(())
    } else {
        Err(ApiError::not_found("Node not found"))
    }
}
