pub mod access_group;
pub mod node;
pub mod sync;
pub mod tenant_config;
pub mod user;

pub use access_group::{AccessGroup, AccessGroupDetail};
pub use node::{Node, NodeKind};
pub use sync::{SyncCursor, SyncErrorRow, SyncRun, SyncSchedule};
pub use tenant_config::{TenantConfig, TenantConfigResponse};
pub use user::User;
