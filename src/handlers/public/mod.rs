// handlers/public/mod.rs - endpoints that do not require a JWT
//
// Route Prefix: none (/, /health, /auth/*)

pub mod auth;
pub mod system;

pub use auth::{login, refresh};
pub use system::{health, root};
