// handlers/protected/mod.rs - JWT-authenticated handlers
//
// Route Prefix: /api/*
// Middleware: jwt_auth_middleware injects AuthUser; role checks happen per handler

pub mod access_groups;
pub mod auth;
pub mod dashboards;
pub mod nodes;
pub mod sync;
pub mod tenant_configs;
pub mod users;
