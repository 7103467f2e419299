// handlers/mod.rs - two-tier handler layout
//
// Public (no auth) → Protected (JWT auth, role checks inside handlers)

pub mod protected; // /api/*
pub mod public; // /, /health, /auth/*
