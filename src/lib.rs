//! Portfolio analytics service: turns a holdings snapshot into deterministic
//! metrics and an LLM-written narrative.

pub mod app;
pub mod config;
pub mod errors;
pub mod external;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
