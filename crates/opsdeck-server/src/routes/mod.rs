//! HTTP route handlers.

pub mod backups;
pub mod health;
pub mod migrations;
pub mod monitoring;
pub mod performance;
