//! Telegram bot that watches GitHub repositories and announces new releases.

pub mod callback;
pub mod config;
pub mod db;
pub mod github;
pub mod handlers;
pub mod identity;
pub mod keyboards;
pub mod model;
pub mod reconcile;
pub mod server;
pub mod transport;
