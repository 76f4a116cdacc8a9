pub mod chat;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod ordering;
pub mod password;
pub mod schema;
pub mod server;
pub mod storage;
pub mod validation;
