//! Database layer for SiteOps

mod connection;
mod migrations;

pub use connection::Database;
