//! Durable block storage on sled

pub mod database;

pub use database::Database;
