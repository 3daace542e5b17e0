pub mod config;
pub mod db;
pub mod error;
pub mod logger;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
