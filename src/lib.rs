pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod project;
pub mod remote_auth;
pub mod routes;
pub mod snowflake;
pub mod state;
pub mod store;
