//! Tool router gateway: configuration and HTTP surface

pub mod api;
pub mod config;
