// Library exports for SafeHer
// The operator binary and integration tests build on these modules

pub mod accounts;
pub mod admin;
pub mod auth;
pub mod config;
pub mod contacts;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod reports;
pub mod state;
pub mod task;
