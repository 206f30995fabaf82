//! HTTP request handlers, organized by audience.

pub mod admin;
pub mod health;
pub mod orders;
pub mod sessions;
pub mod tasks;
pub mod webhooks;

pub use health::health_check;
