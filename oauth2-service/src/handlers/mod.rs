//! HTTP handlers for oauth2-service.

pub mod oauth2;

pub use oauth2::*;
