//! Typed client for the survey platform's v3 REST API.
//!
//! Every operation maps onto one upstream resource. Replies arrive wrapped in the
//! platform envelope (`{"result": ..., "meta": {...}}`) and any failure surfaces as
//! [`UpstreamError`].

pub mod client;
pub mod config;
mod envelope;
pub mod error;
pub mod metrics_defs;
pub mod platform;
pub mod types;

#[cfg(test)]
mod testutils;

pub use client::SurveyClient;
pub use error::UpstreamError;
pub use platform::SurveyPlatform;
