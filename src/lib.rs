//! Cloudflare Zero Trust Operator
//!
//! This crate provides a Kubernetes operator that reconciles declarative
//! CloudflareAccessGroup resources against the Cloudflare Zero Trust API.

pub mod cfapi;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod telemetry;

pub use crate::error::{Error, Result};
