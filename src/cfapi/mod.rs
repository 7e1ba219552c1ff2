//! Cloudflare Zero Trust API integration

mod client;
mod types;


pub use client::{AccessGroupService, CloudflareApi, DEFAULT_BASE_URL};
pub use types::{AccessGroup, AccessRule, ApiEnvelope, ApiMessage, EmailRule};
