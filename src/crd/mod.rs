//! Custom Resource Definitions for the Zero Trust operator
//!
//! This module defines the Kubernetes CRDs mapped onto Cloudflare Zero Trust
//! objects.

mod access_group;


pub use access_group::{
    CloudflareAccessGroup, CloudflareAccessGroupSpec, CloudflareAccessGroupStatus,
};
