//! Controller module for CloudflareAccessGroup reconciliation
//! This module contains the main controller loop, the convergence pass,
//! and the matching logic between desired and Cloudflare state.

pub mod converge;
pub mod matcher;
mod reconciler;

#[cfg(test)]
mod converge_test;
#[cfg(test)]
mod matcher_test;

pub use converge::{
    converge_access_group, ConvergeOutcome, MissingGroupPolicy, StatusPersister,
};
pub use reconciler::{run_controller, ControllerState};
