//! Supervised execution of web-agent workflows
//!
//! A [`workflow::WorkflowExecutor`] runs a declarative list of steps against a
//! [`page::PageController`], resolving natural-language targets through an
//! [`gateway::ElementResolutionGateway`] and gating sensitive actions behind a
//! [`permission::PermissionManager`].

pub mod cli;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod page;
pub mod permission;
pub mod workflow;

#[cfg(test)]
mod testing;
