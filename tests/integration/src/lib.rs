//! Multi-node integration tests for the Meshage mesh
//!
//! This test suite validates:
//! - On-demand route discovery across relay chains
//! - Flood deduplication for route requests and broadcasts
//! - Link breakage handling and route error propagation
//! - Presence announcements and neighbor tracking
//! - The async runtime driving several nodes over one hub


#[cfg(test)]
mod route_discovery_tests;

#[cfg(test)]
mod flooding_tests;

#[cfg(test)]
mod link_failure_tests;

#[cfg(test)]
mod presence_tests;
