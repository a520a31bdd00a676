//! Workstation advisor daemon
//!
//! HTTP surface and configuration loading for the advisor engine.

pub mod api;
pub mod config;
