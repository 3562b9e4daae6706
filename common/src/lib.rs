//! Shared types for the XDP layer-4 load balancer
//!
//! This crate holds the record layout and constants that both the
//! kernel-resident XDP program and the userspace control plane agree on.

#![no_std]

pub mod constants;
pub mod types;

pub use constants::*;
pub use types::DestinationRecord;
