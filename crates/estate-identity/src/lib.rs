//! Identity document verification for the property marketplace.
//!
//! Submitted identity documents move through a small state machine, resolved
//! outcomes land in a per-user notification ledger, and every change is fanned
//! out to live administrator and owner listeners.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
