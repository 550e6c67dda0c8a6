//! Core functionality for punchsync.
//!
//! This module contains:
//! - Reconciliation of raw punches into daily attendance sessions
//! - The weekday admission policy used when forwarding punches

pub mod policy;
pub mod reconcile;

// Re-export commonly used types
pub use policy::{Admission, AdmissionPolicy};
pub use reconcile::{
    reconcile, reconcile_link, AttendanceSession, DateRange, ReconcileError, SessionGrouper,
};
