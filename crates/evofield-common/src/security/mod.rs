//! Security module - admission control and auditing
//!
//! This module provides:
//! - The admission gate consulted before any field mutation
//! - Throttling policy (cooldown plus rolling window)
//! - Audit logging

pub mod audit;
pub mod gate;
pub mod policy;

pub use audit::{
    AuditCategory, AuditEvent, AuditLogger, AuditSeverity, AuditSink, FileAuditSink, MemoryAuditSink,
};
pub use gate::{AdmissionGate, GateConfig, SealedGate, SharedGate};
pub use policy::{Throttle, ThrottleDenial, ThrottleRule};
