//! Control-loop Audit Logging
//!
//! Provides audit logging for every decision that may alter the field:
//! - Admission requests and their outcome
//! - Invariant validation results
//! - Controller state transitions
//! - Checkpoint and rollback events

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Audit event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuditSeverity {
    /// Informational - normal operation
    Info,
    /// Warning - request denied or degraded behaviour
    Warning,
    /// Error - operation failed
    Error,
    /// Critical - physical invariant broken
    Critical,
}

impl std::fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditSeverity::Info => write!(f, "INFO"),
            AuditSeverity::Warning => write!(f, "WARN"),
            AuditSeverity::Error => write!(f, "ERROR"),
            AuditSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Audit event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditCategory {
    /// Admission gate decisions
    Admission,
    /// Physical invariant checks
    Invariant,
    /// Field mutations
    Mutation,
    /// Checkpoint creation and rollback
    Checkpoint,
    /// Controller state transitions
    StateTransition,
    /// Configuration changes
    Configuration,
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditCategory::Admission => write!(f, "ADMIT"),
            AuditCategory::Invariant => write!(f, "INVARIANT"),
            AuditCategory::Mutation => write!(f, "MUTATE"),
            AuditCategory::Checkpoint => write!(f, "CHECKPOINT"),
            AuditCategory::StateTransition => write!(f, "STATE"),
            AuditCategory::Configuration => write!(f, "CONFIG"),
        }
    }
}

/// Audit outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Failure,
    Unknown,
}

/// Audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub event_id: String,

    /// Timestamp (Unix millis)
    pub timestamp: i64,

    /// Event severity
    pub severity: AuditSeverity,

    /// Event category
    pub category: AuditCategory,

    /// Event action (e.g., "system_mutation", "validate_energy")
    pub action: String,

    /// Outcome (success/failure)
    pub outcome: AuditOutcome,

    /// Component that raised the event
    pub actor: Option<String>,

    /// Additional details
    pub details: HashMap<String, String>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(category: AuditCategory, action: &str, outcome: AuditOutcome) -> Self {
        Self {
            event_id: uuid::Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            severity: match outcome {
                AuditOutcome::Success => AuditSeverity::Info,
                AuditOutcome::Failure => AuditSeverity::Warning,
                AuditOutcome::Unknown => AuditSeverity::Info,
            },
            category,
            action: action.to_string(),
            outcome,
            actor: None,
            details: HashMap::new(),
        }
    }

    /// Set severity
    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Set actor
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    /// Add detail
    pub fn with_detail(mut self, key: &str, value: &str) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Audit log sink
pub trait AuditSink: Send + Sync {
    /// Write an audit event
    fn write(&self, event: &AuditEvent);

    /// Flush pending events
    fn flush(&self);
}

/// Tracing audit sink
pub struct ConsoleAuditSink;

impl AuditSink for ConsoleAuditSink {
    fn write(&self, event: &AuditEvent) {
        let log_line = format!(
            "[{}] {} {} {} - actor={} outcome={:?}",
            event.severity,
            event.category,
            event.action,
            event.event_id,
            event.actor.as_deref().unwrap_or("-"),
            event.outcome,
        );

        match event.severity {
            AuditSeverity::Info => info!("{}", log_line),
            AuditSeverity::Warning => warn!("{}", log_line),
            AuditSeverity::Error => error!("{}", log_line),
            AuditSeverity::Critical => error!("CRITICAL: {}", log_line),
        }
    }

    fn flush(&self) {
        // Tracing output is immediate
    }
}

/// In-memory audit sink
///
/// Clones share the same buffer, so a handle kept outside the logger can read
/// back what was recorded.
#[derive(Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn write(&self, event: &AuditEvent) {
        self.events.write().push(event.clone());
    }

    fn flush(&self) {}
}

/// JSON-lines file audit sink
pub struct FileAuditSink {
    path: PathBuf,
    buffer: Arc<RwLock<Vec<String>>>,
    max_buffer_size: usize,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            buffer: Arc::new(RwLock::new(Vec::new())),
            max_buffer_size: 100,
        }
    }

    fn drain(&self, buffer: &mut Vec<String>) {
        if buffer.is_empty() {
            return;
        }
        debug!(path = %self.path.display(), count = buffer.len(), "Flushing audit buffer");

        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                for line in buffer.iter() {
                    writeln!(file, "{}", line)?;
                }
                Ok(())
            });

        // Audit output is advisory; losing it must not stop the control loop
        if let Err(e) = written {
            warn!(path = %self.path.display(), error = %e, "Failed to write audit log");
        }
        buffer.clear();
    }
}

impl Drop for FileAuditSink {
    fn drop(&mut self) {
        let mut buffer = self.buffer.write();
        self.drain(&mut buffer);
    }
}

impl AuditSink for FileAuditSink {
    fn write(&self, event: &AuditEvent) {
        let mut buffer = self.buffer.write();
        buffer.push(event.to_json());

        if buffer.len() >= self.max_buffer_size {
            self.drain(&mut buffer);
        }
    }

    fn flush(&self) {
        let mut buffer = self.buffer.write();
        self.drain(&mut buffer);
    }
}

/// Audit logger
pub struct AuditLogger {
    sinks: Vec<Box<dyn AuditSink>>,
    /// Minimum severity to log
    min_severity: AuditSeverity,
    /// Categories to log (empty = all)
    enabled_categories: Vec<AuditCategory>,
}

impl AuditLogger {
    /// Create a new audit logger writing to tracing
    pub fn new() -> Self {
        Self {
            sinks: vec![Box::new(ConsoleAuditSink)],
            min_severity: AuditSeverity::Info,
            enabled_categories: vec![],
        }
    }

    /// Create a logger without any sink
    pub fn silent() -> Self {
        Self {
            sinks: vec![],
            min_severity: AuditSeverity::Info,
            enabled_categories: vec![],
        }
    }

    /// Add a sink
    pub fn add_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    /// Builder-style sink registration
    pub fn with_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.add_sink(sink);
        self
    }

    /// Set minimum severity
    pub fn set_min_severity(&mut self, severity: AuditSeverity) {
        self.min_severity = severity;
    }

    /// Set enabled categories
    pub fn set_enabled_categories(&mut self, categories: Vec<AuditCategory>) {
        self.enabled_categories = categories;
    }

    /// Log an audit event
    pub fn log(&self, event: AuditEvent) {
        if event.severity < self.min_severity {
            return;
        }

        if !self.enabled_categories.is_empty()
            && !self.enabled_categories.contains(&event.category)
        {
            return;
        }

        for sink in &self.sinks {
            sink.write(&event);
        }
    }

    /// Log an admission request and its decision
    pub fn log_admission(&self, actor: &str, action: &str, granted: bool) {
        let outcome = if granted {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };

        let event = AuditEvent::new(AuditCategory::Admission, action, outcome)
            .with_actor(actor)
            .with_detail("decision", if granted { "granted" } else { "denied" });

        self.log(event);
    }

    /// Log an invariant check
    pub fn log_invariant_check(&self, actor: &str, energy: f64, violation: Option<&str>) {
        let mut event = AuditEvent::new(
            AuditCategory::Invariant,
            "validate_energy",
            if violation.is_none() {
                AuditOutcome::Success
            } else {
                AuditOutcome::Failure
            },
        )
        .with_actor(actor)
        .with_detail("energy", &energy.to_string());

        if let Some(reason) = violation {
            event = event
                .with_severity(AuditSeverity::Critical)
                .with_detail("violation", reason);
        }

        self.log(event);
    }

    /// Log a controller state transition
    pub fn log_state_transition(&self, actor: &str, from: &str, to: &str) {
        let event = AuditEvent::new(
            AuditCategory::StateTransition,
            "transition",
            AuditOutcome::Success,
        )
        .with_actor(actor)
        .with_detail("from", from)
        .with_detail("to", to);

        self.log(event);
    }

    /// Log a mutation applied to the field
    pub fn log_mutation(&self, actor: &str, kind: &str, strength: f64) {
        let event = AuditEvent::new(AuditCategory::Mutation, kind, AuditOutcome::Success)
            .with_actor(actor)
            .with_detail("strength", &strength.to_string());

        self.log(event);
    }

    /// Log a checkpoint operation
    pub fn log_checkpoint(&self, actor: &str, operation: &str, success: bool, hash: Option<&str>) {
        let mut event = AuditEvent::new(
            AuditCategory::Checkpoint,
            operation,
            if success {
                AuditOutcome::Success
            } else {
                AuditOutcome::Failure
            },
        )
        .with_actor(actor);

        if let Some(h) = hash {
            event = event.with_detail("hash", h);
        }
        if !success {
            event = event.with_severity(AuditSeverity::Error);
        }

        self.log(event);
    }

    /// Flush all sinks
    pub fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_creation() {
        let event = AuditEvent::new(AuditCategory::Admission, "system_mutation", AuditOutcome::Success)
            .with_actor("evolution")
            .with_detail("decision", "granted");

        assert_eq!(event.category, AuditCategory::Admission);
        assert_eq!(event.action, "system_mutation");
        assert_eq!(event.severity, AuditSeverity::Info);
        assert_eq!(event.actor, Some("evolution".to_string()));
        assert_eq!(event.details.get("decision"), Some(&"granted".to_string()));
    }

    #[test]
    fn test_audit_event_json() {
        let event = AuditEvent::new(AuditCategory::Invariant, "validate_energy", AuditOutcome::Failure);

        let json = event.to_json();
        assert!(json.contains("Invariant"));
        assert!(json.contains("validate_energy"));
    }

    #[test]
    fn test_memory_sink_records_through_logger() {
        let sink = MemoryAuditSink::new();
        let logger = AuditLogger::silent().with_sink(Box::new(sink.clone()));

        logger.log_admission("evolution", "system_mutation", true);
        logger.log_admission("evolution", "system_mutation", false);
        logger.log_state_transition("evolution", "Active", "Stasis");

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].outcome, AuditOutcome::Failure);
        assert_eq!(events[1].severity, AuditSeverity::Warning);
    }

    #[test]
    fn test_mutation_event() {
        let sink = MemoryAuditSink::new();
        let logger = AuditLogger::silent().with_sink(Box::new(sink.clone()));

        logger.log_mutation("evolution", "couplings", 0.05);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, AuditCategory::Mutation);
        assert_eq!(events[0].action, "couplings");
        assert_eq!(events[0].outcome, AuditOutcome::Success);
        assert_eq!(events[0].details.get("strength"), Some(&"0.05".to_string()));
    }

    #[test]
    fn test_category_filter() {
        let sink = MemoryAuditSink::new();
        let mut logger = AuditLogger::silent().with_sink(Box::new(sink.clone()));
        logger.set_enabled_categories(vec![AuditCategory::Invariant]);

        logger.log_admission("evolution", "system_mutation", true);
        logger.log_invariant_check("gate", -1.0, Some("negative"));

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0].severity, AuditSeverity::Critical);
    }

    #[test]
    fn test_min_severity_filter() {
        let sink = MemoryAuditSink::new();
        let mut logger = AuditLogger::silent().with_sink(Box::new(sink.clone()));
        logger.set_min_severity(AuditSeverity::Warning);

        logger.log_admission("evolution", "system_mutation", true);
        logger.log_admission("evolution", "system_mutation", false);

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0].severity, AuditSeverity::Warning);
    }

    #[test]
    fn test_file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let logger = AuditLogger::silent().with_sink(Box::new(FileAuditSink::new(&path)));

        logger.log_checkpoint("evolution", "create", true, Some("abcd"));
        logger.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("abcd"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AuditSeverity::Info < AuditSeverity::Warning);
        assert!(AuditSeverity::Warning < AuditSeverity::Error);
        assert!(AuditSeverity::Error < AuditSeverity::Critical);
    }
}
