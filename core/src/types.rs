//! Shared primitive types used across the entire engine.

/// Unique identifier of a transaction record within its collection.
pub type TransactionId = String;

/// Unique identifier of a customer record.
pub type CustomerId = String;

/// Stable identifier of a scenario (rule) configuration.
pub type ScenarioId = String;

/// Identifier of a refinement rule.
pub type RuleId = String;

/// The canonical run identifier, assigned by the caller.
pub type RunId = String;
