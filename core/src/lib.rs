//! amlsim-core — schema-agnostic, rule-driven detection of suspicious
//! financial activity.
//!
//! One pipeline and its evaluation tooling:
//!   1. Scenario execution (filter → windowed aggregation → threshold →
//!      condition → alert), see `scenario_engine`.
//!   2. Refinement/suppression with an append-only audit log, see
//!      `refinement_layer`.
//!   3. Comparison of two finalized alert sets, see `comparison_engine`.
//!   4. Pre-deployment red-teaming of a proposed refinement, see
//!      `risk_engine`.
//!
//! RULES:
//!   - The core never performs I/O: it consumes in-memory records plus a
//!     read-only reference snapshot and returns in-memory results.
//!   - Reference data (whitelist, risk profiles) is snapshotted by the
//!     caller at run start; there is no process-wide mutable state.
//!   - Customer groups are independent after filtering; callers may shard
//!     them across workers, the core itself stays synchronous.

pub mod aggregation_stage;
pub mod alert;
pub mod comparison_engine;
pub mod config;
pub mod error;
pub mod filter_stage;
pub mod formula;
pub mod record;
pub mod refinement_layer;
pub mod risk_engine;
pub mod scenario_engine;
pub mod threshold_stage;
pub mod types;

pub use alert::{Alert, ExclusionLogEntry};
pub use comparison_engine::{compare_alert_sets, ComparisonReport, RiskLevel};
pub use config::RuleConfig;
pub use error::{EngineError, EngineResult};
pub use record::{Record, ReferenceData, Value};
pub use refinement_layer::apply_refinements;
pub use risk_engine::{analyze_refinement_risk, RiskReport};
pub use scenario_engine::{execute_run, execute_scenario, RunReport};
