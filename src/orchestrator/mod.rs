// =============================================================================
// Decision Orchestrator Module
// =============================================================================
//
// The fallback chain: remote inference, then the deterministic quant
// pipeline, then the minimal RSI rule.  Every evaluation ends in exactly
// one provenance-tagged Decision.

pub mod chain;
pub mod decision;
pub mod minimal;
pub mod quant;
pub mod remote_stage;
pub mod stage;

pub use chain::DecisionOrchestrator;
pub use decision::Decision;
