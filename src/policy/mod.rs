pub mod engine;
pub mod pattern;

pub use engine::{CompiledPolicy, Decision, PolicyEngine, PolicyTier, TieredDecision, decide};
pub use pattern::{ActionPattern, PatternError};
