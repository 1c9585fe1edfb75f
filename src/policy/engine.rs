//! Statement-based policy decisions.
//!
//! Evaluation order is action identifier, then policy, then statement, then pattern;
//! the first pattern that matches decides and nothing is aggregated. An empty
//! result means default deny.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::pattern::{ActionPattern, PatternError};
use crate::error::{AppError, AppResult};
use crate::identity::model::{Policy, StatementEffect};

#[derive(Debug, Clone)]
pub struct CompiledStatement {
    pub name: String,
    pub effect: StatementEffect,
    pub patterns: Vec<ActionPattern>,
}

#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub uuid: String,
    pub name: String,
    pub statements: Vec<CompiledStatement>,
}

impl CompiledPolicy {
    pub fn compile(policy: &Policy) -> Result<Self, PatternError> {
        let mut statements = Vec::with_capacity(policy.statements.len());
        for s in policy.statements.iter() {
            let patterns = s.actions.iter().map(|a| ActionPattern::compile(a)).collect::<Result<Vec<_>, _>>()?;
            statements.push(CompiledStatement { name: s.name.clone(), effect: s.effect, patterns });
        }
        Ok(CompiledPolicy { uuid: policy.uuid.clone(), name: policy.name.clone(), statements })
    }
}

/// The statement that settled an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub policy_uuid: String,
    pub policy_name: String,
    pub statement_name: String,
    /// Action identifier that matched.
    pub action: String,
    /// Pattern that matched it.
    pub pattern: String,
    pub effect: StatementEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyTier {
    User,
    Group,
}

impl fmt::Display for PolicyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyTier::User => f.write_str("user policy"),
            PolicyTier::Group => f.write_str("group policy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieredDecision {
    pub tier: PolicyTier,
    pub decision: Decision,
}

/// First-match evaluation over `policies` for each of `actions`.
pub fn decide(actions: &[String], policies: &[Arc<CompiledPolicy>]) -> Option<Decision> {
    for action in actions.iter() {
        for p in policies.iter() {
            for s in p.statements.iter() {
                for pattern in s.patterns.iter() {
                    if pattern.matches(action) {
                        return Some(Decision {
                            policy_uuid: p.uuid.clone(),
                            policy_name: p.name.clone(),
                            statement_name: s.name.clone(),
                            action: action.clone(),
                            pattern: pattern.as_str().to_string(),
                            effect: s.effect,
                        });
                    }
                    trace!(
                        target: "cloud_iam::policy",
                        "action '{}' not matched by policy[name: {}, uuid: {}] statement[name: {}, action: {}, effect: {:?}]",
                        action, p.name, p.uuid, s.name, pattern.as_str(), s.effect
                    );
                }
            }
        }
    }
    None
}

/// Compiles policies once and keeps them by uuid. Policies are immutable after
/// creation, so an entry only leaves the cache when its policy is deleted.
#[derive(Default)]
pub struct PolicyEngine {
    cache: RwLock<HashMap<String, Arc<CompiledPolicy>>>,
}

impl PolicyEngine {
    pub fn new() -> Self { Self::default() }

    /// Compile and cache; used when a policy is created so bad patterns are refused up front.
    pub fn register(&self, policy: &Policy) -> Result<Arc<CompiledPolicy>, PatternError> {
        let compiled = Arc::new(CompiledPolicy::compile(policy)?);
        self.cache.write().insert(policy.uuid.clone(), compiled.clone());
        Ok(compiled)
    }

    pub fn evict(&self, policy_uuid: &str) { self.cache.write().remove(policy_uuid); }

    pub fn cached_len(&self) -> usize { self.cache.read().len() }

    /// Compiled forms of stored policies, compiling on cache miss.
    pub fn resolve(&self, policies: &[Policy]) -> AppResult<Vec<Arc<CompiledPolicy>>> {
        let mut out = Vec::with_capacity(policies.len());
        for p in policies.iter() {
            let cached = self.cache.read().get(&p.uuid).cloned();
            let compiled = match cached {
                Some(c) => c,
                None => self.register(p).map_err(|e| {
                    AppError::internal(format!("stored policy[name: {}, uuid: {}] is invalid: {}", p.name, p.uuid, e))
                })?,
            };
            out.push(compiled);
        }
        Ok(out)
    }

    /// Direct policies first; group policies are loaded and consulted only when the
    /// direct tier has no matching statement at all.
    pub fn evaluate_tiers<F>(&self, actions: &[String], user_policies: &[Policy], group_policies: F) -> AppResult<Option<TieredDecision>>
    where
        F: FnOnce() -> AppResult<Vec<Policy>>,
    {
        let direct = self.resolve(user_policies)?;
        if let Some(decision) = decide(actions, &direct) {
            return Ok(Some(TieredDecision { tier: PolicyTier::User, decision }));
        }
        let inherited = self.resolve(&group_policies()?)?;
        Ok(decide(actions, &inherited).map(|decision| TieredDecision { tier: PolicyTier::Group, decision }))
    }
}
