//! # factum-rules
//!
//! The FACTUM rule engine.
//!
//! [`RuleEngine::evaluate`] dispatches each caller-supplied rule by kind to
//! its evaluator and collects every violation in rule order.  Evaluators
//! that reach outside the process — reference lookups, connectors, embedding
//! similarity, web fact-checks — go through injected collaborator traits,
//! carry their own timeouts, and degrade to `warning` violations on any
//! failure.
//!
//! `constraint` rules are evaluated by the restricted predicate evaluator in
//! [`expr`]: a one-bound-name grammar with a fixed function allow-list, not
//! a general scripting facility.

pub mod engine;
pub mod expr;

pub use engine::RuleEngine;
pub use expr::{evaluate_predicate, ExprError};
