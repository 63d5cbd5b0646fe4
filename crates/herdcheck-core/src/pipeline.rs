//! Ordered, short-circuiting rule pipeline.
//!
//! Rules are registered in a fixed order at construction time, each paired
//! with a continuation policy. Execution walks the registration order,
//! wraps every outcome with its stop decision, and halts as soon as a
//! policy fires; skipped rules are not invoked and do not appear in the
//! output. For a given input, context and rule set the invocation order and
//! stop point are reproducible: rules are never reordered on outcome.
//!
//! The same [`AnalysisContext`] is passed unchanged to every invoked rule,
//! letting rules share derived lookups for one record.

#![forbid(unsafe_code)]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    identifiers::{IssueCode, OperationId, RuleCode},
    issue::ContactDetails,
};

// ============================================================================
// RULE OUTCOMES
// ============================================================================

/// Details of a detected issue, produced by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDetection {
    /// Classification code of the detected issue.
    pub issue_code: IssueCode,
    /// Optional upstream error code.
    pub error_code: Option<String>,
    /// Optional upstream error description.
    pub error_description: Option<String>,
    /// Optional contact context passed through to the issue.
    pub contact: Option<ContactDetails>,
    /// Free-form contextual payload (deterministically ordered).
    pub context: BTreeMap<String, String>,
}

impl IssueDetection {
    /// Minimal detection with only an issue code.
    #[must_use]
    pub fn new(issue_code: IssueCode) -> Self {
        Self {
            issue_code,
            error_code: None,
            error_description: None,
            contact: None,
            context: BTreeMap::new(),
        }
    }
}

/// Outcome of one rule evaluation: either clean, or an issue was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleResult {
    /// The rule condition does not hold for this record.
    Clean,
    /// The rule detected a data-quality issue.
    Issue(IssueDetection),
}

impl RuleResult {
    /// Whether this outcome carries an issue.
    #[must_use]
    pub const fn has_issue(&self) -> bool {
        matches!(self, Self::Issue(_))
    }

    /// The detection, if any.
    #[must_use]
    pub const fn detection(&self) -> Option<&IssueDetection> {
        match self {
            Self::Issue(detection) => Some(detection),
            Self::Clean => None,
        }
    }
}

/// A rule outcome wrapped with its originating rule and the pipeline's stop
/// decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRuleResult {
    /// Code of the rule that produced this result.
    pub rule_code: RuleCode,
    /// The rule's outcome.
    pub result: RuleResult,
    /// True when this result halted the pipeline.
    pub stop_processing: bool,
}

/// Rule evaluation failure. Fatal to the pass: the run is marked failed and
/// the sweep does not execute.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("rule {rule_code} failed: {message}")]
pub struct RuleError {
    /// Code of the failing rule.
    pub rule_code: RuleCode,
    /// Captured failure message.
    pub message: String,
}

impl RuleError {
    /// Build a rule error.
    #[must_use]
    pub fn new(rule_code: RuleCode, message: impl Into<String>) -> Self {
        Self {
            rule_code,
            message: message.into(),
        }
    }
}

// ============================================================================
// ANALYSIS CONTEXT
// ============================================================================

/// Shared per-record context handed unchanged to every invoked rule.
///
/// Carries the pass's operation id and a small cache so rules can share
/// derived lookups (e.g. a parsed registry record) within one record.
#[derive(Debug)]
pub struct AnalysisContext {
    operation_id: OperationId,
    cache: Mutex<HashMap<String, serde_json::Value>>,
}

impl AnalysisContext {
    /// Context for one record within the given pass.
    #[must_use]
    pub fn new(operation_id: OperationId) -> Self {
        Self {
            operation_id,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The pass this context belongs to.
    #[must_use]
    pub fn operation_id(&self) -> &OperationId {
        &self.operation_id
    }

    /// Read a cached value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(key).cloned())
    }

    /// Cache a derived value for later rules in the same record.
    pub fn insert(&self, key: impl Into<String>, value: serde_json::Value) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key.into(), value);
        }
    }
}

// ============================================================================
// RULE TRAIT
// ============================================================================

/// A unit of domain logic evaluated against one input record.
///
/// Supplied by the surrounding application; the pipeline only consumes this
/// contract. Rules must be deterministic for a given record and context.
pub trait Rule<R>: Send + Sync {
    /// Stable code identifying this rule.
    fn code(&self) -> RuleCode;

    /// Evaluate the rule against one record.
    ///
    /// # Errors
    ///
    /// Returns `RuleError` on evaluation failure; the error aborts the pass.
    fn evaluate(&self, record: &R, ctx: &AnalysisContext) -> Result<RuleResult, RuleError>;
}

// ============================================================================
// CONTINUATION POLICY
// ============================================================================

type StopPredicate = Arc<dyn Fn(&RuleResult) -> bool + Send + Sync>;

/// Decides, per registration, whether the pipeline halts after a result.
#[derive(Clone)]
pub enum ContinuationPolicy {
    /// Never stop after this rule.
    ContinueAlways,
    /// Stop when this rule reports an issue.
    StopOnIssue,
    /// Stop when the predicate holds for this rule's result.
    StopWhen(StopPredicate),
}

impl ContinuationPolicy {
    fn should_stop(&self, result: &RuleResult) -> bool {
        match self {
            Self::ContinueAlways => false,
            Self::StopOnIssue => result.has_issue(),
            Self::StopWhen(predicate) => predicate(result),
        }
    }
}

impl std::fmt::Debug for ContinuationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContinueAlways => f.write_str("ContinueAlways"),
            Self::StopOnIssue => f.write_str("StopOnIssue"),
            Self::StopWhen(_) => f.write_str("StopWhen(..)"),
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

struct Step<R> {
    rule: Arc<dyn Rule<R>>,
    policy: ContinuationPolicy,
}

/// Immutable, ordered rule pipeline. Built once via [`RulePipelineBuilder`].
pub struct RulePipeline<R> {
    steps: Vec<Step<R>>,
}

impl<R> RulePipeline<R> {
    /// Start building a pipeline.
    #[must_use]
    pub fn builder() -> RulePipelineBuilder<R> {
        RulePipelineBuilder { steps: Vec::new() }
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute the registered rules in order against one record.
    ///
    /// Halts after the first result whose policy fires; skipped rules do not
    /// appear in the output. An empty pipeline returns an empty list without
    /// invoking anything.
    ///
    /// # Errors
    ///
    /// Propagates the first `RuleError`; results gathered so far are
    /// discarded and the pass must be aborted.
    pub fn execute(
        &self,
        record: &R,
        ctx: &AnalysisContext,
    ) -> Result<Vec<PipelineRuleResult>, RuleError> {
        let mut results = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let result = step.rule.evaluate(record, ctx)?;
            let stop_processing = step.policy.should_stop(&result);
            results.push(PipelineRuleResult {
                rule_code: step.rule.code(),
                result,
                stop_processing,
            });
            if stop_processing {
                break;
            }
        }

        Ok(results)
    }
}

/// Builder assembling the ordered `(rule, policy)` sequence.
pub struct RulePipelineBuilder<R> {
    steps: Vec<Step<R>>,
}

impl<R> RulePipelineBuilder<R> {
    /// Register a rule that never halts the pipeline.
    #[must_use]
    pub fn continue_always(self, rule: Arc<dyn Rule<R>>) -> Self {
        self.register(rule, ContinuationPolicy::ContinueAlways)
    }

    /// Register a rule that halts the pipeline when it reports an issue.
    #[must_use]
    pub fn stop_on_issue(self, rule: Arc<dyn Rule<R>>) -> Self {
        self.register(rule, ContinuationPolicy::StopOnIssue)
    }

    /// Register a rule with a custom stop predicate.
    #[must_use]
    pub fn stop_when(
        self,
        rule: Arc<dyn Rule<R>>,
        predicate: impl Fn(&RuleResult) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.register(rule, ContinuationPolicy::StopWhen(Arc::new(predicate)))
    }

    /// Register a rule with an explicit policy.
    #[must_use]
    pub fn register(mut self, rule: Arc<dyn Rule<R>>, policy: ContinuationPolicy) -> Self {
        self.steps.push(Step { rule, policy });
        self
    }

    /// Freeze the pipeline.
    #[must_use]
    pub fn build(self) -> RulePipeline<R> {
        RulePipeline { steps: self.steps }
    }
}

// ============================================================================
// TESTS
// ============================================================================
