//! The rule engine: dispatches each rule by kind to its evaluator.
//!
//! `evaluate()` walks the caller-supplied rule specs in order and collects
//! every violation before returning, so callers see the full failure set in
//! one pass.  Three degradation guarantees hold throughout:
//!
//! - an unknown rule kind is logged and skipped (forward compatibility);
//! - a malformed known kind produces exactly one `warning` violation;
//! - an evaluator that touches the outside world (reference, external_ref,
//!   semantic, web_verify) carries its own timeout and converts every
//!   failure into a violation, never an error.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use factum_connect::{ConnectorRegistry, WebVerifier};
use factum_contracts::traits::{ReferenceLookup, TextSimilarity};
use factum_contracts::value::{as_number, get_path};
use factum_contracts::{
    CorrectionHint, FactumError, Rule, RuleKind, Severity, ValidationContext, Violation,
    ViolationKind,
};
use factum_stats::MlAnomalyDetector;

use crate::expr::evaluate_predicate;

/// Default timeout for evaluators that perform outbound I/O.
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest prefix of a text value echoed back in violations.
const FOUND_VALUE_LIMIT: usize = 200;

/// The FACTUM rule engine.
///
/// Owns the shared connector registry and ML detector; the remaining
/// collaborators are optional — rules that need an absent collaborator
/// degrade to `warning` violations instead of failing.
pub struct RuleEngine {
    connectors: Arc<ConnectorRegistry>,
    ml: Arc<MlAnomalyDetector>,
    similarity: Option<Arc<dyn TextSimilarity>>,
    references: Option<Arc<dyn ReferenceLookup>>,
    web: Option<Arc<WebVerifier>>,
    io_timeout: Duration,
}

impl RuleEngine {
    pub fn new(connectors: Arc<ConnectorRegistry>, ml: Arc<MlAnomalyDetector>) -> Self {
        Self {
            connectors,
            ml,
            similarity: None,
            references: None,
            web: None,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Inject the embedding-similarity collaborator (enables `semantic`).
    pub fn with_similarity(mut self, similarity: Arc<dyn TextSimilarity>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    /// Inject the reference-lookup collaborator (enables `reference`).
    pub fn with_references(mut self, references: Arc<dyn ReferenceLookup>) -> Self {
        self.references = Some(references);
        self
    }

    /// Inject the web fact-check pipeline (enables `web_verify`).
    pub fn with_web_verifier(mut self, web: Arc<WebVerifier>) -> Self {
        self.web = Some(web);
        self
    }

    /// Override the default outbound-I/O timeout.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Parse rule specs, dropping unknown kinds and malformed rules.
    ///
    /// Used by callers that need the typed rules for a later pass (the
    /// anomaly detector); parse diagnostics are produced by `evaluate`.
    pub fn parse_rules(rule_specs: &[Value]) -> Vec<Rule> {
        rule_specs
            .iter()
            .filter_map(|spec| Rule::from_spec(spec).ok().flatten())
            .collect()
    }

    /// Evaluate every rule against `document`, in list order.
    pub async fn evaluate(
        &self,
        document: &Value,
        rule_specs: &[Value],
        context: &ValidationContext,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        for spec in rule_specs {
            let rule = match Rule::from_spec(spec) {
                Ok(Some(rule)) => rule,
                Ok(None) => {
                    warn!(
                        kind = spec.get("type").and_then(|v| v.as_str()).unwrap_or("?"),
                        "skipping rule with unrecognized kind"
                    );
                    continue;
                }
                Err(e) => {
                    violations.push(Violation::new(
                        &e.name,
                        ViolationKind::Constraint,
                        "unknown",
                        format!("rule parse error: {}", e.reason),
                        Severity::Warning,
                    ));
                    continue;
                }
            };

            debug!(rule = %rule.name, kind = rule.kind.kind_str(), "evaluating rule");
            self.evaluate_rule(document, &rule, context, &mut violations)
                .await;
        }

        violations
    }

    async fn evaluate_rule(
        &self,
        document: &Value,
        rule: &Rule,
        context: &ValidationContext,
        out: &mut Vec<Violation>,
    ) {
        match &rule.kind {
            RuleKind::Schema { schema } => self.eval_schema(document, rule, schema, out),
            RuleKind::Range { field, min, max } => {
                self.eval_range(document, rule, field, *min, *max, out)
            }
            RuleKind::Pattern {
                field,
                pattern,
                message,
                suggestion,
            } => self.eval_pattern(document, rule, field, pattern, message, suggestion, out),
            RuleKind::Constraint {
                field,
                expression,
                message,
            } => self.eval_constraint(document, rule, field, expression, message, out),
            RuleKind::Enumeration {
                field,
                valid_options,
            } => self.eval_enum(document, rule, field, valid_options, out),
            RuleKind::Required {
                field,
                default_value,
            } => self.eval_required(document, rule, field, default_value, out),
            RuleKind::Reference {
                field,
                table,
                column,
                message,
            } => {
                self.eval_reference(document, rule, field, table, column, message, context, out)
                    .await
            }
            RuleKind::ExternalRef {
                field,
                connector,
                params,
                timeout,
            } => {
                self.eval_external_ref(document, rule, field, connector, params, *timeout, out)
                    .await
            }
            RuleKind::Semantic {
                output_field,
                context_field,
                min_alignment,
            } => {
                self.eval_semantic(document, rule, output_field, context_field, *min_alignment, context, out)
                    .await
            }
            RuleKind::WebVerify {
                field,
                confidence_threshold,
                search_depth,
                max_results,
            } => {
                self.eval_web_verify(
                    document,
                    rule,
                    field,
                    *confidence_threshold,
                    search_depth,
                    *max_results,
                    out,
                )
                .await
            }
            // Statistical anomaly rules run in the dedicated anomaly pass,
            // gated by `context.detect_anomalies`.
            RuleKind::AnomalyStat { .. } => {}
            RuleKind::AnomalyMl {
                fields,
                org_id,
                min_samples,
            } => self.eval_anomaly_ml(document, rule, fields, org_id, *min_samples, context, out),
        }
    }

    // ── schema ────────────────────────────────────────────────────────────────

    fn eval_schema(&self, document: &Value, rule: &Rule, schema: &Value, out: &mut Vec<Violation>) {
        match jsonschema::validator_for(schema) {
            Ok(validator) => {
                for error in validator.iter_errors(document) {
                    let pointer = error.instance_path.to_string();
                    let field = if pointer.is_empty() {
                        "root".to_string()
                    } else {
                        pointer.trim_start_matches('/').replace('/', ".")
                    };
                    out.push(
                        Violation::new(
                            &rule.name,
                            ViolationKind::Schema,
                            field,
                            error.to_string(),
                            rule.severity,
                        )
                        .with_value(error.instance.clone().into_owned()),
                    );
                }
            }
            Err(e) => {
                out.push(Violation::new(
                    &rule.name,
                    ViolationKind::Schema,
                    "root",
                    format!("invalid JSON Schema document: {e}"),
                    rule.severity,
                ));
            }
        }
    }

    // ── range ─────────────────────────────────────────────────────────────────

    fn eval_range(
        &self,
        document: &Value,
        rule: &Rule,
        field: &str,
        min: Option<f64>,
        max: Option<f64>,
        out: &mut Vec<Violation>,
    ) {
        let Some(value) = get_path(document, field) else {
            return;
        };

        let Some(number) = as_number(value) else {
            out.push(
                Violation::new(
                    &rule.name,
                    ViolationKind::Constraint,
                    field,
                    format!("{field} must be a number"),
                    Severity::Error,
                )
                .with_value(value.clone())
                .with_hint(CorrectionHint::text("numeric value")),
            );
            return;
        };

        let below = min.is_some_and(|m| number < m);
        let above = max.is_some_and(|m| number > m);
        if !below && !above {
            return;
        }

        let message = match (min, max) {
            (Some(min), Some(max)) => format!("{field} must be between {min} and {max}"),
            (Some(min), None) => format!("{field} must be >= {min}"),
            (None, Some(max)) => format!("{field} must be <= {max}"),
            (None, None) => return,
        };

        out.push(
            Violation::new(&rule.name, ViolationKind::Constraint, field, message, rule.severity)
                .with_value(value.clone())
                .with_hint(CorrectionHint::Range { min, max }),
        );
    }

    // ── pattern ───────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn eval_pattern(
        &self,
        document: &Value,
        rule: &Rule,
        field: &str,
        pattern: &str,
        message: &Option<String>,
        suggestion: &Option<String>,
        out: &mut Vec<Violation>,
    ) {
        let Some(value) = get_path(document, field) else {
            return;
        };

        let Some(text) = value.as_str() else {
            out.push(
                Violation::new(
                    &rule.name,
                    ViolationKind::Constraint,
                    field,
                    format!("{field} must be a string for pattern matching"),
                    Severity::Error,
                )
                .with_value(value.clone())
                .with_hint(CorrectionHint::text("string")),
            );
            return;
        };

        // Match-at-start semantics: anchor the pattern unless the caller
        // already did.
        let anchored = if pattern.starts_with('^') {
            pattern.to_string()
        } else {
            format!("^(?:{pattern})")
        };

        let regex = match regex::Regex::new(&anchored) {
            Ok(regex) => regex,
            Err(e) => {
                out.push(
                    Violation::new(
                        &rule.name,
                        ViolationKind::Constraint,
                        field,
                        format!("invalid regex pattern: {e}"),
                        Severity::Warning,
                    )
                    .with_value(value.clone()),
                );
                return;
            }
        };

        if !regex.is_match(text) {
            let mut violation = Violation::new(
                &rule.name,
                ViolationKind::Constraint,
                field,
                message
                    .clone()
                    .unwrap_or_else(|| format!("value must match pattern: {pattern}")),
                rule.severity,
            )
            .with_value(value.clone())
            .with_hint(CorrectionHint::text(format!("pattern: {pattern}")));
            if let Some(suggestion) = suggestion {
                violation = violation.with_suggestion(suggestion.clone());
            }
            out.push(violation);
        }
    }

    // ── constraint ────────────────────────────────────────────────────────────

    fn eval_constraint(
        &self,
        document: &Value,
        rule: &Rule,
        field: &str,
        expression: &str,
        message: &Option<String>,
        out: &mut Vec<Violation>,
    ) {
        let Some(value) = get_path(document, field) else {
            return;
        };

        match evaluate_predicate(expression, value) {
            Ok(true) => {}
            Ok(false) => {
                out.push(
                    Violation::new(
                        &rule.name,
                        ViolationKind::Constraint,
                        field,
                        message
                            .clone()
                            .unwrap_or_else(|| format!("constraint failed: {expression}")),
                        rule.severity,
                    )
                    .with_value(value.clone())
                    .with_hint(CorrectionHint::text(expression)),
                );
            }
            Err(e) => {
                out.push(
                    Violation::new(
                        &rule.name,
                        ViolationKind::Constraint,
                        field,
                        format!("constraint evaluation error: {e}"),
                        Severity::Warning,
                    )
                    .with_value(value.clone()),
                );
            }
        }
    }

    // ── enum ──────────────────────────────────────────────────────────────────

    fn eval_enum(
        &self,
        document: &Value,
        rule: &Rule,
        field: &str,
        valid_options: &[String],
        out: &mut Vec<Violation>,
    ) {
        let Some(value) = get_path(document, field) else {
            return;
        };

        let found = match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        };

        if valid_options.iter().any(|option| option == &found) {
            return;
        }

        out.push(
            Violation::new(
                &rule.name,
                ViolationKind::Constraint,
                field,
                format!(
                    "{field} value '{found}' is not one of the valid options: {}",
                    valid_options.join(", ")
                ),
                rule.severity,
            )
            .with_value(value.clone())
            .with_hint(CorrectionHint::Options {
                valid: valid_options.to_vec(),
            }),
        );
    }

    // ── required ──────────────────────────────────────────────────────────────

    fn eval_required(
        &self,
        document: &Value,
        rule: &Rule,
        field: &str,
        default_value: &Option<Value>,
        out: &mut Vec<Violation>,
    ) {
        if get_path(document, field).is_some() {
            return;
        }

        let mut violation = Violation::new(
            &rule.name,
            ViolationKind::Schema,
            field,
            format!("required field '{field}' is missing or null"),
            rule.severity,
        );
        if let Some(default) = default_value {
            violation = violation.with_hint(CorrectionHint::Default {
                value: default.clone(),
            });
        }
        out.push(violation);
    }

    // ── reference ─────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn eval_reference(
        &self,
        document: &Value,
        rule: &Rule,
        field: &str,
        table: &str,
        column: &str,
        message: &Option<String>,
        context: &ValidationContext,
        out: &mut Vec<Violation>,
    ) {
        let Some(value) = get_path(document, field) else {
            out.push(Violation::new(
                &rule.name,
                ViolationKind::Reference,
                field,
                message
                    .clone()
                    .unwrap_or_else(|| format!("field '{field}' not found in output")),
                rule.severity,
            ));
            return;
        };

        let Some(references) = self.references.as_ref() else {
            out.push(
                Violation::new(
                    &rule.name,
                    ViolationKind::Reference,
                    field,
                    "reference lookup is not configured".to_string(),
                    Severity::Warning,
                )
                .with_value(value.clone()),
            );
            return;
        };

        let org = context.organization_id.as_deref();
        // Lookup failures (including timeouts) are treated as "does not
        // exist": the collaborator rolls its transaction back, we report the
        // violation.
        let exists = match tokio::time::timeout(
            self.io_timeout,
            references.exists(table, column, value, org),
        )
        .await
        {
            Ok(Ok(exists)) => exists,
            Ok(Err(e)) => {
                warn!(rule = %rule.name, table = %table, column = %column, error = %e, "reference lookup failed");
                false
            }
            Err(_) => {
                warn!(rule = %rule.name, table = %table, column = %column, "reference lookup timed out");
                false
            }
        };

        if !exists {
            let found = display_text(value);
            out.push(
                Violation::new(
                    &rule.name,
                    ViolationKind::Reference,
                    field,
                    message.clone().unwrap_or_else(|| {
                        format!("{field}={found} does not exist in {table}.{column}")
                    }),
                    rule.severity,
                )
                .with_value(value.clone())
                .with_suggestion(format!("Verify that the {field} exists in your database")),
            );
        }
    }

    // ── external_ref ──────────────────────────────────────────────────────────

    async fn eval_external_ref(
        &self,
        document: &Value,
        rule: &Rule,
        field: &str,
        connector: &str,
        params: &serde_json::Map<String, Value>,
        timeout: Option<f64>,
        out: &mut Vec<Violation>,
    ) {
        let Some(value) = get_path(document, field) else {
            return;
        };

        let timeout = timeout
            .map(Duration::from_secs_f64)
            .unwrap_or(self.io_timeout);

        let result = match self.connectors.check(connector, value, params, timeout).await {
            Ok(result) => result,
            Err(FactumError::ConnectorNotRegistered { name, available }) => {
                out.push(
                    Violation::new(
                        &rule.name,
                        ViolationKind::Reference,
                        field,
                        format!("connector '{name}' is not registered (available: {})", available.join(", ")),
                        Severity::Warning,
                    )
                    .with_value(value.clone()),
                );
                return;
            }
            Err(e) => {
                out.push(
                    Violation::new(
                        &rule.name,
                        ViolationKind::Reference,
                        field,
                        format!("external reference check failed: {e}"),
                        Severity::Warning,
                    )
                    .with_value(value.clone()),
                );
                return;
            }
        };

        if result.exists {
            return;
        }

        // Infra problems (connector error, timeout) are warnings; a genuine
        // "does not exist" answer uses the rule's configured severity.
        let severity = if result.infra_failure {
            Severity::Warning
        } else {
            rule.severity
        };

        out.push(
            Violation::new(
                &rule.name,
                ViolationKind::Reference,
                field,
                format!("external reference check failed: {}", result.detail),
                severity,
            )
            .with_value(value.clone())
            .with_hint(CorrectionHint::text(result.detail)),
        );
    }

    // ── semantic ──────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn eval_semantic(
        &self,
        document: &Value,
        rule: &Rule,
        output_field: &str,
        context_field: &str,
        min_alignment: f64,
        context: &ValidationContext,
        out: &mut Vec<Violation>,
    ) {
        let Some(output_value) = get_path(document, output_field) else {
            out.push(Violation::new(
                &rule.name,
                ViolationKind::Semantic,
                output_field,
                format!("field '{output_field}' not found in output"),
                Severity::Warning,
            ));
            return;
        };
        let output_text = display_text(output_value);

        let Some(context_value) = context.get(context_field) else {
            out.push(
                Violation::new(
                    &rule.name,
                    ViolationKind::Semantic,
                    output_field,
                    format!("context field '{context_field}' not provided; cannot run semantic check"),
                    Severity::Warning,
                )
                .with_value(json!(truncate(&output_text))),
            );
            return;
        };
        let context_text = display_text(context_value);

        let Some(similarity) = self.similarity.as_ref() else {
            out.push(Violation::new(
                &rule.name,
                ViolationKind::Semantic,
                output_field,
                "similarity provider is not configured".to_string(),
                Severity::Warning,
            ));
            return;
        };

        let score = match tokio::time::timeout(
            self.io_timeout,
            similarity.similarity(&output_text, &context_text),
        )
        .await
        {
            Ok(Ok(score)) => score.clamp(0.0, 1.0),
            Ok(Err(e)) => {
                out.push(
                    Violation::new(
                        &rule.name,
                        ViolationKind::Semantic,
                        output_field,
                        format!("semantic validation error: {e}"),
                        Severity::Warning,
                    )
                    .with_value(json!(truncate(&output_text))),
                );
                return;
            }
            Err(_) => {
                out.push(Violation::new(
                    &rule.name,
                    ViolationKind::Semantic,
                    output_field,
                    "semantic validation timed out".to_string(),
                    Severity::Warning,
                ));
                return;
            }
        };

        if score >= min_alignment {
            return;
        }

        let label = if score >= 0.3 {
            "weakly aligned; possible semantic mismatch"
        } else {
            "contradicted; output opposes the context"
        };

        out.push(
            Violation::new(
                &rule.name,
                ViolationKind::Semantic,
                output_field,
                format!(
                    "semantic alignment {score:.4} ({label}); output may contradict or ignore the provided '{context_field}'"
                ),
                rule.severity,
            )
            .with_value(json!(truncate(&output_text)))
            .with_hint(CorrectionHint::text(format!(
                "alignment >= {min_alignment} (got {score:.4})"
            )))
            .with_suggestion("Review the output; it may contradict the context"),
        );
    }

    // ── web_verify ────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn eval_web_verify(
        &self,
        document: &Value,
        rule: &Rule,
        field: &str,
        confidence_threshold: f64,
        search_depth: &str,
        max_results: usize,
        out: &mut Vec<Violation>,
    ) {
        let Some(value) = get_path(document, field) else {
            out.push(Violation::new(
                &rule.name,
                ViolationKind::Semantic,
                field,
                format!("field '{field}' not found in output; cannot fact-check"),
                Severity::Warning,
            ));
            return;
        };
        let claim = display_text(value);

        let Some(web) = self.web.as_ref() else {
            out.push(Violation::new(
                &rule.name,
                ViolationKind::Semantic,
                field,
                "web verifier is not configured (missing search credentials)".to_string(),
                Severity::Warning,
            ));
            return;
        };

        let verification = match tokio::time::timeout(
            self.io_timeout,
            web.verify(&claim, search_depth, max_results),
        )
        .await
        {
            Ok(verification) => verification,
            Err(_) => {
                out.push(Violation::new(
                    &rule.name,
                    ViolationKind::Semantic,
                    field,
                    "web verification timed out".to_string(),
                    Severity::Warning,
                ));
                return;
            }
        };

        if let Some(error) = verification.error {
            out.push(
                Violation::new(
                    &rule.name,
                    ViolationKind::Semantic,
                    field,
                    format!("web verification inconclusive: {error}"),
                    Severity::Warning,
                )
                .with_value(json!(truncate(&claim))),
            );
            return;
        }

        if verification.web_confidence >= confidence_threshold {
            return;
        }

        let sources: Vec<&str> = verification
            .sources
            .iter()
            .take(3)
            .map(|s| s.url.as_str())
            .collect();

        out.push(
            Violation::new(
                &rule.name,
                ViolationKind::Semantic,
                field,
                format!(
                    "claim verification verdict {}: web confidence {:.4} is below threshold {confidence_threshold}",
                    verification.verdict, verification.web_confidence
                ),
                rule.severity,
            )
            .with_value(json!(truncate(&claim)))
            .with_hint(CorrectionHint::text(format!(
                "web confidence >= {confidence_threshold}"
            )))
            .with_suggestion(format!("Supporting sources: {}", sources.join(", "))),
        );
    }

    // ── anomaly_ml ────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn eval_anomaly_ml(
        &self,
        document: &Value,
        rule: &Rule,
        fields: &[String],
        org_id: &Option<String>,
        min_samples: Option<usize>,
        context: &ValidationContext,
        out: &mut Vec<Violation>,
    ) {
        let field_label = fields.join(", ");

        let Some(org) = org_id
            .as_deref()
            .or(context.organization_id.as_deref())
        else {
            out.push(Violation::new(
                &rule.name,
                ViolationKind::Statistical,
                field_label,
                "anomaly_ml rule needs an organization id (rule org_id or context organization_id)"
                    .to_string(),
                Severity::Warning,
            ));
            return;
        };

        if !self.ml.is_trained(org) {
            // Give score() a chance to lazy-load from the store first.
            let probe = self.ml.score(org, document, fields);
            if probe.reason.contains("not trained") {
                out.push(Violation::new(
                    &rule.name,
                    ViolationKind::Statistical,
                    field_label,
                    format!(
                        "anomaly model for organization '{org}' is not trained yet; submit training data before this rule can flag anomalies"
                    ),
                    Severity::Warning,
                ));
                return;
            }
        }

        if let (Some(min), Some(trained)) = (min_samples, self.ml.trained_samples(org)) {
            if trained < min {
                out.push(Violation::new(
                    &rule.name,
                    ViolationKind::Statistical,
                    field_label,
                    format!(
                        "anomaly model for organization '{org}' was trained on only {trained} samples; rule requires at least {min}"
                    ),
                    Severity::Warning,
                ));
                return;
            }
        }

        let score = self.ml.score(org, document, fields);
        if score.is_anomaly {
            out.push(
                Violation::new(
                    &rule.name,
                    ViolationKind::Statistical,
                    field_label,
                    score.reason.clone(),
                    rule.severity,
                )
                .with_value(json!(score.raw_score))
                .with_hint(CorrectionHint::text(format!(
                    "decision score >= 0 over fields: {}",
                    score.fields_used.join(", ")
                ))),
            );
        }
    }
}

/// Render any JSON value as plain text for messages and similarity calls.
fn display_text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// Truncate long text for `found_value` echoes.
fn truncate(text: &str) -> String {
    if text.chars().count() <= FOUND_VALUE_LIMIT {
        text.to_string()
    } else {
        text.chars().take(FOUND_VALUE_LIMIT).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use factum_connect::{Connector, ConnectorResult};
    use factum_contracts::CollaboratorError;
    use factum_contracts::traits::{SearchHit, SearchProvider};

    use super::*;

    // ── Builder helpers ───────────────────────────────────────────────────────

    fn engine() -> RuleEngine {
        RuleEngine::new(
            Arc::new(ConnectorRegistry::new()),
            Arc::new(MlAnomalyDetector::new()),
        )
    }

    fn ctx() -> ValidationContext {
        ValidationContext::default()
    }

    async fn run(engine: &RuleEngine, document: Value, rules: Value) -> Vec<Violation> {
        let specs = rules.as_array().cloned().expect("rules literal is an array");
        engine.evaluate(&document, &specs, &ctx()).await
    }

    // ── range ─────────────────────────────────────────────────────────────────

    /// The spec's canonical case: hours 30 against [0, 24] is exactly one
    /// error violation with a {min, max} hint.
    #[tokio::test]
    async fn range_violation_with_hint() {
        let violations = run(
            &engine(),
            json!({ "hours": 30 }),
            json!([{ "type": "range", "name": "hours_check", "field": "hours", "min": 0, "max": 24 }]),
        )
        .await;

        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.rule_name, "hours_check");
        assert_eq!(v.severity, Severity::Error);
        assert_eq!(v.message, "hours must be between 0 and 24");
        assert_eq!(v.found_value, Some(json!(30)));
        assert_eq!(
            v.hint,
            CorrectionHint::Range { min: Some(0.0), max: Some(24.0) }
        );
    }

    /// In-range values and absent fields produce nothing.
    #[tokio::test]
    async fn range_passes() {
        let rules =
            json!([{ "type": "range", "field": "hours", "min": 0, "max": 24 }]);
        assert!(run(&engine(), json!({ "hours": 8 }), rules.clone()).await.is_empty());
        assert!(run(&engine(), json!({ "other": 1 }), rules).await.is_empty());
    }

    /// Numeric strings coerce; non-numeric values are an error.
    #[tokio::test]
    async fn range_coercion() {
        let rules = json!([{ "type": "range", "field": "hours", "min": 0, "max": 24 }]);

        assert!(run(&engine(), json!({ "hours": "8.5" }), rules.clone()).await.is_empty());

        let violations = run(&engine(), json!({ "hours": "eight" }), rules).await;
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("must be a number"));
        assert_eq!(violations[0].severity, Severity::Error);
    }

    /// Open-ended ranges check only the provided bound.
    #[tokio::test]
    async fn range_open_ended() {
        let violations = run(
            &engine(),
            json!({ "age": -1 }),
            json!([{ "type": "range", "field": "age", "min": 0 }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains(">= 0"));
        assert_eq!(violations[0].hint, CorrectionHint::Range { min: Some(0.0), max: None });
    }

    // ── pattern ───────────────────────────────────────────────────────────────

    /// Pattern mismatches report at the rule's severity; matches pass.
    #[tokio::test]
    async fn pattern_matching() {
        let rules = json!([{
            "type": "pattern", "field": "email",
            "pattern": r"[^@]+@[^@]+\.[^@]+", "severity": "warning"
        }]);

        assert!(run(&engine(), json!({ "email": "a@b.cc" }), rules.clone()).await.is_empty());

        let violations = run(&engine(), json!({ "email": "not-an-email" }), rules).await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
    }

    /// Match-at-start semantics: a trailing mismatch still matches.
    #[tokio::test]
    async fn pattern_anchored_at_start() {
        let rules = json!([{ "type": "pattern", "field": "code", "pattern": r"\d{3}" }]);
        assert!(run(&engine(), json!({ "code": "123abc" }), rules.clone()).await.is_empty());
        let violations = run(&engine(), json!({ "code": "abc123" }), rules).await;
        assert_eq!(violations.len(), 1);
    }

    /// An invalid regex is the rule author's bug: warning, not error.
    #[tokio::test]
    async fn pattern_invalid_regex() {
        let violations = run(
            &engine(),
            json!({ "code": "x" }),
            json!([{ "type": "pattern", "field": "code", "pattern": "(" }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("invalid regex"));
    }

    /// Non-string values cannot be pattern-matched.
    #[tokio::test]
    async fn pattern_non_string() {
        let violations = run(
            &engine(),
            json!({ "code": 42 }),
            json!([{ "type": "pattern", "field": "code", "pattern": r"\d+" }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("must be a string"));
    }

    // ── constraint ────────────────────────────────────────────────────────────

    /// A failing predicate uses the rule's message and severity.
    #[tokio::test]
    async fn constraint_failure() {
        let violations = run(
            &engine(),
            json!({ "hours": 30 }),
            json!([{
                "type": "constraint", "field": "hours",
                "expression": "value > 0 && value <= 24",
                "message": "hours outside the working day"
            }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "hours outside the working day");
        assert_eq!(violations[0].severity, Severity::Error);
    }

    /// Erroring predicates become warnings carrying the error text.
    #[tokio::test]
    async fn constraint_error_is_warning() {
        let violations = run(
            &engine(),
            json!({ "hours": 8 }),
            json!([{ "type": "constraint", "field": "hours", "expression": "hours > 0" }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("unknown name"));
    }

    /// Passing predicates produce nothing.
    #[tokio::test]
    async fn constraint_passes() {
        let violations = run(
            &engine(),
            json!({ "hours": 8 }),
            json!([{ "type": "constraint", "field": "hours", "expression": "abs(value) <= 24" }]),
        )
        .await;
        assert!(violations.is_empty());
    }

    // ── enum ──────────────────────────────────────────────────────────────────

    /// Out-of-set values carry the options hint for fuzzy correction.
    #[tokio::test]
    async fn enum_violation_with_options() {
        let violations = run(
            &engine(),
            json!({ "fiqh_school": "Hanafy" }),
            json!([{
                "type": "enum", "field": "fiqh_school",
                "valid_options": ["Hanafi", "Jafaria", "Shafi", "Maliki", "Hanbali"]
            }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].hint,
            CorrectionHint::Options {
                valid: vec![
                    "Hanafi".to_string(),
                    "Jafaria".to_string(),
                    "Shafi".to_string(),
                    "Maliki".to_string(),
                    "Hanbali".to_string()
                ]
            }
        );
    }

    /// Exact members pass.
    #[tokio::test]
    async fn enum_passes() {
        let violations = run(
            &engine(),
            json!({ "fiqh_school": "Hanafi" }),
            json!([{ "type": "enum", "field": "fiqh_school", "valid_options": ["Hanafi"] }]),
        )
        .await;
        assert!(violations.is_empty());
    }

    // ── required ──────────────────────────────────────────────────────────────

    /// Absent and explicit-null fields both violate; the default value rides
    /// along as a hint.
    #[tokio::test]
    async fn required_missing_and_null() {
        let rules = json!([{
            "type": "required", "field": "timezone", "default_value": "Asia/Dhaka"
        }]);

        for doc in [json!({}), json!({ "timezone": null })] {
            let violations = run(&engine(), doc, rules.clone()).await;
            assert_eq!(violations.len(), 1);
            assert_eq!(
                violations[0].hint,
                CorrectionHint::Default { value: json!("Asia/Dhaka") }
            );
        }

        assert!(run(&engine(), json!({ "timezone": "UTC" }), rules).await.is_empty());
    }

    // ── schema ────────────────────────────────────────────────────────────────

    /// JSON Schema violations surface one violation per schema error with a
    /// dotted field path.
    #[tokio::test]
    async fn schema_violations() {
        let rules = json!([{
            "type": "schema", "name": "shape_check",
            "schema": {
                "type": "object",
                "properties": {
                    "user": {
                        "type": "object",
                        "properties": { "hours": { "type": "number" } }
                    }
                },
                "required": ["user"]
            }
        }]);

        assert!(run(&engine(), json!({ "user": { "hours": 8 } }), rules.clone()).await.is_empty());

        let violations = run(&engine(), json!({ "user": { "hours": "x" } }), rules).await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Schema);
        assert_eq!(violations[0].field, "user.hours");
    }

    // ── reference ─────────────────────────────────────────────────────────────

    struct SetLookup(Vec<String>);

    #[async_trait]
    impl ReferenceLookup for SetLookup {
        async fn exists(
            &self,
            _table: &str,
            _column: &str,
            value: &Value,
            _organization_id: Option<&str>,
        ) -> Result<bool, CollaboratorError> {
            Ok(self.0.iter().any(|v| Some(v.as_str()) == value.as_str()))
        }
    }

    struct BrokenLookup;

    #[async_trait]
    impl ReferenceLookup for BrokenLookup {
        async fn exists(
            &self,
            _table: &str,
            _column: &str,
            _value: &Value,
            _organization_id: Option<&str>,
        ) -> Result<bool, CollaboratorError> {
            Err(CollaboratorError::from("relation does not exist"))
        }
    }

    /// Known values pass; unknown values violate at the rule's severity.
    #[tokio::test]
    async fn reference_lookup() {
        let engine = engine().with_references(Arc::new(SetLookup(vec!["u-1".to_string()])));
        let rules = json!([{
            "type": "reference", "field": "user_id", "table": "users", "column": "id"
        }]);

        assert!(run(&engine, json!({ "user_id": "u-1" }), rules.clone()).await.is_empty());

        let violations = run(&engine, json!({ "user_id": "u-404" }), rules).await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Reference);
        assert_eq!(violations[0].severity, Severity::Error);
        assert!(violations[0].message.contains("does not exist in users.id"));
    }

    /// A lookup failure is treated as "does not exist": the violation is
    /// still produced.
    #[tokio::test]
    async fn reference_failure_still_violates() {
        let engine = engine().with_references(Arc::new(BrokenLookup));
        let violations = run(
            &engine,
            json!({ "user_id": "u-1" }),
            json!([{ "type": "reference", "field": "user_id", "table": "users", "column": "id" }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Error);
    }

    /// Without a configured lookup the rule degrades to a warning.
    #[tokio::test]
    async fn reference_without_provider() {
        let violations = run(
            &engine(),
            json!({ "user_id": "u-1" }),
            json!([{ "type": "reference", "field": "user_id", "table": "users", "column": "id" }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("not configured"));
    }

    // ── external_ref ──────────────────────────────────────────────────────────

    struct NeverExists;

    #[async_trait]
    impl Connector for NeverExists {
        async fn call(
            &self,
            value: &Value,
            _params: &serde_json::Map<String, Value>,
        ) -> Result<ConnectorResult, CollaboratorError> {
            Ok(ConnectorResult::missing(format!("{value} is not on record")))
        }
    }

    struct Throws;

    #[async_trait]
    impl Connector for Throws {
        async fn call(
            &self,
            _value: &Value,
            _params: &serde_json::Map<String, Value>,
        ) -> Result<ConnectorResult, CollaboratorError> {
            Err(CollaboratorError::from("TLS handshake failed"))
        }
    }

    fn engine_with_connectors() -> RuleEngine {
        let mut registry = ConnectorRegistry::new();
        registry.register("customer_check", Box::new(NeverExists));
        registry.register("flaky", Box::new(Throws));
        RuleEngine::new(Arc::new(registry), Arc::new(MlAnomalyDetector::new()))
    }

    /// A genuine "does not exist" uses the rule's configured severity.
    #[tokio::test]
    async fn external_ref_genuine_miss() {
        let violations = run(
            &engine_with_connectors(),
            json!({ "customer": "cust_1" }),
            json!([{
                "type": "external_ref", "field": "customer",
                "connector": "customer_check", "severity": "error"
            }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Error);
        assert!(violations[0].message.contains("not on record"));
    }

    /// A throwing connector is an infra problem: warning severity.
    #[tokio::test]
    async fn external_ref_infra_failure() {
        let violations = run(
            &engine_with_connectors(),
            json!({ "customer": "cust_1" }),
            json!([{
                "type": "external_ref", "field": "customer",
                "connector": "flaky", "severity": "error"
            }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("TLS handshake failed"));
    }

    /// An unregistered connector name is a warning naming the alternatives.
    #[tokio::test]
    async fn external_ref_unregistered() {
        let violations = run(
            &engine_with_connectors(),
            json!({ "customer": "cust_1" }),
            json!([{
                "type": "external_ref", "field": "customer",
                "connector": "phantom", "severity": "error"
            }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("not registered"));
    }

    // ── semantic ──────────────────────────────────────────────────────────────

    struct FixedSimilarity(f64);

    #[async_trait]
    impl TextSimilarity for FixedSimilarity {
        async fn similarity(&self, _a: &str, _b: &str) -> Result<f64, CollaboratorError> {
            Ok(self.0)
        }
    }

    fn semantic_rules() -> Value {
        json!([{
            "type": "semantic", "name": "alignment_check",
            "output_field": "recommendation", "context_field": "patient_history",
            "min_alignment": 0.5, "severity": "error"
        }])
    }

    fn semantic_context() -> ValidationContext {
        serde_json::from_value(json!({ "patient_history": "diabetic, on metformin" })).unwrap()
    }

    /// Below-threshold alignment violates at the rule's severity.
    #[tokio::test]
    async fn semantic_contradiction() {
        let engine = engine().with_similarity(Arc::new(FixedSimilarity(0.2)));
        let specs = semantic_rules().as_array().cloned().unwrap();
        let violations = engine
            .evaluate(
                &json!({ "recommendation": "prescribe sugar" }),
                &specs,
                &semantic_context(),
            )
            .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Error);
        assert!(violations[0].message.contains("0.2000"));
        assert!(violations[0].message.contains("contradicted"));
    }

    /// Aligned output passes.
    #[tokio::test]
    async fn semantic_aligned() {
        let engine = engine().with_similarity(Arc::new(FixedSimilarity(0.8)));
        let specs = semantic_rules().as_array().cloned().unwrap();
        let violations = engine
            .evaluate(&json!({ "recommendation": "ok" }), &specs, &semantic_context())
            .await;
        assert!(violations.is_empty());
    }

    /// Missing inputs degrade to warnings, never errors.
    #[tokio::test]
    async fn semantic_missing_inputs() {
        let engine = engine().with_similarity(Arc::new(FixedSimilarity(0.9)));
        let specs = semantic_rules().as_array().cloned().unwrap();

        // Output field absent.
        let violations = engine
            .evaluate(&json!({}), &specs, &semantic_context())
            .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);

        // Context field absent.
        let violations = engine
            .evaluate(&json!({ "recommendation": "ok" }), &specs, &ctx())
            .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("patient_history"));
    }

    // ── web_verify ────────────────────────────────────────────────────────────

    struct OneHit;

    #[async_trait]
    impl SearchProvider for OneHit {
        async fn search(
            &self,
            _query: &str,
            _depth: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchHit>, CollaboratorError> {
            Ok(vec![SearchHit {
                url: "https://example.org/evidence".to_string(),
                title: "Evidence".to_string(),
                snippet: "some snippet".to_string(),
                relevance: 0.9,
            }])
        }
    }

    /// Low web confidence violates at the rule's severity and names the
    /// supporting sources.
    #[tokio::test]
    async fn web_verify_low_confidence() {
        let web = WebVerifier::new(Arc::new(OneHit), Arc::new(FixedSimilarity(0.2)));
        let engine = engine().with_web_verifier(Arc::new(web));
        let violations = run(
            &engine,
            json!({ "claim": "the moon is cheese" }),
            json!([{ "type": "web_verify", "field": "claim", "severity": "error" }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Error);
        assert!(violations[0]
            .suggestion
            .as_deref()
            .unwrap()
            .contains("example.org/evidence"));
    }

    /// Without a verifier the rule degrades to a warning.
    #[tokio::test]
    async fn web_verify_unconfigured() {
        let violations = run(
            &engine(),
            json!({ "claim": "x" }),
            json!([{ "type": "web_verify", "field": "claim" }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("not configured"));
    }

    // ── anomaly_ml ────────────────────────────────────────────────────────────

    fn trained_engine() -> RuleEngine {
        let ml = MlAnomalyDetector::new();
        let samples: Vec<Value> = (0..200)
            .map(|i| json!({ "hours": 6.0 + 3.0 * ((i * 37 % 100) as f64 / 100.0) }))
            .collect();
        let report = ml.train("org-1", &samples, &["hours".to_string()], 0.05);
        assert!(report.success);
        RuleEngine::new(Arc::new(ConnectorRegistry::new()), Arc::new(ml))
    }

    fn ml_rules() -> Value {
        json!([{
            "type": "anomaly_ml", "name": "hours_anomaly",
            "fields": ["hours"], "org_id": "org-1", "severity": "warning"
        }])
    }

    /// An extreme value against a trained model violates.
    #[tokio::test]
    async fn anomaly_ml_flags_outlier() {
        let violations = run(&trained_engine(), json!({ "hours": 30 }), ml_rules()).await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Statistical);
        assert!(violations[0].message.contains("anomaly detected"));
    }

    /// A typical value passes.
    #[tokio::test]
    async fn anomaly_ml_passes_typical() {
        let violations = run(&trained_engine(), json!({ "hours": 7.5 }), ml_rules()).await;
        assert!(violations.is_empty(), "unexpected: {violations:?}");
    }

    /// An untrained org produces exactly one warning and never a false
    /// anomaly.
    #[tokio::test]
    async fn anomaly_ml_untrained_org() {
        let violations = run(
            &engine(),
            json!({ "hours": 30 }),
            json!([{ "type": "anomaly_ml", "fields": ["hours"], "org_id": "org-new" }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("not trained"));
    }

    /// Without any organization id the rule degrades to a warning.
    #[tokio::test]
    async fn anomaly_ml_needs_org() {
        let violations = run(
            &engine(),
            json!({ "hours": 30 }),
            json!([{ "type": "anomaly_ml", "fields": ["hours"] }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("organization id"));
    }

    /// A model trained below the rule's floor is reported, not scored.
    #[tokio::test]
    async fn anomaly_ml_min_samples_floor() {
        let ml = MlAnomalyDetector::new();
        let samples: Vec<Value> = (0..10).map(|i| json!({ "hours": 6.0 + i as f64 * 0.1 })).collect();
        ml.train("org-1", &samples, &["hours".to_string()], 0.05);
        let engine = RuleEngine::new(Arc::new(ConnectorRegistry::new()), Arc::new(ml));

        let violations = run(
            &engine,
            json!({ "hours": 30 }),
            json!([{
                "type": "anomaly_ml", "fields": ["hours"],
                "org_id": "org-1", "min_samples": 50
            }]),
        )
        .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("only 10 samples"));
    }

    // ── dispatch behavior ─────────────────────────────────────────────────────

    /// Unknown kinds are skipped silently; malformed known kinds produce
    /// exactly one warning; good rules still run. Order follows rule order.
    #[tokio::test]
    async fn dispatch_degradation() {
        let violations = run(
            &engine(),
            json!({ "hours": 30 }),
            json!([
                { "type": "telepathy", "field": "hours" },
                { "type": "enum", "name": "broken", "field": "hours" },
                { "type": "range", "name": "hours_check", "field": "hours", "min": 0, "max": 24 }
            ]),
        )
        .await;

        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].rule_name, "broken");
        assert_eq!(violations[0].severity, Severity::Warning);
        assert!(violations[0].message.contains("rule parse error"));
        assert_eq!(violations[1].rule_name, "hours_check");
    }

    /// Identical inputs produce identical violation lists (determinism).
    #[tokio::test]
    async fn evaluation_is_deterministic() {
        let engine = trained_engine();
        let doc = json!({ "hours": 30, "email": "bad" });
        let rules = json!([
            { "type": "range", "field": "hours", "min": 0, "max": 24 },
            { "type": "pattern", "field": "email", "pattern": r"[^@]+@[^@]+" },
            { "type": "anomaly_ml", "fields": ["hours"], "org_id": "org-1" }
        ]);
        let specs = rules.as_array().cloned().unwrap();

        let first = engine.evaluate(&doc, &specs, &ctx()).await;
        let second = engine.evaluate(&doc, &specs, &ctx()).await;
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
