//! FACTUM — Validation Pipeline Demo CLI
//!
//! Runs one or all of the three demo scenarios.  Each scenario uses real
//! FACTUM components (rule engine, anomaly detectors, auto-corrector,
//! confidence scorer) wired together with in-memory fakes for the external
//! collaborators, so everything runs offline.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- business-rules
//!   cargo run -p demo -- anomaly-ml
//!   cargo run -p demo -- fact-check

use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use factum_connect::{ConnectorRegistry, WebVerifier};
use factum_contracts::traits::{SearchHit, SearchProvider, TextSimilarity};
use factum_contracts::{CollaboratorError, ValidationContext};
use factum_core::Validator;
use factum_rules::RuleEngine;
use factum_stats::MlAnomalyDetector;

// ── CLI definition ────────────────────────────────────────────────────────────

/// FACTUM — rule-based validation of AI-generated documents.
///
/// Each subcommand runs one or all of the demo scenarios, demonstrating
/// rule evaluation, auto-correction, anomaly detection, and confidence
/// scoring.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "FACTUM validation pipeline demo",
    long_about = "Runs FACTUM demo scenarios showing rule evaluation, auto-correction,\n\
                  per-tenant ML anomaly detection, and confidence scoring."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all three scenarios in sequence.
    RunAll,
    /// Scenario 1: business rules with auto-correction (range, enum, required).
    BusinessRules,
    /// Scenario 2: per-tenant ML anomaly detection (train, then score).
    AnomalyMl,
    /// Scenario 3: semantic alignment and web fact-check with fake providers.
    FactCheck,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Structured logging. Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::BusinessRules => run_business_rules().await,
        Command::AnomalyMl => run_anomaly_ml().await,
        Command::FactCheck => run_fact_check().await,
    };

    match result {
        Ok(()) => println!("All selected scenarios completed successfully."),
        Err(e) => {
            eprintln!("Demo error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_all() -> factum_contracts::FactumResult<()> {
    run_business_rules().await?;
    run_anomaly_ml().await?;
    run_fact_check().await?;
    Ok(())
}

fn print_banner() {
    println!();
    println!("FACTUM — AI Output Validation Pipeline");
    println!("======================================");
    println!();
    println!("Pipeline per request:");
    println!("  [1] Rule engine evaluates every rule in order (range, pattern, enum, ...)");
    println!("  [2] Anomaly detectors flag statistical outliers and suspicious constants");
    println!("  [3] Auto-corrector repairs error-level violations (clamp, fuzzy, default)");
    println!("  [4] Confidence scorer blends five factors into one trust number");
    println!();
}

// ── Shared fakes ──────────────────────────────────────────────────────────────

/// Similarity fake: proportional to shared lowercase words.
struct WordOverlapSimilarity;

#[async_trait]
impl TextSimilarity for WordOverlapSimilarity {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64, CollaboratorError> {
        let a_words: std::collections::HashSet<String> =
            a.to_lowercase().split_whitespace().map(String::from).collect();
        let b_words: std::collections::HashSet<String> =
            b.to_lowercase().split_whitespace().map(String::from).collect();
        if a_words.is_empty() || b_words.is_empty() {
            return Ok(0.0);
        }
        let shared = a_words.intersection(&b_words).count() as f64;
        Ok(shared / a_words.len().max(b_words.len()) as f64)
    }
}

/// Search fake with a tiny canned corpus.
struct CannedSearch;

#[async_trait]
impl SearchProvider for CannedSearch {
    async fn search(
        &self,
        _query: &str,
        _depth: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, CollaboratorError> {
        let hits = vec![
            SearchHit {
                url: "https://timings.example/dhaka".to_string(),
                title: "Dhaka prayer timings".to_string(),
                snippet: "official sehri time for dhaka is 05:08 am during ramadan".to_string(),
                relevance: 0.92,
            },
            SearchHit {
                url: "https://almanac.example/bd".to_string(),
                title: "Bangladesh almanac".to_string(),
                snippet: "dhaka sunrise sunset and sehri schedule".to_string(),
                relevance: 0.74,
            },
        ];
        Ok(hits.into_iter().take(max_results).collect())
    }
}

fn build_validator(ml: Arc<MlAnomalyDetector>) -> Validator {
    let mut registry = ConnectorRegistry::new();
    factum_connect::register_builtins(&mut registry);

    let similarity: Arc<dyn TextSimilarity> = Arc::new(WordOverlapSimilarity);
    let web = WebVerifier::new(Arc::new(CannedSearch), Arc::clone(&similarity));

    let engine = RuleEngine::new(Arc::new(registry), ml)
        .with_similarity(similarity)
        .with_web_verifier(Arc::new(web));
    Validator::new(engine)
}

fn print_result(label: &str, result: &factum_contracts::ValidationResult) {
    println!("  [{label}]");
    println!("    status:     {:?}", result.status);
    println!("    is_valid:   {}", result.is_valid);
    println!(
        "    confidence: {} ({})",
        result
            .confidence_score
            .map_or("-".to_string(), |c| format!("{c:.3}")),
        result.confidence_level.as_deref().unwrap_or("-")
    );
    for v in &result.violations {
        println!("    [{}] {}: {}", v.severity, v.field, v.message);
    }
    for fix in &result.corrections_applied {
        println!("    fix: {fix}");
    }
    if let Some(corrected) = &result.corrected_output {
        println!("    corrected: {corrected}");
    }
    println!();
}

// ── Scenario 1: business rules + auto-correction ──────────────────────────────

async fn run_business_rules() -> factum_contracts::FactumResult<()> {
    println!("Scenario 1: business rules with auto-correction");
    println!("-----------------------------------------------");

    let validator = build_validator(Arc::new(MlAnomalyDetector::new()));

    // A timesheet-style AI output with three problems: out-of-range hours,
    // a misspelled enum value, and a missing timezone.
    let document = json!({
        "user_id": 12345,
        "hours": 30,
        "fiqh_school": "Hanafy",
        "project_name": "  Project-X  "
    });

    let rules = json!([
        { "type": "range", "name": "hours_check", "field": "hours", "min": 0, "max": 24 },
        {
            "type": "enum", "name": "school_check", "field": "fiqh_school",
            "valid_options": ["Hanafi", "Jafaria", "Shafi", "Maliki", "Hanbali"]
        },
        {
            "type": "required", "name": "timezone_required", "field": "timezone",
            "default_value": "Asia/Dhaka"
        },
        {
            "type": "constraint", "name": "hours_positive", "field": "hours",
            "expression": "value > 0"
        }
    ]);

    let context = ValidationContext {
        auto_correct: true,
        ..ValidationContext::default()
    };

    let result = validator.validate(&document, &rules, &context).await?;
    print_result("timesheet", &result);
    Ok(())
}

// ── Scenario 2: per-tenant ML anomaly detection ───────────────────────────────

async fn run_anomaly_ml() -> factum_contracts::FactumResult<()> {
    println!("Scenario 2: per-tenant ML anomaly detection");
    println!("-------------------------------------------");

    let ml = Arc::new(MlAnomalyDetector::new());

    // Train on 200 synthetic historical records with hours in [6, 9].
    let samples: Vec<Value> = (0..200)
        .map(|i| {
            let hours = 6.0 + 3.0 * ((i * 37 % 100) as f64 / 100.0);
            json!({ "hours": hours, "total_cost": hours * 20.0 })
        })
        .collect();
    let report = ml.train(
        "org-demo",
        &samples,
        &["hours".to_string(), "total_cost".to_string()],
        0.05,
    );
    println!("  training: {}", report.message);

    let validator = build_validator(Arc::clone(&ml));
    let rules = json!([{
        "type": "anomaly_ml", "name": "hours_anomaly",
        "fields": ["hours", "total_cost"], "org_id": "org-demo",
        "severity": "warning"
    }]);
    let context = ValidationContext::default();

    let typical = validator
        .validate(&json!({ "hours": 7.5, "total_cost": 150.0 }), &rules, &context)
        .await?;
    print_result("typical sample (hours 7.5)", &typical);

    let outlier = validator
        .validate(&json!({ "hours": 30.0, "total_cost": 150.0 }), &rules, &context)
        .await?;
    print_result("outlier sample (hours 30)", &outlier);

    // Scoring an org that never trained must warn, never flag.
    let untrained = validator
        .validate(
            &json!({ "hours": 30.0 }),
            &json!([{ "type": "anomaly_ml", "fields": ["hours"], "org_id": "org-new" }]),
            &context,
        )
        .await?;
    print_result("untrained organization", &untrained);

    Ok(())
}

// ── Scenario 3: semantic alignment + web fact-check ───────────────────────────

async fn run_fact_check() -> factum_contracts::FactumResult<()> {
    println!("Scenario 3: semantic alignment and web fact-check");
    println!("-------------------------------------------------");

    let validator = build_validator(Arc::new(MlAnomalyDetector::new()));

    let document = json!({
        "answer": "official sehri time for dhaka is 05:08 am",
        "recommendation": "increase dosage of metformin immediately"
    });

    let rules = json!([
        {
            "type": "web_verify", "name": "sehri_claim_check", "field": "answer",
            "confidence_threshold": 0.4, "severity": "error"
        },
        {
            "type": "semantic", "name": "alignment_check",
            "output_field": "recommendation", "context_field": "patient_history",
            "min_alignment": 0.5, "severity": "error"
        }
    ]);

    let context: ValidationContext = serde_json::from_value(json!({
        "patient_history": "patient reports stable glucose, no medication changes planned"
    }))
    .expect("context literal is valid");

    let result = validator.validate(&document, &rules, &context).await?;
    print_result("grounded claims", &result);
    Ok(())
}
