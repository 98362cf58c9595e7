//! `argus check` command implementation.
//!
//! Validates a project before anything is run against an account:
//! - the control manifest parses and every expression compiles
//! - every list and sub-call operation is served by the provider
//! - capability entries point at registered operations
//! - the remediation rule set loads

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

use argus_core::{ArgusConfig, ControlManifest, SinkKind};
use argus_policy::load_policy;
use argus_runtime::setup::{build_registry, load_capabilities};
use argus_runtime::{CompiledControl, OperationRegistry, Provider};

// ============================================================================
// Check Result Types
// ============================================================================

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational message.
    Info,
    /// Warning - the project loads but part of it will not run.
    Warning,
    /// Error - configuration is invalid.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    /// Category of the check that produced this finding.
    pub category: String,
    pub message: String,
    /// File the finding refers to.
    pub file: Option<PathBuf>,
    /// Location within the file (e.g., "controls.RDS-001").
    pub location: Option<String>,
}

impl CheckFinding {
    fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            file: None,
            location: None,
        }
    }

    fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    fn warning(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    fn info(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, category, message)
    }

    fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    fn add(&mut self, finding: CheckFinding) {
        self.findings.push(finding);
    }

    fn extend(&mut self, findings: impl IntoIterator<Item = CheckFinding>) {
        self.findings.extend(findings);
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// Print human-readable summary, most severe first.
    pub fn print_summary(&self) {
        for (severity, title) in [
            (Severity::Error, "❌ Errors"),
            (Severity::Warning, "⚠️  Warnings"),
            (Severity::Info, "ℹ️  Info"),
        ] {
            let mut group: Vec<_> = self
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .collect();
            if group.is_empty() {
                continue;
            }
            group.sort_by(|a, b| a.category.cmp(&b.category));

            println!("\n{} ({}):", title, group.len());
            println!("{}", "─".repeat(60));
            for finding in group {
                print_finding(finding);
            }
        }

        println!();
        println!("{}", "═".repeat(60));
        if self.error_count() == 0 && self.warning_count() == 0 {
            println!("✅ All checks passed!");
        } else {
            println!(
                "Summary: {} error(s), {} warning(s)",
                self.error_count(),
                self.warning_count()
            );
        }
    }
}

fn print_finding(finding: &CheckFinding) {
    let icon = match finding.severity {
        Severity::Error => "✗",
        Severity::Warning => "⚠",
        Severity::Info => "ℹ",
    };

    let location = match (&finding.file, &finding.location) {
        (Some(f), Some(l)) => format!(" [{}:{}]", f.display(), l),
        (Some(f), None) => format!(" [{}]", f.display()),
        (None, Some(l)) => format!(" [{}]", l),
        (None, None) => String::new(),
    };

    println!(
        "  {} [{}]{}: {}",
        icon, finding.category, location, finding.message
    );
}

// ============================================================================
// Main Check Runner
// ============================================================================

/// Run all checks without printing.
pub async fn run_quiet(config_path: &Path) -> Result<CheckResults> {
    let mut results = CheckResults::default();

    let config = match ArgusConfig::load_with_context(config_path) {
        Ok(config) => config,
        Err(e) => {
            results.add(CheckFinding::error("config", e.to_string()).with_file(config_path));
            return Ok(results);
        }
    };

    results.extend(check_account(&config, config_path));

    let registry = match build_registry(&config) {
        Ok(registry) => Some(registry),
        Err(e) => {
            results.add(CheckFinding::error("inventory", e.to_string()));
            None
        }
    };

    results.extend(check_manifest(&config, registry.as_ref()));
    if let Some(registry) = &registry {
        results.extend(check_capabilities(&config, registry));
    }
    results.extend(check_policy(&config));
    results.extend(check_notifications(&config));

    Ok(results)
}

/// Run all checks and print the results. Fails when any check errors.
pub async fn run(config_path: &Path) -> Result<()> {
    println!("🔍 Checking {}", config_path.display());

    let results = run_quiet(config_path).await?;
    results.print_summary();

    if results.has_errors() {
        bail!(
            "Configuration check failed with {} error(s)",
            results.error_count()
        );
    }
    Ok(())
}

// ============================================================================
// Individual Checks
// ============================================================================

fn check_account(config: &ArgusConfig, config_path: &Path) -> Vec<CheckFinding> {
    match config.account_context() {
        Ok(account) => vec![CheckFinding::info(
            "account",
            format!("Auditing {} in {}", account.account_id, account.region),
        )],
        Err(e) => vec![
            CheckFinding::warning("account", format!("{}; `argus detect` will refuse to run", e))
                .with_file(config_path),
        ],
    }
}

fn check_manifest(config: &ArgusConfig, registry: Option<&OperationRegistry>) -> Vec<CheckFinding> {
    let path = &config.manifest;
    let manifest = match ControlManifest::from_file(path) {
        Ok(manifest) => manifest,
        Err(e) => return vec![CheckFinding::error("manifest", e.to_string()).with_file(path)],
    };

    let mut findings = vec![CheckFinding::info(
        "manifest",
        format!("{} control(s) loaded", manifest.controls.len()),
    )];

    for control in &manifest.controls {
        let location = format!("controls.{}", control.control_id);

        if let Err(e) = CompiledControl::compile(control.clone()) {
            findings.push(
                CheckFinding::error("expression", e.to_string())
                    .with_file(path)
                    .with_location(&location),
            );
        }

        let Some(registry) = registry else { continue };
        let detection = &control.detection;
        let mut operations = vec![detection.list_operation.as_str()];
        if let Some(sub_call) = &detection.sub_call {
            operations.push(sub_call.operation.as_str());
        }
        for operation in operations {
            if !registry.supports(&detection.service, operation) {
                findings.push(
                    CheckFinding::error(
                        "provider",
                        format!(
                            "no provider operation {}.{}",
                            detection.service, operation
                        ),
                    )
                    .with_file(path)
                    .with_location(&location),
                );
            }
        }
    }

    findings
}

fn check_capabilities(config: &ArgusConfig, registry: &OperationRegistry) -> Vec<CheckFinding> {
    let table = match load_capabilities(config) {
        Ok(table) => table,
        Err(e) => return vec![CheckFinding::error("capabilities", e.to_string())],
    };

    table
        .entries()
        .filter(|entry| !registry.supports(&entry.service, &entry.api_call))
        .map(|entry| {
            CheckFinding::warning(
                "capabilities",
                format!(
                    "{}.{} has no provider operation; actions using it will fail",
                    entry.service, entry.api_call
                ),
            )
        })
        .collect()
}

fn check_policy(config: &ArgusConfig) -> Vec<CheckFinding> {
    let path = &config.policy.path;
    match load_policy(&config.policy) {
        Ok(engine) => vec![
            CheckFinding::info("policy", format!("{} rule set loaded", engine.name()))
                .with_file(path),
        ],
        Err(e) => vec![CheckFinding::error("policy", e.to_string()).with_file(path)],
    }
}

fn check_notifications(config: &ArgusConfig) -> Vec<CheckFinding> {
    let notifications = &config.notifications;
    match notifications.sink {
        SinkKind::File if notifications.path.is_none() => vec![CheckFinding::info(
            "notifications",
            "file sink has no path, findings go to findings.jsonl",
        )],
        SinkKind::None => vec![CheckFinding::warning(
            "notifications",
            "findings are discarded (sink: none)",
        )],
        _ => Vec::new(),
    }
}
