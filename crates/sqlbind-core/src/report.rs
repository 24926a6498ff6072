//! `report.json` written by `sqlbind check`
//!
//! One entry per configured package plus every diagnostic of the run.
//! Readers should check `format` before relying on the layout.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{Engine, SqlPackage};
use crate::diagnostic::{Diagnostic, Severity};

/// Layout revision of `report.json`
pub const REPORT_FORMAT: u32 = 1;

/// Outcome of compiling one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOutcome {
    pub name: String,
    pub engine: Engine,

    /// Queries compiled; 0 when the package failed
    pub queries: usize,

    pub errors: usize,
}

/// Totals over all packages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub packages: usize,
    pub queries: usize,
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub format: u32,

    /// Version of the sqlbind build that wrote the report
    pub sqlbind_version: String,

    /// RFC 3339 time the run started
    pub generated_at: String,

    pub summary: ReportSummary,
    pub packages: Vec<PackageOutcome>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn new() -> Self {
        Self {
            format: REPORT_FORMAT,
            sqlbind_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::default(),
            packages: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Record a package that compiled cleanly
    pub fn compiled(&mut self, package: &SqlPackage, queries: usize) {
        self.summary.packages += 1;
        self.summary.queries += queries;
        self.packages.push(PackageOutcome {
            name: package.name.clone(),
            engine: package.engine,
            queries,
            errors: 0,
        });
    }

    /// Record a package that failed with `diagnostics`
    pub fn failed(&mut self, package: &SqlPackage, diagnostics: Vec<Diagnostic>) {
        let errors = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        self.summary.packages += 1;
        self.packages.push(PackageOutcome {
            name: package.name.clone(),
            engine: package.engine,
            queries: 0,
            errors,
        });
        for diagnostic in diagnostics {
            match diagnostic.severity {
                Severity::Error => self.summary.errors += 1,
                Severity::Warn => self.summary.warnings += 1,
                Severity::Info => {}
            }
            self.diagnostics.push(diagnostic);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticCode, MultiError};
    use std::path::PathBuf;

    fn package(name: &str) -> SqlPackage {
        SqlPackage {
            name: name.to_string(),
            engine: Engine::PostgreSql,
            schema: vec![PathBuf::from("schema.sql")],
            queries: vec![PathBuf::from("query.sql")],
        }
    }

    #[test]
    fn clean_run() {
        let mut report = Report::new();
        report.compiled(&package("app"), 4);

        assert_eq!(report.format, REPORT_FORMAT);
        assert_eq!(report.summary.packages, 1);
        assert_eq!(report.summary.queries, 4);
        assert!(!report.has_errors());
        assert_eq!(report.packages[0].errors, 0);
    }

    #[test]
    fn failed_package_counts_its_errors() {
        let mut errors = MultiError::new();
        errors.add("a.sql", "SELECT", 0, DiagnosticCode::SqlParseError, "bad");
        errors.add("b.sql", "SELECT", 0, DiagnosticCode::DuplicateQueryName, "duplicate query name: A");

        let mut report = Report::new();
        report.compiled(&package("app"), 3);
        report.failed(&package("billing"), errors.to_diagnostics());

        assert_eq!(report.summary.packages, 2);
        assert_eq!(report.summary.queries, 3);
        assert_eq!(report.summary.errors, 2);
        assert_eq!(report.packages[1].name, "billing");
        assert_eq!(report.packages[1].errors, 2);
        assert!(report.has_errors());
    }

    #[test]
    fn written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = Report::new();
        report.compiled(&package("app"), 1);
        report.save_to_file(&path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["format"], 1);
        assert_eq!(json["packages"][0]["name"], "app");
        assert_eq!(json["summary"]["queries"], 1);
    }
}
