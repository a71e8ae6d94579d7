//! Recoverable issues found while loading, repairing, and solving an assignment.
//!
//! A flow that rounded below zero, a header count that disagrees with the file body, an
//! artificial connector added during repair: none of these stop a run. They are recorded
//! in a [`Diagnostics`] value that the caller passes explicitly into every component that
//! can raise one, and the caller decides how loudly to report them.
//!
//! ```
//! use tap_core::diagnostics::{Category, Diagnostics, Subject};
//! use tap_core::LinkId;
//!
//! let mut diag = Diagnostics::new();
//! diag.warn(Category::Connectivity, "added artificial link 3 -> 1");
//! diag.error_on(Category::Validation, Subject::Link(LinkId::new(7)), "capacity must be positive");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.in_category(Category::Validation).count(), 1);
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::{LinkId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The run continued
    Warning,
    /// The input cannot be solved as given
    Error,
}

/// Where an issue came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Input file contents
    Parse,
    /// Graph shape: empty network, self loops
    Structure,
    Demand,
    /// Cost function parameters
    Validation,
    /// Artificial links added by connectivity repair
    Connectivity,
    /// Flow updates that went negative
    Numeric,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Parse => "parse",
            Category::Structure => "structure",
            Category::Demand => "demand",
            Category::Validation => "validation",
            Category::Connectivity => "connectivity",
            Category::Numeric => "numeric",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network element an issue refers to, by external id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum Subject {
    Link(LinkId),
    Node(NodeId),
    Origin(NodeId),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Link(id) => write!(f, "link {id}"),
            Subject::Node(id) => write!(f, "node {id}"),
            Subject::Origin(id) => write!(f, "origin {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{severity}:{}] ", self.category)?;
        if let Some(subject) = &self.subject {
            write!(f, "{subject}: ")?;
        }
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
    /// Round-off undershoots clamped to zero without an issue being recorded
    pub clamped_flows: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: Category,
        subject: Option<Subject>,
        message: impl Into<String>,
    ) {
        self.issues.push(DiagnosticIssue {
            severity,
            category,
            message: message.into(),
            subject,
        });
    }

    pub fn warn(&mut self, category: Category, message: impl Into<String>) {
        self.push(Severity::Warning, category, None, message);
    }

    pub fn warn_on(&mut self, category: Category, subject: Subject, message: impl Into<String>) {
        self.push(Severity::Warning, category, Some(subject), message);
    }

    pub fn error(&mut self, category: Category, message: impl Into<String>) {
        self.push(Severity::Error, category, None, message);
    }

    pub fn error_on(&mut self, category: Category, subject: Subject, message: impl Into<String>) {
        self.push(Severity::Error, category, Some(subject), message);
    }

    pub fn record_clamped_flow(&mut self) {
        self.clamped_flows += 1;
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    /// Fold in issues collected by a worker, e.g. one origin of a Jacobi sweep.
    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
        self.clamped_flows += other.clamped_flows;
    }

    /// One line such as `2 warnings (1 connectivity, 1 parse), 3 clamped flows`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        for severity in [Severity::Error, Severity::Warning] {
            let mut by_category: BTreeMap<Category, usize> = BTreeMap::new();
            for issue in self.issues.iter().filter(|i| i.severity == severity) {
                *by_category.entry(issue.category).or_default() += 1;
            }
            let total: usize = by_category.values().sum();
            if total == 0 {
                continue;
            }
            let noun = match severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            let breakdown: Vec<String> = by_category
                .iter()
                .map(|(category, count)| format!("{count} {category}"))
                .collect();
            parts.push(format!(
                "{total} {noun}{} ({})",
                plural(total),
                breakdown.join(", ")
            ));
        }
        if self.clamped_flows > 0 {
            parts.push(format!(
                "{} clamped flow{}",
                self.clamped_flows,
                plural(self.clamped_flows)
            ));
        }
        if parts.is_empty() {
            "no issues".to_string()
        } else {
            parts.join(", ")
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}
