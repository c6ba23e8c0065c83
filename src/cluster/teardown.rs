//! Outcome of tearing a cluster down

use std::fmt;

/// Kind of a resource removed during teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Service,
    Deployment,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Service => write!(f, "Service"),
            ResourceKind::Deployment => write!(f, "Deployment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The resource was already gone
    Absent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: DeleteOutcome,
}

/// Per-resource results of a teardown. Every deletion is attempted, so this
/// always holds one entry per resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub outcomes: Vec<ResourceOutcome>,
}

impl TeardownReport {
    pub fn push(&mut self, kind: ResourceKind, name: &str, outcome: DeleteOutcome) {
        self.outcomes.push(ResourceOutcome {
            kind,
            name: name.to_string(),
            outcome,
        });
    }

    /// Deletions that failed for a reason other than the resource being absent
    pub fn failures(&self) -> Vec<&ResourceOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, DeleteOutcome::Failed(_)))
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn deleted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == DeleteOutcome::Deleted)
            .count()
    }
}
