//! Run results and the installed / upgraded report forests.
use std::fmt;

use crate::config::step::{SkipSummary, StepType};

/// Final state of one step after the workflow ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not applicable to this host, filtered out, or disabled.
    Skipped,
    /// Already installed and no update was needed (or checked).
    UpToDate,
    /// Was missing and has been installed.
    Installed,
    /// Was installed and has been updated.
    Upgraded,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skipped => "skipped",
            Self::UpToDate => "up to date",
            Self::Installed => "installed",
            Self::Upgraded => "upgraded",
        })
    }
}

/// Result of one step, with the results of its children for composites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultNode {
    /// Step name.
    pub name: String,
    /// Step type.
    pub kind: StepType,
    /// What happened.
    pub outcome: Outcome,
    /// Child results, in execution order.
    pub children: Vec<ResultNode>,
    /// Summary visibility flags copied from the declaration.
    pub skip_summary: SkipSummary,
}

impl ResultNode {
    /// A result without children.
    #[must_use]
    pub fn leaf(name: impl Into<String>, kind: StepType, outcome: Outcome) -> Self {
        Self {
            name: name.into(),
            kind,
            outcome,
            children: Vec::new(),
            skip_summary: SkipSummary::default(),
        }
    }

    /// Attach summary visibility flags.
    #[must_use]
    pub const fn with_skip_summary(mut self, skip: SkipSummary) -> Self {
        self.skip_summary = skip;
        self
    }

    /// Build a container result whose outcome is folded from `children`.
    #[must_use]
    pub fn container(name: impl Into<String>, kind: StepType, children: Vec<Self>) -> Self {
        Self {
            name: name.into(),
            kind,
            outcome: fold_outcome(&children),
            children,
            skip_summary: SkipSummary::default(),
        }
    }

    fn is_container(&self) -> bool {
        self.kind.is_composite()
    }

    fn hidden_from(&self, action: Outcome) -> bool {
        match action {
            Outcome::Installed => self.skip_summary.install,
            Outcome::Upgraded => self.skip_summary.update,
            Outcome::Skipped | Outcome::UpToDate => false,
        }
    }
}

/// Outcome of a composite: `Installed` if any child installed, else
/// `Upgraded` if any child upgraded, else `UpToDate`.
#[must_use]
pub fn fold_outcome(children: &[ResultNode]) -> Outcome {
    if children.iter().any(|c| c.outcome == Outcome::Installed) {
        Outcome::Installed
    } else if children.iter().any(|c| c.outcome == Outcome::Upgraded) {
        Outcome::Upgraded
    } else {
        Outcome::UpToDate
    }
}

/// Prune `forest` down to the nodes relevant to `action`.
///
/// Nodes hidden from the category are dropped with their subtree.
/// Containers are kept (with pruned children) only when some descendant
/// survives; leaves are kept, without children, only when their outcome is
/// `action`.
#[must_use]
pub fn collect_by_action(forest: &[ResultNode], action: Outcome) -> Vec<ResultNode> {
    forest
        .iter()
        .filter(|node| !node.hidden_from(action))
        .filter_map(|node| {
            if node.is_container() {
                let children = collect_by_action(&node.children, action);
                (!children.is_empty()).then(|| ResultNode {
                    children,
                    ..node.clone()
                })
            } else {
                (node.outcome == action).then(|| ResultNode {
                    children: Vec::new(),
                    ..node.clone()
                })
            }
        })
        .collect()
}

/// What a run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Steps that were installed, as a pruned forest.
    pub installed: Vec<ResultNode>,
    /// Steps that were upgraded, as a pruned forest.
    pub upgraded: Vec<ResultNode>,
}

impl Summary {
    /// Build both report forests from the full result forest.
    #[must_use]
    pub fn from_results(results: &[ResultNode]) -> Self {
        Self {
            installed: collect_by_action(results, Outcome::Installed),
            upgraded: collect_by_action(results, Outcome::Upgraded),
        }
    }

    /// Whether the run changed nothing that should be reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.upgraded.is_empty()
    }
}
