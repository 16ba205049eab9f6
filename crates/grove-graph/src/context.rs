//! Parameters shared by every step of one synchronization run.

use crate::fallback::{branch_candidates, BranchCandidate};
use grove_core::UNKNOWN_VERSION;

/// The partition being written and the branches it is compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    pub project_id: String,
    pub branch: String,
    pub main_branch: Option<String>,
    pub base_branch: Option<String>,
    pub pull_request_id: Option<String>,
    pub version: String,
    pub base_version: Option<String>,
}

impl SyncContext {
    pub fn new(project_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            branch: branch.into(),
            main_branch: None,
            base_branch: None,
            pull_request_id: None,
            version: UNKNOWN_VERSION.to_string(),
            base_version: None,
        }
    }

    /// Branch used for change detection: `base` if set, else `main`.
    pub fn comparison_branch(&self) -> Option<&str> {
        self.base_branch
            .as_deref()
            .or(self.main_branch.as_deref())
    }

    /// Whether change detection compares against the branch being written.
    pub fn compares_in_place(&self) -> bool {
        self.comparison_branch() == Some(self.branch.as_str())
    }

    /// Branches searched for nodes a fact refers to.
    pub fn target_candidates(&self) -> Vec<BranchCandidate> {
        branch_candidates(
            &self.branch,
            self.base_branch.as_deref(),
            self.main_branch.as_deref(),
        )
    }

    /// Pull request id stamped on created nodes. Nodes on the main branch
    /// are never PR-scoped.
    pub fn pr_scope(&self) -> Option<&str> {
        match (&self.pull_request_id, &self.main_branch) {
            (Some(_), Some(main)) if *main == self.branch => None,
            (pr, _) => pr.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_outranks_main() {
        let mut ctx = SyncContext::new("1", "feature");
        assert_eq!(ctx.comparison_branch(), None);

        ctx.main_branch = Some("main".into());
        assert_eq!(ctx.comparison_branch(), Some("main"));

        ctx.base_branch = Some("develop".into());
        assert_eq!(ctx.comparison_branch(), Some("develop"));
        assert!(!ctx.compares_in_place());
    }

    #[test]
    fn test_pr_scope_skips_main() {
        let mut ctx = SyncContext::new("1", "main");
        ctx.pull_request_id = Some("42".into());
        assert_eq!(ctx.pr_scope(), Some("42"));

        ctx.main_branch = Some("main".into());
        assert_eq!(ctx.pr_scope(), None);

        ctx.branch = "feature".into();
        assert_eq!(ctx.pr_scope(), Some("42"));
    }
}
