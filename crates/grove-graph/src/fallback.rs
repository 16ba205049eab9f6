//! Branch fallback for edge endpoint resolution.
//!
//! A sparse feature branch only holds the nodes it re-analyzed; everything
//! else is still reachable in the branch it diverged from. The end of an edge
//! that a fact refers to, such as a callee or an implemented interface,
//! is therefore looked up in the current branch first, then in `base`, then
//! in `main`, and the first branch with a hit wins.

use serde::{Deserialize, Serialize};

/// One branch to try, with its rank (0 is tried first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCandidate {
    pub branch: String,
    pub priority: u8,
}

/// Ordered candidates `[current, base?, main?]`, with repeats removed.
pub fn branch_candidates(
    current: &str,
    base: Option<&str>,
    main: Option<&str>,
) -> Vec<BranchCandidate> {
    let mut candidates: Vec<BranchCandidate> = Vec::with_capacity(3);
    for (priority, branch) in [Some(current), base, main].into_iter().enumerate() {
        let Some(branch) = branch else { continue };
        if candidates.iter().any(|c| c.branch == branch) {
            continue;
        }
        candidates.push(BranchCandidate {
            branch: branch.to_string(),
            priority: priority as u8,
        });
    }
    candidates
}

/// Only the current branch. Nodes of the fact being imported are never
/// resolved elsewhere.
pub fn current_only(current: &str) -> Vec<BranchCandidate> {
    branch_candidates(current, None, None)
}

/// Runs `lookup` over the candidates in order and returns the first
/// non-empty result together with the branch that produced it.
pub fn first_match<T, E, F>(
    candidates: &[BranchCandidate],
    mut lookup: F,
) -> Result<Option<(&BranchCandidate, Vec<T>)>, E>
where
    F: FnMut(&str) -> Result<Vec<T>, E>,
{
    for candidate in candidates {
        let found = lookup(&candidate.branch)?;
        if !found.is_empty() {
            return Ok(Some((candidate, found)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(candidates: &[BranchCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.branch.as_str()).collect()
    }

    #[test]
    fn test_priority_order() {
        let candidates = branch_candidates("feature", Some("develop"), Some("main"));
        assert_eq!(names(&candidates), vec!["feature", "develop", "main"]);
        assert_eq!(candidates[2].priority, 2);
    }

    #[test]
    fn test_repeats_collapse() {
        let candidates = branch_candidates("develop", Some("develop"), Some("main"));
        assert_eq!(names(&candidates), vec!["develop", "main"]);
        assert_eq!(candidates[1].priority, 2);

        assert_eq!(names(&branch_candidates("main", None, Some("main"))), vec!["main"]);
    }

    #[test]
    fn test_first_match_wins() {
        let candidates = branch_candidates("feature", Some("develop"), Some("main"));
        let mut asked = Vec::new();
        let hit = first_match::<_, (), _>(&candidates, |branch| {
            asked.push(branch.to_string());
            Ok(match branch {
                "develop" => vec![1],
                "main" => vec![2],
                _ => vec![],
            })
        })
        .unwrap();

        let (candidate, found) = hit.unwrap();
        assert_eq!(candidate.branch, "develop");
        assert_eq!(found, vec![1]);
        assert_eq!(asked, vec!["feature", "develop"]);
    }

    #[test]
    fn test_no_match() {
        let candidates = current_only("feature");
        let hit = first_match::<u8, (), _>(&candidates, |_| Ok(vec![])).unwrap();
        assert!(hit.is_none());
    }
}
