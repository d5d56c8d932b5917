use lean_repl::ProofState;

/// A node in the search tree.
///
/// Nodes are stored in a flat arena (`Vec<SearchNode>`) and reference
/// parents by index. The tactic path from the root is never stored on the
/// node; it is recovered by walking parents, so a child's path is always its
/// parent's path plus `tactic_applied`.
#[derive(Debug, Clone)]
pub struct SearchNode {
    /// Proof state reached at this node.
    pub state: ProofState,
    /// Index of the parent node in the arena, `None` for root.
    pub parent: Option<usize>,
    /// Tactic that was applied to reach this state (empty for root).
    pub tactic_applied: String,
    /// Number of tactic applications from root.
    pub depth: u32,
}

impl SearchNode {
    pub fn root(state: ProofState) -> Self {
        Self {
            state,
            parent: None,
            tactic_applied: String::new(),
            depth: 0,
        }
    }

    pub fn child(state: ProofState, parent: usize, tactic: String, depth: u32) -> Self {
        Self {
            state,
            parent: Some(parent),
            tactic_applied: tactic,
            depth,
        }
    }
}

/// Trace the parent chain from a node back to the root,
/// returning arena indices in root-to-node order.
pub fn extract_proof_path(tree: &[SearchNode], index: usize) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = Some(index);
    while let Some(idx) = current {
        path.push(idx);
        current = tree[idx].parent;
    }
    path.reverse();
    path
}

/// Tactics applied along the path from root to `index`, root excluded.
pub fn extract_tactic_sequence(tree: &[SearchNode], index: usize) -> Vec<String> {
    extract_proof_path(tree, index)
        .into_iter()
        .filter(|&idx| tree[idx].parent.is_some())
        .map(|idx| tree[idx].tactic_applied.clone())
        .collect()
}
