//! Folding new revision paths into a document's tree, choosing the
//! winner, and stemming old generations.

use crate::document::Revision;
use crate::rev_tree::{RevNode, RevPath, RevStatus, RevTree, collect_leaves};

/// Number of generations kept per branch.
pub const DEFAULT_REV_LIMIT: u64 = 1000;

/// What a merge did to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    /// A leaf grew: an ordinary edit.
    NewLeaf,
    /// A sibling branch or a new root appeared: a conflict.
    NewBranch,
    /// Every revision of the path was already known.
    InternalNode,
}

/// Fold a linear path into `tree`, then stem to `rev_limit` (0 disables
/// stemming).
pub fn merge_tree(tree: &RevTree, new_path: &RevPath, rev_limit: u64) -> (RevTree, MergeResult) {
    let mut merged = tree.clone();
    let chain = flatten(new_path);

    let grafted = merged.iter_mut().find_map(|existing| graft(existing, &chain));
    let result = match grafted {
        Some(result) => result,
        None => {
            merged.push(new_path.clone());
            MergeResult::NewBranch
        }
    };

    if rev_limit > 0 {
        stem(&mut merged, rev_limit);
    }

    (merged, result)
}

/// A linear path as `(pos, node-without-children)` pairs, root first.
fn flatten(path: &RevPath) -> Vec<(u64, RevNode)> {
    let mut chain = Vec::new();
    let mut current = Some(&path.tree);
    let mut pos = path.pos;
    while let Some(node) = current {
        chain.push((
            pos,
            RevNode {
                children: vec![],
                ..node.clone()
            },
        ));
        current = node.children.first();
        pos += 1;
    }
    chain
}

/// Graft `chain` onto `existing` at the oldest revision both share.
///
/// Returns `None` when the two have nothing in common.
fn graft(existing: &mut RevPath, chain: &[(u64, RevNode)]) -> Option<MergeResult> {
    let (start, target) = chain.iter().enumerate().find_map(|(i, (pos, node))| {
        index_path(&existing.tree, existing.pos, *pos, &node.hash).map(|p| (i, p))
    })?;

    let mut current = &mut existing.tree;
    for idx in target {
        current = &mut current.children[idx];
    }
    adopt_status(current, &chain[start].1);

    for (offset, (_, incoming)) in chain[start + 1..].iter().enumerate() {
        match current.children.iter().position(|c| c.hash == incoming.hash) {
            Some(idx) => {
                current = &mut current.children[idx];
                adopt_status(current, incoming);
            }
            None => {
                let forked = !current.children.is_empty();
                current.children.push(relink(&chain[start + 1 + offset..]));
                return Some(if forked {
                    MergeResult::NewBranch
                } else {
                    MergeResult::NewLeaf
                });
            }
        }
    }

    Some(MergeResult::InternalNode)
}

/// A stored body arriving for a revision we only knew by hash fills it in.
fn adopt_status(node: &mut RevNode, incoming: &RevNode) {
    if node.status == RevStatus::Missing && incoming.status == RevStatus::Available {
        node.status = RevStatus::Available;
        node.opts = incoming.opts.clone();
    }
}

/// Turn a flattened chain back into a linked subtree.
fn relink(chain: &[(u64, RevNode)]) -> RevNode {
    let mut iter = chain.iter().rev();
    let mut node = iter.next().map(|(_, n)| n.clone()).unwrap_or_else(|| RevNode {
        hash: String::new(),
        status: RevStatus::Missing,
        opts: Default::default(),
        children: vec![],
    });
    for (_, parent) in iter {
        node = RevNode {
            children: vec![node],
            ..parent.clone()
        };
    }
    node
}

/// Child indices leading from `node` to `target_pos-hash`.
fn index_path(node: &RevNode, pos: u64, target_pos: u64, hash: &str) -> Option<Vec<usize>> {
    if pos == target_pos {
        return (node.hash == hash).then(Vec::new);
    }
    if pos > target_pos {
        return None;
    }
    node.children.iter().enumerate().find_map(|(i, child)| {
        index_path(child, pos + 1, target_pos, hash).map(|mut rest| {
            rest.insert(0, i);
            rest
        })
    })
}

/// The revision readers see: the first leaf in winner order (live before
/// deleted, then deeper, then greater hash). Depends only on the tree, so
/// every replica agrees.
pub fn winning_rev(tree: &RevTree) -> Option<Revision> {
    collect_leaves(tree)
        .first()
        .map(|l| Revision::new(l.pos, l.hash.clone()))
}

/// Whether the winner is a tombstone.
pub fn is_deleted(tree: &RevTree) -> bool {
    collect_leaves(tree).first().is_some_and(|l| l.deleted)
}

/// Live leaves other than the winner, i.e. `_conflicts`.
pub fn collect_conflicts(tree: &RevTree) -> Vec<Revision> {
    collect_leaves(tree)
        .iter()
        .skip(1)
        .filter(|l| !l.deleted)
        .map(|l| Revision::new(l.pos, l.hash.clone()))
        .collect()
}

/// Prune each path so no branch is longer than `depth` generations. Returns
/// the hashes that were removed. Pruning never cuts past a branch point.
pub fn stem(tree: &mut RevTree, depth: u64) -> Vec<String> {
    fn height(node: &RevNode) -> u64 {
        node.children.iter().map(|c| 1 + height(c)).max().unwrap_or(0)
    }

    let mut removed = Vec::new();
    for path in tree.iter_mut() {
        while height(&path.tree) >= depth && path.tree.children.len() == 1 {
            if let Some(child) = path.tree.children.pop() {
                removed.push(std::mem::replace(&mut path.tree, child).hash);
                path.pos += 1;
            }
        }
    }
    removed
}
