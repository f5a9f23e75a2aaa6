//! The revision tree kept for every document.
//!
//! A tree is a forest of [`RevPath`]s. Each path starts at `pos` (the
//! generation of its root) and branches wherever two edits share a parent.
//! Roots other than generation 1 appear after stemming or when a replicator
//! sends a history whose oldest entries were already pruned.

/// Whether the body of a revision is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevStatus {
    Available,
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeOpts {
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevNode {
    pub hash: String,
    pub status: RevStatus,
    pub opts: NodeOpts,
    pub children: Vec<RevNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevPath {
    pub pos: u64,
    pub tree: RevNode,
}

pub type RevTree = Vec<RevPath>;

/// A leaf of the tree together with its ancestry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafInfo {
    pub pos: u64,
    pub hash: String,
    pub deleted: bool,
    /// Hashes from this leaf back to its root, newest first.
    pub ancestry: Vec<String>,
}

/// Collect every leaf, sorted so the winning revision comes first.
///
/// Order: live leaves before deleted ones, then higher generation, then the
/// lexicographically greater hash.
pub fn collect_leaves(tree: &RevTree) -> Vec<LeafInfo> {
    fn walk(node: &RevNode, pos: u64, trail: &mut Vec<String>, out: &mut Vec<LeafInfo>) {
        trail.push(node.hash.clone());
        if node.children.is_empty() {
            out.push(LeafInfo {
                pos,
                hash: node.hash.clone(),
                deleted: node.opts.deleted,
                ancestry: trail.iter().rev().cloned().collect(),
            });
        }
        for child in &node.children {
            walk(child, pos + 1, trail, out);
        }
        trail.pop();
    }

    let mut leaves = Vec::new();
    for path in tree {
        walk(&path.tree, path.pos, &mut Vec::new(), &mut leaves);
    }

    leaves.sort_by(|a, b| {
        a.deleted
            .cmp(&b.deleted)
            .then_with(|| b.pos.cmp(&a.pos))
            .then_with(|| b.hash.cmp(&a.hash))
    });
    leaves
}

/// Build a linear path from a revision history.
///
/// `hashes` is newest first, as in `_revisions.ids`; the newest entry sits at
/// generation `pos`. The leaf gets `opts` and `status`, ancestors are marked
/// missing because only their hashes are known.
pub fn build_path_from_revs(
    pos: u64,
    hashes: &[String],
    opts: NodeOpts,
    status: RevStatus,
) -> RevPath {
    let mut iter = hashes.iter();
    let leaf_hash = iter.next().cloned().unwrap_or_default();
    let mut node = RevNode {
        hash: leaf_hash,
        status,
        opts,
        children: vec![],
    };

    for hash in iter {
        node = RevNode {
            hash: hash.clone(),
            status: RevStatus::Missing,
            opts: NodeOpts::default(),
            children: vec![node],
        };
    }

    RevPath {
        pos: (pos + 1).saturating_sub(hashes.len().max(1) as u64).max(1),
        tree: node,
    }
}

fn find_node<'a>(node: &'a RevNode, pos: u64, target_pos: u64, hash: &str) -> Option<&'a RevNode> {
    if pos == target_pos && node.hash == hash {
        return Some(node);
    }
    if pos >= target_pos {
        return None;
    }
    node.children
        .iter()
        .find_map(|child| find_node(child, pos + 1, target_pos, hash))
}

/// Whether `pos-hash` appears anywhere in the tree.
pub fn rev_exists(tree: &RevTree, pos: u64, hash: &str) -> bool {
    tree.iter()
        .any(|path| find_node(&path.tree, path.pos, pos, hash).is_some())
}

/// Whether `pos-hash` is a leaf of the tree.
pub fn is_leaf(tree: &RevTree, pos: u64, hash: &str) -> bool {
    tree.iter().any(|path| {
        find_node(&path.tree, path.pos, pos, hash).is_some_and(|n| n.children.is_empty())
    })
}

/// Hashes from `pos-hash` back to its root, newest first.
pub fn ancestry(tree: &RevTree, pos: u64, hash: &str) -> Option<Vec<String>> {
    fn walk(
        node: &RevNode,
        pos: u64,
        target_pos: u64,
        hash: &str,
        trail: &mut Vec<String>,
    ) -> bool {
        trail.push(node.hash.clone());
        if pos == target_pos && node.hash == hash {
            return true;
        }
        if pos < target_pos {
            for child in &node.children {
                if walk(child, pos + 1, target_pos, hash, trail) {
                    return true;
                }
            }
        }
        trail.pop();
        false
    }

    for path in tree {
        let mut trail = Vec::new();
        if walk(&path.tree, path.pos, pos, hash, &mut trail) {
            trail.reverse();
            return Some(trail);
        }
    }
    None
}
