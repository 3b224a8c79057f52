//! Arena-backed search tree.

use go_core::{Coord, MoveStats, Stats2};
use tracing::trace;

use crate::config::TreeConfig;
use crate::merge::MergeError;
use crate::node::{Node, NodeId};

/// Search tree with arena node storage.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    config: TreeConfig,
}

impl Tree {
    /// Create a tree whose root is a virtual pass node (never played).
    pub fn new(config: TreeConfig) -> Self {
        Self {
            nodes: vec![Node::new(NodeId::NONE, Coord::Pass)],
            root: NodeId(0),
            config,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn config(&self) -> TreeConfig {
        self.config
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find the child of `parent` playing `coord`.
    pub fn find_child(&self, parent: NodeId, coord: Coord) -> Option<NodeId> {
        let children = &self.get(parent).children;
        children
            .binary_search_by(|id| self.get(*id).coord.cmp(&coord))
            .ok()
            .map(|idx| children[idx])
    }

    /// Insert a child under `parent`, keeping the sibling list
    /// coord-sorted. Returns the existing child if the coordinate is
    /// already present.
    pub fn add_child(&mut self, parent: NodeId, coord: Coord) -> NodeId {
        let pos = match self.get(parent)
            .children
            .binary_search_by(|id| self.get(*id).coord.cmp(&coord))
        {
            Ok(idx) => return self.get(parent).children[idx],
            Err(idx) => idx,
        };
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(parent, coord));
        self.get_mut(parent).children.insert(pos, id);
        id
    }

    /// Fold the master's merged prior statistics into the root's children.
    ///
    /// Each payload entry is the cumulative contribution of all other
    /// slaves as last seen by the master; only the delta against the
    /// node's `pu`/`pamaf` snapshots is added, and the snapshots then
    /// record the incoming cumulative values. A shrinking cumulative
    /// count means the snapshots have diverged from the master's view.
    pub fn ingest_prior_stats(&mut self, stats: &[(Coord, Stats2)]) -> Result<(), MergeError> {
        let rave_equiv = self.config.rave_equiv;
        let root = self.root;
        for (coord, incoming) in stats {
            let child = self.add_child(root, *coord);
            let node = self.get_mut(child);
            if incoming.u.playouts < node.pu.playouts
                || incoming.amaf.playouts < node.pamaf.playouts
            {
                return Err(MergeError::SnapshotMismatch { coord: *coord });
            }
            node.u.add_delta(incoming.u, node.pu);
            node.amaf.add_delta(incoming.amaf, node.pamaf);
            node.pu = incoming.u;
            node.pamaf = incoming.amaf;
            node.refresh_value(rave_equiv);
        }
        trace!(entries = stats.len(), "ingested remote prior stats");
        Ok(())
    }

    /// This tree's own contribution per root child since the last
    /// synchronization: `u - pu` (and the AMAF counterpart). Children
    /// with no unsynchronized direct playouts are omitted; the remote
    /// peer never sees the full local tree.
    pub fn report_own_stats(&self) -> Vec<(Coord, Stats2)> {
        self.get(self.root)
            .children
            .iter()
            .filter_map(|&id| {
                let node = self.get(id);
                let own_u = MoveStats::diff(node.u, node.pu);
                if own_u.is_empty() {
                    return None;
                }
                let own_amaf = MoveStats::diff(node.amaf, node.pamaf);
                Some((node.coord, Stats2::new(own_u, own_amaf)))
            })
            .collect()
    }

    /// Make the root child playing `coord` the new root, discarding every
    /// other branch. Returns false when no such child exists.
    pub fn promote(&mut self, coord: Coord) -> bool {
        let Some(child) = self.find_child(self.root, coord) else {
            return false;
        };
        let mut nodes = Vec::with_capacity(self.nodes.len() / 2 + 1);
        let root = self.copy_subtree(child, NodeId::NONE, &mut nodes);
        self.nodes = nodes;
        self.root = root;
        true
    }

    fn copy_subtree(&self, id: NodeId, new_parent: NodeId, out: &mut Vec<Node>) -> NodeId {
        let new_id = NodeId(out.len() as u32);
        let mut node = self.get(id).clone();
        node.parent = new_parent;
        let children = std::mem::take(&mut node.children);
        out.push(node);
        let new_children: Vec<NodeId> = children
            .iter()
            .map(|&c| self.copy_subtree(c, new_id, out))
            .collect();
        out[new_id.0 as usize].children = new_children;
        new_id
    }

    /// Divide accumulated statistics by `factor`, keeping snapshots in
    /// step. Used between synchronization epochs so long games do not
    /// drown fresh evidence under stale counts.
    pub fn normalize(&mut self, factor: u32) {
        if factor <= 1 {
            return;
        }
        let rave_equiv = self.config.rave_equiv;
        for node in &mut self.nodes {
            node.u = normalize_stats(node.u, node.pu, factor);
            node.amaf = normalize_stats(node.amaf, node.pamaf, factor);
            node.snapshot_priors();
            node.refresh_value(rave_equiv);
        }
    }
}

/// Shrink the unsynchronized portion of `now` by `factor`, in wins-space,
/// on top of the synchronized base `base`.
fn normalize_stats(now: MoveStats, base: MoveStats, factor: u32) -> MoveStats {
    let dp = now.playouts.saturating_sub(base.playouts) / factor;
    let playouts = base.playouts + dp;
    if playouts == 0 {
        return MoveStats::default();
    }
    let dw = (now.wins() - base.wins()) / f64::from(factor);
    let wins = base.wins() + dw;
    MoveStats {
        playouts,
        value: (wins / f64::from(playouts)).clamp(0.0, 1.0) as f32,
    }
}
