//! Incremental tree merging.
//!
//! Merging folds a peer's tree into the local one by child coordinate.
//! Each node contributes only the delta between its statistics and its
//! last-synchronized snapshot, then both sides refresh their snapshots,
//! which makes re-merging an unchanged source a no-op. Snapshots that
//! disagree between the two sides mean the peers lost sync; the caller
//! treats that as a protocol error and resynchronizes.

use go_core::Coord;
use thiserror::Error;
use tracing::trace;

use crate::node::NodeId;
use crate::tree::Tree;

/// Merge failures. Both variants are protocol errors: the trees no longer
/// describe the same synchronization history.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    /// The prior-delta snapshots disagree for this node.
    #[error("prior snapshot mismatch at {coord}")]
    SnapshotMismatch { coord: Coord },

    /// The constant domain priors disagree for this node.
    #[error("domain prior mismatch at {coord}")]
    PriorMismatch { coord: Coord },
}

/// Merge `src` into `dest`. Destructive on `src`: its snapshots are
/// advanced so the transferred deltas are not offered again.
///
/// Both trees must be rooted on the same position and share their
/// synchronization history; a node whose snapshots disagree aborts the
/// merge.
pub fn merge_trees(dest: &mut Tree, src: &mut Tree) -> Result<(), MergeError> {
    let before = dest.len();
    merge_node(dest, dest.root(), src, src.root())?;
    trace!(adopted = dest.len() - before, "merged peer tree");
    Ok(())
}

fn merge_node(
    dest: &mut Tree,
    dest_id: NodeId,
    src: &mut Tree,
    src_id: NodeId,
) -> Result<(), MergeError> {
    // Untouched source nodes have untouched subtrees: playouts reach a
    // child only through its parent.
    let (src_untouched, coord) = {
        let s = src.get(src_id);
        (!s.has_pending_delta(), s.coord)
    };
    if src_untouched {
        return Ok(());
    }

    {
        let d = dest.get(dest_id);
        let s = src.get(src_id);
        if d.pu.playouts != s.pu.playouts || d.pamaf.playouts != s.pamaf.playouts {
            return Err(MergeError::SnapshotMismatch { coord });
        }
        if d.prior != s.prior {
            return Err(MergeError::PriorMismatch { coord });
        }
    }

    // Merge the sibling lists; both are coord-sorted, unmatched source
    // children are adopted at their sorted position, unmatched
    // destination children are retained.
    let src_children = src.get(src_id).children.clone();
    for sc in src_children {
        let child_coord = src.get(sc).coord;
        match dest.find_child(dest_id, child_coord) {
            Some(dc) => merge_node(dest, dc, src, sc)?,
            None => adopt_subtree(dest, dest_id, src, sc),
        }
    }

    let (su, spu, samaf, spamaf) = {
        let s = src.get(src_id);
        (s.u, s.pu, s.amaf, s.pamaf)
    };
    let rave_equiv = dest.config().rave_equiv;
    let d = dest.get_mut(dest_id);
    d.u.add_delta(su, spu);
    d.amaf.add_delta(samaf, spamaf);
    d.snapshot_priors();
    d.refresh_value(rave_equiv);
    src.get_mut(src_id).snapshot_priors();
    Ok(())
}

/// Copy a whole source subtree under `dest_parent`. The copy arrives
/// fully synchronized (snapshots equal to its statistics) on both sides.
fn adopt_subtree(dest: &mut Tree, dest_parent: NodeId, src: &mut Tree, src_id: NodeId) {
    let (coord, prior, u, amaf) = {
        let s = src.get(src_id);
        (s.coord, s.prior, s.u, s.amaf)
    };
    let rave_equiv = dest.config().rave_equiv;
    let new_id = dest.add_child(dest_parent, coord);
    {
        let d = dest.get_mut(new_id);
        d.prior = prior;
        d.u = u;
        d.amaf = amaf;
        d.snapshot_priors();
        d.refresh_value(rave_equiv);
    }
    src.get_mut(src_id).snapshot_priors();

    let src_children = src.get(src_id).children.clone();
    for sc in src_children {
        adopt_subtree(dest, new_id, src, sc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use go_core::MoveStats;

    fn coord(s: &str) -> Coord {
        s.parse().unwrap()
    }

    /// A pair of trees that diverged from a common synchronized base:
    /// both saw 20 playouts at A1, then dest added 10 and src added 8.
    fn diverged_pair() -> (Tree, Tree) {
        let mut dest = Tree::new(TreeConfig::default());
        let mut src = Tree::new(TreeConfig::default());
        for (tree, extra, value) in [(&mut dest, 10, 0.50), (&mut src, 8, 0.75)] {
            let root = tree.root();
            tree.get_mut(root).pu = MoveStats::new(20, 0.5);
            tree.get_mut(root).u = MoveStats::new(20, 0.5);
            tree.get_mut(root).u.add_result(value, extra);

            let a1 = tree.add_child(root, coord("A1"));
            tree.get_mut(a1).pu = MoveStats::new(20, 0.5);
            tree.get_mut(a1).u = MoveStats::new(20, 0.5);
            tree.get_mut(a1).u.add_result(value, extra);
        }
        (dest, src)
    }

    #[test]
    fn merge_adds_only_the_delta() {
        let (mut dest, mut src) = diverged_pair();
        merge_trees(&mut dest, &mut src).unwrap();

        let root = dest.root();
        // 20 base + 10 local + 8 remote; the base is not double-counted.
        assert_eq!(dest.get(root).u.playouts, 38);
        let a1 = dest.find_child(root, coord("A1")).unwrap();
        assert_eq!(dest.get(a1).u.playouts, 38);
    }

    #[test]
    fn merge_is_idempotent() {
        let (mut dest, mut src) = diverged_pair();
        merge_trees(&mut dest, &mut src).unwrap();
        let snapshot: Vec<(u32, f32)> = (0..dest.len())
            .map(|i| {
                let n = dest.get(NodeId(i as u32));
                (n.u.playouts, n.u.value)
            })
            .collect();

        // The source's deltas were consumed; merging again changes nothing.
        merge_trees(&mut dest, &mut src).unwrap();
        let after: Vec<(u32, f32)> = (0..dest.len())
            .map(|i| {
                let n = dest.get(NodeId(i as u32));
                (n.u.playouts, n.u.value)
            })
            .collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn merge_upholds_stat_invariants() {
        let (mut dest, mut src) = diverged_pair();
        merge_trees(&mut dest, &mut src).unwrap();

        for i in 0..dest.len() {
            let n = dest.get(NodeId(i as u32));
            assert!(n.u.playouts >= n.pu.playouts);
            assert!(n.u.value >= 0.0 && n.u.value <= 1.0);
            assert!(n.u.wins() <= f64::from(n.u.playouts));
        }
    }

    #[test]
    fn merge_rejects_snapshot_mismatch() {
        let (mut dest, mut src) = diverged_pair();
        let src_root = src.root();
        src.get_mut(src_root).pu = MoveStats::new(25, 0.5);

        let err = merge_trees(&mut dest, &mut src).unwrap_err();
        assert_eq!(
            err,
            MergeError::SnapshotMismatch {
                coord: Coord::Pass
            }
        );
    }

    #[test]
    fn merge_rejects_domain_prior_mismatch() {
        let (mut dest, mut src) = diverged_pair();
        let src_root = src.root();
        src.get_mut(src_root).prior = MoveStats::new(50, 0.5);

        let err = merge_trees(&mut dest, &mut src).unwrap_err();
        assert!(matches!(err, MergeError::PriorMismatch { .. }));
    }

    #[test]
    fn untouched_source_is_a_noop() {
        let (mut dest, mut src) = diverged_pair();
        let src_root = src.root();
        // Consuming the root delta makes its snapshot disagree with
        // dest's, but an untouched source never reaches the comparison.
        src.get_mut(src_root).snapshot_priors();

        let before = dest.get(dest.root()).u.playouts;
        merge_trees(&mut dest, &mut src).unwrap();
        assert_eq!(dest.get(dest.root()).u.playouts, before);
    }

    #[test]
    fn unmatched_source_children_adopted_in_coord_order() {
        let (mut dest, mut src) = diverged_pair();
        let dest_root = dest.root();
        let q16 = dest.add_child(dest_root, coord("Q16"));
        dest.get_mut(q16).u = MoveStats::new(3, 0.4);

        let src_root = src.root();
        let b2 = src.add_child(src_root, coord("B2"));
        src.get_mut(b2).u = MoveStats::new(12, 0.66);

        merge_trees(&mut dest, &mut src).unwrap();

        let coords: Vec<String> = dest
            .get(dest_root)
            .children
            .iter()
            .map(|&id| dest.get(id).coord.to_string())
            .collect();
        assert_eq!(coords, ["A1", "B2", "Q16"]);

        // The adopted child arrives fully synchronized.
        let b2 = dest.find_child(dest_root, coord("B2")).unwrap();
        assert_eq!(dest.get(b2).u.playouts, 12);
        assert_eq!(dest.get(b2).pu, dest.get(b2).u);

        // The unmatched destination child is retained untouched.
        let q16 = dest.find_child(dest_root, coord("Q16")).unwrap();
        assert_eq!(dest.get(q16).u.playouts, 3);
    }
}
