//! MCTS search tree maintenance for distributed play.
//!
//! This crate implements the slave-side half of the master-slave protocol
//! contract: a tree whose nodes carry direct (`u`) and AMAF statistics
//! together with prior-delta snapshots (`pu`, `pamaf`) recording what has
//! already been synchronized with remote peers. Merging folds in only the
//! delta since the last snapshot, so the same playouts are never counted
//! twice no matter how often partial results are exchanged.
//!
//! Nodes live in an arena (`Vec<Node>` indexed by [`NodeId`]); each node
//! keeps its children sorted by coordinate so merging two sibling lists is
//! a linear two-pointer walk.

pub mod config;
pub mod merge;
pub mod node;
pub mod tree;

pub use config::TreeConfig;
pub use merge::{merge_trees, MergeError};
pub use node::{Node, NodeId};
pub use tree::Tree;
