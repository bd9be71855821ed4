//! Arena-backed binary BVH and its top-down builder.
//!
//! Nodes live in one `Vec<Node>` and refer to their children by [`NodeId`].
//! The builder drives an explicit work-list instead of recursing, so deep
//! trees from near-collinear input cannot exhaust the call stack. Each task
//! owns a disjoint sub-slice of the primitive array, which it sorts and
//! splits in place.

use smallvec::SmallVec;

use super::primitive::{range_bounds, Primitive};
use super::sah::{find_best_split, SahScratch};
use crate::scene::Triangle;
use crate::util::Aabb;

/// Index of a node inside its [`BvhTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    /// Exactly one triangle.
    Leaf(Triangle),
    /// Two exclusively owned children, larger surface area first.
    Internal { left: NodeId, right: NodeId },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub bounds: Aabb,
    pub kind: NodeKind,
}

impl Node {
    /// Occupies a reserved child slot until its task runs.
    const RESERVED: Node = Node {
        bounds: Aabb::EMPTY,
        kind: NodeKind::Internal {
            left: NodeId(0),
            right: NodeId(0),
        },
    };

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Child links of an internal node.
    #[inline]
    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self.kind {
            NodeKind::Internal { left, right } => Some((left, right)),
            NodeKind::Leaf(_) => None,
        }
    }
}

/// Binary BVH over single-triangle leaves. Node 0 is the root.
#[derive(Debug, Clone)]
pub struct BvhTree {
    nodes: Vec<Node>,
    max_depth: usize,
}

/// Pending build step: fill `slot` from `prims[start..end]`.
struct Task {
    slot: usize,
    start: usize,
    end: usize,
    depth: usize,
}

impl BvhTree {
    /// Build the tree top-down over `prims`, reordering them in place.
    ///
    /// # Panics
    ///
    /// Panics if `prims` is empty; callers reject empty scenes first.
    #[tracing::instrument(skip_all, fields(prim_count = prims.len()))]
    pub fn build(prims: &mut [Primitive]) -> Self {
        let n = prims.len();
        assert!(n > 0, "BVH build over an empty primitive range");

        // A full binary tree with n leaves has 2n - 1 nodes.
        let mut nodes: Vec<Node> = Vec::with_capacity(2 * n - 1);
        nodes.push(Node::RESERVED);

        let mut scratch = SahScratch::with_capacity(n);
        let mut stack: SmallVec<[Task; 64]> = SmallVec::new();
        stack.push(Task {
            slot: 0,
            start: 0,
            end: n,
            depth: 0,
        });
        let mut max_depth = 0;

        while let Some(task) = stack.pop() {
            max_depth = max_depth.max(task.depth);
            let range = &mut prims[task.start..task.end];

            if range.len() == 1 {
                nodes[task.slot] = Node {
                    bounds: range[0].bounds,
                    kind: NodeKind::Leaf(range[0].triangle),
                };
                continue;
            }

            // Node bounds come from the whole range, not from the children.
            let bounds = range_bounds(range);
            let split = find_best_split(range, &mut scratch);
            let mid = task.start + split.index;

            let left_area = range_bounds(&prims[task.start..mid]).surface_area();
            let right_area = range_bounds(&prims[mid..task.end]).surface_area();

            let left_slot = nodes.len();
            let right_slot = left_slot + 1;
            nodes.push(Node::RESERVED);
            nodes.push(Node::RESERVED);

            let mut left = Task {
                slot: left_slot,
                start: task.start,
                end: mid,
                depth: task.depth + 1,
            };
            let mut right = Task {
                slot: right_slot,
                start: mid,
                end: task.end,
                depth: task.depth + 1,
            };

            // Visit the larger (more likely hit) child first.
            if right_area > left_area {
                std::mem::swap(&mut left.slot, &mut right.slot);
            }

            nodes[task.slot] = Node {
                bounds,
                kind: NodeKind::Internal {
                    left: NodeId(left_slot as u32),
                    right: NodeId(right_slot as u32),
                },
            };

            stack.push(right);
            stack.push(left);
        }

        tracing::debug!(node_count = nodes.len(), max_depth, "BVH built");

        Self { nodes, max_depth }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Leaves equal input triangles: `(node_count + 1) / 2`.
    #[inline]
    pub fn leaf_count(&self) -> usize {
        (self.nodes.len() + 1) / 2
    }

    /// Edges on the longest root-to-leaf path.
    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Leaf triangles in depth-first, left-before-right order.
    pub fn leaves(&self) -> Vec<Triangle> {
        let mut out = Vec::with_capacity(self.leaf_count());
        let mut stack: SmallVec<[NodeId; 64]> = SmallVec::new();
        stack.push(self.root());

        while let Some(id) = stack.pop() {
            match self.node(id).kind {
                NodeKind::Leaf(tri) => out.push(tri),
                NodeKind::Internal { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        out
    }
}
