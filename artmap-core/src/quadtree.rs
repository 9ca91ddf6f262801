//! Ephemeral quadtree over point indices, keyed by (x, y).
//!
//! Built fresh whenever the point collection changes and used only for
//! range queries during tile baking. Nodes live in a flat arena and the
//! range query walks an explicit stack, so neither build nor query recurses.

use crate::types::{BoundsRect, PointSet};

const NODE_CAPACITY: usize = 16;
const MAX_SPLIT_DEPTH: u8 = 12;

#[derive(Debug)]
struct Node {
    bounds: BoundsRect,
    depth: u8,
    entries: Vec<(f64, f64, usize)>,
    /// Indices of the four children once split, NW/NE/SW/SE order.
    children: Option<[usize; 4]>,
}

impl Node {
    fn leaf(bounds: BoundsRect, depth: u8) -> Self {
        Self {
            bounds,
            depth,
            entries: Vec::new(),
            children: None,
        }
    }

    /// Child slot for a position, split at the node's center.
    fn child_slot(&self, x: f64, y: f64) -> usize {
        let (cx, cy) = self.bounds.center();
        let east = x >= cx;
        let south = y >= cy;
        (south as usize) * 2 + east as usize
    }
}

/// Spatial index over the current point collection.
#[derive(Debug)]
pub struct Quadtree {
    nodes: Vec<Node>,
    len: usize,
}

impl Quadtree {
    /// Index every point of the set by position. Returns None for an empty
    /// collection (there is nothing to query).
    pub fn build(points: &PointSet) -> Option<Self> {
        let extent = points.extent()?;
        let mut tree = Self {
            nodes: vec![Node::leaf(extent.bounds(), 0)],
            len: 0,
        };
        for (index, point) in points.points().iter().enumerate() {
            tree.insert(point.x, point.y, index);
        }
        Some(tree)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn insert(&mut self, x: f64, y: f64, index: usize) {
        let mut node = 0;
        loop {
            if let Some(children) = self.nodes[node].children {
                let slot = self.nodes[node].child_slot(x, y);
                node = children[slot];
                continue;
            }
            if self.nodes[node].entries.len() < NODE_CAPACITY
                || self.nodes[node].depth >= MAX_SPLIT_DEPTH
            {
                self.nodes[node].entries.push((x, y, index));
                self.len += 1;
                return;
            }
            self.split(node);
        }
    }

    /// Turn a full leaf into an internal node, redistributing its entries.
    fn split(&mut self, node: usize) {
        let bounds = self.nodes[node].bounds;
        let depth = self.nodes[node].depth;
        let (cx, cy) = bounds.center();
        let hw = bounds.width / 2.0;
        let hh = bounds.height / 2.0;

        let child_bounds = [
            BoundsRect::new(bounds.x, bounds.y, hw, hh),
            BoundsRect::new(cx, bounds.y, hw, hh),
            BoundsRect::new(bounds.x, cy, hw, hh),
            BoundsRect::new(cx, cy, hw, hh),
        ];

        let first_child = self.nodes.len();
        for b in child_bounds {
            self.nodes.push(Node::leaf(b, depth + 1));
        }
        let children = [first_child, first_child + 1, first_child + 2, first_child + 3];

        let entries = std::mem::take(&mut self.nodes[node].entries);
        self.nodes[node].children = Some(children);
        for (x, y, index) in entries {
            let slot = self.nodes[node].child_slot(x, y);
            self.nodes[children[slot]].entries.push((x, y, index));
        }
    }

    /// Point indices whose positions fall inside `query`, via an iterative
    /// traversal that prunes subtrees not intersecting the query bounds.
    pub fn range_query(&self, query: &BoundsRect) -> Vec<usize> {
        let mut found = Vec::new();
        let mut stack = vec![0usize];
        while let Some(node) = stack.pop() {
            let node = &self.nodes[node];
            if !node.bounds.intersects(query) {
                continue;
            }
            if let Some(children) = node.children {
                stack.extend_from_slice(&children);
            } else {
                for &(x, y, index) in &node.entries {
                    if query.contains(x, y) {
                        found.push(index);
                    }
                }
            }
        }
        found
    }
}
