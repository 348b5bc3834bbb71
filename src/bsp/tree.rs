//! The BSP tree proper: an arena of elements plus the edit and lookup
//! operations everything else builds on.
//!
//! Public API you can rely on:
//! ```text
//! BspTree::new()
//! BspTree::leaf_from_coords()
//! BspTree::divide_leaf() / merge_leaf() / set_solid()
//! BspTree::iter_elements() / iter_leaves() / iter_visleaves() / iter_nodes()
//! BspTree::element() / get() / root()
//! ```
//!
//! Elements live in a slot arena indexed by [`ElementId`]; `parent`,
//! `left` and `right` are ids, which keeps the parent↔child cycle out
//! of the ownership graph and makes serialization ids trivial. Ids
//! are *non-owning handles*: any `divide_leaf`/`merge_leaf`/`from_kv`
//! on the tree ends the validity of every previously obtained id, and
//! a freed slot may be reused by a later edit.

use glam::{IVec2, ivec2};
use smallvec::SmallVec;
use std::collections::HashSet;
use thiserror::Error;

use crate::bsp::portal::{Portal, PortalId};
use crate::geom::Rect;

/*──────────────────────────── ids ────────────────────────────────────*/

/// Index of an element in the tree's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub(crate) u32);

/// Split axis of a node. `Horizontal` cuts along a `y = partition`
/// line (left child on top), `Vertical` along `x = partition` (left
/// child on the left).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Horizontal = 0,
    Vertical = 1,
}

/*──────────────────────────── elements ───────────────────────────────*/

#[derive(Clone, Debug)]
pub struct Element {
    pub bounds: Rect,
    pub parent: Option<ElementId>,
    pub kind: ElementKind,
}

#[derive(Clone, Debug)]
pub enum ElementKind {
    Node(NodeData),
    Leaf(LeafData),
}

#[derive(Clone, Debug)]
pub struct NodeData {
    pub orientation: Orientation,
    pub partition: i32,
    pub left: ElementId,
    pub right: ElementId,
}

#[derive(Clone, Debug)]
pub struct LeafData {
    /// Solid leaves block sight; non-solid leaves are *visleaves*.
    pub solid: bool,
    /// Contiguous visleaf index assigned at serialize time, `-1` for
    /// solid leaves. Indexes the external visibility matrix.
    pub leaf_id: i32,
    /// Portals naming this leaf, rebuilt by `generate_portals`.
    pub portals: SmallVec<[PortalId; 4]>,
    /// Potentially visible set, rebuilt by `load_visibility_matrix`.
    pub pvs: HashSet<ElementId>,
}

impl LeafData {
    pub(crate) fn new(solid: bool) -> Self {
        Self {
            solid,
            leaf_id: -1,
            portals: SmallVec::new(),
            pvs: HashSet::new(),
        }
    }
}

impl Element {
    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, ElementKind::Leaf(_))
    }

    #[inline(always)]
    pub fn is_node(&self) -> bool {
        matches!(self.kind, ElementKind::Node(_))
    }

    #[inline]
    pub fn as_leaf(&self) -> Option<&LeafData> {
        match &self.kind {
            ElementKind::Leaf(leaf) => Some(leaf),
            ElementKind::Node(_) => None,
        }
    }

    #[inline]
    pub fn as_node(&self) -> Option<&NodeData> {
        match &self.kind {
            ElementKind::Node(node) => Some(node),
            ElementKind::Leaf(_) => None,
        }
    }

    /// Endpoints of a node's partition line inside its bounds.
    /// `None` for leaves.
    pub fn partition_segment(&self) -> Option<(IVec2, IVec2)> {
        let node = self.as_node()?;
        let Rect { min, max } = self.bounds;
        Some(match node.orientation {
            Orientation::Horizontal => {
                (ivec2(min.x, node.partition), ivec2(max.x, node.partition))
            }
            Orientation::Vertical => (ivec2(node.partition, min.y), ivec2(node.partition, max.y)),
        })
    }
}

/*──────────────────────────── errors ─────────────────────────────────*/

/// Things that can go wrong while editing or querying a tree.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BspError {
    #[error("world dimensions must be positive, got {width}x{height}")]
    BadDimensions { width: i32, height: i32 },

    #[error("partition {partition} must lie strictly inside ({lo}, {hi})")]
    PartitionOutOfRange { partition: i32, lo: i32, hi: i32 },

    #[error("element {0:?} is not part of this tree")]
    StaleHandle(ElementId),

    #[error("element {0:?} is not a leaf")]
    NotALeaf(ElementId),

    #[error("point ({x}, {y}) lies outside the world")]
    OutsideWorld { x: i32, y: i32 },

    #[error("portal requires two boundary-sharing visleaves, got {0:?} and {1:?}")]
    NotAdjacentVisleaves(ElementId, ElementId),

    #[error("leaf id {leaf_id} does not index the {rows}-row visibility matrix")]
    LeafIdOutOfMatrix { leaf_id: i32, rows: usize },
}

/*──────────────────────────── tree ───────────────────────────────────*/

/// A recursively subdivided axis-aligned rectangular world.
///
/// Starts as a single non-solid leaf covering
/// `(0, 0)..(max_width, max_height)` and is carved with
/// [`divide_leaf`](Self::divide_leaf) /
/// [`merge_leaf`](Self::merge_leaf).
#[derive(Clone, Debug)]
pub struct BspTree {
    max_width: i32,
    max_height: i32,
    slots: Vec<Option<Element>>,
    free: Vec<u32>,
    root: ElementId,
    pub(crate) portals: Vec<Portal>,
}

impl BspTree {
    pub fn new(max_width: i32, max_height: i32) -> Result<Self, BspError> {
        if max_width <= 0 || max_height <= 0 {
            return Err(BspError::BadDimensions {
                width: max_width,
                height: max_height,
            });
        }
        let mut tree = Self {
            max_width,
            max_height,
            slots: Vec::new(),
            free: Vec::new(),
            root: ElementId(0),
            portals: Vec::new(),
        };
        let world = tree.world_rect();
        tree.root = tree.alloc(Element {
            bounds: world,
            parent: None,
            kind: ElementKind::Leaf(LeafData::new(false)),
        });
        Ok(tree)
    }

    /// Rebuild an empty arena around already-decoded elements.
    /// `from_kv` is the only caller.
    pub(crate) fn from_parts(
        max_width: i32,
        max_height: i32,
        slots: Vec<Option<Element>>,
        root: ElementId,
    ) -> Self {
        Self {
            max_width,
            max_height,
            slots,
            free: Vec::new(),
            root,
            portals: Vec::new(),
        }
    }

    #[inline(always)]
    pub fn max_width(&self) -> i32 {
        self.max_width
    }

    #[inline(always)]
    pub fn max_height(&self) -> i32 {
        self.max_height
    }

    #[inline]
    pub fn world_rect(&self) -> Rect {
        Rect::new(IVec2::ZERO, ivec2(self.max_width, self.max_height))
    }

    #[inline(always)]
    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Borrow a live element. Panics on a stale handle; use
    /// [`get`](Self::get) when liveness is in question.
    #[inline]
    pub fn element(&self, id: ElementId) -> &Element {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("stale element handle")
    }

    #[inline]
    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    #[inline]
    pub(crate) fn element_mut(&mut self, id: ElementId) -> &mut Element {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("stale element handle")
    }

    pub(crate) fn leaf_data_mut(&mut self, id: ElementId) -> &mut LeafData {
        match &mut self.element_mut(id).kind {
            ElementKind::Leaf(leaf) => leaf,
            ElementKind::Node(_) => panic!("element {id:?} is not a leaf"),
        }
    }

    /*──────────────────── arena plumbing ────────────────────────────*/

    fn alloc(&mut self, element: Element) -> ElementId {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(element);
                ElementId(slot)
            }
            None => {
                self.slots.push(Some(element));
                ElementId((self.slots.len() - 1) as u32)
            }
        }
    }

    fn release(&mut self, id: ElementId) {
        debug_assert!(self.slots[id.0 as usize].is_some());
        self.slots[id.0 as usize] = None;
        self.free.push(id.0);
    }

    /// Free `id` and everything below it.
    fn free_subtree(&mut self, id: ElementId) {
        let mut stack: SmallVec<[ElementId; 16]> = SmallVec::new();
        stack.push(id);
        while let Some(id) = stack.pop() {
            if let ElementKind::Node(node) = &self.element(id).kind {
                stack.push(node.left);
                stack.push(node.right);
            }
            self.release(id);
        }
    }

    fn live_leaf(&self, id: ElementId) -> Result<&Element, BspError> {
        let element = self.get(id).ok_or(BspError::StaleHandle(id))?;
        if element.is_leaf() {
            Ok(element)
        } else {
            Err(BspError::NotALeaf(id))
        }
    }

    /// Point `parent`'s child slot that currently holds `old` at
    /// `new`; with no parent, `new` becomes the root.
    fn replace_child(&mut self, parent: Option<ElementId>, old: ElementId, new: ElementId) {
        match parent {
            None => self.root = new,
            Some(p) => match &mut self.element_mut(p).kind {
                ElementKind::Node(node) => {
                    if node.left == old {
                        node.left = new;
                    } else {
                        debug_assert_eq!(node.right, old);
                        node.right = new;
                    }
                }
                ElementKind::Leaf(_) => unreachable!("parent of an element must be a node"),
            },
        }
    }

    /// Tree edits orphan every generated portal.
    fn invalidate_portals(&mut self) {
        self.portals.clear();
        let leaves: Vec<ElementId> = self.iter_leaves().collect();
        for id in leaves {
            self.leaf_data_mut(id).portals.clear();
        }
    }

    /*──────────────────── point location ────────────────────────────*/

    /// Walk the tree and return the leaf containing `(x, y)`.
    pub fn leaf_from_coords(&self, x: i32, y: i32) -> Result<ElementId, BspError> {
        if !self.world_rect().contains(ivec2(x, y)) {
            return Err(BspError::OutsideWorld { x, y });
        }
        let mut id = self.root;
        loop {
            match &self.element(id).kind {
                ElementKind::Leaf(_) => return Ok(id),
                ElementKind::Node(node) => {
                    let v = match node.orientation {
                        Orientation::Horizontal => y,
                        Orientation::Vertical => x,
                    };
                    id = if v >= node.partition {
                        node.right
                    } else {
                        node.left
                    };
                }
            }
        }
    }

    /*──────────────────── edits ─────────────────────────────────────*/

    /// Replace `leaf` with a node split at `partition`; returns the
    /// two fresh child leaves `(left, right)`, both born solid.
    ///
    /// For `Horizontal` the left child is the top half, for
    /// `Vertical` the left child is the left half. Every previously
    /// obtained handle is invalidated.
    pub fn divide_leaf(
        &mut self,
        leaf: ElementId,
        orientation: Orientation,
        partition: i32,
    ) -> Result<(ElementId, ElementId), BspError> {
        let element = self.live_leaf(leaf)?;
        let bounds = element.bounds;
        let parent = element.parent;

        let (lo, hi) = match orientation {
            Orientation::Horizontal => (bounds.min.y, bounds.max.y),
            Orientation::Vertical => (bounds.min.x, bounds.max.x),
        };
        if !(lo < partition && partition < hi) {
            return Err(BspError::PartitionOutOfRange { partition, lo, hi });
        }

        let (left_bounds, right_bounds) = match orientation {
            Orientation::Horizontal => (
                Rect::new(bounds.min, ivec2(bounds.max.x, partition)),
                Rect::new(ivec2(bounds.min.x, partition), bounds.max),
            ),
            Orientation::Vertical => (
                Rect::new(bounds.min, ivec2(partition, bounds.max.y)),
                Rect::new(ivec2(partition, bounds.min.y), bounds.max),
            ),
        };

        self.release(leaf);
        let node = self.alloc(Element {
            bounds,
            parent,
            kind: ElementKind::Node(NodeData {
                orientation,
                partition,
                // patched right below, once the children exist
                left: ElementId(u32::MAX),
                right: ElementId(u32::MAX),
            }),
        });
        let left = self.alloc(Element {
            bounds: left_bounds,
            parent: Some(node),
            kind: ElementKind::Leaf(LeafData::new(true)),
        });
        let right = self.alloc(Element {
            bounds: right_bounds,
            parent: Some(node),
            kind: ElementKind::Leaf(LeafData::new(true)),
        });
        match &mut self.element_mut(node).kind {
            ElementKind::Node(data) => {
                data.left = left;
                data.right = right;
            }
            ElementKind::Leaf(_) => unreachable!(),
        }
        self.replace_child(parent, leaf, node);
        self.invalidate_portals();
        Ok((left, right))
    }

    /// Collapse `leaf`'s parent subtree (the leaf, its sibling
    /// subtree and the parent node) into one fresh non-solid leaf and
    /// return its handle. Merging the root leaf resets the tree to a
    /// single non-solid leaf; doing it twice is a no-op.
    pub fn merge_leaf(&mut self, leaf: ElementId) -> Result<ElementId, BspError> {
        let element = self.live_leaf(leaf)?;
        let merged = match element.parent {
            None => {
                self.release(leaf);
                let world = self.world_rect();
                let id = self.alloc(Element {
                    bounds: world,
                    parent: None,
                    kind: ElementKind::Leaf(LeafData::new(false)),
                });
                self.root = id;
                id
            }
            Some(parent) => {
                let parent_element = self.element(parent);
                let bounds = parent_element.bounds;
                let grandparent = parent_element.parent;
                self.free_subtree(parent);
                let id = self.alloc(Element {
                    bounds,
                    parent: grandparent,
                    kind: ElementKind::Leaf(LeafData::new(false)),
                });
                self.replace_child(grandparent, parent, id);
                id
            }
        };
        self.invalidate_portals();
        Ok(merged)
    }

    /// Flip a leaf between solid and visleaf. Does not touch portals;
    /// call [`generate_portals`](Self::generate_portals) before the
    /// next flood.
    pub fn set_solid(&mut self, leaf: ElementId, solid: bool) -> Result<(), BspError> {
        self.live_leaf(leaf)?;
        self.leaf_data_mut(leaf).solid = solid;
        Ok(())
    }

    /*──────────────────── iteration ─────────────────────────────────*/

    /// Every element, root first, right subtrees before left.
    pub fn iter_elements(&self) -> ElementIter<'_> {
        let mut stack = SmallVec::new();
        stack.push(self.root);
        ElementIter { tree: self, stack }
    }

    pub fn iter_leaves(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.iter_elements().filter(|&id| self.element(id).is_leaf())
    }

    /// Non-solid leaves only.
    pub fn iter_visleaves(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.iter_elements()
            .filter(|&id| self.element(id).as_leaf().is_some_and(|leaf| !leaf.solid))
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.iter_elements().filter(|&id| self.element(id).is_node())
    }
}

/// Stack-driven element traversal; see
/// [`BspTree::iter_elements`] for the order guarantee.
pub struct ElementIter<'a> {
    tree: &'a BspTree,
    stack: SmallVec<[ElementId; 32]>,
}

impl Iterator for ElementIter<'_> {
    type Item = ElementId;

    fn next(&mut self) -> Option<ElementId> {
        let id = self.stack.pop()?;
        if let ElementKind::Node(node) = &self.tree.element(id).kind {
            self.stack.push(node.left);
            self.stack.push(node.right);
        }
        Some(id)
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_degenerate_worlds() {
        assert!(matches!(
            BspTree::new(0, 64),
            Err(BspError::BadDimensions { .. })
        ));
        assert!(matches!(
            BspTree::new(128, -1),
            Err(BspError::BadDimensions { .. })
        ));
    }

    #[test]
    fn empty_world_is_one_visleaf() {
        let tree = BspTree::new(128, 64).unwrap();
        let root = tree.root();
        assert_eq!(tree.leaf_from_coords(0, 0).unwrap(), root);
        assert_eq!(tree.leaf_from_coords(127, 63).unwrap(), root);
        assert!(!tree.element(root).as_leaf().unwrap().solid);
        assert_eq!(tree.iter_elements().count(), 1);
        assert_eq!(tree.neighbors(root).count(), 0);
    }

    #[test]
    fn leaf_from_coords_rejects_outside_points() {
        let tree = BspTree::new(128, 64).unwrap();
        assert!(matches!(
            tree.leaf_from_coords(128, 0),
            Err(BspError::OutsideWorld { .. })
        ));
        assert!(matches!(
            tree.leaf_from_coords(5, -1),
            Err(BspError::OutsideWorld { .. })
        ));
    }

    #[test]
    fn divide_splits_bounds_per_orientation() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();

        let lb = tree.element(left).bounds;
        let rb = tree.element(right).bounds;
        assert_eq!((lb.min, lb.max), (ivec2(0, 0), ivec2(64, 64)));
        assert_eq!((rb.min, rb.max), (ivec2(64, 0), ivec2(128, 64)));

        // fresh children are born solid
        assert!(tree.element(left).as_leaf().unwrap().solid);
        assert!(tree.element(right).as_leaf().unwrap().solid);

        // point location respects the >= partition rule
        assert_eq!(tree.leaf_from_coords(63, 10).unwrap(), left);
        assert_eq!(tree.leaf_from_coords(64, 10).unwrap(), right);

        let (top, bottom) = tree.divide_leaf(left, Orientation::Horizontal, 32).unwrap();
        assert_eq!(tree.element(top).bounds.max, ivec2(64, 32));
        assert_eq!(tree.element(bottom).bounds.min, ivec2(0, 32));
    }

    #[test]
    fn divide_validates_partition_range() {
        let mut tree = BspTree::new(128, 64).unwrap();
        for bad in [0, 128, 200, -5] {
            assert!(matches!(
                tree.divide_leaf(tree.root(), Orientation::Vertical, bad),
                Err(BspError::PartitionOutOfRange { .. })
            ));
        }
        // horizontal range is the y axis
        assert!(matches!(
            tree.divide_leaf(tree.root(), Orientation::Horizontal, 64),
            Err(BspError::PartitionOutOfRange { .. })
        ));
    }

    #[test]
    fn divide_rejects_nodes_and_stale_handles() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let old_root = tree.root();
        tree.divide_leaf(old_root, Orientation::Vertical, 64)
            .unwrap();
        // old_root's slot now holds the node
        assert!(matches!(
            tree.divide_leaf(tree.root(), Orientation::Vertical, 32),
            Err(BspError::NotALeaf(_))
        ));
        assert!(matches!(
            tree.divide_leaf(ElementId(999), Orientation::Vertical, 32),
            Err(BspError::StaleHandle(_))
        ));
    }

    #[test]
    fn parent_child_links_stay_consistent() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, _) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        tree.divide_leaf(left, Orientation::Horizontal, 32).unwrap();

        for id in tree.iter_elements().collect::<Vec<_>>() {
            let element = tree.element(id);
            match element.parent {
                None => assert_eq!(id, tree.root()),
                Some(p) => {
                    let node = tree.element(p).as_node().unwrap();
                    assert!(node.left == id || node.right == id);
                }
            }
            if let Some(node) = element.as_node() {
                assert_eq!(tree.element(node.left).parent, Some(id));
                assert_eq!(tree.element(node.right).parent, Some(id));
                // children tile the node exactly
                let lb = tree.element(node.left).bounds;
                let rb = tree.element(node.right).bounds;
                match node.orientation {
                    Orientation::Horizontal => {
                        assert_eq!(lb.max.y, node.partition);
                        assert_eq!(rb.min.y, node.partition);
                        assert_eq!(lb.min, element.bounds.min);
                        assert_eq!(rb.max, element.bounds.max);
                    }
                    Orientation::Vertical => {
                        assert_eq!(lb.max.x, node.partition);
                        assert_eq!(rb.min.x, node.partition);
                        assert_eq!(lb.min, element.bounds.min);
                        assert_eq!(rb.max, element.bounds.max);
                    }
                }
            }
        }
    }

    #[test]
    fn merge_collapses_sibling_subtree() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, _right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        let (top, _bottom) = tree.divide_leaf(left, Orientation::Horizontal, 32).unwrap();

        // merging the top-left grandchild folds the whole left half
        let merged = tree.merge_leaf(top).unwrap();
        let bounds = tree.element(merged).bounds;
        assert_eq!((bounds.min, bounds.max), (ivec2(0, 0), ivec2(64, 64)));
        assert!(!tree.element(merged).as_leaf().unwrap().solid);
        assert_eq!(tree.iter_leaves().count(), 2);
    }

    #[test]
    fn merge_root_resets_and_is_idempotent() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, _) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        let merged = tree.merge_leaf(left).unwrap();
        assert_eq!(merged, tree.root());

        let once = tree.merge_leaf(merged).unwrap();
        assert_eq!(tree.iter_elements().count(), 1);
        assert!(!tree.element(once).as_leaf().unwrap().solid);

        let twice = tree.merge_leaf(once).unwrap();
        assert_eq!(tree.iter_elements().count(), 1);
        assert_eq!(tree.element(twice).bounds, tree.world_rect());
    }

    #[test]
    fn iteration_order_is_root_then_right_subtree() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        let order: Vec<ElementId> = tree.iter_elements().collect();
        assert_eq!(order, vec![tree.root(), right, left]);

        assert_eq!(tree.iter_nodes().count(), 1);
        assert_eq!(tree.iter_leaves().count(), 2);
        // both children are solid until marked otherwise
        assert_eq!(tree.iter_visleaves().count(), 0);
        tree.set_solid(left, false).unwrap();
        assert_eq!(tree.iter_visleaves().count(), 1);
    }

    #[test]
    fn partition_segment_spans_the_node() {
        let mut tree = BspTree::new(128, 64).unwrap();
        tree.divide_leaf(tree.root(), Orientation::Vertical, 48)
            .unwrap();
        let root = tree.element(tree.root());
        assert_eq!(
            root.partition_segment(),
            Some((ivec2(48, 0), ivec2(48, 64)))
        );
    }
}
