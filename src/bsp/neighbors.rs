//! Directional neighbor query.
//!
//! For a leaf and a world side this yields every leaf touching that
//! side whose extent along the perpendicular axis strictly overlaps
//! the query leaf's. The walk has two phases: ascend to the nearest
//! ancestor whose partition separates the leaf from that side, then
//! descend the sibling subtree keeping only children that can touch
//! the shared boundary.

use smallvec::SmallVec;

use crate::bsp::tree::{BspTree, ElementId, ElementKind, Orientation};
use crate::geom::Rect;

/// A side of a leaf, in world orientation (`Top` is `-y`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Top,
    Right,
    Bottom,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::Left, Side::Top, Side::Right, Side::Bottom];

    /// Ascending from the query leaf stops at a node with this
    /// orientation...
    #[inline]
    fn ancestor_orientation(self) -> Orientation {
        match self {
            Side::Left | Side::Right => Orientation::Vertical,
            Side::Top | Side::Bottom => Orientation::Horizontal,
        }
    }

    /// ...approached from its right child for `Left`/`Top` (the leaf
    /// sits right/below the partition), left child otherwise.
    #[inline]
    fn arrives_from_right(self) -> bool {
        matches!(self, Side::Left | Side::Top)
    }
}

impl BspTree {
    /// Leaves adjacent to `leaf` on `side`, nearest-first along the
    /// descent order. Yields nothing when the leaf touches the world
    /// boundary on that side.
    pub fn directed_neighbors(&self, leaf: ElementId, side: Side) -> NeighborIter<'_> {
        let bounds = self.element(leaf).bounds;

        // Ascend until `side`'s partition orientation is approached
        // from the matching child.
        let mut ancestor = None;
        let mut current = leaf;
        while let Some(parent) = self.element(current).parent {
            if let ElementKind::Node(node) = &self.element(parent).kind {
                if node.orientation == side.ancestor_orientation() {
                    let from_right = node.right == current;
                    if from_right == side.arrives_from_right() {
                        ancestor = Some(parent);
                        break;
                    }
                }
            }
            current = parent;
        }

        let mut stack = SmallVec::new();
        if let Some(ancestor) = ancestor {
            let node = self.element(ancestor).as_node().expect("ancestor is a node");
            stack.push(if side.arrives_from_right() {
                node.left
            } else {
                node.right
            });
        }

        NeighborIter {
            tree: self,
            bounds,
            side,
            stack,
        }
    }

    /// All four directions chained: left, top, right, bottom.
    pub fn neighbors(&self, leaf: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        Side::ALL
            .into_iter()
            .flat_map(move |side| self.directed_neighbors(leaf, side))
    }

    /// True when `a` lies on `side` of `b`.
    ///
    /// Not guaranteed symmetric with the opposite side's query;
    /// portal generation only relies on some directional relation
    /// existing.
    pub fn is_directed_neighbor(&self, a: ElementId, b: ElementId, side: Side) -> bool {
        self.directed_neighbors(b, side).any(|n| n == a)
    }

    pub fn is_neighbor(&self, a: ElementId, b: ElementId) -> bool {
        self.neighbors(b).any(|n| n == a)
    }
}

/// Lazy descent over the sibling subtree picked by
/// [`BspTree::directed_neighbors`].
pub struct NeighborIter<'a> {
    tree: &'a BspTree,
    bounds: Rect,
    side: Side,
    stack: SmallVec<[ElementId; 16]>,
}

impl NeighborIter<'_> {
    /// Strict overlap along the axis perpendicular to the query
    /// direction; corner-touching leaves are not neighbors.
    fn overlaps(&self, other: Rect) -> bool {
        match self.side {
            Side::Left | Side::Right => {
                !(other.max.y <= self.bounds.min.y || other.min.y >= self.bounds.max.y)
            }
            Side::Top | Side::Bottom => {
                !(other.max.x <= self.bounds.min.x || other.min.x >= self.bounds.max.x)
            }
        }
    }
}

impl Iterator for NeighborIter<'_> {
    type Item = ElementId;

    fn next(&mut self) -> Option<ElementId> {
        while let Some(id) = self.stack.pop() {
            match &self.tree.element(id).kind {
                ElementKind::Leaf(_) => {
                    if self.overlaps(self.tree.element(id).bounds) {
                        return Some(id);
                    }
                }
                ElementKind::Node(node) => {
                    // Splits parallel to the shared boundary keep only
                    // the child facing the query leaf; perpendicular
                    // splits keep both.
                    let parallel = node.orientation == self.side.ancestor_orientation();
                    if !parallel {
                        self.stack.push(node.left);
                        self.stack.push(node.right);
                    } else if self.side.arrives_from_right() {
                        self.stack.push(node.right);
                    } else {
                        self.stack.push(node.left);
                    }
                }
            }
        }
        None
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_edges_have_no_neighbors() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        assert_eq!(tree.directed_neighbors(left, Side::Left).count(), 0);
        assert_eq!(tree.directed_neighbors(left, Side::Top).count(), 0);
        assert_eq!(tree.directed_neighbors(left, Side::Bottom).count(), 0);
        assert_eq!(tree.directed_neighbors(right, Side::Right).count(), 0);
    }

    #[test]
    fn single_split_halves_are_mutual_neighbors() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        let of_left: Vec<_> = tree.directed_neighbors(left, Side::Right).collect();
        assert_eq!(of_left, vec![right]);
        let of_right: Vec<_> = tree.directed_neighbors(right, Side::Left).collect();
        assert_eq!(of_right, vec![left]);

        assert!(tree.is_directed_neighbor(left, right, Side::Left));
        assert!(tree.is_neighbor(right, left));
    }

    #[test]
    fn right_half_sees_both_left_quadrants() {
        // 128x64 -> vertical at 64 -> left half horizontal at 32
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        let (top_left, bottom_left) =
            tree.divide_leaf(left, Orientation::Horizontal, 32).unwrap();

        let mut of_right: Vec<_> = tree.directed_neighbors(right, Side::Left).collect();
        of_right.sort();
        let mut expected = vec![top_left, bottom_left];
        expected.sort();
        assert_eq!(of_right, expected);

        // and each quadrant sees the right half back
        assert_eq!(
            tree.directed_neighbors(top_left, Side::Right).collect::<Vec<_>>(),
            vec![right]
        );
        assert_eq!(
            tree.directed_neighbors(bottom_left, Side::Right).collect::<Vec<_>>(),
            vec![right]
        );
    }

    #[test]
    fn vertical_stacking_uses_top_and_bottom() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (top, bottom) = tree
            .divide_leaf(tree.root(), Orientation::Horizontal, 32)
            .unwrap();
        assert_eq!(
            tree.directed_neighbors(top, Side::Bottom).collect::<Vec<_>>(),
            vec![bottom]
        );
        assert_eq!(
            tree.directed_neighbors(bottom, Side::Top).collect::<Vec<_>>(),
            vec![top]
        );
        assert_eq!(tree.directed_neighbors(top, Side::Left).count(), 0);
    }

    #[test]
    fn strict_overlap_excludes_diagonal_leaves() {
        // quarter the world: diagonal quadrants only touch at the
        // center point, which must not count as adjacency
        let mut tree = BspTree::new(64, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 32)
            .unwrap();
        let (tl, bl) = tree.divide_leaf(left, Orientation::Horizontal, 32).unwrap();
        let (tr, br) = tree.divide_leaf(right, Orientation::Horizontal, 32).unwrap();

        let of_tl: Vec<_> = tree.neighbors(tl).collect();
        assert!(of_tl.contains(&tr));
        assert!(of_tl.contains(&bl));
        assert!(!of_tl.contains(&br));

        let of_br: Vec<_> = tree.neighbors(br).collect();
        assert!(of_br.contains(&tr));
        assert!(of_br.contains(&bl));
        assert!(!of_br.contains(&tl));
    }

    #[test]
    fn partial_overlap_still_counts() {
        // left half split at y=40, right half split at y=24: the
        // bottom-left leaf (40..64) overlaps the bottom-right leaf
        // (24..64) but not the top-right one (0..24)
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        let (_tl, bl) = tree.divide_leaf(left, Orientation::Horizontal, 40).unwrap();
        let (tr, br) = tree.divide_leaf(right, Orientation::Horizontal, 24).unwrap();

        let of_bl: Vec<_> = tree.directed_neighbors(bl, Side::Right).collect();
        assert!(of_bl.contains(&br));
        assert!(!of_bl.contains(&tr));
    }
}
