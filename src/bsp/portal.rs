//! Portals: the shared-boundary segments the visibility flood
//! travels through.
//!
//! A portal joins two visleaves that touch along one axis. The whole
//! set is rebuilt from the tree geometry by
//! [`BspTree::generate_portals`]; any tree edit throws every portal
//! away.

use glam::{IVec2, ivec2};
use log::warn;
use std::collections::HashSet;

use crate::bsp::neighbors::Side;
use crate::bsp::tree::{BspError, BspTree, ElementId, Orientation};

/// Index of a portal in the owning tree's portal list. Valid until
/// the next `generate_portals`/`load_portals` or tree edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortalId(pub(crate) u32);

/// An axis-aligned segment along the shared boundary of two
/// visleaves. `start <= end` componentwise; exactly one coordinate
/// varies, the other holds the boundary value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Portal {
    pub leaf1: ElementId,
    pub leaf2: ElementId,
    /// `Vertical` joins left/right neighbors, `Horizontal` top/bottom.
    pub orientation: Orientation,
    pub start: IVec2,
    pub end: IVec2,
}

impl Portal {
    /// Build the portal joining `leaf1` and `leaf2` from their shared
    /// boundary. Fails unless both are visleaves with some
    /// directional neighbor relation between them.
    pub fn between(
        tree: &BspTree,
        leaf1: ElementId,
        leaf2: ElementId,
    ) -> Result<Portal, BspError> {
        for (id, other) in [(leaf1, leaf2), (leaf2, leaf1)] {
            match tree.get(id).and_then(|e| e.as_leaf()) {
                Some(leaf) if !leaf.solid => {}
                _ => return Err(BspError::NotAdjacentVisleaves(id, other)),
            }
        }

        let b1 = tree.element(leaf1).bounds;
        let b2 = tree.element(leaf2).bounds;

        // Which side of leaf2 does leaf1 sit on? The first relation
        // found fixes the boundary coordinate.
        let relation = Side::ALL
            .into_iter()
            .find(|&side| tree.is_directed_neighbor(leaf1, leaf2, side))
            .ok_or(BspError::NotAdjacentVisleaves(leaf1, leaf2))?;

        let (orientation, start, end) = match relation {
            Side::Left | Side::Right => {
                let x = if relation == Side::Left {
                    b1.max.x
                } else {
                    b1.min.x
                };
                let top = b1.min.y.max(b2.min.y);
                let bottom = b1.max.y.min(b2.max.y);
                (Orientation::Vertical, ivec2(x, top), ivec2(x, bottom))
            }
            Side::Top | Side::Bottom => {
                let y = if relation == Side::Top {
                    b1.max.y
                } else {
                    b1.min.y
                };
                let left = b1.min.x.max(b2.min.x);
                let right = b1.max.x.min(b2.max.x);
                (Orientation::Horizontal, ivec2(left, y), ivec2(right, y))
            }
        };

        Ok(Portal {
            leaf1,
            leaf2,
            orientation,
            start,
            end,
        })
    }

    /// The leaf on the far side of the portal from `leaf`, or `None`
    /// when the portal does not name `leaf` at all.
    #[inline]
    pub fn other_side(&self, leaf: ElementId) -> Option<ElementId> {
        if leaf == self.leaf1 {
            Some(self.leaf2)
        } else if leaf == self.leaf2 {
            Some(self.leaf1)
        } else {
            None
        }
    }
}

impl BspTree {
    #[inline]
    pub fn portals(&self) -> &[Portal] {
        &self.portals
    }

    #[inline]
    pub fn portal(&self, id: PortalId) -> &Portal {
        &self.portals[id.0 as usize]
    }

    fn clear_portal_sets(&mut self) {
        self.portals.clear();
        let visleaves: Vec<ElementId> = self.iter_visleaves().collect();
        for id in visleaves {
            self.leaf_data_mut(id).portals.clear();
        }
    }

    fn register_portal(&mut self, portal: Portal) {
        let id = PortalId(self.portals.len() as u32);
        let (leaf1, leaf2) = (portal.leaf1, portal.leaf2);
        self.portals.push(portal);
        self.leaf_data_mut(leaf1).portals.push(id);
        self.leaf_data_mut(leaf2).portals.push(id);
    }

    /// Rebuild the portal set from the current tree geometry: one
    /// portal per unordered pair of adjacent visleaves, recorded on
    /// the tree and on both leaves.
    pub fn generate_portals(&mut self) {
        self.clear_portal_sets();

        let mut processed: HashSet<(ElementId, ElementId)> = HashSet::new();
        let visleaves: Vec<ElementId> = self.iter_visleaves().collect();

        for &visleaf in &visleaves {
            let neighbors: Vec<ElementId> = self.neighbors(visleaf).collect();
            for neighbor in neighbors {
                if self.element(neighbor).as_leaf().is_none_or(|l| l.solid) {
                    continue;
                }
                let pair = (visleaf.min(neighbor), visleaf.max(neighbor));
                if !processed.insert(pair) {
                    continue;
                }
                let Ok(portal) = Portal::between(self, visleaf, neighbor) else {
                    continue;
                };
                if portal.start == portal.end {
                    warn!(
                        "skipping zero-length portal between {:?} and {:?}",
                        visleaf, neighbor
                    );
                    continue;
                }
                self.register_portal(portal);
            }
        }
    }

    /// Deserialization dual of [`generate_portals`]: adopt an
    /// externally stored portal set. Each portal must name two live
    /// visleaves of this tree.
    pub fn load_portals(&mut self, portals: impl IntoIterator<Item = Portal>) {
        self.clear_portal_sets();
        for portal in portals {
            if portal.start == portal.end {
                warn!(
                    "skipping zero-length portal between {:?} and {:?}",
                    portal.leaf1, portal.leaf2
                );
                continue;
            }
            self.register_portal(portal);
        }
    }

    /// Rebuild every visleaf's PVS from a boolean matrix indexed by
    /// the leaf ids assigned at serialize time.
    pub fn load_visibility_matrix(&mut self, matrix: &[Vec<bool>]) -> Result<(), BspError> {
        let visleaves: Vec<ElementId> = self.iter_visleaves().collect();
        for &id in &visleaves {
            self.leaf_data_mut(id).pvs.clear();
        }

        let rows = matrix.len();
        let row_of = |id: ElementId, tree: &Self| -> Result<usize, BspError> {
            let leaf_id = tree.element(id).as_leaf().expect("visleaf").leaf_id;
            if leaf_id < 0 || leaf_id as usize >= rows {
                return Err(BspError::LeafIdOutOfMatrix { leaf_id, rows });
            }
            Ok(leaf_id as usize)
        };

        for &a in &visleaves {
            let row = row_of(a, self)?;
            for &b in &visleaves {
                let col = row_of(b, self)?;
                if matrix[row].get(col).copied().unwrap_or(false) {
                    self.leaf_data_mut(a).pvs.insert(b);
                }
            }
        }
        Ok(())
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    fn two_room_world() -> (BspTree, ElementId, ElementId) {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        tree.set_solid(left, false).unwrap();
        tree.set_solid(right, false).unwrap();
        (tree, left, right)
    }

    #[test]
    fn empty_world_generates_no_portals() {
        let mut tree = BspTree::new(128, 64).unwrap();
        tree.generate_portals();
        assert!(tree.portals().is_empty());
    }

    #[test]
    fn one_split_generates_one_vertical_portal() {
        let (mut tree, left, right) = two_room_world();
        tree.generate_portals();

        assert_eq!(tree.portals().len(), 1);
        let portal = &tree.portals()[0];
        assert_eq!(portal.orientation, Orientation::Vertical);
        assert_eq!(portal.start, ivec2(64, 0));
        assert_eq!(portal.end, ivec2(64, 64));
        assert_eq!(portal.other_side(left), Some(right));
        assert_eq!(portal.other_side(right), Some(left));

        // recorded on both leaves
        let id = PortalId(0);
        assert!(tree.element(left).as_leaf().unwrap().portals.contains(&id));
        assert!(tree.element(right).as_leaf().unwrap().portals.contains(&id));
    }

    #[test]
    fn solid_neighbors_produce_no_portal() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, _right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        tree.set_solid(left, false).unwrap();
        tree.generate_portals();
        assert!(tree.portals().is_empty());
    }

    #[test]
    fn generation_is_idempotent() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        tree.set_solid(left, false).unwrap();
        tree.set_solid(right, false).unwrap();
        let (a, b) = tree.divide_leaf(left, Orientation::Horizontal, 32).unwrap();
        tree.set_solid(a, false).unwrap();
        tree.set_solid(b, false).unwrap();

        tree.generate_portals();
        let first: Vec<Portal> = tree.portals().to_vec();
        tree.generate_portals();
        assert_eq!(tree.portals(), &first[..]);
    }

    #[test]
    fn portal_count_matches_adjacent_visleaf_pairs() {
        // quarter the world into four visleaves: 4 shared edges
        let mut tree = BspTree::new(64, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 32)
            .unwrap();
        let (tl, bl) = tree.divide_leaf(left, Orientation::Horizontal, 32).unwrap();
        let (tr, br) = tree.divide_leaf(right, Orientation::Horizontal, 32).unwrap();
        for id in [tl, bl, tr, br] {
            tree.set_solid(id, false).unwrap();
        }
        tree.generate_portals();
        assert_eq!(tree.portals().len(), 4);

        // every portal appears in exactly its two leaves' sets
        for (i, portal) in tree.portals().iter().enumerate() {
            let id = PortalId(i as u32);
            for leaf in [tl, bl, tr, br] {
                let has = tree.element(leaf).as_leaf().unwrap().portals.contains(&id);
                let named = portal.leaf1 == leaf || portal.leaf2 == leaf;
                assert_eq!(has, named);
            }
        }
    }

    #[test]
    fn portal_between_rejects_solid_and_distant_leaves() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        // both solid
        assert!(matches!(
            Portal::between(&tree, left, right),
            Err(BspError::NotAdjacentVisleaves(..))
        ));

        // visleaves, but not adjacent: quarter the left half
        tree.set_solid(right, false).unwrap();
        let (tl, bl) = tree.divide_leaf(left, Orientation::Horizontal, 32).unwrap();
        tree.set_solid(tl, false).unwrap();
        tree.set_solid(bl, false).unwrap();
        assert!(Portal::between(&tree, tl, bl).is_ok());
    }

    #[test]
    fn partial_overlap_clips_the_portal_segment() {
        let mut tree = BspTree::new(128, 64).unwrap();
        let (left, right) = tree
            .divide_leaf(tree.root(), Orientation::Vertical, 64)
            .unwrap();
        tree.set_solid(right, false).unwrap();
        let (tl, bl) = tree.divide_leaf(left, Orientation::Horizontal, 40).unwrap();
        tree.set_solid(tl, false).unwrap();
        tree.set_solid(bl, false).unwrap();
        tree.generate_portals();

        // the bl/right portal spans only bl's extent
        let portal = tree
            .portals()
            .iter()
            .find(|p| p.other_side(bl) == Some(right))
            .unwrap();
        assert_eq!(portal.orientation, Orientation::Vertical);
        assert_eq!(portal.start, ivec2(64, 40));
        assert_eq!(portal.end, ivec2(64, 64));
    }

    #[test]
    fn edits_discard_portals() {
        let (mut tree, left, _right) = two_room_world();
        tree.generate_portals();
        assert_eq!(tree.portals().len(), 1);
        tree.divide_leaf(left, Orientation::Horizontal, 32).unwrap();
        assert!(tree.portals().is_empty());
    }

    #[test]
    fn load_portals_replaces_the_generation() {
        let (mut tree, left, right) = two_room_world();
        tree.generate_portals();
        let saved: Vec<Portal> = tree.portals().to_vec();

        tree.load_portals(saved.clone());
        assert_eq!(tree.portals(), &saved[..]);
        assert_eq!(tree.element(left).as_leaf().unwrap().portals.len(), 1);
        assert_eq!(tree.element(right).as_leaf().unwrap().portals.len(), 1);
    }

    #[test]
    fn visibility_matrix_builds_pvs() {
        let (mut tree, left, right) = two_room_world();
        // assign contiguous leaf ids the way serialization does
        tree.to_kv();

        let id_of = |tree: &BspTree, leaf| tree.element(leaf).as_leaf().unwrap().leaf_id as usize;
        let (li, ri) = (id_of(&tree, left), id_of(&tree, right));
        let mut matrix = vec![vec![false; 2]; 2];
        matrix[li][ri] = true;
        matrix[li][li] = true;

        tree.load_visibility_matrix(&matrix).unwrap();
        let left_pvs = &tree.element(left).as_leaf().unwrap().pvs;
        assert!(left_pvs.contains(&right));
        assert!(left_pvs.contains(&left));
        assert!(tree.element(right).as_leaf().unwrap().pvs.is_empty());
    }

    #[test]
    fn visibility_matrix_rejects_unassigned_leaf_ids() {
        let (mut tree, _, _) = two_room_world();
        // leaf ids were never assigned (-1)
        let matrix = vec![vec![false; 2]; 2];
        assert!(matches!(
            tree.load_visibility_matrix(&matrix),
            Err(BspError::LeafIdOutOfMatrix { .. })
        ));
    }
}
