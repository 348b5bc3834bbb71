//! Portal-flood visibility.
//!
//! From a viewpoint and a look-at target the flood walks the portal
//! graph depth-first, narrowing the view cone at every portal it
//! passes through and rasterizing the narrowed cone into a per-leaf
//! [`ShroudMask`]. Each portal is traversed at most once and the
//! narrowing is monotone, so the walk terminates after touching at
//! most every visleaf.

use glam::{IVec2, Vec2, ivec2, vec2};
use std::collections::{HashMap, HashSet};
use std::f32::consts::TAU;

use crate::bsp::{BspTree, ElementId, Orientation, Portal, PortalId};
use crate::geom::{Ray, intersect_line_ray};
use crate::vis::shroud::{ShroudMask, fill_surface_within_viewcone};

/// Default field of view: 135° in radians.
pub const DEFAULT_FOV: f32 = 2.356_194_5;

/*──────────────────────────── entry point ────────────────────────────*/

/// Flood visibility from `view_pos` toward `view_target` and return
/// the shroud mask of every leaf the cone reaches, keyed by leaf.
///
/// Pure with respect to the tree: every call allocates a fresh map.
/// The tree's portals must be current (see
/// [`BspTree::generate_portals`]); `view_pos` must lie inside the
/// world.
///
/// The view direction is computed in an axis-swapped angular frame
/// (`atan2(dx, dy)` against `(sin, cos)` axes). The swaps cancel for
/// the cone's central ray, leaving `+fov/2` sweeping clockwise in
/// screen coordinates, and the flank assignment below depends on
/// that sense.
pub fn build_shroud(
    tree: &BspTree,
    view_pos: IVec2,
    view_target: IVec2,
    fov: f32,
) -> Result<HashMap<ElementId, ShroudMask>, crate::bsp::BspError> {
    let start_leaf = tree.leaf_from_coords(view_pos.x, view_pos.y)?;
    let pos = view_pos.as_vec2();

    let view_vector = vec2(
        (view_target.y - view_pos.y) as f32,
        (view_target.x - view_pos.x) as f32,
    );
    let view_angle = view_vector.y.atan2(view_vector.x).rem_euclid(TAU);
    let half_fov = fov * 0.5;
    let left_angle = view_angle + half_fov;
    let right_angle = view_angle - half_fov;

    let cone_left = Ray::new(pos, pos + vec2(left_angle.sin(), left_angle.cos()));
    let cone_right = Ray::new(pos, pos + vec2(right_angle.sin(), right_angle.cos()));

    let mut shrouds: HashMap<ElementId, ShroudMask> = HashMap::new();
    let mut seen_portals: HashSet<PortalId> = HashSet::new();
    let mut stack: Vec<(ElementId, Ray, Ray)> = vec![(start_leaf, cone_left, cone_right)];

    while let Some((leaf_id, cone_left, cone_right)) = stack.pop() {
        let element = tree.element(leaf_id);
        let bounds = element.bounds;

        let mask = shrouds
            .entry(leaf_id)
            .or_insert_with(|| ShroudMask::new(bounds.width(), bounds.height()));

        let top_left = bounds.top_left().as_vec2();
        fill_surface_within_viewcone(
            mask,
            &cone_left.rebased(top_left),
            &cone_right.rebased(top_left),
        );

        let Some(leaf) = element.as_leaf() else {
            continue;
        };
        for &portal_id in &leaf.portals {
            if seen_portals.contains(&portal_id) {
                continue;
            }
            let portal = tree.portal(portal_id);
            if !portal_within_viewcone(portal, &cone_left, &cone_right) {
                continue;
            }
            seen_portals.insert(portal_id);
            let (narrow_left, narrow_right) = restrict_viewcone(portal, &cone_left, &cone_right);
            let Some(next) = portal.other_side(leaf_id) else {
                continue;
            };
            stack.push((next, narrow_left, narrow_right));
        }
    }

    Ok(shrouds)
}

/*──────────────────────────── portal tests ───────────────────────────*/

#[inline]
fn clamp_to_portal(p: Vec2, portal: &Portal) -> Vec2 {
    p.clamp(portal.start.as_vec2(), portal.end.as_vec2())
}

/// Whether any part of the portal lies inside the cone.
///
/// Both rays hitting the portal's supporting line count only when
/// the two clamped hits differ after integer truncation (a cone
/// converging to a single portal pixel sees nothing through it); a
/// single hit always counts; no hit means the portal is behind the
/// viewer.
pub fn portal_within_viewcone(portal: &Portal, cone_left: &Ray, cone_right: &Ray) -> bool {
    debug_assert_eq!(cone_left.start, cone_right.start);
    let start = portal.start.as_vec2();
    let end = portal.end.as_vec2();

    let hit_left = intersect_line_ray(start, end, cone_left);
    let hit_right = intersect_line_ray(start, end, cone_right);

    match (hit_left, hit_right) {
        (Some(l), Some(r)) => {
            let lb = clamp_to_portal(l, portal);
            let rb = clamp_to_portal(r, portal);
            ivec2(lb.x as i32, lb.y as i32) != ivec2(rb.x as i32, rb.y as i32)
        }
        (Some(_), None) | (None, Some(_)) => true,
        (None, None) => false,
    }
}

/// Narrow the cone to fit through `portal`.
///
/// A ray that hits the portal's supporting line keeps its anchor and
/// ends at the hit clamped into the portal segment. A ray that
/// misses (parallel, or the hit is behind the viewer) diverges away
/// from the portal, so its new endpoint is the portal endpoint on
/// the side it escapes toward, picked by which side of the portal
/// the viewer is on. Applying the restriction twice is a no-op.
pub fn restrict_viewcone(portal: &Portal, cone_left: &Ray, cone_right: &Ray) -> (Ray, Ray) {
    debug_assert_eq!(cone_left.start, cone_right.start);
    let start = portal.start.as_vec2();
    let end = portal.end.as_vec2();

    let left_end = match intersect_line_ray(start, end, cone_left) {
        Some(hit) => clamp_to_portal(hit, portal),
        None => match portal.orientation {
            Orientation::Vertical => {
                if cone_left.start.x < start.x {
                    start
                } else {
                    end
                }
            }
            Orientation::Horizontal => {
                if cone_left.start.y < start.y {
                    end
                } else {
                    start
                }
            }
        },
    };

    let right_end = match intersect_line_ray(start, end, cone_right) {
        Some(hit) => clamp_to_portal(hit, portal),
        None => match portal.orientation {
            Orientation::Vertical => {
                if cone_right.start.x < start.x {
                    end
                } else {
                    start
                }
            }
            Orientation::Horizontal => {
                if cone_right.start.y < start.y {
                    start
                } else {
                    end
                }
            }
        },
    };

    (
        Ray::new(cone_left.start, left_end),
        Ray::new(cone_right.start, right_end),
    )
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
