//! Shared 2-D geometry: integer rectangles, rays, and the segment
//! intersection predicates the collision and visibility code lean on.
//!
//! Everything here is pure. Integer world geometry uses [`IVec2`],
//! float ray math uses [`Vec2`].

use glam::{IVec2, Vec2, vec2};

/*──────────────────────────── Rect ───────────────────────────────────*/

/// Axis-aligned integer rectangle (map units).
///
/// `min` is the top-left corner, `max` the bottom-right; both axes are
/// strictly ordered (`min.x < max.x`, `min.y < max.y`). Containment is
/// half-open: a point on the right or bottom edge belongs to the
/// neighboring rectangle, matching the `>= partition` descent rule of
/// the BSP walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub min: IVec2,
    pub max: IVec2,
}

impl Rect {
    #[inline]
    pub fn new(min: IVec2, max: IVec2) -> Self {
        debug_assert!(min.x < max.x && min.y < max.y);
        Self { min, max }
    }

    #[inline(always)]
    pub fn width(&self) -> i32 {
        self.max.x - self.min.x
    }

    #[inline(always)]
    pub fn height(&self) -> i32 {
        self.max.y - self.min.y
    }

    #[inline(always)]
    pub fn top_left(&self) -> IVec2 {
        self.min
    }

    #[inline(always)]
    pub fn bottom_right(&self) -> IVec2 {
        self.max
    }

    /// Half-open containment test.
    #[inline]
    pub fn contains(&self, p: IVec2) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }
}

/*──────────────────────────── Ray ────────────────────────────────────*/

/// A ray anchored at `start`, aimed through `end`.
///
/// `end` is a point the ray passes through, not a far clip: the view
/// cone carries unit-length rays and the portal clipper rewrites `end`
/// to the clamped portal intersection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub start: Vec2,
    pub end: Vec2,
}

impl Ray {
    #[inline]
    pub fn new(start: Vec2, end: Vec2) -> Self {
        Self { start, end }
    }

    #[inline(always)]
    pub fn dir(&self) -> Vec2 {
        self.end - self.start
    }

    /// The ray's normal, direction rotated a quarter turn clockwise
    /// in screen coordinates: `(dy, -dx)`.
    #[inline]
    pub fn normal(&self) -> Vec2 {
        seg_normal(self.start, self.end)
    }

    /// Translate both endpoints so `base` becomes the origin.
    #[inline]
    pub fn rebased(&self, base: Vec2) -> Ray {
        Ray {
            start: self.start - base,
            end: self.end - base,
        }
    }
}

/*────────────────────── scalar helpers ───────────────────────────────*/

/// -1, 0 or +1 according to the sign of `n`.
#[inline(always)]
pub fn sign(n: f32) -> i32 {
    if n > 0.0 {
        1
    } else if n < 0.0 {
        -1
    } else {
        0
    }
}

/// Normal of the segment `start → end`: `(dy, -dx)`.
#[inline]
pub fn seg_normal(start: Vec2, end: Vec2) -> Vec2 {
    vec2(end.y - start.y, -(end.x - start.x))
}

/*──────────────────── orientation / intersection ─────────────────────*/

/// Orientation of the triple `(p1, p2, p3)`: the sign of the cross
/// product `(p2 - p1) × (p3 - p1)`. +1 counter-clockwise, -1
/// clockwise, 0 collinear.
#[inline]
pub fn orientation(p1: Vec2, p2: Vec2, p3: Vec2) -> i32 {
    sign((p3.y - p1.y) * (p2.x - p1.x) - (p3.x - p1.x) * (p2.y - p1.y))
}

/// True when `p` lies within the bounding box of the segment
/// `a → b`. Only meaningful once `p` is known collinear with the
/// segment.
#[inline]
pub fn point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> bool {
    p.x <= a.x.max(b.x) && p.x >= a.x.min(b.x) && p.y <= a.y.max(b.y) && p.y >= a.y.min(b.y)
}

/// Closed-segment intersection test via the four-orientation method,
/// with the collinear endpoint-on-segment fallback.
pub fn segments_intersect(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> bool {
    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == 0 && point_on_segment(b1, a1, a2))
        || (o2 == 0 && point_on_segment(b2, a1, a2))
        || (o3 == 0 && point_on_segment(a1, b1, b2))
        || (o4 == 0 && point_on_segment(a2, b1, b2))
}

/// Intersection of the infinite line through `(line_start, line_end)`
/// with `ray`, or `None` when the two are parallel or the hit lies
/// behind the ray's anchor.
pub fn intersect_line_ray(line_start: Vec2, line_end: Vec2, ray: &Ray) -> Option<Vec2> {
    let d1 = line_end - line_start;
    let d2 = ray.dir();

    let parallel = (d1.x == 0.0 && d2.x == 0.0)
        || ((d1.x != 0.0 && d2.x != 0.0) && (d1.y / d1.x == d2.y / d2.x));
    if parallel {
        return None;
    }

    let p1 = line_start;
    let p2 = ray.start;

    let t = (p2.y * d1.x - p1.y * d1.x - p2.x * d1.y + p1.x * d1.y) / (d2.x * d1.y - d1.x * d2.y);

    (t >= 0.0).then(|| p2 + t * d2)
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
