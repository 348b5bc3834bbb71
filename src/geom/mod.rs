mod primitives;

pub use primitives::{
    Ray, Rect, intersect_line_ray, orientation, point_on_segment, seg_normal, segments_intersect,
    sign,
};
