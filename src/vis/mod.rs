mod flood;
mod shroud;

pub use flood::{DEFAULT_FOV, build_shroud, portal_within_viewcone, restrict_viewcone};
pub use shroud::{BLOCK_SIZE, ShroudMask, Surface, fill_surface_within_viewcone};
