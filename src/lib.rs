//! 2-D visibility in a BSP-partitioned rectangular world.
//!
//! The crate is three coupled layers:
//!
//! * [`bsp`]: the axis-aligned BSP tree, with divide/merge edits,
//!   point location, segment-vs-solid collision, directional
//!   neighbor queries, portal generation and the key/value
//!   serialization bridge.
//! * [`vis`]: the portal-flood visibility engine, which floods the
//!   portal graph from a viewpoint, narrowing the view cone at every
//!   portal and rasterizing it into per-leaf shroud masks.
//! * [`geom`] / [`kv`]: the geometry primitives and the ordered
//!   key/value tree format the layers above share.
//!
//! ```no_run
//! use glam::ivec2;
//! use shroudvis::bsp::{BspTree, Orientation};
//! use shroudvis::vis::{DEFAULT_FOV, build_shroud};
//!
//! let mut tree = BspTree::new(1024, 768)?;
//! let (left, right) = tree.divide_leaf(tree.root(), Orientation::Vertical, 512)?;
//! tree.set_solid(left, false)?;
//! tree.set_solid(right, false)?;
//! tree.generate_portals();
//!
//! let shrouds = build_shroud(&tree, ivec2(100, 100), ivec2(600, 400), DEFAULT_FOV)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bsp;
pub mod geom;
pub mod kv;
pub mod vis;
