mod collision;
mod neighbors;
mod portal;
mod serial;
mod tree;

pub use neighbors::{NeighborIter, Side};
pub use portal::{Portal, PortalId};
pub use tree::{
    BspError, BspTree, Element, ElementId, ElementIter, ElementKind, LeafData, NodeData,
    Orientation,
};
