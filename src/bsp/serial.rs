//! Encode / decode the tree through the ordered key/value format.
//!
//! A serialized world looks like:
//!
//! ```text
//! "BSP"
//! {
//!     "maxWidth"  "128"
//!     "maxHeight" "64"
//!     "elements"
//!     {
//!         "0"
//!         {
//!             "type" "BSPNode"
//!             "bounds" { "left" "0" "top" "0" "right" "128" "bottom" "64" }
//!             "orientation" "1"
//!             "partition" "64"
//!             "left" "2"
//!             "right" "1"
//!         }
//!         ...
//!     }
//! }
//! ```
//!
//! Every scalar is stringified; booleans use `"True"` / `"False"`;
//! orientation is `"0"` (horizontal) / `"1"` (vertical). Element ids
//! are renumbered contiguously in traversal order on encode, and the
//! element with the smallest id becomes the root on decode.

use std::collections::HashMap;

use glam::ivec2;

use crate::bsp::tree::{BspTree, Element, ElementId, ElementKind, LeafData, NodeData, Orientation};
use crate::geom::Rect;
use crate::kv::{KvError, KvMap, KvValue};

const NODE_TYPE: &str = "BSPNode";
const LEAF_TYPE: &str = "BSPLeaf";

/*──────────────────────────── encode ─────────────────────────────────*/

fn bounds_record(bounds: Rect) -> KvMap {
    let mut map = KvMap::new();
    map.insert_str("left", bounds.min.x.to_string());
    map.insert_str("top", bounds.min.y.to_string());
    map.insert_str("right", bounds.max.x.to_string());
    map.insert_str("bottom", bounds.max.y.to_string());
    map
}

impl BspTree {
    /// Serialize to the key/value form.
    ///
    /// Renumbers every visleaf's `leaf_id` contiguously (solid leaves
    /// get `-1`) and assigns element ids in traversal order; the new
    /// leaf ids stay on the tree, which is what
    /// [`load_visibility_matrix`](Self::load_visibility_matrix)
    /// indexes by.
    pub fn to_kv(&mut self) -> KvMap {
        let leaves: Vec<ElementId> = self.iter_leaves().collect();
        for id in leaves {
            self.leaf_data_mut(id).leaf_id = -1;
        }
        let visleaves: Vec<ElementId> = self.iter_visleaves().collect();
        for (i, id) in visleaves.into_iter().enumerate() {
            self.leaf_data_mut(id).leaf_id = i as i32;
        }

        let order: Vec<ElementId> = self.iter_elements().collect();
        let serial_of: HashMap<ElementId, usize> =
            order.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut elements = KvMap::new();
        for (i, &id) in order.iter().enumerate() {
            let element = self.element(id);
            let mut record = KvMap::new();
            match &element.kind {
                ElementKind::Node(node) => {
                    record.insert_str("type", NODE_TYPE);
                    record.insert_map("bounds", bounds_record(element.bounds));
                    record.insert_str("orientation", (node.orientation as i32).to_string());
                    record.insert_str("partition", node.partition.to_string());
                    record.insert_str("left", serial_of[&node.left].to_string());
                    record.insert_str("right", serial_of[&node.right].to_string());
                }
                ElementKind::Leaf(leaf) => {
                    record.insert_str("type", LEAF_TYPE);
                    record.insert_map("bounds", bounds_record(element.bounds));
                    record.insert_str("leafID", leaf.leaf_id.to_string());
                    record.insert_str("solid", if leaf.solid { "True" } else { "False" });
                }
            }
            elements.insert_map(i.to_string(), record);
        }

        let mut bsp = KvMap::new();
        bsp.insert_str("maxWidth", self.max_width().to_string());
        bsp.insert_str("maxHeight", self.max_height().to_string());
        bsp.insert_map("elements", elements);

        let mut top = KvMap::new();
        top.insert_map("BSP", bsp);
        top
    }

    /// [`to_kv`](Self::to_kv) rendered in the text form.
    pub fn to_kv_text(&mut self) -> String {
        crate::kv::format_kv(&self.to_kv())
    }

    /*──────────────────────── decode ────────────────────────────────*/

    /// Rebuild a tree from its key/value form. Two passes: every
    /// element is instantiated detached, then child links and parent
    /// back-references are resolved. The smallest element id is the
    /// root.
    pub fn from_kv(kv: &KvMap) -> Result<Self, KvError> {
        let bsp = kv.map_field("BSP")?;
        let max_width = bsp.int_field("maxWidth")?;
        let max_height = bsp.int_field("maxHeight")?;
        if max_width <= 0 || max_height <= 0 {
            return Err(KvError::BadWorldSize(max_width, max_height));
        }

        let elements_kv = bsp.map_field("elements")?;

        // Pass 1: instantiate detached elements, children unresolved.
        struct RawNode {
            serial: usize,
            left: usize,
            right: usize,
        }
        let mut raw_nodes: Vec<RawNode> = Vec::new();
        let mut by_serial: HashMap<usize, ElementId> = HashMap::new();
        let mut slots: Vec<Option<Element>> = Vec::new();

        for (key, value) in elements_kv.iter() {
            let serial: usize = key.parse().map_err(|_| KvError::BadNumber {
                key: key.to_owned(),
                value: key.to_owned(),
            })?;
            let record = match value {
                KvValue::Map(map) => map,
                KvValue::String(_) => return Err(KvError::NotAMap("elements")),
            };

            let bounds = decode_bounds(record, serial)?;
            let kind = match record.str_field("type")? {
                NODE_TYPE => {
                    let orientation = decode_orientation(record)?;
                    let partition = record.int_field("partition")?;
                    raw_nodes.push(RawNode {
                        serial,
                        left: record.int_field("left")? as usize,
                        right: record.int_field("right")? as usize,
                    });
                    ElementKind::Node(NodeData {
                        orientation,
                        partition,
                        // patched in pass 2
                        left: ElementId(u32::MAX),
                        right: ElementId(u32::MAX),
                    })
                }
                LEAF_TYPE => {
                    let leaf_id = record.int_field("leafID")?;
                    let solid = match record.str_field("solid")? {
                        "True" => true,
                        "False" => false,
                        other => {
                            return Err(KvError::BadBool {
                                key: "solid",
                                value: other.to_owned(),
                            });
                        }
                    };
                    let mut leaf = LeafData::new(solid);
                    leaf.leaf_id = leaf_id;
                    ElementKind::Leaf(leaf)
                }
                other => return Err(KvError::UnknownElementType(other.to_owned())),
            };

            let id = ElementId(slots.len() as u32);
            slots.push(Some(Element {
                bounds,
                parent: None,
                kind,
            }));
            by_serial.insert(serial, id);
        }

        // Pass 2: resolve child links, set parents, validate that the
        // children tile the node exactly as its partition dictates.
        for raw in &raw_nodes {
            let node_id = by_serial[&raw.serial];
            let left_id = *by_serial
                .get(&raw.left)
                .ok_or(KvError::DanglingChild(raw.left))?;
            let right_id = *by_serial
                .get(&raw.right)
                .ok_or(KvError::DanglingChild(raw.right))?;

            let (bounds, orientation, partition) = {
                let element = slots[node_id.0 as usize].as_ref().expect("pass-1 slot");
                let node = match &element.kind {
                    ElementKind::Node(n) => n,
                    ElementKind::Leaf(_) => unreachable!("raw_nodes only holds nodes"),
                };
                (element.bounds, node.orientation, node.partition)
            };
            let (want_left, want_right) = match orientation {
                Orientation::Horizontal => (
                    Rect::new(bounds.min, ivec2(bounds.max.x, partition)),
                    Rect::new(ivec2(bounds.min.x, partition), bounds.max),
                ),
                Orientation::Vertical => (
                    Rect::new(bounds.min, ivec2(partition, bounds.max.y)),
                    Rect::new(ivec2(partition, bounds.min.y), bounds.max),
                ),
            };
            if slots[left_id.0 as usize].as_ref().expect("pass-1 slot").bounds != want_left
                || slots[right_id.0 as usize].as_ref().expect("pass-1 slot").bounds != want_right
            {
                return Err(KvError::InconsistentBounds(raw.serial));
            }

            match &mut slots[node_id.0 as usize].as_mut().expect("pass-1 slot").kind {
                ElementKind::Node(node) => {
                    node.left = left_id;
                    node.right = right_id;
                }
                ElementKind::Leaf(_) => unreachable!(),
            }
            slots[left_id.0 as usize].as_mut().expect("pass-1 slot").parent = Some(node_id);
            slots[right_id.0 as usize].as_mut().expect("pass-1 slot").parent = Some(node_id);
        }

        let root_serial = by_serial.keys().copied().min().ok_or(KvError::NoElements)?;
        let root = by_serial[&root_serial];

        Ok(BspTree::from_parts(max_width, max_height, slots, root))
    }

    /// Parse the text form and decode it.
    pub fn from_kv_text(text: &str) -> Result<Self, KvError> {
        Self::from_kv(&crate::kv::parse_kv(text)?)
    }
}

fn decode_bounds(record: &KvMap, serial: usize) -> Result<Rect, KvError> {
    let bounds = record.map_field("bounds")?;
    let left = bounds.int_field("left")?;
    let top = bounds.int_field("top")?;
    let right = bounds.int_field("right")?;
    let bottom = bounds.int_field("bottom")?;
    if left >= right || top >= bottom {
        return Err(KvError::InconsistentBounds(serial));
    }
    Ok(Rect::new(ivec2(left, top), ivec2(right, bottom)))
}

fn decode_orientation(record: &KvMap) -> Result<Orientation, KvError> {
    match record.str_field("orientation")? {
        "0" => Ok(Orientation::Horizontal),
        "1" => Ok(Orientation::Vertical),
        other => Err(KvError::UnknownOrientation(other.to_owned())),
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
