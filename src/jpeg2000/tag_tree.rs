use crate::jpeg2000::bit_io::J2kBitWriter;

/// Tag Tree for JPEG 2000 Packet Header coding (ISO/IEC 15444-1 B.10.2).
/// Represents a quad-tree structure used to encode 2D arrays of values (e.g. inclusion, zero bit-planes).
#[derive(Debug, Clone)]
pub struct TagTree {
    nodes: Vec<TagTreeNode>,
    leaf_width: usize,
    leaf_height: usize,
}

#[derive(Clone, Debug)]
struct TagTreeNode {
    value: i32,
    low: i32,
    known: bool,
    parent_index: Option<usize>,
}

impl Default for TagTreeNode {
    fn default() -> Self {
        Self {
            value: Self::UNSET,
            low: 0,
            known: false,
            parent_index: None,
        }
    }
}

impl TagTreeNode {
    const UNSET: i32 = 999;
}

impl TagTree {
    /// Create a new TagTree for a grid of `w` x `h` leaves.
    pub fn new(w: usize, h: usize) -> Self {
        let mut nodes = vec![TagTreeNode::default(); w * h];

        let mut current_level_start = 0;
        let mut current_w = w;
        let mut current_h = h;

        // Build levels up to root
        while current_w * current_h > 1 {
            let next_w = current_w.div_ceil(2);
            let next_h = current_h.div_ceil(2);
            let next_level_start = nodes.len();
            nodes.resize(next_level_start + next_w * next_h, TagTreeNode::default());

            // Link children to parents
            for y in 0..current_h {
                for x in 0..current_w {
                    let child_idx = current_level_start + y * current_w + x;
                    let parent_idx = next_level_start + (y / 2) * next_w + x / 2;
                    nodes[child_idx].parent_index = Some(parent_idx);
                }
            }

            current_w = next_w;
            current_h = next_h;
            current_level_start = next_level_start;
        }

        Self {
            nodes,
            leaf_width: w,
            leaf_height: h,
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_width * self.leaf_height
    }

    /// Reset the tree state (values and known status).
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.value = TagTreeNode::UNSET;
            node.low = 0;
            node.known = false;
        }
    }

    /// Set the value of leaf `leaf` (raster index). Ancestors keep the
    /// minimum of their children.
    pub fn set_value(&mut self, leaf: usize, value: i32) {
        let mut idx = Some(leaf).filter(|&l| l < self.leaf_count());
        while let Some(i) = idx {
            let node = &mut self.nodes[i];
            if node.value <= value {
                break;
            }
            node.value = value;
            idx = node.parent_index;
        }
    }

    /// Encode the value of leaf `leaf` against `threshold`: one bit per
    /// increment of the lower bound, stopping once the value is known or the
    /// threshold is reached.
    pub fn encode(&mut self, writer: &mut J2kBitWriter, leaf: usize, threshold: i32) {
        if leaf >= self.leaf_count() {
            return;
        }

        // Path from the leaf up to the root
        let mut path = vec![leaf];
        while let Some(parent) = self.nodes[path[path.len() - 1]].parent_index {
            path.push(parent);
        }

        let mut low = 0;
        for &idx in path.iter().rev() {
            let node = &mut self.nodes[idx];
            if low > node.low {
                node.low = low;
            } else {
                low = node.low;
            }

            while low < threshold {
                if low >= node.value {
                    if !node.known {
                        writer.write_bit(1);
                        node.known = true;
                    }
                    break;
                }
                writer.write_bit(0);
                low += 1;
            }
            node.low = low;
        }
    }
}
