//! Directory nodes and the table that owns them.

use crate::bytes::ByteReader;
use crate::consts::*;
use crate::error::{IndexError, Result};
use crate::pointer::Pointer;

/// 256 slots split into `256 >> local_depth` hashmaps of `1 << local_depth`
/// slots each. Every hashmap belongs to one slot of the parent node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    pub slots: Box<[Pointer; MAX_LEVEL_SIZE]>,
    pub local_depth: u8,
    /// Deepest `local_depth` among children hanging off slots `0..128`.
    pub max_left_child_depth: u8,
    /// Same for slots `128..256`.
    pub max_right_child_depth: u8,
}

impl DirectoryNode {
    pub fn new(local_depth: u8) -> Self {
        Self {
            slots: Box::new([Pointer::Empty; MAX_LEVEL_SIZE]),
            local_depth,
            max_left_child_depth: 0,
            max_right_child_depth: 0,
        }
    }

    pub fn hash_map_size(&self) -> usize {
        1 << self.local_depth
    }

    pub fn max_child_depth(&self, right: bool) -> u8 {
        if right {
            self.max_right_child_depth
        } else {
            self.max_left_child_depth
        }
    }

    pub fn raise_max_child_depth(&mut self, right: bool, depth: u8) {
        let max = if right {
            &mut self.max_right_child_depth
        } else {
            &mut self.max_left_child_depth
        };
        *max = (*max).max(depth);
    }
}

/// True when every hashmap of `hash_map_size` slots holds a single bucket
/// pointer repeated, so the hashmaps could be replaced by that pointer.
pub fn hash_maps_uniform(slots: &[Pointer], hash_map_size: usize) -> bool {
    slots.chunks(hash_map_size).all(|map| {
        !map[0].is_node() && map.iter().all(|pointer| *pointer == map[0])
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeSlot {
    Live(DirectoryNode),
    Free { next: Option<u32> },
}

/// Growable table of directory nodes. Node 0 is the root.
///
/// Freed entries are linked into a free list and handed out again before the
/// table grows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeAllocator {
    slots: Vec<NodeSlot>,
    free_head: Option<u32>,
}

impl NodeAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table length, counting free entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn free_head(&self) -> Option<u32> {
        self.free_head
    }

    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, NodeSlot::Live(_)))
            .count()
    }

    pub fn free_count(&self) -> usize {
        self.len() - self.live_count()
    }

    pub fn is_live(&self, index: u32) -> bool {
        matches!(self.slots.get(index as usize), Some(NodeSlot::Live(_)))
    }

    pub fn get(&self, index: u32) -> Result<&DirectoryNode> {
        match self.slots.get(index as usize) {
            Some(NodeSlot::Live(node)) => Ok(node),
            _ => Err(dangling(index)),
        }
    }

    pub fn get_mut(&mut self, index: u32) -> Result<&mut DirectoryNode> {
        match self.slots.get_mut(index as usize) {
            Some(NodeSlot::Live(node)) => Ok(node),
            _ => Err(dangling(index)),
        }
    }

    pub fn live(&self) -> impl Iterator<Item = (u32, &DirectoryNode)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            NodeSlot::Live(node) => Some((i as u32, node)),
            NodeSlot::Free { .. } => None,
        })
    }

    pub fn allocate(&mut self, node: DirectoryNode) -> u32 {
        if let Some(index) = self.free_head {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                if let NodeSlot::Free { next } = *slot {
                    self.free_head = next;
                    *slot = NodeSlot::Live(node);
                    return index;
                }
            }
        }
        self.slots.push(NodeSlot::Live(node));
        (self.slots.len() - 1) as u32
    }

    /// Return a node to the table. The last entry shrinks the table, any other
    /// entry goes on the free list.
    pub fn release(&mut self, index: u32) -> Result<()> {
        if !self.is_live(index) {
            return Err(dangling(index));
        }
        if index as usize == self.slots.len() - 1 {
            self.slots.pop();
        } else {
            self.slots[index as usize] = NodeSlot::Free {
                next: self.free_head,
            };
            self.free_head = Some(index);
        }
        Ok(())
    }

    /// Per entry: local depth, the two cached child depths, then 256 packed
    /// slots. A free entry has local depth 0 and the next free index in its
    /// first slot.
    pub fn write_bytes(&self, page_size: usize, out: &mut Vec<u8>) {
        out.extend((self.slots.len() as u64).to_le_bytes());
        for slot in &self.slots {
            match slot {
                NodeSlot::Live(node) => {
                    out.push(node.local_depth);
                    out.push(node.max_left_child_depth);
                    out.push(node.max_right_child_depth);
                    for pointer in node.slots.iter() {
                        out.extend(pointer.pack(page_size).to_le_bytes());
                    }
                }
                NodeSlot::Free { next } => {
                    out.extend([0, 0, 0]);
                    out.extend(next.map_or(-1i64, |next| next as i64).to_le_bytes());
                    out.extend(std::iter::repeat(0).take((MAX_LEVEL_SIZE - 1) * 8));
                }
            }
        }
    }

    pub fn read_bytes(
        reader: &mut ByteReader<'_>,
        page_size: usize,
        free_head: Option<u32>,
    ) -> Result<Self> {
        let count = reader.u64()? as usize;
        if count > reader.remaining() / NODE_RECORD_SIZE {
            return Err(IndexError::Corrupted(format!(
                "tree state claims {} nodes",
                count
            )));
        }

        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            let local_depth = reader.u8()?;
            let max_left_child_depth = reader.u8()?;
            let max_right_child_depth = reader.u8()?;
            if local_depth == 0 {
                let next = match reader.i64()? {
                    -1 => None,
                    next if next >= 0 && (next as usize) < count => Some(next as u32),
                    next => {
                        return Err(IndexError::Corrupted(format!(
                            "free node {} links to {}",
                            index, next
                        )))
                    }
                };
                reader.take((MAX_LEVEL_SIZE - 1) * 8)?;
                slots.push(NodeSlot::Free { next });
                continue;
            }
            if local_depth > MAX_LEVEL_DEPTH {
                return Err(IndexError::Corrupted(format!(
                    "node {} has local depth {}",
                    index, local_depth
                )));
            }
            let mut node = DirectoryNode::new(local_depth);
            node.max_left_child_depth = max_left_child_depth;
            node.max_right_child_depth = max_right_child_depth;
            for pointer in node.slots.iter_mut() {
                *pointer = Pointer::unpack(reader.i64()?, page_size)?;
            }
            slots.push(NodeSlot::Live(node));
        }

        let allocator = Self { slots, free_head };
        allocator.check_free_list()?;
        Ok(allocator)
    }

    /// The free list must visit every free entry exactly once.
    fn check_free_list(&self) -> Result<()> {
        let mut seen = vec![false; self.slots.len()];
        let mut visited = 0;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            match self.slots.get(index as usize) {
                Some(NodeSlot::Free { next }) if !seen[index as usize] => {
                    seen[index as usize] = true;
                    visited += 1;
                    cursor = *next;
                }
                _ => {
                    return Err(IndexError::Corrupted(format!(
                        "free node list is broken at {}",
                        index
                    )))
                }
            }
        }
        if visited != self.free_count() {
            return Err(IndexError::Corrupted(format!(
                "{} free nodes but only {} are on the free list",
                self.free_count(),
                visited
            )));
        }
        Ok(())
    }
}

fn dangling(index: u32) -> IndexError {
    IndexError::Corrupted(format!("reference to missing directory node {}", index))
}
