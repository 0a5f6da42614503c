//! The directory: a trie of fixed width nodes over the leading bits of a hash.
//!
//! Node 0 is the root and always consumes 8 bits. Deeper nodes consume between
//! 1 and 8 bits each. A node consuming fewer than 8 bits is shared by several
//! neighbouring slots of its parent, one hashmap per parent slot, and only
//! ever holds bucket pointers: children are only hung under full depth nodes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::bytes::ByteReader;
use crate::consts::*;
use crate::error::{IndexError, Result};
use crate::hash::prefix;
use crate::node::{hash_maps_uniform, DirectoryNode, NodeAllocator};
use crate::pointer::Pointer;

/// One step of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathLevel {
    pub node: u32,
    /// First slot of the hashmap used inside `node`.
    pub hash_map_offset: usize,
    /// Slot within the hashmap.
    pub item_index: usize,
    pub local_depth: u8,
    /// Hash bits consumed from the root down to and including this node.
    pub global_depth: u8,
}

impl PathLevel {
    pub fn slot(&self) -> usize {
        self.hash_map_offset + self.item_index
    }
}

/// Route from the root to the slot that resolved a hash. Built per lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPath {
    pub levels: Vec<PathLevel>,
}

impl BucketPath {
    pub fn last(&self) -> &PathLevel {
        // a path always holds the root level
        &self.levels[self.levels.len() - 1]
    }

    pub fn parent(&self) -> Option<&PathLevel> {
        self.levels.len().checked_sub(2).map(|i| &self.levels[i])
    }
}

/// Contiguous run of slots governed by one bucket prefix inside one hashmap.
/// The lower half of the run is `start..start + half`, the upper half follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    pub level: usize,
    pub start: usize,
    pub half: usize,
}

impl SlotRange {
    pub fn end(&self) -> usize {
        self.start + 2 * self.half
    }
}

/// A child node whose slots were rewritten, with the node it hangs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Touched {
    pub child: u32,
    pub parent: u32,
}

/// One directory slot reached by [`Directory::walk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotVisit {
    /// Hash bits that lead to the slot, `depth` of them.
    pub prefix: u64,
    pub depth: u8,
    pub pointer: Pointer,
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    nodes: NodeAllocator,
}

impl Directory {
    /// A root of full depth whose slots point at `buckets` in order.
    pub fn new(buckets: &[u64]) -> Result<Self> {
        if buckets.len() != MAX_LEVEL_SIZE {
            return Err(IndexError::Corrupted(format!(
                "root needs {} buckets, got {}",
                MAX_LEVEL_SIZE,
                buckets.len()
            )));
        }
        let mut root = DirectoryNode::new(MAX_LEVEL_DEPTH);
        for (slot, id) in root.slots.iter_mut().zip(buckets) {
            *slot = Pointer::Bucket(*id);
        }
        let mut nodes = NodeAllocator::new();
        nodes.allocate(root);
        Ok(Self { nodes })
    }

    pub fn from_nodes(nodes: NodeAllocator) -> Result<Self> {
        match nodes.get(0) {
            Ok(root) if root.local_depth == MAX_LEVEL_DEPTH => Ok(Self { nodes }),
            Ok(root) => Err(IndexError::Corrupted(format!(
                "root has local depth {}",
                root.local_depth
            ))),
            Err(_) => Err(IndexError::Corrupted("directory has no root".into())),
        }
    }

    pub fn nodes(&self) -> &NodeAllocator {
        &self.nodes
    }

    pub fn pointer(&self, level: &PathLevel) -> Result<Pointer> {
        Ok(self.nodes.get(level.node)?.slots[level.slot()])
    }

    /// Walk from the root to the slot holding the bucket for `hash`.
    pub fn locate(&self, hash: u64) -> Result<BucketPath> {
        let mut node_index = 0;
        let mut offset = 0;
        let mut global_depth: u8 = 0;
        let mut levels = Vec::new();

        loop {
            let node = self.nodes.get(node_index)?;
            global_depth = match global_depth.checked_add(node.local_depth) {
                Some(depth) if depth <= MAX_HASH_DEPTH => depth,
                _ => {
                    return Err(IndexError::Corrupted(
                        "directory walk exceeds 64 bits of hash".into(),
                    ))
                }
            };
            let item_index =
                (prefix(hash, global_depth) as usize) & (node.hash_map_size() - 1);
            let level = PathLevel {
                node: node_index,
                hash_map_offset: offset,
                item_index,
                local_depth: node.local_depth,
                global_depth,
            };
            levels.push(level);

            match node.slots[level.slot()] {
                Pointer::Node { index, offset: child_offset } => {
                    node_index = index;
                    offset = child_offset as usize;
                }
                _ => return Ok(BucketPath { levels }),
            }
        }
    }

    /// Slots covered by a bucket whose prefix is `depth` bits long, split into
    /// the halves that differ in bit `depth + 1`.
    ///
    /// Climbs the path to the deepest node whose hashmap contains the whole
    /// prefix boundary.
    pub fn split_range(&self, path: &BucketPath, depth: u8) -> Result<SlotRange> {
        for (i, level) in path.levels.iter().enumerate().rev() {
            let start_depth = level.global_depth - level.local_depth;
            if start_depth > depth {
                continue;
            }
            if depth >= level.global_depth {
                break;
            }
            let diff = depth - start_depth;
            let half = 1usize << (level.local_depth - diff - 1);
            let start = level.item_index & !((half << 1) - 1);
            return Ok(SlotRange {
                level: i,
                start,
                half,
            });
        }
        Err(IndexError::Corrupted(format!(
            "no directory level covers a {} bit prefix",
            depth
        )))
    }

    /// Point every slot of `range` of a hashmap at `pointer`, descending into
    /// child hashmaps found along the way. Children that were rewritten are
    /// appended to `touched`.
    pub fn fill(
        &mut self,
        node: u32,
        offset: usize,
        start: usize,
        end: usize,
        pointer: Pointer,
        touched: &mut Vec<Touched>,
    ) -> Result<()> {
        let mut pending = vec![(node, offset + start, offset + end)];
        while let Some((index, from, to)) = pending.pop() {
            let mut children = Vec::new();
            let slots = &mut self.nodes.get_mut(index)?.slots;
            for slot in &mut slots[from..to] {
                match *slot {
                    Pointer::Node {
                        index: child,
                        offset: child_offset,
                    } => children.push((child, child_offset as usize)),
                    _ => *slot = pointer,
                }
            }
            for (child, child_offset) in children {
                let size = self.nodes.get(child)?.hash_map_size();
                touched.push(Touched {
                    child,
                    parent: index,
                });
                pending.push((child, child_offset, child_offset + size));
            }
        }
        Ok(())
    }

    /// Repoint the slots of a split bucket: the lower half keeps `updated`, the
    /// upper half gets `new`. `new_depth` must not exceed the depth of the node
    /// that resolved the bucket.
    pub fn update_after_bucket_split(
        &mut self,
        path: &BucketPath,
        new_depth: u8,
        updated: Pointer,
        new: Pointer,
    ) -> Result<()> {
        let range = self.split_range(path, new_depth - 1)?;
        let level = path.levels[range.level];
        let mut touched = Vec::new();
        self.fill(
            level.node,
            level.hash_map_offset,
            range.start,
            range.start + range.half,
            updated,
            &mut touched,
        )?;
        self.fill(
            level.node,
            level.hash_map_offset,
            range.start + range.half,
            range.end(),
            new,
            &mut touched,
        )
    }

    /// Give the node that resolved a split bucket one more bit of depth.
    ///
    /// Every hashmap doubles, so the node's left half stays in place and the
    /// right half moves to a sibling. A half whose hashmaps all hold a single
    /// bucket is folded back into the parent instead of being kept as a node.
    pub fn split_node(
        &mut self,
        path: &BucketPath,
        updated: Pointer,
        new: Pointer,
    ) -> Result<()> {
        let level = *path.last();
        let parent = *path
            .parent()
            .ok_or_else(|| IndexError::Corrupted("root cannot be split".into()))?;
        let node = self.nodes.get(level.node)?;
        if level.local_depth >= MAX_LEVEL_DEPTH {
            return Err(IndexError::Corrupted(format!(
                "node {} is already at full depth",
                level.node
            )));
        }

        let half_size = MAX_LEVEL_SIZE / 2;
        let mut left = DirectoryNode::new(level.local_depth + 1);
        let mut right = DirectoryNode::new(level.local_depth + 1);
        for i in 0..half_size {
            left.slots[2 * i] = node.slots[i];
            left.slots[2 * i + 1] = node.slots[i];
            right.slots[2 * i] = node.slots[half_size + i];
            right.slots[2 * i + 1] = node.slots[half_size + i];
        }

        // the doubled slot of the split bucket takes the two halves
        let slot = level.slot();
        let in_right = slot >= half_size;
        let target = if in_right { &mut right } else { &mut left };
        let doubled = 2 * (slot % half_size);
        target.slots[doubled] = updated;
        target.slots[doubled + 1] = new;

        let hash_map_size = left.hash_map_size();
        let fold_left = hash_maps_uniform(&left.slots[..], hash_map_size);
        let fold_right = hash_maps_uniform(&right.slots[..], hash_map_size);

        let right_index = if fold_right {
            None
        } else {
            Some(self.nodes.allocate(right.clone()))
        };
        if fold_left {
            self.nodes.release(level.node)?;
        } else {
            *self.nodes.get_mut(level.node)? = left.clone();
        }

        let pointers = MAX_LEVEL_SIZE >> (level.local_depth + 1);
        let start = self.parent_start(parent.node, level.node, pointers * 2)?;
        let parent_node = self.nodes.get_mut(parent.node)?;
        for k in 0..pointers {
            parent_node.slots[start + k] = if fold_left {
                left.slots[k * hash_map_size]
            } else {
                child_pointer(level.node, k * hash_map_size)
            };
            parent_node.slots[start + pointers + k] = match right_index {
                None => right.slots[k * hash_map_size],
                Some(index) => child_pointer(index, k * hash_map_size),
            };
        }
        parent_node.raise_max_child_depth(start >= half_size, level.local_depth + 1);

        debug!(
            node = level.node,
            sibling = ?right_index,
            depth = level.local_depth + 1,
            fold_left,
            fold_right,
            "directory node split"
        );
        Ok(())
    }

    /// Hang a new node under the full depth node that resolved a split bucket.
    ///
    /// The new node is as deep as the deepest child already on that half of the
    /// parent, so it takes over a run of parent slots that holds no children.
    pub fn add_new_level(
        &mut self,
        path: &BucketPath,
        updated: Pointer,
        new: Pointer,
    ) -> Result<()> {
        let level = *path.last();
        let node = self.nodes.get(level.node)?;
        if level.local_depth != MAX_LEVEL_DEPTH || level.hash_map_offset != 0 {
            return Err(IndexError::Corrupted(format!(
                "new level under node {} of depth {}",
                level.node, level.local_depth
            )));
        }

        let half_size = MAX_LEVEL_SIZE / 2;
        let in_right = level.item_index >= half_size;
        let depth = match node.max_child_depth(in_right) {
            0 => 1,
            depth => depth,
        }
        .min(MAX_HASH_DEPTH - level.global_depth);

        let map_interval = 1usize << (MAX_LEVEL_DEPTH - depth);
        let start = (level.item_index / map_interval) * map_interval;
        let map_size = 1usize << depth;

        let mut child = DirectoryNode::new(depth);
        for i in 0..map_interval {
            let slot = start + i;
            let pointer = node.slots[slot];
            if pointer.is_node() {
                return Err(IndexError::Corrupted(format!(
                    "slot {} of node {} already holds a child",
                    slot, level.node
                )));
            }
            let map = &mut child.slots[i * map_size..(i + 1) * map_size];
            if slot == level.item_index {
                let (lower, upper) = map.split_at_mut(map_size / 2);
                lower.fill(updated);
                upper.fill(new);
            } else {
                map.fill(pointer);
            }
        }

        let child_index = self.nodes.allocate(child);
        let parent_node = self.nodes.get_mut(level.node)?;
        for i in 0..map_interval {
            parent_node.slots[start + i] = child_pointer(child_index, i * map_size);
        }
        parent_node.raise_max_child_depth(in_right, depth);

        debug!(
            parent = level.node,
            node = child_index,
            depth,
            slots = map_interval,
            "new directory level"
        );
        Ok(())
    }

    /// Follow child references from `slot` of `node` through the first slot of
    /// each child hashmap until a bucket pointer is reached.
    pub fn resolve_first(&self, node: u32, slot: usize) -> Result<Pointer> {
        let mut pointer = self.nodes.get(node)?.slots[slot];
        for _ in 0..MAX_HASH_DEPTH {
            match pointer {
                Pointer::Node { index, offset } => {
                    pointer = self.nodes.get(index)?.slots[offset as usize];
                }
                resolved => return Ok(resolved),
            }
        }
        Err(IndexError::Corrupted(format!(
            "child chain from node {} slot {} does not end",
            node, slot
        )))
    }

    /// Replace `child` with its bucket pointers in `parent` when each of its
    /// hashmaps holds a single bucket. Returns whether the node was removed.
    pub fn collapse(&mut self, child: u32, parent: u32) -> Result<bool> {
        if child == 0 || !self.nodes.is_live(child) {
            return Ok(false);
        }
        let node = self.nodes.get(child)?;
        let hash_map_size = node.hash_map_size();
        if !hash_maps_uniform(&node.slots[..], hash_map_size) {
            return Ok(false);
        }
        let local_depth = node.local_depth;
        let pointers: Vec<Pointer> = node
            .slots
            .iter()
            .step_by(hash_map_size)
            .copied()
            .collect();

        let start = self.parent_start(parent, child, pointers.len())?;
        let parent_node = self.nodes.get_mut(parent)?;
        parent_node.slots[start..start + pointers.len()].copy_from_slice(&pointers);
        self.nodes.release(child)?;

        let right = start >= MAX_LEVEL_SIZE / 2;
        if self.nodes.get(parent)?.max_child_depth(right) == local_depth {
            let max = self.max_child_depth(parent, right)?;
            let parent_node = self.nodes.get_mut(parent)?;
            if right {
                parent_node.max_right_child_depth = max;
            } else {
                parent_node.max_left_child_depth = max;
            }
        }

        debug!(node = child, parent, "directory node collapsed into parent");
        Ok(true)
    }

    /// First slot of `parent` that refers to `child`. The `count` slots from
    /// there on must all refer to it.
    fn parent_start(&self, parent: u32, child: u32, count: usize) -> Result<usize> {
        let slots = &self.nodes.get(parent)?.slots;
        let refers =
            |pointer: &Pointer| matches!(pointer, Pointer::Node { index, .. } if *index == child);
        let start = slots.iter().position(refers).ok_or_else(|| {
            IndexError::Corrupted(format!(
                "node {} is not referenced by its parent {}",
                child, parent
            ))
        })?;
        if start % count != 0
            || start + count > MAX_LEVEL_SIZE
            || !slots[start..start + count].iter().all(refers)
        {
            return Err(IndexError::Corrupted(format!(
                "node {} is referenced by a broken slot run of parent {}",
                child, parent
            )));
        }
        Ok(start)
    }

    fn max_child_depth(&self, node: u32, right: bool) -> Result<u8> {
        let half_size = MAX_LEVEL_SIZE / 2;
        let range = if right { half_size..MAX_LEVEL_SIZE } else { 0..half_size };
        let slots = &self.nodes.get(node)?.slots;
        let mut max = 0;
        for pointer in &slots[range] {
            if let Pointer::Node { index, .. } = pointer {
                max = max.max(self.nodes.get(*index)?.local_depth);
            }
        }
        Ok(max)
    }

    /// Every slot reachable from the root, with the hash prefix leading to it.
    pub fn walk(&self) -> Result<Vec<SlotVisit>> {
        let mut visits = Vec::new();
        // (node, hashmap offset, prefix so far, depth so far)
        let mut pending: Vec<(u32, usize, u64, u8)> = vec![(0, 0, 0, 0)];
        let mut parents: BTreeMap<u32, usize> = BTreeMap::new();
        while let Some((index, offset, base, base_depth)) = pending.pop() {
            let node = self.nodes.get(index)?;
            let depth = base_depth
                .checked_add(node.local_depth)
                .filter(|depth| *depth <= MAX_HASH_DEPTH)
                .ok_or_else(|| {
                    IndexError::Corrupted(format!("node {} reaches past 64 bits", index))
                })?;
            *parents.entry(index).or_default() += 1;
            for item in 0..node.hash_map_size() {
                let slot_prefix = (((base as u128) << node.local_depth) | item as u128) as u64;
                match node.slots[offset + item] {
                    Pointer::Node {
                        index: child,
                        offset: child_offset,
                    } => {
                        if node.local_depth != MAX_LEVEL_DEPTH {
                            return Err(IndexError::Corrupted(format!(
                                "node {} of depth {} holds a child",
                                index, node.local_depth
                            )));
                        }
                        pending.push((child, child_offset as usize, slot_prefix, depth));
                    }
                    pointer => visits.push(SlotVisit {
                        prefix: slot_prefix,
                        depth,
                        pointer,
                    }),
                }
            }
        }

        for (index, node) in self.nodes.live() {
            let expected = if index == 0 {
                1
            } else {
                MAX_LEVEL_SIZE >> node.local_depth
            };
            let seen = parents.get(&index).copied().unwrap_or(0);
            if seen != expected {
                return Err(IndexError::Corrupted(format!(
                    "node {} is reached through {} hashmaps, expected {}",
                    index, seen, expected
                )));
            }
        }
        Ok(visits)
    }

    pub fn max_global_depth(&self) -> Result<u8> {
        Ok(self
            .walk()?
            .iter()
            .map(|visit| visit.depth)
            .max()
            .unwrap_or(MAX_LEVEL_DEPTH))
    }

    pub fn write_bytes(&self, page_size: usize, out: &mut Vec<u8>) {
        self.nodes.write_bytes(page_size, out);
    }

    pub fn read_bytes(
        reader: &mut ByteReader<'_>,
        page_size: usize,
        free_head: Option<u32>,
    ) -> Result<Self> {
        Self::from_nodes(NodeAllocator::read_bytes(reader, page_size, free_head)?)
    }
}

fn child_pointer(index: u32, offset: usize) -> Pointer {
    Pointer::Node {
        index,
        offset: offset as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Directory {
        let ids: Vec<u64> = (0..MAX_LEVEL_SIZE as u64).collect();
        Directory::new(&ids).unwrap()
    }

    fn hash_with_top(bits: u64, depth: u8) -> u64 {
        bits << (64 - depth)
    }

    #[test]
    fn test_locate_in_fresh_root() {
        let directory = root();
        let path = directory.locate(hash_with_top(0xAB, 8)).unwrap();
        assert_eq!(path.levels.len(), 1);
        assert_eq!(path.last().item_index, 0xAB);
        assert_eq!(path.last().global_depth, 8);
        assert_eq!(directory.pointer(path.last()).unwrap(), Pointer::Bucket(0xAB));
    }

    #[test]
    fn test_locate_rejects_walk_past_hash_width() {
        // every root slot points back at the root
        let mut looped = DirectoryNode::new(MAX_LEVEL_DEPTH);
        looped.slots.fill(Pointer::Node { index: 0, offset: 0 });
        let mut nodes = NodeAllocator::new();
        nodes.allocate(looped);
        let directory = Directory::from_nodes(nodes).unwrap();

        for hash in [0, hash_with_top(0x42, 8), u64::MAX] {
            assert!(matches!(
                directory.locate(hash),
                Err(IndexError::Corrupted(_))
            ));
        }
    }

    #[test]
    fn test_split_range_in_root() {
        let directory = root();
        let path = directory.locate(hash_with_top(0b1011_0110, 8)).unwrap();
        // a 6 bit prefix covers 4 root slots
        let range = directory.split_range(&path, 6).unwrap();
        assert_eq!(range, SlotRange { level: 0, start: 0b1011_0100, half: 2 });
        // a 7 bit prefix covers 2
        let range = directory.split_range(&path, 7).unwrap();
        assert_eq!(range, SlotRange { level: 0, start: 0b1011_0110, half: 1 });
        assert!(directory.split_range(&path, 8).is_err());
    }

    #[test]
    fn test_new_level_then_locate() {
        let mut directory = root();
        let hash = hash_with_top(0x10, 8);
        let path = directory.locate(hash).unwrap();
        directory
            .add_new_level(&path, Pointer::Bucket(0x10), Pointer::Bucket(500))
            .unwrap();

        let root_node = directory.nodes().get(0).unwrap();
        assert_eq!(root_node.max_left_child_depth, 1);
        // depth 1 child covers 128 root slots
        assert!(root_node.slots[..128].iter().all(Pointer::is_node));
        assert!(!root_node.slots[128].is_node());

        let low = directory.locate(hash).unwrap();
        assert_eq!(low.levels.len(), 2);
        assert_eq!(low.last().global_depth, 9);
        assert_eq!(directory.pointer(low.last()).unwrap(), Pointer::Bucket(0x10));

        let high = directory.locate(hash | (1 << 55)).unwrap();
        assert_eq!(directory.pointer(high.last()).unwrap(), Pointer::Bucket(500));

        let other = directory.locate(hash_with_top(0x11, 8) | (1 << 55)).unwrap();
        assert_eq!(directory.pointer(other.last()).unwrap(), Pointer::Bucket(0x11));
    }

    #[test]
    fn test_node_split_keeps_routing() {
        let mut directory = root();
        let hash = hash_with_top(0x10, 8);
        let path = directory.locate(hash).unwrap();
        directory
            .add_new_level(&path, Pointer::Bucket(0x10), Pointer::Bucket(500))
            .unwrap();

        // bucket 0x10 is now at depth 9 under a depth 1 node; split it again
        let path = directory.locate(hash).unwrap();
        directory
            .split_node(&path, Pointer::Bucket(0x10), Pointer::Bucket(501))
            .unwrap();

        let path = directory.locate(hash).unwrap();
        assert_eq!(path.last().global_depth, 10);
        assert_eq!(directory.pointer(path.last()).unwrap(), Pointer::Bucket(0x10));
        let path = directory.locate(hash | (1 << 54)).unwrap();
        assert_eq!(directory.pointer(path.last()).unwrap(), Pointer::Bucket(501));
        let path = directory.locate(hash | (1 << 55)).unwrap();
        assert_eq!(directory.pointer(path.last()).unwrap(), Pointer::Bucket(500));

        // the right half of the split node only held plain buckets and was folded
        let root_node = directory.nodes().get(0).unwrap();
        assert!(root_node.slots[64..128].iter().all(|p| !p.is_node()));
        assert_eq!(root_node.slots[64], Pointer::Bucket(64));
        assert_eq!(directory.nodes().live_count(), 2);
        assert_eq!(root_node.max_left_child_depth, 2);
        directory.walk().unwrap();
    }

    #[test]
    fn test_fill_descends_and_collapse_restores_root() {
        let mut directory = root();
        let hash = hash_with_top(0x80, 8);
        let path = directory.locate(hash).unwrap();
        directory
            .add_new_level(&path, Pointer::Bucket(0x80), Pointer::Bucket(600))
            .unwrap();
        let child = match directory.nodes().get(0).unwrap().slots[0x80] {
            Pointer::Node { index, .. } => index,
            other => panic!("expected a child, got {}", other),
        };
        assert_eq!(directory.nodes().get(0).unwrap().max_right_child_depth, 1);

        // merge the two halves of slot 0x80 back together
        let mut touched = Vec::new();
        directory
            .fill(0, 0, 0x80, 0x81, Pointer::Bucket(0x80), &mut touched)
            .unwrap();
        assert_eq!(touched, vec![Touched { child, parent: 0 }]);

        assert!(directory.collapse(child, 0).unwrap());
        let root_node = directory.nodes().get(0).unwrap();
        assert_eq!(root_node.slots[0x80], Pointer::Bucket(0x80));
        assert_eq!(root_node.slots[0x81], Pointer::Bucket(0x81));
        assert_eq!(root_node.max_right_child_depth, 0);
        assert_eq!(directory.nodes().live_count(), 1);
        assert!(!directory.collapse(0, 0).unwrap());
    }

    #[test]
    fn test_walk_covers_hash_space() {
        let mut directory = root();
        let path = directory.locate(hash_with_top(3, 8)).unwrap();
        directory
            .add_new_level(&path, Pointer::Bucket(3), Pointer::Bucket(900))
            .unwrap();
        let visits = directory.walk().unwrap();
        let covered: u128 = visits
            .iter()
            .map(|visit| 1u128 << (64 - visit.depth as u32))
            .sum();
        assert_eq!(covered, 1u128 << 64);
        assert_eq!(directory.max_global_depth().unwrap(), 9);
    }

    #[test]
    fn test_resolve_first_follows_children() {
        let mut directory = root();
        let path = directory.locate(hash_with_top(7, 8)).unwrap();
        directory
            .add_new_level(&path, Pointer::Bucket(1000), Pointer::Bucket(1001))
            .unwrap();
        assert_eq!(directory.resolve_first(0, 7).unwrap(), Pointer::Bucket(1000));
        assert_eq!(directory.resolve_first(0, 6).unwrap(), Pointer::Bucket(6));
    }

    #[test]
    fn test_tree_state_bytes() {
        let mut directory = root();
        let path = directory.locate(hash_with_top(7, 8)).unwrap();
        directory
            .add_new_level(&path, Pointer::Bucket(7), Pointer::Bucket(256))
            .unwrap();
        let mut bytes = Vec::new();
        directory.write_bytes(4096, &mut bytes);
        let restored =
            Directory::read_bytes(&mut ByteReader::new(&bytes, "tree state"), 4096, None).unwrap();
        assert_eq!(restored.nodes(), directory.nodes());
    }
}
