//! Incremental quinary Merkle tree.
//!
//! A fixed-depth, arity-5 tree over field elements with append (`insert`),
//! update-in-place, per-leaf inclusion paths and subroot paths (the
//! inclusion path of a whole aligned subtree, used to prove that a batch of
//! consecutive leaves belongs to the tree).
//!
//! Empty positions take deterministic zero-subtree hashes: level 0 holds the
//! configured zero leaf and `zeros[l + 1] = hash5([zeros[l]; 5])`, so the
//! root of a partially filled tree is always defined.

use ark_ff::Zero;

use crate::hashing::hash5;
use crate::Field;

/// Branching factor shared by every tree in the protocol (state, ballot,
/// message and vote-option trees alike).
pub const TREE_ARITY: usize = 5;

/// Per-level sibling sets and position digits proving one leaf (or one
/// subroot) against the root.
///
/// `elements[l]` holds the `TREE_ARITY - 1` siblings at level `l` in slot
/// order with the proven node removed; `indices[l]` is the node's position
/// among its siblings (its base-5 digit at that level).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePath {
    pub elements: Vec<[Field; TREE_ARITY - 1]>,
    pub indices: Vec<usize>,
}

impl MerklePath {
    /// Recompute the root this path leads to from the proven node.
    pub fn compute_root(&self, node: Field) -> Field {
        let mut current = node;
        for (siblings, &position) in self.elements.iter().zip(&self.indices) {
            let mut children = [Field::zero(); TREE_ARITY];
            for (slot, child) in children.iter_mut().enumerate() {
                *child = match slot.cmp(&position) {
                    std::cmp::Ordering::Less => siblings[slot],
                    std::cmp::Ordering::Equal => current,
                    std::cmp::Ordering::Greater => siblings[slot - 1],
                };
            }
            current = hash5(children);
        }
        current
    }

    /// Check the path against an expected root.
    pub fn verify(&self, node: Field, root: Field) -> bool {
        self.indices.iter().all(|&p| p < TREE_ARITY) && self.compute_root(node) == root
    }
}

/// Inclusion path of the subtree covering `[start, start + 5^sub_depth)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleSubrootPath {
    /// Height of the proven subtree.
    pub sub_depth: usize,
    /// Root of the proven subtree, as stored in the tree.
    pub subroot: Field,
    /// Path from the subroot node to the tree root.
    pub path: MerklePath,
}

impl MerkleSubrootPath {
    /// Check the subroot path against an expected root.
    pub fn verify(&self, root: Field) -> bool {
        self.path.verify(self.subroot, root)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalQuinTree {
    depth: usize,
    zero_value: Field,
    /// `zeros[l]` is the hash of an empty subtree of height `l`.
    zeros: Vec<Field>,
    /// `levels[0]` are the leaves; `levels[depth]` holds at most the root.
    /// Only the occupied prefix of each level is stored.
    levels: Vec<Vec<Field>>,
    next_index: usize,
}

impl IncrementalQuinTree {
    /// Create an empty tree of the given depth and zero leaf.
    ///
    /// # Panics
    /// Panics on a zero depth: a tree with no levels has no root to maintain.
    pub fn new(depth: usize, zero_value: Field) -> Self {
        assert!(depth > 0, "tree depth must be at least 1");
        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(zero_value);
        for level in 0..depth {
            let zero = zeros[level];
            zeros.push(hash5([zero; TREE_ARITY]));
        }
        Self {
            depth,
            zero_value,
            zeros,
            levels: vec![Vec::new(); depth + 1],
            next_index: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The configured zero leaf.
    pub fn zero_value(&self) -> Field {
        self.zero_value
    }

    /// Index the next `insert` will write to, which equals the number of
    /// inserted leaves.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Maximum number of leaves the tree can hold.
    pub fn capacity(&self) -> usize {
        TREE_ARITY.pow(self.depth as u32)
    }

    pub fn root(&self) -> Field {
        self.node(self.depth, 0)
    }

    /// The leaf stored at `index` (the zero leaf for untouched slots).
    pub fn leaf(&self, index: usize) -> Field {
        self.node(0, index)
    }

    fn node(&self, level: usize, index: usize) -> Field {
        self.levels[level].get(index).copied().unwrap_or(self.zeros[level])
    }

    /// Append a leaf at `next_index`.
    ///
    /// # Panics
    /// Panics when the tree is full.
    pub fn insert(&mut self, leaf: Field) {
        assert!(
            self.next_index < self.capacity(),
            "tree of depth {} is full ({} leaves)",
            self.depth,
            self.next_index
        );
        let index = self.next_index;
        self.next_index += 1;
        self.set_leaf(index, leaf);
    }

    /// Overwrite the leaf at `index` and rehash its path to the root.
    ///
    /// # Panics
    /// Panics when `index` has not been inserted yet.
    pub fn update(&mut self, index: usize, leaf: Field) {
        assert!(
            index < self.next_index,
            "update index {} is past the last inserted leaf ({})",
            index,
            self.next_index
        );
        self.set_leaf(index, leaf);
    }

    fn set_leaf(&mut self, index: usize, leaf: Field) {
        self.store(0, index, leaf);
        let mut idx = index;
        for level in 0..self.depth {
            let parent = idx / TREE_ARITY;
            let first_child = parent * TREE_ARITY;
            let mut children = [self.zeros[level]; TREE_ARITY];
            for (slot, child) in children.iter_mut().enumerate() {
                *child = self.node(level, first_child + slot);
            }
            self.store(level + 1, parent, hash5(children));
            idx = parent;
        }
    }

    fn store(&mut self, level: usize, index: usize, value: Field) {
        let nodes = &mut self.levels[level];
        if nodes.len() <= index {
            nodes.resize(index + 1, self.zeros[level]);
        }
        nodes[index] = value;
    }

    /// Inclusion path of the leaf at `index`.
    ///
    /// # Panics
    /// Panics when `index` has not been inserted yet.
    pub fn gen_merkle_path(&self, index: usize) -> MerklePath {
        assert!(
            index < self.next_index,
            "path index {} out of {} leaves",
            index,
            self.next_index
        );
        self.path_from(0, index)
    }

    /// Inclusion path of the aligned subtree covering `[start, end)`.
    ///
    /// # Panics
    /// Panics unless `end - start` is a power of `TREE_ARITY`, `start` is a
    /// multiple of that width, and the range lies within the tree.
    pub fn gen_merkle_subroot_path(&self, start: usize, end: usize) -> MerkleSubrootPath {
        assert!(start < end, "empty subroot range [{start}, {end})");
        let width = end - start;
        let mut sub_depth = 0;
        let mut covered = 1;
        while covered < width {
            covered *= TREE_ARITY;
            sub_depth += 1;
        }
        assert!(
            covered == width && start % width == 0,
            "subroot range [{start}, {end}) is not an aligned arity-power block"
        );
        assert!(end <= self.capacity(), "subroot range [{start}, {end}) exceeds the tree");
        let subroot_index = start / width;
        MerkleSubrootPath {
            sub_depth,
            subroot: self.node(sub_depth, subroot_index),
            path: self.path_from(sub_depth, subroot_index),
        }
    }

    fn path_from(&self, start_level: usize, start_index: usize) -> MerklePath {
        let mut elements = Vec::with_capacity(self.depth - start_level);
        let mut indices = Vec::with_capacity(self.depth - start_level);
        let mut idx = start_index;
        for level in start_level..self.depth {
            let position = idx % TREE_ARITY;
            let first_child = (idx / TREE_ARITY) * TREE_ARITY;
            let mut siblings = [self.zeros[level]; TREE_ARITY - 1];
            let mut slot = 0;
            for child in 0..TREE_ARITY {
                if child == position {
                    continue;
                }
                siblings[slot] = self.node(level, first_child + child);
                slot += 1;
            }
            elements.push(siblings);
            indices.push(position);
            idx /= TREE_ARITY;
        }
        MerklePath { elements, indices }
    }
}
