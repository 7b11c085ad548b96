//! Shared test harness: a trivial in-memory [`Storage`] plus the
//! `"000NNNNN"` / `"NNNNN000"` fixed-width key/value encoding the concrete
//! scenario tests are stated in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use btree_core::node::Node;
use btree_core::{io, layout, BTree, FixedSize, MutationResult, Storage, WriteOp};

pub struct MemStorage {
    blocks: HashMap<i64, Vec<u8>>,
    next_offset: i64,
}

impl MemStorage {
    pub fn new() -> Self {
        MemStorage {
            blocks: HashMap::new(),
            next_offset: 0,
        }
    }
}

impl Storage for MemStorage {
    fn read(&mut self, offset: i64, length: usize) -> Vec<u8> {
        self.blocks
            .get(&offset)
            .cloned()
            .unwrap_or_else(|| vec![0u8; length])
    }

    fn allocate(&mut self, length: usize) -> i64 {
        let at = self.next_offset;
        self.next_offset += length as i64;
        at
    }

    fn apply(&mut self, writes: &[WriteOp]) {
        for w in writes {
            self.blocks.insert(w.offset, w.data.clone());
        }
    }
}

impl MemStorage {
    /// Every block, sorted by offset -- used to compare two storages for
    /// byte-for-byte equality (`append` vs `insert`).
    pub fn dump(&self) -> Vec<(i64, Vec<u8>)> {
        let mut blocks: Vec<_> = self.blocks.iter().map(|(&o, b)| (o, b.clone())).collect();
        blocks.sort_by_key(|(o, _)| *o);
        blocks
    }
}

pub type K8 = [u8; 8];

/// `"000NNNNN"`, the fixed-width key notation used throughout this suite.
pub fn key_bytes(n: u32) -> K8 {
    let s = format!("000{:05}", n);
    let mut out = [0u8; 8];
    out.copy_from_slice(s.as_bytes());
    out
}

/// `"NNNNN000"`, the fixed-width value notation used throughout this suite.
pub fn val_bytes(n: u32) -> K8 {
    let s = format!("{:05}000", n);
    let mut out = [0u8; 8];
    out.copy_from_slice(s.as_bytes());
    out
}

/// Create a fresh tree of order `m`, applying the allocation's write batch.
pub fn new_tree(storage: &mut MemStorage, m: usize) -> BTree<K8, K8> {
    let (tree, writes) = io::run(BTree::create(m).unwrap(), storage);
    storage.apply(&writes);
    tree
}

/// Apply a mutating operation's result, returning the (possibly new) root.
pub fn apply_mutation(storage: &mut MemStorage, tree: BTree<K8, K8>, result: MutationResult) -> BTree<K8, K8> {
    storage.apply(&result.write_ops);
    match result.new_root_offset {
        Some(offset) => BTree::new(offset, tree.m),
        None => tree,
    }
}

pub fn insert(storage: &mut MemStorage, tree: BTree<K8, K8>, n: u32) -> BTree<K8, K8> {
    let result = io::run(tree.insert(key_bytes(n), val_bytes(n)), storage);
    apply_mutation(storage, tree, result)
}

pub fn append(storage: &mut MemStorage, tree: BTree<K8, K8>, n: u32) -> BTree<K8, K8> {
    let result = io::run(tree.append(key_bytes(n), val_bytes(n)), storage);
    apply_mutation(storage, tree, result)
}

pub fn find(storage: &mut MemStorage, tree: BTree<K8, K8>, n: u32) -> Option<K8> {
    io::run(tree.find(&key_bytes(n)), storage)
}

/// Decode the raw node block at `offset`, bypassing the `Step` protocol --
/// used only by tests that assert on tree *shape*, not the public API.
pub fn read_node(storage: &mut MemStorage, m: usize, offset: i64) -> Node<K8, K8> {
    let len = layout::node_len(m, K8::WIDTH, K8::WIDTH);
    let bytes = storage.read(offset, len);
    Node::decode(&bytes, m)
}

/// In-order key sequence, via the public `iter` API.
pub fn collect_keys(storage: &mut MemStorage, tree: BTree<K8, K8>) -> Vec<K8> {
    let collected = Rc::new(RefCell::new(Vec::new()));
    let sink = collected.clone();
    io::run(tree.iter(move |k, _v| sink.borrow_mut().push(*k)), storage);
    Rc::try_unwrap(collected).unwrap().into_inner()
}

/// Leaf depths reachable from `offset`, all of which must be equal after
/// any successful mutating operation.
pub fn leaf_depths(storage: &mut MemStorage, m: usize, offset: i64, depth: usize, out: &mut Vec<usize>) {
    let node = read_node(storage, m, offset);
    if node.is_leaf() {
        out.push(depth);
        return;
    }
    let children = node.children.clone();
    for child in children {
        leaf_depths(storage, m, child, depth + 1, out);
    }
}

/// Checks node occupancy (between `ceil(m/2)-1` and `m-1` keys) for every
/// non-root node reachable from `offset`.
pub fn check_occupancy(storage: &mut MemStorage, m: usize, offset: i64, is_root: bool) -> bool {
    let node = read_node(storage, m, offset);
    let min_keys = (m + 1) / 2 - 1;
    let n = node.keys.len();
    if !is_root && (n < min_keys || n > m - 1) {
        return false;
    }
    if is_root && n > m - 1 {
        return false;
    }
    if node.is_leaf() {
        return true;
    }
    node.children
        .clone()
        .into_iter()
        .all(|child| check_occupancy(storage, m, child, false))
}
