//! The B-Tree algorithms expressed as computations over [`crate::io::Step`]:
//! search, insert with split propagation, the `append` fast path, the
//! locality-bounded `find_gt`, in-order `iter`, `last`, and `debug`.
//!
//! A [`BTree<K, V>`] handle is nothing but `(root_offset, m)` -- the pair the
//! caller is responsible for persisting -- so it is `Copy` and freely
//! captured by the one-shot continuations each operation suspends into.

use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::codec::{FixedSize, Key, Value};
use crate::error::{Error, Result};
use crate::io::{Block, Step, WriteOp};
use crate::layout;
use crate::node::Node;

fn node_len<K: FixedSize, V: FixedSize>(m: usize) -> usize {
    layout::node_len(m, K::WIDTH, V::WIDTH)
}

/// A tree handle: the root offset and order, both caller-persisted state.
/// `m` never changes after creation; `root_offset` changes whenever a
/// mutating operation reports a new one.
#[derive(Debug)]
pub struct BTree<K, V> {
    pub root_offset: i64,
    pub m: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for BTree<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<K, V> Copy for BTree<K, V> {}

/// Result of a mutating operation (`insert`/`append`): the new root, if the
/// mutation caused one, plus every node block (re)written, in the order the
/// caller must apply them.
#[derive(Debug)]
pub struct MutationResult {
    pub new_root_offset: Option<i64>,
    pub write_ops: Vec<WriteOp>,
}

/// The split-carry threaded up the insert/append recursion: either the
/// child below finished without splitting, or it split and handed back a
/// median to reinsert here.
enum Carry<K, V> {
    Done,
    Split {
        median_key: K,
        median_val: V,
        right_offset: i64,
    },
}

impl<K: Key + 'static, V: Value + 'static> BTree<K, V> {
    /// Create a new tree of order `m`: allocates one empty root leaf and
    /// reports its offset. `m` must be at least 3.
    pub fn create(m: usize) -> Result<Step<(BTree<K, V>, Vec<WriteOp>)>> {
        if m < 3 {
            return Err(Error::InvalidOrder { m });
        }
        let len = node_len::<K, V>(m);
        Ok(Step::allocate(len, move |offset| {
            let block = Node::<K, V>::empty_leaf().encode(m);
            let tree = BTree::new(offset, m);
            Step::done((tree, vec![WriteOp { offset, data: block }]))
        }))
    }

    /// Wrap an already-persisted `(root_offset, m)` pair into a handle.
    pub fn new(root_offset: i64, m: usize) -> Self {
        BTree {
            root_offset,
            m,
            _marker: PhantomData,
        }
    }

    /// Locate `key`; returns its value, or `None` if absent anywhere in the
    /// tree.
    pub fn find(&self, key: &K) -> Step<Option<V>> {
        let this = *self;
        this.find_at(this.root_offset, key.clone())
    }

    fn find_at(self, offset: i64, key: K) -> Step<Option<V>> {
        let m = self.m;
        Step::read_block(
            Block {
                offset,
                length: node_len::<K, V>(m),
            },
            move |bytes| {
                let node: Node<K, V> = Node::decode(&bytes, m);
                let idx = node.keys.partition_point(|k| k.compare(&key) == Ordering::Less);
                if idx < node.keys.len() && node.keys[idx].compare(&key) == Ordering::Equal {
                    Step::done(Some(node.vals[idx].clone()))
                } else if node.is_leaf() {
                    Step::done(None)
                } else {
                    let child = node.children[idx];
                    self.find_at(child, key)
                }
            },
        )
    }

    /// Insert or overwrite `(key, value)`.
    pub fn insert(&self, key: K, value: V) -> Step<MutationResult> {
        let this = *self;
        log::trace!("insert: key={key:?}");
        let root_offset = this.root_offset;
        this.finish_mutation(this.insert_at(root_offset, key, value))
    }

    /// Insert `key` under the precondition that it is strictly greater than
    /// every key currently in the tree. Violating the precondition is a
    /// caller bug.
    pub fn append(&self, key: K, value: V) -> Step<MutationResult> {
        let this = *self;
        log::trace!("append: key={key:?}");
        let root_offset = this.root_offset;
        this.finish_mutation(this.append_at(root_offset, key, value))
    }

    fn finish_mutation(self, carry_step: Step<(Carry<K, V>, Vec<WriteOp>)>) -> Step<MutationResult> {
        carry_step.and_then(move |(carry, write_ops)| match carry {
            Carry::Done => Step::done(MutationResult {
                new_root_offset: None,
                write_ops,
            }),
            Carry::Split {
                median_key,
                median_val,
                right_offset,
            } => {
                let m = self.m;
                let old_root = self.root_offset;
                let len = node_len::<K, V>(m);
                Step::allocate(len, move |new_root_offset| {
                    log::debug!("root split: old_root={old_root} new_root={new_root_offset}");
                    let root_node = Node::<K, V> {
                        keys: vec![median_key],
                        vals: vec![median_val],
                        children: vec![old_root, right_offset],
                    };
                    let block = root_node.encode(m);
                    let mut write_ops = write_ops;
                    write_ops.push(WriteOp {
                        offset: new_root_offset,
                        data: block,
                    });
                    Step::done(MutationResult {
                        new_root_offset: Some(new_root_offset),
                        write_ops,
                    })
                })
            }
        })
    }

    fn insert_at(self, offset: i64, key: K, val: V) -> Step<(Carry<K, V>, Vec<WriteOp>)> {
        let m = self.m;
        Step::read_block(
            Block {
                offset,
                length: node_len::<K, V>(m),
            },
            move |bytes| {
                let mut node: Node<K, V> = Node::decode(&bytes, m);
                let idx = node.keys.partition_point(|k| k.compare(&key) == Ordering::Less);
                if idx < node.keys.len() && node.keys[idx].compare(&key) == Ordering::Equal {
                    // Overwrite in place: never splits.
                    node.overwrite_at(idx, val);
                    let block = node.encode(m);
                    return Step::done((Carry::Done, vec![WriteOp { offset, data: block }]));
                }
                if node.is_leaf() {
                    node.insert_at(idx, key, val, None);
                    self.finish_insert(offset, node)
                } else {
                    let child_offset = node.children[idx];
                    self.insert_at(child_offset, key, val).and_then(move |(carry, write_ops)| {
                        self.reinsert_carry(offset, node, idx, carry, write_ops)
                    })
                }
            },
        )
    }

    fn append_at(self, offset: i64, key: K, val: V) -> Step<(Carry<K, V>, Vec<WriteOp>)> {
        let m = self.m;
        Step::read_block(
            Block {
                offset,
                length: node_len::<K, V>(m),
            },
            move |bytes| {
                let mut node: Node<K, V> = Node::decode(&bytes, m);
                if node.is_leaf() {
                    let idx = node.len();
                    node.insert_at(idx, key, val, None);
                    self.finish_insert(offset, node)
                } else {
                    let idx = node.children.len() - 1;
                    let child_offset = node.children[idx];
                    let reinsert_idx = node.keys.len();
                    self.append_at(child_offset, key, val).and_then(move |(carry, write_ops)| {
                        self.reinsert_carry(offset, node, reinsert_idx, carry, write_ops)
                    })
                }
            },
        )
    }

    /// Common tail of `insert_at`/`append_at`'s internal-node branch: the
    /// child below either finished, or split and handed back a median to
    /// reinsert into `node` at `idx`.
    fn reinsert_carry(
        self,
        offset: i64,
        mut node: Node<K, V>,
        idx: usize,
        carry: Carry<K, V>,
        write_ops: Vec<WriteOp>,
    ) -> Step<(Carry<K, V>, Vec<WriteOp>)> {
        match carry {
            Carry::Done => Step::done((Carry::Done, write_ops)),
            Carry::Split {
                median_key,
                median_val,
                right_offset,
            } => {
                log::debug!("node at offset {offset} absorbing promoted key {median_key:?}");
                node.insert_at(idx, median_key, median_val, Some(right_offset));
                self.finish_insert(offset, node).and_then(move |(carry2, more_ops)| {
                    let mut write_ops = write_ops;
                    write_ops.extend(more_ops);
                    Step::done((carry2, write_ops))
                })
            }
        }
    }

    /// Encode `node` (now possibly overfull, holding the `m`-key virtual
    /// buffer produced by one too many inserts) back to its block at
    /// `offset`, splitting if necessary.
    fn finish_insert(self, offset: i64, mut node: Node<K, V>) -> Step<(Carry<K, V>, Vec<WriteOp>)> {
        let m = self.m;
        if node.len() < m {
            let block = node.encode(m);
            Step::done((Carry::Done, vec![WriteOp { offset, data: block }]))
        } else {
            log::debug!("node at offset {offset} overflowed, splitting");
            let (median_key, median_val, right) = node.split(m);
            let left_block = node.encode(m);
            let left_write = WriteOp { offset, data: left_block };
            let len = node_len::<K, V>(m);
            Step::allocate(len, move |right_offset| {
                let right_block = right.encode(m);
                let right_write = WriteOp {
                    offset: right_offset,
                    data: right_block,
                };
                Step::done((
                    Carry::Split {
                        median_key,
                        median_val,
                        right_offset,
                    },
                    vec![left_write, right_write],
                ))
            })
        }
    }

    /// Up to `max` values whose keys are strictly greater than `key`, in
    /// ascending order. Locality-bounded: descends to the first node holding
    /// a key `> key`, then walks that node's own keys in order, flattening
    /// in (without further recursion) each immediate right child's own keys
    /// along the way -- see DESIGN.md for why this shape and not a full
    /// range scan.
    pub fn find_gt(&self, key: &K, max: usize) -> Step<Vec<V>> {
        let this = *self;
        this.find_gt_locate(this.root_offset, key.clone(), max)
    }

    fn find_gt_locate(self, offset: i64, key: K, max: usize) -> Step<Vec<V>> {
        if max == 0 {
            return Step::done(Vec::new());
        }
        let m = self.m;
        Step::read_block(
            Block {
                offset,
                length: node_len::<K, V>(m),
            },
            move |bytes| {
                let node: Node<K, V> = Node::decode(&bytes, m);
                let idx = node.keys.partition_point(|k| k.compare(&key) != Ordering::Greater);
                if idx < node.keys.len() {
                    self.find_gt_collect(node, idx, Vec::new(), max)
                } else if node.is_leaf() {
                    Step::done(Vec::new())
                } else {
                    let child_offset = node.children[idx];
                    self.find_gt_locate(child_offset, key, max)
                }
            },
        )
    }

    fn find_gt_collect(self, node: Node<K, V>, i: usize, mut results: Vec<V>, max: usize) -> Step<Vec<V>> {
        if i >= node.keys.len() || results.len() >= max {
            return Step::done(results);
        }
        results.push(node.vals[i].clone());
        if results.len() >= max || node.is_leaf() {
            return self.find_gt_collect(node, i + 1, results, max);
        }
        let m = self.m;
        let child_offset = node.children[i + 1];
        Step::read_block(
            Block {
                offset: child_offset,
                length: node_len::<K, V>(m),
            },
            move |bytes| {
                let child: Node<K, V> = Node::decode(&bytes, m);
                for v in child.vals.iter() {
                    if results.len() >= max {
                        break;
                    }
                    results.push(v.clone());
                }
                self.find_gt_collect(node, i + 1, results, max)
            },
        )
    }

    /// In-order traversal, applying `f` to every value. No ordering
    /// guarantee on `f`'s side effects beyond the key sequence.
    pub fn iter<F>(&self, f: F) -> Step<()>
    where
        F: FnMut(&K, &V) + 'static,
    {
        let this = *self;
        this.iter_at(this.root_offset, f).and_then(|_f| Step::done(()))
    }

    fn iter_at<F>(self, offset: i64, f: F) -> Step<F>
    where
        F: FnMut(&K, &V) + 'static,
    {
        let m = self.m;
        Step::read_block(
            Block {
                offset,
                length: node_len::<K, V>(m),
            },
            move |bytes| {
                let node: Node<K, V> = Node::decode(&bytes, m);
                self.iter_node(node, 0, f)
            },
        )
    }

    fn iter_node<F>(self, node: Node<K, V>, i: usize, mut f: F) -> Step<F>
    where
        F: FnMut(&K, &V) + 'static,
    {
        if node.is_leaf() {
            for j in i..node.keys.len() {
                f(&node.keys[j], &node.vals[j]);
            }
            return Step::done(f);
        }
        if i >= node.keys.len() {
            let child = *node.children.last().unwrap();
            return self.iter_at(child, f);
        }
        let child = node.children[i];
        self.iter_at(child, f).and_then(move |mut f2| {
            f2(&node.keys[i], &node.vals[i]);
            self.iter_node(node, i + 1, f2)
        })
    }

    /// The maximum key and its value, or `None` if the tree is empty:
    /// follows the rightmost subtree pointer from the root.
    pub fn last(&self) -> Step<Option<(K, V)>> {
        let this = *self;
        this.last_at(this.root_offset)
    }

    fn last_at(self, offset: i64) -> Step<Option<(K, V)>> {
        let m = self.m;
        Step::read_block(
            Block {
                offset,
                length: node_len::<K, V>(m),
            },
            move |bytes| {
                let node: Node<K, V> = Node::decode(&bytes, m);
                if node.keys.is_empty() {
                    return Step::done(None);
                }
                if node.is_leaf() {
                    let last = node.keys.len() - 1;
                    Step::done(Some((node.keys[last].clone(), node.vals[last].clone())))
                } else {
                    let child = *node.children.last().unwrap();
                    self.last_at(child)
                }
            },
        )
    }

    /// Pretty-print the tree to stdout: a semantic-level smoke test, not a
    /// persistence mechanism.
    pub fn debug(&self) -> Step<()> {
        let this = *self;
        this.debug_at(this.root_offset, 0)
    }

    fn debug_at(self, offset: i64, depth: usize) -> Step<()> {
        let m = self.m;
        Step::read_block(
            Block {
                offset,
                length: node_len::<K, V>(m),
            },
            move |bytes| {
                let node: Node<K, V> = Node::decode(&bytes, m);
                let indent = "  ".repeat(depth);
                println!(
                    "{indent}node@{offset} keys={:?} leaf={}",
                    node.keys,
                    node.is_leaf()
                );
                if node.is_leaf() {
                    Step::done(())
                } else {
                    self.debug_children(node, 0, depth)
                }
            },
        )
    }

    fn debug_children(self, node: Node<K, V>, i: usize, depth: usize) -> Step<()> {
        if i >= node.children.len() {
            return Step::done(());
        }
        let child = node.children[i];
        self.debug_at(child, depth + 1)
            .and_then(move |_| self.debug_children(node, i + 1, depth))
    }
}
