//! Byte layout of one B-Tree node block.
//!
//! ```text
//! offset 0                    : u32 LE   nb_of_vals
//! offset 4                    : key[0] .. key[m-2]      (Kw bytes each)
//! offset 4 + (m-1)*Kw         : val[0] .. val[m-2]      (Vw bytes each)
//! offset 4 + (m-1)*(Kw+Vw)    : subtree[0] .. subtree[m-1]  (i64 LE each)
//! total length Nw(m)          = 4 + (m-1)*(Kw+Vw) + m*8
//! ```
//!
//! Everything here is a pure computation over a byte window already in
//! memory; no I/O happens in this module. Bounds checks are
//! `debug_assert!`s: an out-of-range index is a caller bug, not a
//! recoverable error.

use crate::codec::FixedSize;

/// Offset "no child" sentinel: a leaf's subtree slots are all this value.
pub const LEAF_SENTINEL: i64 = -1;

const HEADER_LEN: usize = 4;
const SUBTREE_WIDTH: usize = 8;

/// Total on-disk length of a node of order `m`, given key/value widths.
pub fn node_len(m: usize, kw: usize, vw: usize) -> usize {
    HEADER_LEN + (m - 1) * (kw + vw) + m * SUBTREE_WIDTH
}

fn key_offset(i: usize, kw: usize) -> usize {
    HEADER_LEN + i * kw
}

fn val_offset(i: usize, m: usize, kw: usize, vw: usize) -> usize {
    HEADER_LEN + (m - 1) * kw + i * vw
}

fn subtree_offset(i: usize, m: usize, kw: usize, vw: usize) -> usize {
    HEADER_LEN + (m - 1) * (kw + vw) + i * SUBTREE_WIDTH
}

/// Read `nb_of_vals` from a node block.
pub fn nb_of_vals(block: &[u8]) -> u32 {
    u32::decode(&block[0..4])
}

/// Write `nb_of_vals` into a node block.
pub fn set_nb_of_vals(block: &mut [u8], n: u32) {
    n.encode(&mut block[0..4]);
}

/// Read the `i`-th key slot (`i < m-1`).
pub fn key<K: FixedSize>(block: &[u8], i: usize, m: usize) -> K {
    debug_assert!(i < m - 1, "key index {i} out of range for order {m}");
    let off = key_offset(i, K::WIDTH);
    K::decode(&block[off..off + K::WIDTH])
}

/// Write the `i`-th key slot (`i < m-1`).
pub fn set_key<K: FixedSize>(block: &mut [u8], i: usize, m: usize, k: &K) {
    debug_assert!(i < m - 1, "key index {i} out of range for order {m}");
    let off = key_offset(i, K::WIDTH);
    k.encode(&mut block[off..off + K::WIDTH]);
}

/// Read the `i`-th value slot (`i < m-1`).
pub fn value<K: FixedSize, V: FixedSize>(block: &[u8], i: usize, m: usize) -> V {
    debug_assert!(i < m - 1, "value index {i} out of range for order {m}");
    let off = val_offset(i, m, K::WIDTH, V::WIDTH);
    V::decode(&block[off..off + V::WIDTH])
}

/// Write the `i`-th value slot (`i < m-1`).
pub fn set_value<K: FixedSize, V: FixedSize>(block: &mut [u8], i: usize, m: usize, v: &V) {
    debug_assert!(i < m - 1, "value index {i} out of range for order {m}");
    let off = val_offset(i, m, K::WIDTH, V::WIDTH);
    v.encode(&mut block[off..off + V::WIDTH]);
}

/// Read the `i`-th subtree offset (`i < m`); `LEAF_SENTINEL` means "no child".
pub fn subtree<K: FixedSize, V: FixedSize>(block: &[u8], i: usize, m: usize) -> i64 {
    debug_assert!(i < m, "subtree index {i} out of range for order {m}");
    let off = subtree_offset(i, m, K::WIDTH, V::WIDTH);
    i64::decode(&block[off..off + SUBTREE_WIDTH])
}

/// Write the `i`-th subtree offset (`i < m`).
pub fn set_subtree<K: FixedSize, V: FixedSize>(block: &mut [u8], i: usize, m: usize, offset: i64) {
    debug_assert!(i < m, "subtree index {i} out of range for order {m}");
    let off = subtree_offset(i, m, K::WIDTH, V::WIDTH);
    offset.encode(&mut block[off..off + SUBTREE_WIDTH]);
}

/// A node is a leaf iff all `nb_of_vals+1` used subtree slots are the
/// sentinel. A freshly-allocated, still-empty node (`nb_of_vals == 0` and an
/// all-sentinel subtree array) also satisfies this and counts as a leaf.
pub fn is_leaf<K: FixedSize, V: FixedSize>(block: &[u8], m: usize) -> bool {
    let n = nb_of_vals(block) as usize;
    (0..=n).all(|i| subtree::<K, V>(block, i, m) == LEAF_SENTINEL)
}

/// A freshly allocated node: zero keys, all subtree slots set to the
/// sentinel.
pub fn zeroed_block<K: FixedSize, V: FixedSize>(m: usize) -> Vec<u8> {
    let mut block = vec![0u8; node_len(m, K::WIDTH, V::WIDTH)];
    for i in 0..m {
        set_subtree::<K, V>(&mut block, i, m, LEAF_SENTINEL);
    }
    block
}
