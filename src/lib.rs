//! A disk-oriented B-Tree index core, parameterised over fixed-size keys
//! and fixed-size values.
//!
//! This crate owns the B-Tree algorithms (search, insert, append, split,
//! range scan, iteration) and the on-disk node layout, but it performs no
//! I/O and no allocation itself. Every operation returns a [`io::Step`]
//! instead: a small interpreter-style value that tells the caller which
//! bytes to read, which bytes to write, or how many bytes of fresh storage
//! to allocate next. The caller drives the computation forward by feeding
//! results back in, via [`io::run`] against an [`io::Storage`]
//! implementation, or by matching on `Step` by hand for a storage backend
//! with its own suspension points (a block device driver, an async file).
//!
//! This inversion lets the same core run unmodified against an in-memory
//! byte buffer (see `tests/`), a file, a block device, or any custom
//! backing store -- the storage is always the caller's concern, never this
//! crate's.
//!
//! # What this crate does not do
//!
//! No deletion, no concurrent mutation, no variable-length keys or values,
//! no transactions or crash-safety beyond the write batch a mutating
//! operation reports, and no caching layer. See the crate's `DESIGN.md`
//! for the reasoning behind each of those boundaries.

pub mod codec;
pub mod error;
pub mod io;
pub mod layout;
pub mod node;
pub mod tree;

pub use codec::{FixedSize, Key, Value};
pub use error::{Error, Result};
pub use io::{Block, Step, Storage, WriteOp};
pub use tree::{BTree, MutationResult};
