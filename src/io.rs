//! The suspendable I/O protocol.
//!
//! Every algorithm in [`crate::tree`] returns a [`Step<T>`] instead of doing
//! I/O directly: either it's already [`Step::Done`], or it needs bytes
//! ([`Step::ReadBlock`]) or a fresh allocation ([`Step::Allocate`]) before it
//! can continue. The continuation attached to a suspension is one-shot --
//! call it exactly once, with exactly the bytes/offset the request asked
//! for, in the order the requests were produced.
//!
//! This module also provides [`Storage`], the interface a caller implements
//! to *drive* a `Step` synchronously, and [`run`], a small pump loop over
//! that interface. Concrete storage backends (an in-memory buffer, a file)
//! are callers' concerns, not the core's -- see the crate's `tests/` for an
//! example harness.

use std::fmt;

/// A byte range `(offset, length)` in the caller's storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub offset: i64,
    pub length: usize,
}

/// A write the caller must durably apply: `length` bytes of `data` at
/// `offset`. Emitted only inside the `write_ops` batch of a terminal
/// [`Step::Done`] from a mutating operation -- never as its own suspension;
/// write batches are pre-commit and are not part of the suspension
/// protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOp {
    pub offset: i64,
    pub data: Vec<u8>,
}

/// A one-shot continuation from a [`Step::ReadBlock`] or [`Step::Allocate`]
/// suspension.
type Continuation<I, T> = Box<dyn FnOnce(I) -> Step<T>>;

/// A suspendable computation: either a terminal result, or a request the
/// caller must service before the computation can continue.
pub enum Step<T> {
    /// Terminal: the algorithm's logical result.
    Done(T),
    /// Needs the bytes currently stored at `Block`; once supplied, call the
    /// continuation with exactly `block.length` bytes.
    ReadBlock(Block, Continuation<Vec<u8>, T>),
    /// Needs a fresh, contiguous region of `length` bytes reserved in
    /// storage; once supplied, call the continuation with the offset the
    /// caller chose for it.
    Allocate(usize, Continuation<i64, T>),
}

impl<T> fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Done(_) => write!(f, "Step::Done(..)"),
            Step::ReadBlock(block, _) => write!(f, "Step::ReadBlock({block:?}, ..)"),
            Step::Allocate(len, _) => write!(f, "Step::Allocate({len}, ..)"),
        }
    }
}

impl<T: 'static> Step<T> {
    pub fn done(value: T) -> Self {
        Step::Done(value)
    }

    pub fn read_block(block: Block, k: impl FnOnce(Vec<u8>) -> Step<T> + 'static) -> Self {
        Step::ReadBlock(block, Box::new(k))
    }

    pub fn allocate(length: usize, k: impl FnOnce(i64) -> Step<T> + 'static) -> Self {
        Step::Allocate(length, Box::new(k))
    }

    /// Chain another suspendable computation onto this one's result,
    /// without the caller needing to unwrap intermediate `Done`s by hand.
    /// Used internally to compose node-at-a-time steps into whole-tree
    /// operations.
    pub fn and_then<U: 'static>(self, f: impl FnOnce(T) -> Step<U> + 'static) -> Step<U> {
        match self {
            Step::Done(value) => f(value),
            Step::ReadBlock(block, k) => Step::read_block(block, move |bytes| k(bytes).and_then(f)),
            Step::Allocate(len, k) => Step::allocate(len, move |offset| k(offset).and_then(f)),
        }
    }
}

/// Storage driver interface required from the caller: read a byte range,
/// reserve a fresh region, and durably apply a batch of writes in order.
/// The core imposes no filesystem or block-device shape on this.
pub trait Storage {
    /// Return the bytes currently stored at `[offset, offset+length)`.
    fn read(&mut self, offset: i64, length: usize) -> Vec<u8>;

    /// Reserve a fresh, contiguous region of `length` bytes and return its
    /// starting offset.
    fn allocate(&mut self, length: usize) -> i64;

    /// Durably apply a batch of writes, in order.
    fn apply(&mut self, writes: &[WriteOp]);
}

/// Drive a [`Step`] to completion against a synchronous [`Storage`],
/// servicing every suspension in the order it is produced. This is the
/// reference pump loop for callers that don't need to suspend across
/// asynchronous boundaries themselves; callers that do can instead match on
/// `Step` manually and hold the continuation until bytes/offsets arrive from
/// elsewhere.
pub fn run<T: 'static>(mut step: Step<T>, storage: &mut impl Storage) -> T {
    loop {
        match step {
            Step::Done(value) => return value,
            Step::ReadBlock(block, k) => {
                let bytes = storage.read(block.offset, block.length);
                step = k(bytes);
            }
            Step::Allocate(length, k) => {
                let offset = storage.allocate(length);
                step = k(offset);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingStorage {
        reads: Vec<(i64, usize)>,
        next_offset: i64,
    }

    impl Storage for CountingStorage {
        fn read(&mut self, offset: i64, length: usize) -> Vec<u8> {
            self.reads.push((offset, length));
            vec![0u8; length]
        }

        fn allocate(&mut self, length: usize) -> i64 {
            let at = self.next_offset;
            self.next_offset += length as i64;
            at
        }

        fn apply(&mut self, _writes: &[WriteOp]) {}
    }

    #[test]
    fn run_services_requests_in_order() {
        let step: Step<i64> = Step::read_block(Block { offset: 0, length: 4 }, |bytes| {
            let n = bytes.len() as i64;
            Step::allocate(8, move |offset| Step::done(offset + n))
        });
        let mut storage = CountingStorage { reads: vec![], next_offset: 100 };
        let result = run(step, &mut storage);
        assert_eq!(result, 104);
        assert_eq!(storage.reads, vec![(0, 4)]);
    }

    #[test]
    fn and_then_chains_without_extra_suspension_reordering() {
        let step: Step<i64> = Step::done(1).and_then(|v| Step::done(v + 1));
        let mut storage = CountingStorage { reads: vec![], next_offset: 0 };
        assert_eq!(run(step, &mut storage), 2);
    }
}
