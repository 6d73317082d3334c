//! Binary heap (k-way) merger.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::error::Error;

use crate::Element;

/// Heap entry: the current head value of a source and the index of that source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    value: Element,
    source: usize,
}

impl Ord for HeapEntry {
    // binary heap is max-heap by default so the ordering is reversed to get a min-heap;
    // equal values are taken from the lower source index first
    fn cmp(&self, other: &Self) -> Ordering {
        other.value.cmp(&self.value).then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output in one pass.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of chunks (inputs).
pub struct BinaryHeapMerger<E, C>
where
    E: Error,
    C: IntoIterator<Item = Result<Element, E>>,
{
    items: BinaryHeap<HeapEntry>,
    chunks: Vec<C::IntoIter>,
    initiated: bool,
    failed: bool,
}

impl<E, C> BinaryHeapMerger<E, C>
where
    E: Error,
    C: IntoIterator<Item = Result<Element, E>>,
{
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk items should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let chunks = Vec::from_iter(chunks.into_iter().map(|c| c.into_iter()));
        let items = BinaryHeap::with_capacity(chunks.len());

        return BinaryHeapMerger {
            chunks,
            items,
            initiated: false,
            failed: false,
        };
    }

    /// Number of merged sources.
    pub fn sources(&self) -> usize {
        self.chunks.len()
    }

    fn advance(&mut self, source: usize) -> Result<(), E> {
        if let Some(item) = self.chunks[source].next() {
            self.items.push(HeapEntry { value: item?, source });
        }

        return Ok(());
    }
}

impl<E, C> Iterator for BinaryHeapMerger<E, C>
where
    E: Error,
    C: IntoIterator<Item = Result<Element, E>>,
{
    type Item = Result<Element, E>;

    /// Returns the next item from the inputs in ascending order.
    /// The merger stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if !self.initiated {
            self.initiated = true;
            for source in 0..self.chunks.len() {
                if let Err(err) = self.advance(source) {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }

        let entry = self.items.pop()?;
        if let Err(err) = self.advance(entry.source) {
            self.failed = true;
            return Some(Err(err));
        }

        return Some(Ok(entry.value));
    }
}
