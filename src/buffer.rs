//! Limited run buffer implementations.

use crate::{Element, Run};

/// Buffer builder.
pub trait ChunkBufferBuilder: Default {
    type Buffer: ChunkBuffer;

    /// Creates a new buffer.
    fn build(&self) -> Self::Buffer;
}

/// Base limited buffer interface. A buffer accumulates input elements until it is full and is then
/// sorted and persisted as a run.
pub trait ChunkBuffer {
    /// Adds a new element to the buffer.
    fn push(&mut self, item: Element);

    /// Returns buffer length
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if the buffer reached the limit.
    fn is_full(&self) -> bool;

    /// Sorts buffered elements in ascending order. The sort is stable.
    fn sort(&mut self);

    /// Converts the buffer into a run.
    fn into_run(self) -> Run;
}

pub struct LimitedBufferBuilder {
    buffer_limit: usize,
    preallocate: bool,
}

impl LimitedBufferBuilder {
    /// Creates a builder of buffers holding at most `buffer_limit` elements.
    /// A zero limit is treated as one.
    pub fn new(buffer_limit: usize, preallocate: bool) -> Self {
        LimitedBufferBuilder {
            buffer_limit: buffer_limit.max(1),
            preallocate,
        }
    }

    pub fn limit(&self) -> usize {
        self.buffer_limit
    }
}

impl ChunkBufferBuilder for LimitedBufferBuilder {
    type Buffer = LimitedBuffer;

    fn build(&self) -> Self::Buffer {
        if self.preallocate {
            LimitedBuffer::with_capacity(self.buffer_limit)
        } else {
            LimitedBuffer::new(self.buffer_limit)
        }
    }
}

impl Default for LimitedBufferBuilder {
    fn default() -> Self {
        LimitedBufferBuilder {
            buffer_limit: 1_000_000,
            preallocate: false,
        }
    }
}

/// Buffer limited by elements count.
pub struct LimitedBuffer {
    limit: usize,
    inner: Vec<Element>,
}

impl LimitedBuffer {
    pub fn new(limit: usize) -> Self {
        LimitedBuffer {
            limit,
            inner: Vec::new(),
        }
    }

    pub fn with_capacity(limit: usize) -> Self {
        LimitedBuffer {
            limit,
            inner: Vec::with_capacity(limit),
        }
    }
}

impl ChunkBuffer for LimitedBuffer {
    fn push(&mut self, item: Element) {
        self.inner.push(item);
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }

    fn sort(&mut self) {
        self.inner.sort();
    }

    fn into_run(self) -> Run {
        self.inner
    }
}

#[cfg(test)]
mod test {
    use super::{ChunkBuffer, ChunkBufferBuilder, LimitedBufferBuilder};

    #[test]
    fn test_limited_buffer() {
        let builder = LimitedBufferBuilder::new(2, true);
        let mut buffer = builder.build();

        buffer.push(7);
        assert_eq!(buffer.is_full(), false);
        buffer.push(-1);
        assert_eq!(buffer.is_full(), true);

        buffer.sort();
        assert_eq!(buffer.into_run(), vec![-1, 7]);
    }

    #[test]
    fn test_zero_limit_holds_one_element() {
        let builder = LimitedBufferBuilder::new(0, false);
        assert_eq!(builder.limit(), 1);

        let mut buffer = builder.build();
        assert!(buffer.is_empty());
        buffer.push(3);
        assert!(buffer.is_full());
    }
}

#[cfg(feature = "memory-limit")]
pub mod mem {
    use deepsize::DeepSizeOf;

    use super::{ChunkBuffer, ChunkBufferBuilder};
    use crate::{Element, Run};

    pub struct MemoryLimitedBufferBuilder {
        buffer_limit: u64,
    }

    impl MemoryLimitedBufferBuilder {
        pub fn new(buffer_limit: u64) -> Self {
            MemoryLimitedBufferBuilder { buffer_limit }
        }
    }

    impl ChunkBufferBuilder for MemoryLimitedBufferBuilder {
        type Buffer = MemoryLimitedBuffer;

        fn build(&self) -> Self::Buffer {
            MemoryLimitedBuffer::new(self.buffer_limit)
        }
    }

    impl Default for MemoryLimitedBufferBuilder {
        fn default() -> Self {
            MemoryLimitedBufferBuilder { buffer_limit: u64::MAX }
        }
    }

    /// Buffer limited by consumed memory.
    pub struct MemoryLimitedBuffer {
        limit: u64,
        current_size: u64,
        inner: Vec<Element>,
    }

    impl MemoryLimitedBuffer {
        pub fn new(limit: u64) -> Self {
            MemoryLimitedBuffer {
                limit,
                current_size: 0,
                inner: Vec::new(),
            }
        }

        pub fn mem_size(&self) -> u64 {
            self.current_size
        }
    }

    impl ChunkBuffer for MemoryLimitedBuffer {
        fn push(&mut self, item: Element) {
            self.current_size += item.deep_size_of() as u64;
            self.inner.push(item);
        }

        fn len(&self) -> usize {
            self.inner.len()
        }

        fn is_full(&self) -> bool {
            self.current_size >= self.limit
        }

        fn sort(&mut self) {
            self.inner.sort();
        }

        fn into_run(self) -> Run {
            self.inner
        }
    }

}
