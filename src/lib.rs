//! `tape-sort` is an external merge sort for streams of integers.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is done in two phases. During the
//! first phase memory-sized chunks of the input are sorted and persisted as runs, during the second one the runs
//! are merged together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! Two merge strategies are supported:
//!
//! * **Balanced merge** ([`Strategy::Balanced`]):
//!   initial runs are distributed over two tapes. Every pass merges runs pairwise from the two input tapes
//!   into two fresh output tapes, halving the number of runs, until a single run remains.
//!   Only two runs are held in memory at a time.
//! * **K-way merge** ([`Strategy::KWay`]):
//!   every run is stored in its own chunk file and all chunks are merged in a single pass using
//!   a binary heap.
//!
//! Run length is limited either by elements count ([`LimitedBufferBuilder`]) or by consumed memory
//! (`buffer::mem::MemoryLimitedBufferBuilder`, `memory-limit` feature required).
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io::{self, prelude::*};
//! use std::path;
//!
//! use tape_sort::format::{self, InputFormat, OutputFormat};
//! use tape_sort::{ExternalSorter, ExternalSorterBuilder, LimitedBufferBuilder, Strategy};
//!
//! fn main() {
//!     let input = format::read_input(fs::File::open("input.txt").unwrap(), InputFormat::Auto).unwrap();
//!     let mut output_writer = io::BufWriter::new(fs::File::create("output.txt").unwrap());
//!
//!     let sorter: ExternalSorter<io::Error> = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_buffer(LimitedBufferBuilder::new(1_000_000, true))
//!         .with_strategy(Strategy::Balanced)
//!         .build()
//!         .unwrap();
//!
//!     let sorted = sorter.sort(input).unwrap();
//!
//!     format::write_output(&mut output_writer, sorted, OutputFormat::Lines).unwrap();
//!     output_writer.flush().unwrap();
//! }
//! ```

pub mod balanced;
pub mod buffer;
pub mod chunk;
pub mod format;
pub mod merger;
pub mod observer;
pub mod runs;
pub mod sort;
pub mod tape;

/// Sorted element type.
pub type Element = i64;

/// Ascending sequence of elements persisted as a single record.
pub type Run = Vec<Element>;

pub use balanced::BalancedMerger;
pub use buffer::{ChunkBuffer, ChunkBufferBuilder, LimitedBuffer, LimitedBufferBuilder};
pub use chunk::{ExternalChunk, RmpExternalChunk};
pub use merger::BinaryHeapMerger;
pub use observer::{LogObserver, NoopObserver, SortObserver};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, Sorted, Strategy};
pub use tape::{Tape, TapeDeck, TapeError};
