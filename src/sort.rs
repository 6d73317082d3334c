//! External sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::io;
use std::marker::PhantomData;
use std::path::Path;

use crate::balanced::BalancedMerger;
use crate::chunk::{ExternalChunk, RmpExternalChunk};
use crate::merger::BinaryHeapMerger;
use crate::observer::{LogObserver, SortObserver};
use crate::runs;
use crate::tape::{RunStream, TapeDeck, TapeError};
use crate::{ChunkBufferBuilder, Element, LimitedBufferBuilder};

/// Sorting error.
#[derive(Debug)]
pub enum SortError<I: Error> {
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Common I/O error.
    IO(io::Error),
    /// Tape or chunk serialization error or corrupted tape content.
    Storage(TapeError),
    /// Input data stream error
    InputError(I),
}

impl<I> Error for SortError<I>
where
    I: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            SortError::TempDir(err) => err,
            SortError::IO(err) => err,
            SortError::Storage(err) => err,
            SortError::InputError(err) => err,
        })
    }
}

impl<I: Error> Display for SortError<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::Storage(err) => write!(f, "storage error: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
        }
    }
}

impl<I: Error> From<TapeError> for SortError<I> {
    fn from(err: TapeError) -> Self {
        match err {
            TapeError::IO(err) => SortError::IO(err),
            err => SortError::Storage(err),
        }
    }
}

/// Merge strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Multi-pass balanced merge over two pairs of alternating tapes.
    Balanced,
    /// Single-pass k-way merge over all chunk files using a binary heap.
    KWay,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Balanced
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
pub struct ExternalSorterBuilder<E, B = LimitedBufferBuilder, C = RmpExternalChunk>
where
    E: Error,
    B: ChunkBufferBuilder,
    C: ExternalChunk,
{
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Tape and chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Run buffer builder.
    buffer_builder: B,
    /// Merge strategy.
    strategy: Strategy,
    /// Progress observer.
    observer: Option<Box<dyn SortObserver>>,

    /// External chunk type.
    external_chunk_type: PhantomData<C>,
    /// Input error type.
    input_error_type: PhantomData<E>,
}

impl<E, B, C> ExternalSorterBuilder<E, B, C>
where
    E: Error,
    B: ChunkBufferBuilder,
    C: ExternalChunk,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<E, B, C>, SortError<E>> {
        ExternalSorter::new(
            self.tmp_dir.as_deref(),
            self.buffer_builder,
            self.rw_buf_size,
            self.strategy,
            self.observer.unwrap_or_else(|| Box::new(LogObserver::default())),
        )
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder<E, B, C> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets buffer builder.
    pub fn with_buffer(mut self, buffer_builder: B) -> ExternalSorterBuilder<E, B, C> {
        self.buffer_builder = buffer_builder;
        return self;
    }

    /// Sets tape and chunk read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder<E, B, C> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets merge strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> ExternalSorterBuilder<E, B, C> {
        self.strategy = strategy;
        return self;
    }

    /// Sets progress observer. [`LogObserver`] is used by default.
    pub fn with_observer(mut self, observer: impl SortObserver + 'static) -> ExternalSorterBuilder<E, B, C> {
        self.observer = Some(Box::new(observer));
        return self;
    }
}

impl<E, B, C> Default for ExternalSorterBuilder<E, B, C>
where
    E: Error,
    B: ChunkBufferBuilder,
    C: ExternalChunk,
{
    fn default() -> Self {
        ExternalSorterBuilder {
            tmp_dir: None,
            rw_buf_size: None,
            buffer_builder: B::default(),
            strategy: Strategy::default(),
            observer: None,
            external_chunk_type: PhantomData,
            input_error_type: PhantomData,
        }
    }
}

/// External sorter.
pub struct ExternalSorter<E, B = LimitedBufferBuilder, C = RmpExternalChunk>
where
    E: Error,
    B: ChunkBufferBuilder,
    C: ExternalChunk,
{
    /// Tape factory working in the temporary directory.
    deck: TapeDeck,
    /// Directory to be used to store temporary data.
    tmp_dir: tempfile::TempDir,
    /// Run buffer builder.
    buffer_builder: B,
    /// Tape and chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Merge strategy.
    strategy: Strategy,
    /// Progress observer.
    observer: Box<dyn SortObserver>,

    /// External chunk type.
    external_chunk_type: PhantomData<C>,
    /// Input error type.
    input_error_type: PhantomData<E>,
}

impl<E, B, C> ExternalSorter<E, B, C>
where
    E: Error,
    B: ChunkBufferBuilder,
    C: ExternalChunk,
{
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `tmp_path` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `buffer_builder` - An instance of a buffer builder that will be used for run buffer creation.
    /// * `rw_buf_size` - Tapes and chunks file read/write buffer size.
    /// * `strategy` - Merge strategy.
    /// * `observer` - Progress observer.
    pub fn new(
        tmp_path: Option<&Path>,
        buffer_builder: B,
        rw_buf_size: Option<usize>,
        strategy: Strategy,
        observer: Box<dyn SortObserver>,
    ) -> Result<Self, SortError<E>> {
        let tmp_dir = Self::init_tmp_directory(tmp_path)?;
        log::info!("using {:?} merge strategy", strategy);

        return Ok(ExternalSorter {
            deck: TapeDeck::new(tmp_dir.path(), rw_buf_size),
            tmp_dir,
            buffer_builder,
            rw_buf_size,
            strategy,
            observer,
            external_chunk_type: PhantomData,
            input_error_type: PhantomData,
        });
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError<E>> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Sorts data from the input.
    /// Returns an iterator that can be used to get sorted data stream.
    /// Empty input is not an error: an empty stream is returned (see [`Sorted::is_empty`]).
    /// The stream borrows the sorter, whose temporary directory holds the data being read.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    pub fn sort<I>(&self, input: I) -> Result<Sorted<'_, C>, SortError<E>>
    where
        I: IntoIterator<Item = Result<Element, E>>,
    {
        let sorted = match self.strategy {
            Strategy::Balanced => self.sort_balanced(input)?,
            Strategy::KWay => self.sort_kway(input)?,
        };

        if sorted.is_empty() {
            log::info!("no data processed");
        }

        return Ok(sorted);
    }

    fn sort_balanced<I>(&self, input: I) -> Result<Sorted<'_, C>, SortError<E>>
    where
        I: IntoIterator<Item = Result<Element, E>>,
    {
        let areas = self.deck.create_pair("initial")?;

        let runs = match runs::generate_runs(input, &self.buffer_builder, &areas, self.observer.as_ref()) {
            Ok(runs) => runs,
            Err(err) => {
                for tape in areas {
                    tape.discard();
                }
                return Err(err);
            }
        };
        log::debug!("external sort preparation done");

        let merger = BalancedMerger::new(&self.deck, self.observer.as_ref());
        return match merger.merge(Vec::from(areas), runs)? {
            Some(tape) => Ok(Sorted::new(Source::Run(tape.into_run_stream()?), self.observer.as_ref())),
            None => Ok(Sorted::new(Source::Empty, self.observer.as_ref())),
        };
    }

    fn sort_kway<I>(&self, input: I) -> Result<Sorted<'_, C>, SortError<E>>
    where
        I: IntoIterator<Item = Result<Element, E>>,
    {
        let chunks: Vec<C> = runs::generate_chunks(
            input,
            &self.buffer_builder,
            &self.tmp_dir,
            self.rw_buf_size,
            self.observer.as_ref(),
        )?;
        log::debug!("external sort preparation done");

        if chunks.is_empty() {
            return Ok(Sorted::new(Source::Empty, self.observer.as_ref()));
        }

        return Ok(Sorted::new(
            Source::Merged(BinaryHeapMerger::new(chunks)),
            self.observer.as_ref(),
        ));
    }
}

/// Number of merged elements between two [`SortObserver::merged`] reports.
const MERGE_REPORT_INTERVAL: usize = 1000;

enum Source<C: ExternalChunk> {
    Empty,
    Run(RunStream),
    Merged(BinaryHeapMerger<TapeError, C>),
}

/// Sorted data stream.
///
/// The stream reads tapes and chunk files kept in the sorter's temporary directory, so it borrows the sorter
/// and the sorter cannot be dropped while the stream is alive:
///
/// ```compile_fail
/// use tape_sort::{ExternalSorter, ExternalSorterBuilder};
///
/// let sorter: ExternalSorter<std::io::Error> = ExternalSorterBuilder::new().build().unwrap();
/// let sorted = sorter.sort(vec![Ok(2), Ok(1)]).unwrap();
/// drop(sorter);
/// assert_eq!(sorted.count(), 2);
/// ```
pub struct Sorted<'a, C: ExternalChunk = RmpExternalChunk> {
    source: Source<C>,
    observer: &'a dyn SortObserver,
    merged: usize,
    finished: bool,
}

impl<'a, C: ExternalChunk> Sorted<'a, C> {
    fn new(source: Source<C>, observer: &'a dyn SortObserver) -> Self {
        Sorted {
            source,
            observer,
            merged: 0,
            finished: false,
        }
    }

    /// Checks whether no data was processed.
    pub fn is_empty(&self) -> bool {
        matches!(self.source, Source::Empty)
    }

    /// Counts a merged item and notifies the observer.
    fn track_merged(&mut self, item: Option<Result<Element, TapeError>>) -> Option<Result<Element, TapeError>> {
        match &item {
            Some(Ok(_)) => {
                self.merged += 1;
                if self.merged % MERGE_REPORT_INTERVAL == 0 {
                    self.observer.merged(self.merged);
                }
            }
            Some(Err(_)) => self.finished = true,
            None if !self.finished => {
                self.finished = true;
                self.observer.merge_completed(self.merged);
            }
            None => {}
        }
        return item;
    }
}

impl<'a, C: ExternalChunk> Iterator for Sorted<'a, C> {
    type Item = Result<Element, TapeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match &mut self.source {
            Source::Empty => return None,
            Source::Run(stream) => return stream.next(),
            Source::Merged(merger) => merger.next(),
        };
        self.track_merged(item)
    }
}

impl<'a, C: ExternalChunk> Debug for Sorted<'a, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Empty => write!(f, "Sorted::Empty"),
            Source::Run(stream) => write!(f, "Sorted::Run(remaining: {})", stream.remaining()),
            Source::Merged(merger) => {
                write!(f, "Sorted::Merged(sources: {}, merged: {})", merger.sources(), self.merged)
            }
        }
    }
}
