//! Initial run generation.
//!
//! The input is accumulated in a limited buffer. Every time the buffer is full it is sorted in memory and
//! persisted as a run; the last partially filled buffer becomes the final (shorter) run.

use std::error::Error;

use crate::buffer::{ChunkBuffer, ChunkBufferBuilder};
use crate::chunk::ExternalChunk;
use crate::observer::SortObserver;
use crate::sort::SortError;
use crate::tape::Tape;
use crate::{Element, Run};

/// Splits the input into sorted runs distributed round-robin over two tapes.
/// Returns the number of runs written. Empty input produces no runs and leaves both tapes empty.
///
/// # Arguments
/// * `input` - Input stream data to be fetched from
/// * `buffer_builder` - Builder of the buffers limiting run length
/// * `areas` - Tapes the runs are distributed over, the first run goes to `areas[0]`
/// * `observer` - Progress observer
pub fn generate_runs<I, E, B>(
    input: I,
    buffer_builder: &B,
    areas: &[Tape; 2],
    observer: &dyn SortObserver,
) -> Result<usize, SortError<E>>
where
    I: IntoIterator<Item = Result<Element, E>>,
    E: Error,
    B: ChunkBufferBuilder,
{
    let runs = split_into_runs(input, buffer_builder, |index, run| {
        let area = &areas[index % areas.len()];
        area.append_run(&run)?;

        log::debug!("run {} ({} elements) saved to {}", index, run.len(), area.path().display());
        observer.run_created(index, run.len());
        return Ok(());
    })?;

    observer.runs_generated(runs);
    return Ok(runs);
}

/// Splits the input into sorted chunks each stored in its own file.
///
/// # Arguments
/// * `input` - Input stream data to be fetched from
/// * `buffer_builder` - Builder of the buffers limiting chunk length
/// * `dir` - Directory chunk files are created in
/// * `rw_buf_size` - Chunk file read/write buffer size
/// * `observer` - Progress observer
pub fn generate_chunks<C, I, E, B>(
    input: I,
    buffer_builder: &B,
    dir: &tempfile::TempDir,
    rw_buf_size: Option<usize>,
    observer: &dyn SortObserver,
) -> Result<Vec<C>, SortError<E>>
where
    C: ExternalChunk,
    I: IntoIterator<Item = Result<Element, E>>,
    E: Error,
    B: ChunkBufferBuilder,
{
    let mut chunks = Vec::new();

    split_into_runs(input, buffer_builder, |index, run| {
        let len = run.len();
        chunks.push(C::build(dir, run, rw_buf_size)?);

        log::debug!("chunk {} ({} elements) saved", index, len);
        observer.run_created(index, len);
        return Ok(());
    })?;

    observer.runs_generated(chunks.len());
    return Ok(chunks);
}

fn split_into_runs<I, E, B, F>(input: I, buffer_builder: &B, mut flush: F) -> Result<usize, SortError<E>>
where
    I: IntoIterator<Item = Result<Element, E>>,
    E: Error,
    B: ChunkBufferBuilder,
    F: FnMut(usize, Run) -> Result<(), SortError<E>>,
{
    let mut runs = 0;
    let mut chunk_buf = buffer_builder.build();

    for item in input.into_iter() {
        match item {
            Ok(item) => chunk_buf.push(item),
            Err(err) => return Err(SortError::InputError(err)),
        }

        if chunk_buf.is_full() {
            flush(runs, sorted_run(chunk_buf))?;
            runs += 1;
            chunk_buf = buffer_builder.build();
        }
    }

    if !chunk_buf.is_empty() {
        flush(runs, sorted_run(chunk_buf))?;
        runs += 1;
    }

    return Ok(runs);
}

fn sorted_run(mut buffer: impl ChunkBuffer) -> Run {
    buffer.sort();
    buffer.into_run()
}
