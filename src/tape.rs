//! Tapes: append-only files holding a sequence of length-prefixed sorted runs.
//!
//! Each record on a tape is a MessagePack encoded `u64` length `N` followed by `N` MessagePack encoded
//! elements. Readers consume exactly `N` values per record before expecting the next length prefix.

use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, prelude::*};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use log;

use crate::{Element, Run};

/// Tape operation error.
#[derive(Debug)]
pub enum TapeError {
    /// Common I/O error (file creation, removal, disk full, permissions).
    IO(io::Error),
    /// Run serialization error.
    SerializationError(rmp_serde::encode::Error),
    /// Tape content is truncated or malformed.
    Corrupted { path: PathBuf, reason: String },
}

impl Error for TapeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            TapeError::IO(err) => Some(err),
            TapeError::SerializationError(err) => Some(err),
            TapeError::Corrupted { .. } => None,
        }
    }
}

impl fmt::Display for TapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            TapeError::IO(err) => write!(f, "tape I/O operation failed: {}", err),
            TapeError::SerializationError(err) => write!(f, "run serialization error: {}", err),
            TapeError::Corrupted { path, reason } => write!(f, "tape {} is corrupted: {}", path.display(), reason),
        }
    }
}

impl From<io::Error> for TapeError {
    fn from(err: io::Error) -> Self {
        TapeError::IO(err)
    }
}

/// Handle of a tape stored on the file system.
///
/// A tape is created empty, runs are appended to its end and read back sequentially
/// through a [`TapeReader`]. A reader borrows the tape, so a tape can't be deleted while it is being read.
#[derive(Debug)]
pub struct Tape {
    path: PathBuf,
    buf_size: Option<usize>,
}

impl Tape {
    /// Creates a new empty tape. An existing file at the same path is truncated.
    ///
    /// # Arguments
    /// * `path` - Tape file path
    /// * `buf_size` - Tape file read/write buffer size
    pub fn create(path: impl Into<PathBuf>, buf_size: Option<usize>) -> Result<Self, TapeError> {
        let path = path.into();
        fs::File::create(&path)?;

        return Ok(Tape { path, buf_size });
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a run to the end of the tape leaving previously written runs intact.
    pub fn append_run(&self, run: &[Element]) -> Result<(), TapeError> {
        let file = fs::OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = match self.buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        rmp_serde::encode::write(&mut writer, &(run.len() as u64)).map_err(TapeError::SerializationError)?;
        for item in run {
            rmp_serde::encode::write(&mut writer, item).map_err(TapeError::SerializationError)?;
        }
        writer.flush()?;

        return Ok(());
    }

    /// Opens the tape for sequential reading from its beginning.
    pub fn open_for_read(&self) -> Result<TapeReader<'_>, TapeError> {
        return Ok(TapeReader {
            cursor: Cursor::open(&self.path, self.buf_size)?,
            tape: PhantomData,
        });
    }

    /// Converts the tape into a stream over the values of its first run.
    /// The tape is deleted once the stream is dropped.
    pub fn into_run_stream(self) -> Result<RunStream, TapeError> {
        let mut cursor = Cursor::open(&self.path, self.buf_size)?;
        let remaining = match cursor.read_len() {
            Ok(len) => len.unwrap_or(0),
            Err(err) => {
                drop(cursor);
                self.discard();
                return Err(err);
            }
        };

        return Ok(RunStream {
            cursor: Some(cursor),
            remaining,
            tape: Some(self),
        });
    }

    /// Removes the tape file.
    pub fn delete(self) -> Result<(), TapeError> {
        fs::remove_file(&self.path)?;
        return Ok(());
    }

    /// Removes the tape file reporting a failure as a warning.
    pub(crate) fn discard(self) {
        let path = self.path.clone();
        if let Err(err) = self.delete() {
            log::warn!("tape {} not removed: {}", path.display(), err);
        }
    }
}

/// Sequential tape cursor.
struct Cursor {
    path: PathBuf,
    reader: io::Take<io::BufReader<fs::File>>,
}

impl Cursor {
    fn open(path: &Path, buf_size: Option<usize>) -> Result<Self, TapeError> {
        let file = fs::File::open(path)?;
        let file_len = file.metadata()?.len();

        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(Cursor {
            path: path.to_path_buf(),
            reader: reader.take(file_len),
        });
    }

    /// Reads the next length prefix. Returns `None` if the end of the tape is reached at a record boundary.
    fn read_len(&mut self) -> Result<Option<u64>, TapeError> {
        if self.reader.limit() == 0 {
            return Ok(None);
        }

        let len: u64 = rmp_serde::decode::from_read(&mut self.reader)
            .map_err(|err| self.corrupted(format!("invalid run length prefix: {}", err)))?;

        // every encoded value takes at least one byte
        if len > self.reader.limit() {
            return Err(self.corrupted(format!(
                "run length {} exceeds the remaining {} bytes",
                len,
                self.reader.limit()
            )));
        }

        return Ok(Some(len));
    }

    fn read_value(&mut self) -> Result<Element, TapeError> {
        rmp_serde::decode::from_read(&mut self.reader)
            .map_err(|err| self.corrupted(format!("truncated or invalid run value: {}", err)))
    }

    fn corrupted(&self, reason: String) -> TapeError {
        TapeError::Corrupted {
            path: self.path.clone(),
            reason,
        }
    }
}

/// Tape reader. Reads runs one by one in the order they were appended.
pub struct TapeReader<'a> {
    cursor: Cursor,
    tape: PhantomData<&'a Tape>,
}

impl<'a> TapeReader<'a> {
    /// Reads the next run from the tape. Returns `None` when the tape is exhausted.
    pub fn read_next_run(&mut self) -> Result<Option<Run>, TapeError> {
        let len = match self.cursor.read_len()? {
            Some(len) => len,
            None => return Ok(None),
        };

        let mut run = Vec::with_capacity(len as usize);
        for _ in 0..len {
            run.push(self.cursor.read_value()?);
        }

        return Ok(Some(run));
    }
}

/// Stream over the values of a single run. Owns the tape and deletes it on drop.
pub struct RunStream {
    cursor: Option<Cursor>,
    remaining: u64,
    tape: Option<Tape>,
}

impl RunStream {
    /// Number of values not yet read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Iterator for RunStream {
    type Item = Result<Element, TapeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let cursor = self.cursor.as_mut()?;
        match cursor.read_value() {
            Ok(value) => {
                self.remaining -= 1;
                Some(Ok(value))
            }
            Err(err) => {
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

impl Drop for RunStream {
    fn drop(&mut self) {
        // the file must be closed before it is removed
        drop(self.cursor.take());
        if let Some(tape) = self.tape.take() {
            tape.discard();
        }
    }
}

/// Tape factory. Creates uniquely named tapes in a working directory.
pub struct TapeDeck {
    dir: PathBuf,
    rw_buf_size: Option<usize>,
    counter: Cell<usize>,
}

impl TapeDeck {
    /// Creates a tape deck.
    ///
    /// # Arguments
    /// * `dir` - Directory tapes are created in
    /// * `rw_buf_size` - Tape read/write buffer size
    pub fn new(dir: &Path, rw_buf_size: Option<usize>) -> Self {
        TapeDeck {
            dir: dir.to_path_buf(),
            rw_buf_size,
            counter: Cell::new(0),
        }
    }

    /// Creates a new empty tape named after the prefix and the deck counter.
    pub fn create(&self, prefix: &str) -> Result<Tape, TapeError> {
        let number = self.counter.get() + 1;
        self.counter.set(number);

        let tape = Tape::create(self.dir.join(format!("{}_{}.tape", prefix, number)), self.rw_buf_size)?;
        log::trace!("tape {} created", tape.path().display());

        return Ok(tape);
    }

    /// Creates a pair of tapes sharing the prefix.
    pub fn create_pair(&self, prefix: &str) -> Result<[Tape; 2], TapeError> {
        let first = self.create(&format!("{}_a", prefix))?;
        let second = match self.create(&format!("{}_b", prefix)) {
            Ok(tape) => tape,
            Err(err) => {
                first.discard();
                return Err(err);
            }
        };

        return Ok([first, second]);
    }

    /// Number of tapes created so far.
    pub fn created(&self) -> usize {
        self.counter.get()
    }
}
