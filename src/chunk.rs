//! Chunk files used by the k-way merge strategy. A chunk file stores a single sorted sequence
//! that is read back value by value.

use std::fs;
use std::io;
use std::io::prelude::*;

use tempfile;

use crate::tape::TapeError;
use crate::Element;

/// External chunk interface. Provides methods for creating a chunk stored on file system and reading data from it.
pub trait ExternalChunk: Sized + Iterator<Item = Result<Element, TapeError>> {
    /// Builds an instance of an external chunk.
    fn build(
        dir: &tempfile::TempDir,
        items: impl IntoIterator<Item = Element>,
        buf_size: Option<usize>,
    ) -> Result<Self, TapeError> {
        let tmp_file = tempfile::tempfile_in(dir)?;

        let mut chunk_writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufWriter::new(tmp_file.try_clone()?),
        };

        Self::dump(&mut chunk_writer, items)?;

        chunk_writer.flush()?;

        let mut chunk_reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufReader::new(tmp_file.try_clone()?),
        };

        chunk_reader.rewind()?;
        let file_len = tmp_file.metadata()?.len();

        return Ok(Self::new(chunk_reader.take(file_len)));
    }

    /// Creates and instance of an external chunk.
    fn new(reader: io::Take<io::BufReader<fs::File>>) -> Self;

    /// Dumps items to an external file.
    fn dump(chunk_writer: &mut io::BufWriter<fs::File>, items: impl IntoIterator<Item = Element>)
        -> Result<(), TapeError>;
}

/// RMP (Rust MessagePack) external chunk implementation.
/// It uses MessagePack as a data serialization format.
/// For more information see https://msgpack.org/.
pub struct RmpExternalChunk {
    reader: io::Take<io::BufReader<fs::File>>,
}

impl ExternalChunk for RmpExternalChunk {
    fn new(reader: io::Take<io::BufReader<fs::File>>) -> Self {
        RmpExternalChunk { reader }
    }

    fn dump(
        mut chunk_writer: &mut io::BufWriter<fs::File>,
        items: impl IntoIterator<Item = Element>,
    ) -> Result<(), TapeError> {
        for item in items.into_iter() {
            rmp_serde::encode::write(&mut chunk_writer, &item).map_err(TapeError::SerializationError)?;
        }

        return Ok(());
    }
}

impl Iterator for RmpExternalChunk {
    type Item = Result<Element, TapeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.limit() == 0 {
            None
        } else {
            match rmp_serde::decode::from_read(&mut self.reader) {
                Ok(result) => Some(Ok(result)),
                Err(err) => {
                    // a broken chunk can't be resynchronized, stop reading it
                    self.reader.set_limit(0);
                    Some(Err(TapeError::Corrupted {
                        path: "<chunk>".into(),
                        reason: err.to_string(),
                    }))
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{ExternalChunk, RmpExternalChunk};
    use crate::tape::TapeError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    #[case(None)]
    #[case(Some(8))]
    fn test_rmp_chunk(tmp_dir: tempfile::TempDir, #[case] buf_size: Option<usize>) {
        let saved = Vec::from_iter(-50..50);

        let chunk: RmpExternalChunk = ExternalChunk::build(&tmp_dir, saved.clone(), buf_size).unwrap();

        let restored: Result<Vec<i64>, TapeError> = chunk.collect();
        let restored = restored.unwrap();

        assert_eq!(restored, saved);
    }

    #[rstest]
    fn test_empty_rmp_chunk(tmp_dir: tempfile::TempDir) {
        let mut chunk: RmpExternalChunk = ExternalChunk::build(&tmp_dir, Vec::new(), None).unwrap();
        assert!(chunk.next().is_none());
    }
}
