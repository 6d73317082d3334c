//! Balanced (two-tape) merge.
//!
//! Every pass reads one run from each input tape, merges them and writes the result to one of two
//! output tapes in turn. The output tapes of a pass become the input tapes of the next one, so the number
//! of runs is halved by every pass until a single sorted run remains.

use log;

use crate::observer::SortObserver;
use crate::tape::{Tape, TapeDeck, TapeError};
use crate::{Element, Run};

/// Merges two ascending runs into one. Equal elements are taken from `a` first.
pub fn merge_two(a: &[Element], b: &[Element]) -> Run {
    merge_by(a, b, |x, y| x <= y)
}

fn merge_by<T: Clone>(a: &[T], b: &[T], mut le: impl FnMut(&T, &T) -> bool) -> Vec<T> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if le(&a[i], &b[j]) {
            merged.push(a[i].clone());
            i += 1;
        } else {
            merged.push(b[j].clone());
            j += 1;
        }
    }

    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);

    return merged;
}

/// Runs a single merge pass. Returns the number of runs written to the output tapes.
///
/// Each iteration takes the next run of every input tape. A single run is copied unchanged, two or more
/// runs are merged two at a time into one. Results are appended to `outputs[0]`, `outputs[1]`,
/// `outputs[0]`, ... in turn. All input readers are closed when the function returns.
pub fn merge_pass(inputs: &[Tape], outputs: &[Tape; 2]) -> Result<usize, TapeError> {
    let mut readers = inputs
        .iter()
        .map(Tape::open_for_read)
        .collect::<Result<Vec<_>, _>>()?;
    let mut written = 0;

    loop {
        let mut runs = Vec::with_capacity(readers.len());
        for reader in readers.iter_mut() {
            if let Some(run) = reader.read_next_run()? {
                runs.push(run);
            }
        }

        let mut runs = runs.into_iter();
        let merged = match runs.next() {
            Some(first) => runs.fold(first, |acc, run| merge_two(&acc, &run)),
            None => break,
        };

        outputs[written % outputs.len()].append_run(&merged)?;
        written += 1;
    }

    return Ok(written);
}

/// Balanced merge driver.
pub struct BalancedMerger<'a> {
    deck: &'a TapeDeck,
    observer: &'a dyn SortObserver,
}

impl<'a> BalancedMerger<'a> {
    /// Creates a merger.
    ///
    /// # Arguments
    /// * `deck` - Tape factory used to create the output tapes of every pass
    /// * `observer` - Progress observer notified after every pass
    pub fn new(deck: &'a TapeDeck, observer: &'a dyn SortObserver) -> Self {
        BalancedMerger { deck, observer }
    }

    /// Merges the runs stored on the initial tapes until a single run remains.
    /// Returns the tape holding that run or `None` if there are no runs at all.
    ///
    /// Input tapes of every pass are deleted once the pass is done. On error all tapes of the current and
    /// the next generation are deleted.
    ///
    /// # Arguments
    /// * `initial` - Tapes holding the initial runs
    /// * `runs` - Number of runs stored on the initial tapes
    pub fn merge(&self, initial: Vec<Tape>, runs: usize) -> Result<Option<Tape>, TapeError> {
        let mut current = initial;

        if runs == 0 {
            log::debug!("no runs to merge");
            discard_all(current);
            return Ok(None);
        }

        let mut pass = 1;
        loop {
            let outputs = match self.deck.create_pair(&format!("pass_{}", pass)) {
                Ok(outputs) => outputs,
                Err(err) => {
                    discard_all(current);
                    return Err(err);
                }
            };

            let written = match merge_pass(&current, &outputs) {
                Ok(written) => written,
                Err(err) => {
                    log::error!("merge pass {} failed: {}", pass, err);
                    discard_all(current);
                    discard_all(outputs);
                    return Err(err);
                }
            };

            log::debug!("merge pass {} done ({} -> {} runs)", pass, current.len(), written);
            self.observer.pass_completed(pass, written);
            discard_all(current);

            let [first, second] = outputs;
            match written {
                0 => {
                    discard_all([first, second]);
                    return Ok(None);
                }
                1 => {
                    second.discard();
                    return Ok(Some(first));
                }
                _ => {
                    current = vec![first, second];
                    pass += 1;
                }
            }
        }
    }
}

fn discard_all(tapes: impl IntoIterator<Item = Tape>) {
    for tape in tapes {
        tape.discard();
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use rand::Rng;
    use rstest::*;

    use super::{merge_by, merge_pass, merge_two, BalancedMerger};
    use crate::observer::test::RecordingObserver;
    use crate::tape::{Tape, TapeDeck, TapeError};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn read_all(tape: &Tape) -> Vec<Vec<i64>> {
        let mut reader = tape.open_for_read().unwrap();
        let mut runs = Vec::new();
        while let Some(run) = reader.read_next_run().unwrap() {
            runs.push(run);
        }
        runs
    }

    fn tapes_with(deck: &TapeDeck, contents: Vec<Vec<Vec<i64>>>) -> Vec<Tape> {
        contents
            .into_iter()
            .map(|runs| {
                let tape = deck.create("initial").unwrap();
                for run in runs {
                    tape.append_run(&run).unwrap();
                }
                tape
            })
            .collect()
    }

    #[rstest]
    #[case(vec![], vec![], vec![])]
    #[case(vec![1, 3], vec![], vec![1, 3])]
    #[case(vec![], vec![2], vec![2])]
    #[case(vec![3, 5, 8], vec![1, 2, 9], vec![1, 2, 3, 5, 8, 9])]
    #[case(vec![1, 2, 3], vec![4, 5], vec![1, 2, 3, 4, 5])]
    #[case(vec![4, 4], vec![4, 4], vec![4, 4, 4, 4])]
    #[case(vec![-7, 0, 0, 12], vec![-7, 0, 11], vec![-7, -7, 0, 0, 0, 11, 12])]
    fn test_merge_two(#[case] a: Vec<i64>, #[case] b: Vec<i64>, #[case] expected: Vec<i64>) {
        assert_eq!(merge_two(&a, &b), expected);
    }

    #[test]
    fn test_merge_is_stable() {
        let a = vec![(1, 'a'), (2, 'a'), (2, 'a'), (5, 'a')];
        let b = vec![(2, 'b'), (3, 'b'), (5, 'b')];

        let merged = merge_by(&a, &b, |x, y| x.0 <= y.0);

        assert_eq!(
            merged,
            vec![(1, 'a'), (2, 'a'), (2, 'a'), (2, 'b'), (3, 'b'), (5, 'a'), (5, 'b')]
        );
    }

    #[test]
    fn test_merge_two_random() {
        let mut rng = rand::thread_rng();
        let mut a: Vec<i64> = (0..rng.gen_range(0..100)).map(|_| rng.gen_range(-50..50)).collect();
        let mut b: Vec<i64> = (0..rng.gen_range(0..100)).map(|_| rng.gen_range(-50..50)).collect();
        a.sort();
        b.sort();

        let merged = merge_two(&a, &b);

        let mut expected = [a, b].concat();
        expected.sort();
        assert_eq!(merged, expected);
    }

    #[rstest]
    fn test_merge_pass_odd_runs(tmp_dir: tempfile::TempDir) {
        let deck = TapeDeck::new(tmp_dir.path(), None);
        let inputs = tapes_with(
            &deck,
            vec![
                vec![vec![3, 5, 8], vec![7], vec![0, 10]],
                vec![vec![1, 2, 9]],
            ],
        );
        let outputs = deck.create_pair("pass_1").unwrap();

        let written = merge_pass(&inputs, &outputs).unwrap();

        assert_eq!(written, 3);
        assert_eq!(read_all(&outputs[0]), vec![vec![1, 2, 3, 5, 8, 9], vec![0, 10]]);
        assert_eq!(read_all(&outputs[1]), vec![vec![7]]);
    }

    #[rstest]
    fn test_merge_pass_keeps_every_input(tmp_dir: tempfile::TempDir) {
        let deck = TapeDeck::new(tmp_dir.path(), None);
        let inputs = tapes_with(&deck, vec![vec![vec![1, 4]], vec![vec![2, 5]], vec![vec![3, 6]]]);
        let outputs = deck.create_pair("pass_1").unwrap();

        let written = merge_pass(&inputs, &outputs).unwrap();

        assert_eq!(written, 1);
        assert_eq!(read_all(&outputs[0]), vec![vec![1, 2, 3, 4, 5, 6]]);
        assert!(read_all(&outputs[1]).is_empty());
    }

    #[rstest]
    #[case(vec![vec![vec![3, 5, 8], vec![7]], vec![vec![1, 2, 9]]], 3, vec![1, 2, 3, 5, 7, 8, 9], vec![2, 1])]
    #[case(vec![vec![vec![4, 4]], vec![vec![4, 4]]], 2, vec![4, 4, 4, 4], vec![1])]
    #[case(vec![vec![vec![42]], vec![]], 1, vec![42], vec![1])]
    #[case(
        vec![vec![vec![1], vec![3], vec![5], vec![7], vec![9]], vec![vec![2], vec![4], vec![6], vec![8]]],
        9,
        vec![1, 2, 3, 4, 5, 6, 7, 8, 9],
        vec![5, 3, 2, 1],
    )]
    fn test_balanced_merge(
        tmp_dir: tempfile::TempDir,
        #[case] initial: Vec<Vec<Vec<i64>>>,
        #[case] runs: usize,
        #[case] expected: Vec<i64>,
        #[case] expected_passes: Vec<usize>,
    ) {
        let deck = TapeDeck::new(tmp_dir.path(), None);
        let observer = RecordingObserver::default();
        let initial = tapes_with(&deck, initial);

        let merger = BalancedMerger::new(&deck, &observer);
        let result = merger.merge(initial, runs).unwrap().unwrap();

        assert_eq!(read_all(&result), vec![expected]);
        assert_eq!(observer.passes(), expected_passes);

        // only the final tape survives
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 1);
    }

    #[rstest]
    fn test_balanced_merge_without_runs(tmp_dir: tempfile::TempDir) {
        let deck = TapeDeck::new(tmp_dir.path(), None);
        let observer = RecordingObserver::default();
        let initial = Vec::from(deck.create_pair("initial").unwrap());

        let result = BalancedMerger::new(&deck, &observer).merge(initial, 0).unwrap();

        assert!(result.is_none());
        assert!(observer.passes().is_empty());
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_corrupted_tape_aborts_merge(tmp_dir: tempfile::TempDir) {
        let deck = TapeDeck::new(tmp_dir.path(), None);
        let observer = RecordingObserver::default();
        let initial = tapes_with(&deck, vec![vec![vec![1, 300, 70000]], vec![vec![2, 3]]]);

        let path = initial[0].path().to_path_buf();
        let len = fs::metadata(&path).unwrap().len();
        fs::OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 2).unwrap();

        let result = BalancedMerger::new(&deck, &observer).merge(initial, 2);

        assert!(matches!(result, Err(TapeError::Corrupted { .. })));
        assert!(observer.passes().is_empty());
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }
}
