//! Sort progress observers.

use log;

/// Sort progress observer. Methods are invoked at run and pass boundaries and while the k-way merge is consumed;
/// all of them do nothing by default.
pub trait SortObserver {
    /// A sorted run of `len` elements has been persisted. Runs are numbered from zero.
    fn run_created(&self, index: usize, len: usize) {
        let _ = (index, len);
    }

    /// Run generation finished producing `count` runs.
    fn runs_generated(&self, count: usize) {
        let _ = count;
    }

    /// A merge pass (numbered from one) finished writing `runs` runs.
    fn pass_completed(&self, pass: usize, runs: usize) {
        let _ = (pass, runs);
    }

    /// The k-way merge has emitted `count` elements so far. Invoked once per thousand elements.
    fn merged(&self, count: usize) {
        let _ = count;
    }

    /// The k-way merge is exhausted after emitting `total` elements.
    fn merge_completed(&self, total: usize) {
        let _ = total;
    }
}

/// Observer ignoring all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SortObserver for NoopObserver {}

/// Observer reporting progress through the `log` facade.
#[derive(Debug, Clone, Copy)]
pub struct LogObserver {
    /// Every `run_report_interval`-th run is reported at info level, the rest at trace level.
    run_report_interval: usize,
}

impl LogObserver {
    pub fn new(run_report_interval: usize) -> Self {
        LogObserver {
            run_report_interval: run_report_interval.max(1),
        }
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        LogObserver::new(100)
    }
}

impl SortObserver for LogObserver {
    fn run_created(&self, index: usize, len: usize) {
        if (index + 1) % self.run_report_interval == 0 {
            log::info!("{} runs created", index + 1);
        } else {
            log::trace!("run {} created ({} elements)", index, len);
        }
    }

    fn runs_generated(&self, count: usize) {
        log::info!("created {} initial runs", count);
    }

    fn pass_completed(&self, pass: usize, runs: usize) {
        log::info!("pass {}: {} runs written", pass, runs);
    }

    fn merged(&self, count: usize) {
        log::info!("{} elements merged", count);
    }

    fn merge_completed(&self, total: usize) {
        log::info!("merge done, {} elements in total", total);
    }
}

impl<O: SortObserver + ?Sized> SortObserver for std::rc::Rc<O> {
    fn run_created(&self, index: usize, len: usize) {
        (**self).run_created(index, len)
    }

    fn runs_generated(&self, count: usize) {
        (**self).runs_generated(count)
    }

    fn pass_completed(&self, pass: usize, runs: usize) {
        (**self).pass_completed(pass, runs)
    }

    fn merged(&self, count: usize) {
        (**self).merged(count)
    }

    fn merge_completed(&self, total: usize) {
        (**self).merge_completed(total)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::cell::RefCell;

    use super::SortObserver;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Event {
        Run(usize, usize),
        Generated(usize),
        Pass(usize, usize),
        Merged(usize),
        MergeCompleted(usize),
    }

    /// Observer recording every event it receives.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub(crate) events: RefCell<Vec<Event>>,
    }

    impl RecordingObserver {
        pub(crate) fn runs(&self) -> Vec<usize> {
            self.events
                .borrow()
                .iter()
                .filter_map(|event| match event {
                    Event::Run(_, len) => Some(*len),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn passes(&self) -> Vec<usize> {
            self.events
                .borrow()
                .iter()
                .filter_map(|event| match event {
                    Event::Pass(_, runs) => Some(*runs),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn merge_progress(&self) -> Vec<Event> {
            self.events
                .borrow()
                .iter()
                .filter(|event| matches!(event, Event::Merged(_) | Event::MergeCompleted(_)))
                .cloned()
                .collect()
        }
    }

    impl SortObserver for RecordingObserver {
        fn run_created(&self, index: usize, len: usize) {
            self.events.borrow_mut().push(Event::Run(index, len));
        }

        fn runs_generated(&self, count: usize) {
            self.events.borrow_mut().push(Event::Generated(count));
        }

        fn pass_completed(&self, pass: usize, runs: usize) {
            self.events.borrow_mut().push(Event::Pass(pass, runs));
        }

        fn merged(&self, count: usize) {
            self.events.borrow_mut().push(Event::Merged(count));
        }

        fn merge_completed(&self, total: usize) {
            self.events.borrow_mut().push(Event::MergeCompleted(total));
        }
    }
}
