//! Concurrent build scheduler.
//!
//! ```text
//! producer ──bounded(2 × workers)──▶ worker × N ──▶ output/
//!    │                                  │
//!    └──────────── CancelToken ◀────────┘ (first error)
//! ```
//!
//! One producer walks the content tree in sorted order and feeds the files
//! selected for rebuilding into a bounded channel; workers pull jobs until
//! the channel closes or the build is canceled. Any error cancels the whole
//! build and only the first one is reported.

mod cancel;
mod worker;

use parking_lot::Mutex;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crossbeam::channel;

use crate::error::{BuildError, Result};
use crate::freshness::RebuildSet;
use crate::logger::ProgressLine;
use crate::output::WriteOutcome;
use crate::utils::path::is_underscored;
use crate::utils::walk::collect_files;
use crate::debug;

pub use cancel::CancelToken;
pub use worker::Stage;
use worker::{Job, Processed, counter_for};

/// Scheduler lifecycle, reported in verbose mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Dispatching,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// Counts for one scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    /// Pages written (created or updated).
    pub rendered: usize,
    /// Assets written (created or updated).
    pub copied: usize,
    /// Processed files whose output was already up to date.
    pub unchanged: usize,
}

impl ScheduleStats {
    pub fn processed(&self) -> usize {
        self.rendered + self.copied + self.unchanged
    }
}

#[derive(Default)]
struct Counters {
    rendered: AtomicUsize,
    copied: AtomicUsize,
    unchanged: AtomicUsize,
}

impl Counters {
    fn record(&self, processed: Processed) {
        let counter = match processed {
            Processed::Page(WriteOutcome::Unchanged) | Processed::Asset(WriteOutcome::Unchanged) => {
                &self.unchanged
            }
            Processed::Page(_) => &self.rendered,
            Processed::Asset(_) => &self.copied,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ScheduleStats {
        ScheduleStats {
            rendered: self.rendered.load(Ordering::Relaxed),
            copied: self.copied.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
        }
    }
}

/// Holds the first error of a run and cancels everyone else.
struct FirstError<'a> {
    slot: Mutex<Option<BuildError>>,
    cancel: &'a CancelToken,
}

impl<'a> FirstError<'a> {
    fn new(cancel: &'a CancelToken) -> Self {
        Self {
            slot: Mutex::new(None),
            cancel,
        }
    }

    fn report(&self, err: BuildError) {
        let mut slot = self.slot.lock();
        match &*slot {
            None => *slot = Some(err),
            Some(_) => debug!("build"; "dropping later error: {err}"),
        }
        drop(slot);
        self.cancel.cancel();
    }

    fn take(&self) -> Option<BuildError> {
        self.slot.lock().take()
    }
}

/// Runs a [`Stage`] over the selected files with a pool of workers.
pub struct Scheduler<'a> {
    stage: Stage<'a>,
    workers: usize,
    progress: bool,
}

impl<'a> Scheduler<'a> {
    /// `workers` must be at least 1.
    pub fn new(stage: Stage<'a>, workers: usize) -> Self {
        Self {
            stage,
            workers,
            progress: false,
        }
    }

    /// Show a progress line while running.
    pub fn progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Process every selected, non-underscored file under the content
    /// directory.
    ///
    /// Returns the first error if any job failed, or `Canceled` if `cancel`
    /// was triggered from outside.
    pub fn run(&self, cancel: &CancelToken) -> Result<ScheduleStats> {
        if self.workers == 0 {
            return Err(BuildError::Config("workers must be at least 1".into()));
        }
        let jobs = self.jobs(self.stage.rebuild)?;
        let mut state = State::Idle;
        transition(&mut state, State::Dispatching);

        let progress = self.progress.then(|| {
            let pages = jobs.iter().filter(|p| counter_for(p) == "pages").count();
            ProgressLine::new(&[("pages", pages), ("assets", jobs.len() - pages)])
        });

        let errors = FirstError::new(cancel);
        let counters = Counters::default();
        let (tx, rx) = channel::bounded::<Job>(2 * self.workers);

        thread::scope(|s| {
            for id in 0..self.workers {
                let rx = rx.clone();
                let (errors, counters, progress) = (&errors, &counters, progress.as_ref());
                s.spawn(move || {
                    loop {
                        if cancel.is_canceled() {
                            break;
                        }
                        let job = crossbeam::select! {
                            recv(rx) -> job => job.ok(),
                            recv(cancel.receiver()) -> _ => None,
                        };
                        let Some(job) = job else { break };

                        let counter = counter_for(&job.source);
                        match self.stage.process(job, cancel) {
                            Ok(processed) => {
                                counters.record(processed);
                                if let Some(progress) = progress {
                                    progress.inc(counter);
                                }
                            }
                            Err(e) => {
                                errors.report(e);
                                break;
                            }
                        }
                    }
                    debug!("build"; "worker {id} exiting");
                });
            }
            drop(rx);

            // Producer: runs on the scope's own thread.
            for path in jobs {
                if cancel.is_canceled() {
                    break;
                }
                let content = match fs::read(&path) {
                    Ok(content) => content,
                    Err(e) => {
                        errors.report(BuildError::io("read", &path, e));
                        break;
                    }
                };
                let job = Job {
                    source: path,
                    content,
                };
                let sent = crossbeam::select! {
                    send(tx, job) -> res => res.is_ok(),
                    recv(cancel.receiver()) -> _ => false,
                };
                if !sent {
                    break;
                }
            }
            drop(tx);
            transition(&mut state, State::Draining);
        });

        if let Some(progress) = progress {
            progress.finish();
        }

        let stats = counters.snapshot();
        let failure = errors
            .take()
            .or_else(|| cancel.is_canceled().then_some(BuildError::Canceled));
        match failure {
            Some(err) => {
                transition(&mut state, State::Failed);
                Err(err)
            }
            None => {
                transition(&mut state, State::Done);
                Ok(stats)
            }
        }
    }

    /// Files to process, in walk order.
    fn jobs(&self, rebuild: &RebuildSet) -> Result<Vec<PathBuf>> {
        let files = collect_files(self.stage.content_dir)?;
        Ok(files
            .into_iter()
            .filter(|path| !is_underscored(path) && rebuild.contains(path))
            .collect())
    }
}

fn transition(state: &mut State, next: State) {
    debug!("build"; "scheduler {state} → {next}");
    *state = next;
}
