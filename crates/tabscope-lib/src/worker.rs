//! Background column profiling.
//!
//! A job captures everything it needs (table handle, column schemas and the
//! filtered rows) when it is submitted, so later filter or table changes do
//! not affect results already in flight.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::backend::TableBackend;
use crate::comm::{ColumnProfileResult, ColumnProfileSpec, ColumnSchema, ExplorerEvent, FormatOptions};
use crate::profile::{compute_column_profile, ProfileDefaults};

/// One column of a profile job. `schema` is `None` when the requested column
/// does not exist; its result is left empty.
#[derive(Debug, Clone)]
pub struct ColumnJob {
    pub schema: Option<ColumnSchema>,
    pub specs: Vec<ColumnProfileSpec>,
}

#[derive(Debug, Clone)]
pub struct ProfileJob {
    pub callback_id: String,
    pub backend: Arc<dyn TableBackend>,
    pub rows: Option<Arc<Vec<usize>>>,
    pub columns: Vec<ColumnJob>,
    pub format_options: FormatOptions,
    pub defaults: ProfileDefaults,
}

impl ProfileJob {
    /// Results aligned with `columns`.
    pub fn run(&self) -> Vec<ColumnProfileResult> {
        let rows = self.rows.as_deref().map(Vec::as_slice);
        self.columns
            .iter()
            .map(|column| match &column.schema {
                Some(schema) => compute_column_profile(
                    self.backend.as_ref(),
                    schema,
                    rows,
                    &column.specs,
                    &self.format_options,
                    &self.defaults,
                ),
                None => ColumnProfileResult::default(),
            })
            .collect()
    }

    pub fn into_event(self) -> ExplorerEvent {
        let profiles = self.run();
        ExplorerEvent::ColumnProfilesReady {
            callback_id: self.callback_id,
            profiles,
        }
    }
}

/// Single background thread that runs profile jobs in submission order.
#[derive(Debug)]
pub struct ProfileWorker {
    jobs: Option<Sender<ProfileJob>>,
    handle: Option<JoinHandle<()>>,
}

impl ProfileWorker {
    pub fn spawn(events: Sender<ExplorerEvent>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<ProfileJob>();
        let handle = thread::Builder::new()
            .name("tabscope-profiles".to_string())
            .spawn(move || {
                for job in rx {
                    let callback_id = job.callback_id.clone();
                    debug!(%callback_id, columns = job.columns.len(), "computing column profiles");
                    if events.send(job.into_event()).is_err() {
                        debug!(%callback_id, "event receiver gone; stopping profile worker");
                        break;
                    }
                }
            })?;
        Ok(Self {
            jobs: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue `job`. Hands the job back if the worker has stopped.
    pub fn submit(&self, job: ProfileJob) -> Result<(), ProfileJob> {
        match &self.jobs {
            Some(tx) => tx.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }
}

impl Drop for ProfileWorker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("profile worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PolarsBackend;
    use crate::comm::{ColumnDisplayType, ColumnProfileType};
    use polars::prelude::*;
    use std::time::Duration;

    fn job(callback_id: &str, rows: Option<Vec<usize>>) -> ProfileJob {
        let backend: Arc<dyn TableBackend> = Arc::new(PolarsBackend::new(
            df!("n" => &[Some(1i64), None, Some(3), None]).unwrap(),
        ));
        ProfileJob {
            callback_id: callback_id.to_string(),
            backend,
            rows: rows.map(Arc::new),
            columns: vec![
                ColumnJob {
                    schema: Some(ColumnSchema {
                        column_index: 0,
                        column_name: "n".to_string(),
                        type_name: "i64".to_string(),
                        type_display: ColumnDisplayType::Number,
                        timezone: None,
                    }),
                    specs: vec![ColumnProfileSpec::new(ColumnProfileType::NullCount)],
                },
                ColumnJob {
                    schema: None,
                    specs: vec![ColumnProfileSpec::new(ColumnProfileType::NullCount)],
                },
            ],
            format_options: FormatOptions::default(),
            defaults: ProfileDefaults::default(),
        }
    }

    #[test]
    fn results_arrive_in_submission_order() {
        let (tx, rx) = mpsc::channel();
        let worker = ProfileWorker::spawn(tx).unwrap();
        worker.submit(job("first", None)).unwrap();
        worker.submit(job("second", Some(vec![0, 1]))).unwrap();

        let timeout = Duration::from_secs(10);
        match rx.recv_timeout(timeout).unwrap() {
            ExplorerEvent::ColumnProfilesReady {
                callback_id,
                profiles,
            } => {
                assert_eq!(callback_id, "first");
                assert_eq!(profiles[0].null_count, Some(2));
                assert_eq!(profiles[1], ColumnProfileResult::default());
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv_timeout(timeout).unwrap() {
            ExplorerEvent::ColumnProfilesReady {
                callback_id,
                profiles,
            } => {
                assert_eq!(callback_id, "second");
                assert_eq!(profiles[0].null_count, Some(1));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn drop_joins_worker() {
        let (tx, rx) = mpsc::channel();
        let worker = ProfileWorker::spawn(tx).unwrap();
        worker.submit(job("only", None)).unwrap();
        drop(worker);
        assert!(matches!(
            rx.try_recv(),
            Ok(ExplorerEvent::ColumnProfilesReady { .. })
        ));
    }
}
