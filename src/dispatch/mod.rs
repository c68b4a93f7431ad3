//! Job dispatch.
//!
//! Fans the J jobs of one frame out over an execution backend and collects
//! whatever succeeds:
//!
//! - `Sequential`: every job on the calling thread (`no_parallel`)
//! - `Local`: a rayon thread pool with `workers` threads
//! - `Cluster`: remote `cellanneal serve` processes, at most `workers`
//!   requests in flight (see [`cluster`])
//!
//! The backend lives as long as the dispatcher and is released when it is
//! dropped. Each job receives its own copy of the seed colony and its own
//! RNG stream derived from the run seed, the frame index and the job index.

pub mod cluster;

use crate::colony::Colony;
use crate::config::OptimizerParams;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::rng::derive_seed;
use crate::temperature::TemperatureSchedule;
use crate::worker::{run_job, JobResult, WorkerSettings};
use cluster::{ClusterClient, JobRequest};
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One frame handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct FrameInput {
    /// Position of the frame in the run (0 for the first processed frame).
    pub index: usize,
    /// Source file. Required by the cluster backend.
    pub path: Option<PathBuf>,
    pub image: Arc<Frame>,
}

impl FrameInput {
    pub fn new(index: usize, path: Option<PathBuf>, image: Frame) -> Self {
        Self {
            index,
            path,
            image: Arc::new(image),
        }
    }
}

enum Backend {
    Sequential,
    Local(rayon::ThreadPool),
    Cluster {
        client: ClusterClient,
        slots: rayon::ThreadPool,
    },
}

/// Runs the jobs of each frame on the configured backend.
pub struct JobDispatcher {
    backend: Backend,
    jobs: usize,
    run_seed: u64,
    settings: Arc<WorkerSettings>,
    cancel: Arc<AtomicBool>,
}

fn thread_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("cellanneal-worker-{i}"))
        .build()
        .map_err(|e| Error::config(format!("cannot start worker pool: {e}")))
}

impl JobDispatcher {
    /// Acquires the backend selected by `params`.
    pub fn new(
        params: &OptimizerParams,
        settings: WorkerSettings,
        run_seed: u64,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self> {
        let workers = params.resolved_workers();
        let jobs = params.resolved_jobs()?;
        let backend = if params.no_parallel {
            Backend::Sequential
        } else if !params.cluster.trim().is_empty() {
            Backend::Cluster {
                client: ClusterClient::parse(&params.cluster)?,
                slots: thread_pool(workers)?,
            }
        } else {
            Backend::Local(thread_pool(workers)?)
        };

        tracing::info!(
            backend = Self::describe(&backend),
            workers,
            jobs,
            "job dispatcher ready"
        );
        Ok(Self {
            backend,
            jobs,
            run_seed,
            settings: Arc::new(settings),
            cancel,
        })
    }

    fn describe(backend: &Backend) -> &'static str {
        match backend {
            Backend::Sequential => "sequential",
            Backend::Local(_) => "local",
            Backend::Cluster { .. } => "cluster",
        }
    }

    pub fn backend_name(&self) -> &'static str {
        Self::describe(&self.backend)
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Runs all jobs of `frame` and returns the results that succeeded.
    ///
    /// Failed jobs are logged and excluded. Fails with
    /// [`Error::AllJobsFailed`] when none succeeds and with
    /// [`Error::Interrupted`] when cancelled.
    pub fn run_frame(
        &self,
        frame: &FrameInput,
        seed: &Colony,
        schedule: TemperatureSchedule,
    ) -> Result<Vec<JobResult>> {
        let run = |job: usize| self.run_local(frame, seed, schedule, job);

        let outcomes: Vec<Result<JobResult>> = match &self.backend {
            Backend::Sequential => (0..self.jobs).map(run).collect(),
            Backend::Local(pool) => {
                pool.install(|| (0..self.jobs).into_par_iter().map(run).collect())
            }
            Backend::Cluster { client, slots } => slots.install(|| {
                (0..self.jobs)
                    .into_par_iter()
                    .map(|job| self.run_remote(client, frame, seed, schedule, job))
                    .collect()
            }),
        };

        let mut results = Vec::with_capacity(outcomes.len());
        let mut interrupted = false;
        for (job, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(result) => results.push(result),
                Err(Error::Interrupted) => interrupted = true,
                Err(e) => tracing::warn!(
                    frame = frame.index,
                    job,
                    error = %e,
                    "job failed; excluded from aggregation"
                ),
            }
        }

        if interrupted || self.cancelled() {
            return Err(Error::Interrupted);
        }
        if results.is_empty() {
            return Err(Error::AllJobsFailed {
                frame: frame.index,
                jobs: self.jobs,
            });
        }
        Ok(results)
    }

    fn run_local(
        &self,
        frame: &FrameInput,
        seed: &Colony,
        schedule: TemperatureSchedule,
        job: usize,
    ) -> Result<JobResult> {
        if self.cancelled() {
            return Err(Error::Interrupted);
        }
        let rng_seed = derive_seed(self.run_seed, frame.index, job);
        let cancel = Some(Arc::clone(&self.cancel));
        catch_unwind(AssertUnwindSafe(|| {
            run_job(
                &self.settings,
                &frame.image,
                seed,
                schedule,
                job,
                rng_seed,
                cancel,
            )
        }))
        .unwrap_or_else(|panic| {
            Err(Error::JobFailed {
                job,
                reason: panic_message(&panic),
            })
        })
    }

    fn run_remote(
        &self,
        client: &ClusterClient,
        frame: &FrameInput,
        seed: &Colony,
        schedule: TemperatureSchedule,
        job: usize,
    ) -> Result<JobResult> {
        if self.cancelled() {
            return Err(Error::Interrupted);
        }
        let frame_path = frame
            .path
            .clone()
            .ok_or_else(|| Error::Cluster("cluster jobs need a frame file path".into()))?;
        let request = JobRequest {
            job_id: job,
            frame_path,
            cells: seed.to_cells(),
            schedule,
            rng_seed: derive_seed(self.run_seed, frame.index, job),
            settings: (*self.settings).clone(),
        };
        let (cells, cost) = client.submit(&request, &self.cancel)?;
        Ok(JobResult {
            colony: Colony::relinked(cells, seed)?,
            cost,
            job_id: job,
        })
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::tests::{colony, settings, target};

    fn params(no_parallel: bool) -> OptimizerParams {
        OptimizerParams::default()
            .with_workers(2)
            .with_jobs(4)
            .with_no_parallel(no_parallel)
    }

    fn frame() -> FrameInput {
        FrameInput::new(0, None, target(&[("a", 20.0, 12.0)]))
    }

    #[test]
    fn test_local_and_sequential_agree() {
        let seed = colony(&[("a", 18.0, 11.0)]);
        let schedule = TemperatureSchedule::new(10.0, 0.05);
        let cancel = Arc::new(AtomicBool::new(false));

        let local = JobDispatcher::new(&params(false), settings(), 9, Arc::clone(&cancel)).unwrap();
        let sequential = JobDispatcher::new(&params(true), settings(), 9, cancel).unwrap();
        assert_eq!(local.backend_name(), "local");
        assert_eq!(sequential.backend_name(), "sequential");

        let a = local.run_frame(&frame(), &seed, schedule).unwrap();
        let b = sequential.run_frame(&frame(), &seed, schedule).unwrap();
        assert_eq!(a.len(), 4);
        let costs_a: Vec<f64> = a.iter().map(|r| r.cost).collect();
        let costs_b: Vec<f64> = b.iter().map(|r| r.cost).collect();
        assert_eq!(costs_a, costs_b);
    }

    #[test]
    fn test_jobs_use_distinct_streams() {
        let seed = colony(&[("a", 14.0, 9.0)]);
        let cancel = Arc::new(AtomicBool::new(false));
        let dispatcher = JobDispatcher::new(&params(true), settings(), 3, cancel).unwrap();
        let results = dispatcher
            .run_frame(&frame(), &seed, TemperatureSchedule::new(50.0, 1.0))
            .unwrap();
        let first = results[0].colony.to_cells();
        assert!(results.iter().skip(1).any(|r| r.colony.to_cells() != first));
    }

    #[test]
    fn test_cancelled_frame_is_interrupted() {
        let seed = colony(&[("a", 18.0, 11.0)]);
        let cancel = Arc::new(AtomicBool::new(true));
        let dispatcher = JobDispatcher::new(&params(false), settings(), 1, cancel).unwrap();
        let result = dispatcher.run_frame(&frame(), &seed, TemperatureSchedule::new(10.0, 0.1));
        assert!(matches!(result, Err(Error::Interrupted)));
    }

    #[test]
    fn test_cluster_without_path_fails_every_job() {
        let seed = colony(&[("a", 18.0, 11.0)]);
        let cancel = Arc::new(AtomicBool::new(false));
        let params = params(false).with_cluster("127.0.0.1:9");
        let dispatcher = JobDispatcher::new(&params, settings(), 1, cancel).unwrap();
        assert_eq!(dispatcher.backend_name(), "cluster");
        let result = dispatcher.run_frame(&frame(), &seed, TemperatureSchedule::new(10.0, 0.1));
        assert!(matches!(result, Err(Error::AllJobsFailed { jobs: 4, .. })));
    }

    #[test]
    fn test_frame_proceeds_on_surviving_jobs() {
        use crate::aggregate::{aggregate, Strategy};
        use cluster::WorkerServer;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        target(&[("a", 20.0, 12.0)]).save_png(&path).unwrap();

        let server = WorkerServer::bind("127.0.0.1:0").unwrap();
        let live = server.local_addr().unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = {
            let cancel = Arc::clone(&cancel);
            std::thread::spawn(move || server.run(cancel))
        };

        // odd jobs go to a port nobody listens on
        let params = params(false).with_cluster(format!("{live},127.0.0.1:9"));
        let dispatcher = JobDispatcher::new(&params, settings(), 5, Arc::clone(&cancel)).unwrap();
        let frame = FrameInput::new(0, Some(path.clone()), Frame::open(&path).unwrap());
        let seed = colony(&[("a", 18.0, 11.0)]);
        let results = dispatcher
            .run_frame(&frame, &seed, TemperatureSchedule::new(10.0, 0.05))
            .unwrap();

        let jobs: Vec<usize> = results.iter().map(|r| r.job_id).collect();
        assert_eq!(jobs, [0, 2]);
        let selected = aggregate(results, 2, Strategy::BestWins, 0).unwrap();
        assert!(jobs.contains(&selected.job_id));

        cancel.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_panic_message() {
        let panic = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(&panic), "boom");
    }
}
