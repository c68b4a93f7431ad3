//! Cluster backend.
//!
//! Jobs are sent to `cellanneal serve` processes over TCP. Each job opens
//! one connection and exchanges exactly one line of JSON in each
//! direction: a [`JobRequest`] and a [`JobResponse`]. Workers read the
//! frame from `frame_path`, so the frame files must be reachable from
//! every worker host under the same path.

use crate::cell::Cell;
use crate::colony::Colony;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::temperature::TemperatureSchedule;
use crate::worker::{run_job, WorkerSettings};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
/// How often a client waiting on a reply checks for cancellation.
const REPLY_POLL: Duration = Duration::from_millis(100);

/// One job shipped to a worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: usize,
    pub frame_path: PathBuf,
    pub cells: Vec<Cell>,
    pub schedule: TemperatureSchedule,
    pub rng_seed: u64,
    pub settings: WorkerSettings,
}

/// A worker's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobResponse {
    Done {
        job_id: usize,
        cells: Vec<Cell>,
        cost: f64,
    },
    Failed {
        job_id: usize,
        message: String,
    },
}

/// Client side: the list of worker addresses, used round-robin by job id.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    workers: Vec<String>,
}

impl ClusterClient {
    /// Parses a comma-separated list of `host:port` addresses.
    pub fn parse(list: &str) -> Result<Self> {
        let workers: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if workers.is_empty() {
            return Err(Error::config("cluster address list is empty"));
        }
        if let Some(bad) = workers.iter().find(|w| !w.contains(':')) {
            return Err(Error::config(format!(
                "cluster address \"{bad}\" is not of the form host:port"
            )));
        }
        Ok(Self { workers })
    }

    pub fn workers(&self) -> &[String] {
        &self.workers
    }

    /// The worker that receives job `job_id`.
    pub fn worker_for(&self, job_id: usize) -> &str {
        &self.workers[job_id % self.workers.len()]
    }

    /// Sends one job and waits for its reply.
    ///
    /// Returns [`Error::Interrupted`] once `cancel` is raised while the
    /// worker is still busy; the remote job is abandoned.
    pub fn submit(&self, request: &JobRequest, cancel: &AtomicBool) -> Result<(Vec<Cell>, f64)> {
        let addr = self.worker_for(request.job_id);
        let cluster_err = |e: std::io::Error| Error::Cluster(format!("{addr}: {e}"));

        let mut stream = TcpStream::connect(addr).map_err(cluster_err)?;
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        stream.write_all(&line).map_err(cluster_err)?;
        stream.flush().map_err(cluster_err)?;
        stream
            .set_read_timeout(Some(REPLY_POLL))
            .map_err(cluster_err)?;

        let mut reader = BufReader::new(&stream);
        let mut reply = Vec::new();
        loop {
            match reader.read_until(b'\n', &mut reply) {
                Ok(_) => break,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if cancel.load(Ordering::Relaxed) {
                        return Err(Error::Interrupted);
                    }
                }
                Err(e) => return Err(cluster_err(e)),
            }
        }
        if reply.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Cluster(format!("{addr}: connection closed")));
        }

        match serde_json::from_slice(&reply)? {
            JobResponse::Done { cells, cost, .. } => {
                tracing::debug!(worker = addr, job_id = request.job_id, cost, "remote job done");
                Ok((cells, cost))
            }
            JobResponse::Failed { message, .. } => {
                Err(Error::Cluster(format!("{addr}: {message}")))
            }
        }
    }
}

/// Runs a request on this process.
pub fn execute(request: JobRequest, cancel: &Arc<AtomicBool>) -> JobResponse {
    let job_id = request.job_id;
    let outcome = Frame::open(&request.frame_path).and_then(|frame| {
        let seed = Colony::from_cells(request.cells)?;
        run_job(
            &request.settings,
            &frame,
            &seed,
            request.schedule,
            job_id,
            request.rng_seed,
            Some(Arc::clone(cancel)),
        )
    });
    match outcome {
        Ok(result) => JobResponse::Done {
            job_id,
            cells: result.colony.to_cells(),
            cost: result.cost,
        },
        Err(e) => JobResponse::Failed {
            job_id,
            message: e.to_string(),
        },
    }
}

/// Server side of the cluster protocol.
pub struct WorkerServer {
    listener: TcpListener,
}

impl WorkerServer {
    pub fn bind(addr: &str) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|e| Error::Cluster(format!("bind {addr}: {e}")))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| Error::Cluster(e.to_string()))
    }

    /// Accepts connections until `cancel` is raised. Each connection is
    /// served on its own thread.
    pub fn run(self, cancel: Arc<AtomicBool>) -> Result<()> {
        let io_err = |e: std::io::Error| Error::Cluster(e.to_string());
        self.listener.set_nonblocking(true).map_err(io_err)?;
        tracing::info!(addr = %self.local_addr()?, "worker listening");

        while !cancel.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false).map_err(io_err)?;
                    let cancel = Arc::clone(&cancel);
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &cancel) {
                            tracing::warn!(%peer, error = %e, "connection failed");
                        }
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => return Err(io_err(e)),
            }
        }
        tracing::info!("worker stopped");
        Ok(())
    }
}

fn handle_connection(stream: TcpStream, cancel: &Arc<AtomicBool>) -> Result<()> {
    let io_err = |e: std::io::Error| Error::Cluster(e.to_string());
    let mut line = String::new();
    BufReader::new(&stream).read_line(&mut line).map_err(io_err)?;

    let response = match serde_json::from_str::<JobRequest>(&line) {
        Ok(request) => {
            tracing::debug!(
                job_id = request.job_id,
                frame = %request.frame_path.display(),
                "job received"
            );
            execute(request, cancel)
        }
        Err(e) => JobResponse::Failed {
            job_id: 0,
            message: format!("malformed request: {e}"),
        },
    };

    let mut reply = serde_json::to_string(&response)?;
    reply.push('\n');
    (&stream).write_all(reply.as_bytes()).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::tests::{colony, settings, target};

    fn request(frame_path: PathBuf) -> JobRequest {
        JobRequest {
            job_id: 1,
            frame_path,
            cells: colony(&[("a", 18.0, 11.0)]).to_cells(),
            schedule: TemperatureSchedule::new(10.0, 0.05),
            rng_seed: 42,
            settings: settings(),
        }
    }

    #[test]
    fn test_parse_addresses() {
        let client = ClusterClient::parse("a:1, b:2,,c:3").unwrap();
        assert_eq!(client.workers(), ["a:1", "b:2", "c:3"]);
        assert_eq!(client.worker_for(4), "b:2");
        assert!(ClusterClient::parse(" , ").is_err());
        assert!(ClusterClient::parse("localhost").is_err());
    }

    #[test]
    fn test_response_wire_format() {
        let json = serde_json::to_string(&JobResponse::Failed {
            job_id: 3,
            message: "x".into(),
        })
        .unwrap();
        assert!(json.contains("\"status\":\"failed\""));
    }

    #[test]
    fn test_execute_missing_frame() {
        let cancel = Arc::new(AtomicBool::new(false));
        let response = execute(request(PathBuf::from("/nonexistent/frame.png")), &cancel);
        assert!(matches!(response, JobResponse::Failed { job_id: 1, .. }));
    }

    #[test]
    fn test_submit_interrupted_while_waiting() {
        // accepts connections into the backlog but never answers
        let silent = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = ClusterClient::parse(&silent.local_addr().unwrap().to_string()).unwrap();
        let cancel = AtomicBool::new(true);
        let result = client.submit(&request(PathBuf::from("frame.png")), &cancel);
        assert!(matches!(result, Err(Error::Interrupted)));
    }

    #[test]
    fn test_remote_matches_local() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let frame = target(&[("a", 20.0, 12.0)]);
        frame.save_png(&path).unwrap();

        let server = WorkerServer::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = {
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || server.run(cancel))
        };

        let client = ClusterClient::parse(&addr.to_string()).unwrap();
        let request = request(path.clone());
        let (cells, cost) = client.submit(&request, &AtomicBool::new(false)).unwrap();

        let local = run_job(
            &request.settings,
            &Frame::open(&path).unwrap(),
            &Colony::from_cells(request.cells.clone()).unwrap(),
            request.schedule,
            1,
            42,
            None,
        )
        .unwrap();
        assert_eq!(cost, local.cost);
        assert_eq!(cells, local.colony.to_cells());

        cancel.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }
}
