use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::Result;
use crate::io::file::FileIo;
use crate::pool::BufferPool;
use crate::program::RequestRange;
use crate::types::VertexId;

/// What a completed read feeds back into: the vertex's own adjacency list
/// or an auxiliary neighbor fetch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum CompletionKind {
    OwnAdjacency,
    Neighbors,
}

/// Identifies the vertex program a completion belongs to.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Token {
    pub vertex: VertexId,
    pub kind: CompletionKind,
}

pub(crate) struct Completion {
    pub token: Token,
    pub result: Result<Vec<u8>>,
}

pub(crate) struct Job {
    pub range: RequestRange,
    pub token: Token,
    pub reply: mpsc::Sender<Completion>,
}

/// Shared pool of read threads servicing all workers' adjacency fetches.
/// Buffers come from a recycler and travel to the requesting worker inside
/// the completion; the worker releases them after dispatch.
pub(crate) struct IoPool {
    submit: Option<mpsc::Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
}

impl IoPool {
    pub fn spawn(file: Arc<dyn FileIo>, buffers: Arc<BufferPool>, num_threads: usize) -> Self {
        let (submit, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let threads = (0..num_threads)
            .map(|idx| {
                let rx = rx.clone();
                let file = file.clone();
                let buffers = buffers.clone();
                thread::spawn(move || read_loop(idx, rx, file, buffers))
            })
            .collect();
        Self {
            submit: Some(submit),
            threads,
        }
    }

    pub fn submitter(&self) -> mpsc::Sender<Job> {
        self.submit
            .as_ref()
            .expect("io pool already shut down")
            .clone()
    }

    /// Drops the submit side and joins the read threads. Callers must have
    /// dropped their submitter clones first (workers do so on exit).
    pub fn shutdown(&mut self) {
        self.submit.take();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop(
    idx: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    file: Arc<dyn FileIo>,
    buffers: Arc<BufferPool>,
) {
    loop {
        let job = {
            let guard = rx.lock();
            guard.recv()
        };
        let Ok(job) = job else {
            break;
        };
        let mut buf = buffers.acquire();
        buf.resize(job.range.len as usize, 0);
        let result = match file.read_at(job.range.offset, &mut buf) {
            Ok(()) => Ok(buf),
            Err(err) => {
                error!(
                    offset = job.range.offset,
                    len = job.range.len,
                    %err,
                    "io.pool.read_failed"
                );
                buffers.release(buf);
                Err(err)
            }
        };
        let _ = job.reply.send(Completion {
            token: job.token,
            result,
        });
    }
    debug!(thread = idx, "io.pool.thread_exit");
}
