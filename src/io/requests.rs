use std::sync::mpsc;

use crate::io::pool::{Completion, Job, Token};
use crate::program::RequestRange;

/// One worker's outstanding-read table.
///
/// Bounds in-flight requests to `depth` for backpressure: the worker stops
/// taking on new vertices while the table is full, but keeps draining
/// completions so in-flight programs make progress.
pub(crate) struct RequestQueue {
    submit: mpsc::Sender<Job>,
    completions_tx: mpsc::Sender<Completion>,
    completions: mpsc::Receiver<Completion>,
    outstanding: usize,
    depth: usize,
}

impl RequestQueue {
    pub fn new(submit: mpsc::Sender<Job>, depth: usize) -> Self {
        let (completions_tx, completions) = mpsc::channel();
        Self {
            submit,
            completions_tx,
            completions,
            outstanding: 0,
            depth,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.outstanding < self.depth
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn submit(&mut self, range: RequestRange, token: Token) {
        self.outstanding += 1;
        let job = Job {
            range,
            token,
            reply: self.completions_tx.clone(),
        };
        // the pool is shut down only after all workers exit
        self.submit.send(job).expect("io pool disconnected");
    }

    /// Non-blocking poll for one finished read.
    pub fn try_complete(&mut self) -> Option<Completion> {
        match self.completions.try_recv() {
            Ok(completion) => {
                self.outstanding -= 1;
                Some(completion)
            }
            Err(_) => None,
        }
    }

    /// Blocks for one finished read. Returns None when nothing is in
    /// flight or the pool is gone.
    pub fn wait_complete(&mut self) -> Option<Completion> {
        if self.outstanding == 0 {
            return None;
        }
        match self.completions.recv() {
            Ok(completion) => {
                self.outstanding -= 1;
                Some(completion)
            }
            Err(_) => None,
        }
    }
}
