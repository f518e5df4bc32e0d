use std::collections::VecDeque;

use parking_lot::Mutex;

/// Per-worker receive side of the message subsystem.
///
/// Data frames are double-buffered by level parity: frames sent during
/// level L are pushed to parity `(L+1) & 1` and drained by the destination
/// worker at the start of level L+1, which is what gives messages their
/// one-level visibility delay. Activation frames live in their own queue
/// and are folded into the `next` frontier before barrier 1 of the level
/// they were sent in.
///
/// Each queue entry is one flushed sender buffer; senders push whole
/// buffers in send order, so per-(source, destination) FIFO follows from
/// queue order.
pub(crate) struct Inbox {
    data: [Mutex<VecDeque<Vec<u8>>>; 2],
    activations: Mutex<VecDeque<Vec<u8>>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self {
            data: [Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new())],
            activations: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_data(&self, parity: usize, buf: Vec<u8>) {
        self.data[parity].lock().push_back(buf);
    }

    pub fn take_data(&self, parity: usize) -> Vec<Vec<u8>> {
        let mut queue = self.data[parity].lock();
        queue.drain(..).collect()
    }

    /// Buffers queued for the given parity. Undelivered messages count
    /// toward the termination sum so the level that would deliver them is
    /// guaranteed to run.
    pub fn data_len(&self, parity: usize) -> usize {
        self.data[parity].lock().len()
    }

    pub fn push_activation(&self, buf: Vec<u8>) {
        self.activations.lock().push_back(buf);
    }

    pub fn take_activations(&self) -> Vec<Vec<u8>> {
        let mut queue = self.activations.lock();
        queue.drain(..).collect()
    }
}
