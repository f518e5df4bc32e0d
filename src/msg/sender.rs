use std::mem;
use std::sync::Arc;

use crate::msg::inbox::Inbox;
use crate::msg::{append_frame, FrameKind, FRAME_HDR_LEN};
use crate::pool::BufferPool;
use crate::types::VertexId;

/// Buffered point-to-point sender for one (source worker, destination
/// worker) pair. Messages accumulate until the buffer fills or the level
/// ends.
pub(crate) struct PointToPointSender {
    inbox: Arc<Inbox>,
    pool: Arc<BufferPool>,
    cap: usize,
    buf: Vec<u8>,
}

impl PointToPointSender {
    pub fn new(inbox: Arc<Inbox>, pool: Arc<BufferPool>, cap: usize) -> Self {
        let buf = pool.acquire();
        Self {
            inbox,
            pool,
            cap,
            buf,
        }
    }

    pub fn send_cached(&mut self, dest: VertexId, payload: &[u8], parity: usize) {
        let need = FRAME_HDR_LEN + payload.len() + 4;
        if !self.buf.is_empty() && self.buf.len() + need > self.cap {
            self.flush(parity);
        }
        // an oversized message spills into a buffer of its own
        append_frame(&mut self.buf, FrameKind::PointToPoint, &[dest], payload);
        if self.buf.len() >= self.cap {
            self.flush(parity);
        }
    }

    pub fn flush(&mut self, parity: usize) {
        if self.buf.is_empty() {
            return;
        }
        let full = mem::replace(&mut self.buf, self.pool.acquire());
        self.inbox.push_data(parity, full);
    }
}

/// Buffered multicast sender: one payload shared by many destinations.
/// Also used for activations, which are multicasts with an empty payload
/// routed to the destination worker's activation queue.
pub(crate) struct MulticastSender {
    kind: FrameKind,
    inbox: Arc<Inbox>,
    pool: Arc<BufferPool>,
    cap: usize,
    buf: Vec<u8>,
    open: Option<OpenFrame>,
}

struct OpenFrame {
    hdr_pos: usize,
    ndests: u32,
}

impl MulticastSender {
    pub fn new(kind: FrameKind, inbox: Arc<Inbox>, pool: Arc<BufferPool>, cap: usize) -> Self {
        debug_assert!(matches!(
            kind,
            FrameKind::Multicast | FrameKind::Activation
        ));
        let buf = pool.acquire();
        Self {
            kind,
            inbox,
            pool,
            cap,
            buf,
            open: None,
        }
    }

    /// Whether a multicast frame is currently open for more destinations.
    pub fn has_msg(&self) -> bool {
        self.open.is_some()
    }

    /// Opens a fresh multicast frame carrying `payload`, sealing any open
    /// one and flushing first if the buffer cannot hold the new frame plus
    /// at least one destination.
    pub fn init(&mut self, payload: &[u8], parity: usize) {
        self.seal();
        let need = FRAME_HDR_LEN + payload.len() + 4;
        if !self.buf.is_empty() && self.buf.len() + need > self.cap {
            self.flush(parity);
        }
        let hdr_pos = self.buf.len();
        append_frame(&mut self.buf, self.kind, &[], payload);
        self.open = Some(OpenFrame { hdr_pos, ndests: 0 });
    }

    /// Appends one destination to the open frame. Returns false when the
    /// buffer cannot hold another destination; the caller must `init` a
    /// fresh frame and retry, which succeeds on the first attempt.
    pub fn add_dest(&mut self, id: VertexId) -> bool {
        let Some(open) = &mut self.open else {
            return false;
        };
        if open.ndests > 0 && self.buf.len() + 4 > self.cap {
            return false;
        }
        self.buf.extend_from_slice(&id.0.to_le_bytes());
        open.ndests += 1;
        true
    }

    pub fn end_multicast(&mut self) {
        self.seal();
    }

    fn seal(&mut self) {
        if let Some(open) = self.open.take() {
            if open.ndests == 0 {
                // frame gathered no destinations; drop it
                self.buf.truncate(open.hdr_pos);
                return;
            }
            self.buf[open.hdr_pos + 4..open.hdr_pos + 8]
                .copy_from_slice(&open.ndests.to_le_bytes());
        }
    }

    pub fn flush(&mut self, parity: usize) {
        self.seal();
        if self.buf.is_empty() {
            return;
        }
        let full = mem::replace(&mut self.buf, self.pool.acquire());
        match self.kind {
            FrameKind::Activation => self.inbox.push_activation(full),
            _ => self.inbox.push_data(parity, full),
        }
    }
}

/// The full sender set owned by one worker: one sender of each role per
/// destination worker.
pub(crate) struct WorkerSenders {
    p2p: Vec<PointToPointSender>,
    multicast: Vec<MulticastSender>,
    activation: Vec<MulticastSender>,
}

impl WorkerSenders {
    pub fn new(inboxes: &[Arc<Inbox>], pool: &Arc<BufferPool>, cap: usize) -> Self {
        let p2p = inboxes
            .iter()
            .map(|inbox| PointToPointSender::new(inbox.clone(), pool.clone(), cap))
            .collect();
        let multicast = inboxes
            .iter()
            .map(|inbox| {
                MulticastSender::new(FrameKind::Multicast, inbox.clone(), pool.clone(), cap)
            })
            .collect();
        let activation = inboxes
            .iter()
            .map(|inbox| {
                MulticastSender::new(FrameKind::Activation, inbox.clone(), pool.clone(), cap)
            })
            .collect();
        Self {
            p2p,
            multicast,
            activation,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.p2p.len()
    }

    pub fn p2p(&mut self, worker: usize) -> &mut PointToPointSender {
        &mut self.p2p[worker]
    }

    pub fn multicast(&mut self, worker: usize) -> &mut MulticastSender {
        &mut self.multicast[worker]
    }

    pub fn activation(&mut self, worker: usize) -> &mut MulticastSender {
        &mut self.activation[worker]
    }

    /// Flushes every sender. Called once per level after the frontier is
    /// exhausted and all I/O has completed.
    pub fn flush_all(&mut self, parity: usize) {
        for sender in &mut self.p2p {
            sender.flush(parity);
        }
        for sender in &mut self.multicast {
            sender.flush(parity);
        }
        for sender in &mut self.activation {
            sender.flush(parity);
        }
    }
}
