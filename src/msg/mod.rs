pub(crate) mod inbox;
pub(crate) mod sender;

use std::convert::TryInto;

use crate::error::{EngineError, Result};
use crate::types::VertexId;

/// Frame header: kind byte, 3 pad bytes, destination count, payload length.
/// The payload follows the header, the destination ids follow the payload,
/// so multicast senders can keep appending destinations to an open frame.
pub(crate) const FRAME_HDR_LEN: usize = 12;

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum FrameKind {
    PointToPoint = 1,
    Multicast = 2,
    Activation = 3,
}

impl FrameKind {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FrameKind::PointToPoint),
            2 => Ok(FrameKind::Multicast),
            3 => Ok(FrameKind::Activation),
            _ => Err(EngineError::Corruption("unknown message frame kind")),
        }
    }
}

/// One message as seen by a vertex program. The payload borrows the inbox
/// buffer it arrived in.
pub struct Message<'a> {
    payload: &'a [u8],
}

impl<'a> Message<'a> {
    pub(crate) fn new(payload: &'a [u8]) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

pub(crate) fn append_frame(
    buf: &mut Vec<u8>,
    kind: FrameKind,
    dests: &[VertexId],
    payload: &[u8],
) {
    buf.push(kind as u8);
    buf.extend_from_slice(&[0u8; 3]);
    buf.extend_from_slice(&(dests.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    for dest in dests {
        buf.extend_from_slice(&dest.0.to_le_bytes());
    }
}

/// Decoded view of one frame inside a flushed buffer.
pub(crate) struct Frame<'a> {
    pub kind: FrameKind,
    payload: &'a [u8],
    dests: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn num_dests(&self) -> usize {
        self.dests.len() / 4
    }

    pub fn dests(&self) -> impl Iterator<Item = VertexId> + 'a {
        self.dests.chunks_exact(4).map(|chunk| {
            VertexId(u32::from_le_bytes(
                chunk.try_into().expect("slice is 4 bytes"),
            ))
        })
    }
}

/// Iterates the frames packed into one inbox buffer.
pub(crate) struct FrameCursor<'a> {
    buf: &'a [u8],
}

impl<'a> FrameCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame<'a>>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf.len() < FRAME_HDR_LEN {
            return Err(EngineError::Corruption("message frame header truncated"));
        }
        let kind = FrameKind::from_u8(self.buf[0])?;
        let ndests =
            u32::from_le_bytes(self.buf[4..8].try_into().expect("slice is 4 bytes")) as usize;
        let payload_len =
            u32::from_le_bytes(self.buf[8..12].try_into().expect("slice is 4 bytes")) as usize;
        let total = FRAME_HDR_LEN + payload_len + ndests * 4;
        if self.buf.len() < total {
            return Err(EngineError::Corruption("message frame body truncated"));
        }
        let payload = &self.buf[FRAME_HDR_LEN..FRAME_HDR_LEN + payload_len];
        let dests = &self.buf[FRAME_HDR_LEN + payload_len..total];
        self.buf = &self.buf[total..];
        Ok(Some(Frame {
            kind,
            payload,
            dests,
        }))
    }
}
