//! The byte-moving layer underneath the distributed communicator.
//!
//! A [`Transport`] knows how to hand a [`Frame`] to another process in its
//! group and how to hand back whatever frames arrive, in arrival order. It
//! knows nothing about tags, communicators, or matching; that is the job of
//! the [`Mailbox`], which every communicator sharing a transport goes
//! through.

use crate::error::TransportError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which traffic class a frame belongs to. Collective traffic never matches
/// a point-to-point receive, whatever the tags involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    PointToPoint,
    Collective,
}

impl Kind {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Kind::PointToPoint => 0,
            Kind::Collective => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Kind::PointToPoint),
            1 => Some(Kind::Collective),
            _ => None,
        }
    }
}

/// Message metadata: which group it belongs to, who sent it, and what it
/// holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    /// Identifies the communicator the message was sent on.
    pub context: u64,
    pub kind: Kind,
    /// Rank of the sender within the transport (world) group.
    pub source: usize,
    pub tag: i32,
    /// Number of values encoded in the payload.
    pub count: usize,
}

/// One message as it travels over a transport.
#[derive(Debug, Clone)]
pub struct Frame {
    pub envelope: Envelope,
    pub payload: Vec<u8>,
}

/// Interface to a group of processes that can exchange frames. The
/// underlying transport can in principle be TCP, shared memory, or a higher
/// level abstraction like MPI.
pub trait Transport: Send + Sync {
    /// Rank of this process within the transport group.
    fn rank(&self) -> usize;

    /// Number of processes in the transport group.
    fn size(&self) -> usize;

    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Hand a frame to the given process. This method must return without
    /// waiting for a matching receive to be posted. Frames posted from one
    /// process to another must arrive in the order they were posted.
    fn post(&self, dest: usize, frame: Frame) -> Result<(), TransportError>;

    /// Block until the next frame addressed to this process arrives.
    fn next_frame(&self) -> Result<Frame, TransportError>;

    /// Return the next frame if one has already arrived.
    fn try_next_frame(&self) -> Result<Option<Frame>, TransportError>;
}

/// Selection criteria for a receive or probe. `None` fields are wildcards.
#[derive(Debug, Clone, Copy)]
pub struct Pattern {
    pub context: u64,
    pub kind: Kind,
    pub source: Option<usize>,
    pub tag: Option<i32>,
}

impl Pattern {
    pub fn matches(&self, envelope: &Envelope) -> bool {
        envelope.context == self.context
            && envelope.kind == self.kind
            && self.source.map_or(true, |s| s == envelope.source)
            && self.tag.map_or(true, |t| t == envelope.tag)
    }
}

/// Matches incoming frames against receive patterns.
///
/// Frames that arrive while waiting for something else are kept, in arrival
/// order, until a receive asks for them. Because the transport preserves
/// per-sender order and the queue is always scanned front to back, two
/// messages from the same sender with the same tag are received in the
/// order they were sent.
pub struct Mailbox {
    transport: Arc<dyn Transport>,
    undelivered: Mutex<VecDeque<Frame>>,
}

impl Mailbox {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            undelivered: Mutex::new(VecDeque::new()),
        }
    }

    pub fn post(&self, dest: usize, frame: Frame) -> Result<(), TransportError> {
        if dest >= self.transport.size() {
            return Err(TransportError::UnknownPeer(dest));
        }
        self.transport.post(dest, frame)
    }

    /// Block until a frame matching the pattern is available, and remove it.
    pub fn receive(&self, pattern: &Pattern) -> Result<Frame, TransportError> {
        let mut undelivered = self.lock();

        if let Some(index) = Self::position(&undelivered, pattern) {
            if let Some(frame) = undelivered.remove(index) {
                return Ok(frame);
            }
        }
        loop {
            let frame = self.transport.next_frame()?;
            if pattern.matches(&frame.envelope) {
                return Ok(frame);
            }
            undelivered.push_back(frame)
        }
    }

    /// Block until a frame matching the pattern is available, and return its
    /// envelope without consuming it.
    pub fn probe(&self, pattern: &Pattern) -> Result<Envelope, TransportError> {
        let mut undelivered = self.lock();

        if let Some(index) = Self::position(&undelivered, pattern) {
            return Ok(undelivered[index].envelope);
        }
        loop {
            let frame = self.transport.next_frame()?;
            let envelope = frame.envelope;
            undelivered.push_back(frame);

            if pattern.matches(&envelope) {
                return Ok(envelope);
            }
        }
    }

    /// Return the envelope of a matching frame if one has already arrived.
    pub fn iprobe(&self, pattern: &Pattern) -> Result<Option<Envelope>, TransportError> {
        let mut undelivered = self.lock();

        while let Some(frame) = self.transport.try_next_frame()? {
            undelivered.push_back(frame)
        }
        Ok(Self::position(&undelivered, pattern).map(|index| undelivered[index].envelope))
    }

    fn position(undelivered: &VecDeque<Frame>, pattern: &Pattern) -> Option<usize> {
        undelivered
            .iter()
            .position(|frame| pattern.matches(&frame.envelope))
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.undelivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::local::LocalTransport;

    fn frame(source: usize, tag: i32, byte: u8) -> Frame {
        Frame {
            envelope: Envelope {
                context: 0,
                kind: Kind::PointToPoint,
                source,
                tag,
                count: 1,
            },
            payload: vec![byte],
        }
    }

    fn pattern(source: Option<usize>, tag: Option<i32>) -> Pattern {
        Pattern {
            context: 0,
            kind: Kind::PointToPoint,
            source,
            tag,
        }
    }

    #[test]
    fn receive_skips_frames_with_other_tags() {
        let mut universe = LocalTransport::universe(2);
        let receiver = Mailbox::new(Arc::new(universe.pop().unwrap()));
        let sender = universe.pop().unwrap();

        sender.post(1, frame(0, 1, 10)).unwrap();
        sender.post(1, frame(0, 2, 20)).unwrap();
        sender.post(1, frame(0, 1, 11)).unwrap();

        assert_eq!(receiver.receive(&pattern(Some(0), Some(2))).unwrap().payload, vec![20]);
        assert_eq!(receiver.receive(&pattern(Some(0), Some(1))).unwrap().payload, vec![10]);
        assert_eq!(receiver.receive(&pattern(None, None)).unwrap().payload, vec![11]);
    }

    #[test]
    fn probe_does_not_consume() {
        let mut universe = LocalTransport::universe(2);
        let receiver = Mailbox::new(Arc::new(universe.pop().unwrap()));
        let sender = universe.pop().unwrap();

        assert!(receiver.iprobe(&pattern(None, None)).unwrap().is_none());
        sender.post(1, frame(0, 5, 50)).unwrap();

        let envelope = receiver.probe(&pattern(Some(0), None)).unwrap();
        assert_eq!(envelope.tag, 5);
        assert!(receiver.iprobe(&pattern(None, Some(5))).unwrap().is_some());
        assert!(receiver.iprobe(&pattern(None, Some(6))).unwrap().is_none());
        assert_eq!(receiver.receive(&pattern(None, Some(5))).unwrap().payload, vec![50]);
        assert!(receiver.iprobe(&pattern(None, None)).unwrap().is_none());
    }

    #[test]
    fn collective_traffic_does_not_match_point_to_point() {
        let mut universe = LocalTransport::universe(2);
        let receiver = Mailbox::new(Arc::new(universe.pop().unwrap()));
        let sender = universe.pop().unwrap();

        let mut collective = frame(0, 3, 30);
        collective.envelope.kind = Kind::Collective;
        sender.post(1, collective).unwrap();

        assert!(receiver.iprobe(&pattern(None, None)).unwrap().is_none());
    }

    #[test]
    fn posting_outside_the_group_is_rejected() {
        let mut universe = LocalTransport::universe(1);
        let mailbox = Mailbox::new(Arc::new(universe.pop().unwrap()));
        match mailbox.post(4, frame(0, 0, 0)) {
            Err(TransportError::UnknownPeer(4)) => {}
            other => panic!("expected unknown peer, got {:?}", other),
        }
    }
}
