//! Provides an in-process transport based on channels.
//!
//! Every endpoint owns the receiving end of one channel and a sending end
//! for every peer (itself included). This is how a group of ranks is run
//! inside a single test binary: build a universe, move one endpoint onto
//! each thread, and wrap it in a communicator.

use super::transport::{Frame, Transport};
use crate::error::TransportError;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

pub struct LocalTransport {
    rank: usize,
    peers: Vec<Sender<Frame>>,
    inbox: Receiver<Frame>,
}

impl LocalTransport {
    /// Create `size` connected endpoints. The endpoint at index `i` has rank
    /// `i`.
    pub fn universe(size: usize) -> Vec<LocalTransport> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalTransport {
                rank,
                peers: senders.clone(),
                inbox,
            })
            .collect()
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn name(&self) -> &'static str {
        "local"
    }

    fn post(&self, dest: usize, frame: Frame) -> Result<(), TransportError> {
        self.peers
            .get(dest)
            .ok_or(TransportError::UnknownPeer(dest))?
            .send(frame)
            .map_err(|_| TransportError::Disconnected(dest))
    }

    fn next_frame(&self) -> Result<Frame, TransportError> {
        self.inbox
            .recv()
            .map_err(|_| TransportError::Disconnected(self.rank))
    }

    fn try_next_frame(&self) -> Result<Option<Frame>, TransportError> {
        match self.inbox.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Disconnected(self.rank)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::transport::{Envelope, Kind};

    #[test]
    fn endpoints_are_ranked_in_order() {
        let universe = LocalTransport::universe(3);
        let ranks: Vec<_> = universe.iter().map(|t| t.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert!(universe.iter().all(|t| t.size() == 3));
    }

    #[test]
    fn frames_from_one_sender_arrive_in_order() {
        let universe = LocalTransport::universe(2);
        for tag in 0..4 {
            let envelope = Envelope {
                context: 0,
                kind: Kind::PointToPoint,
                source: 0,
                tag,
                count: 0,
            };
            universe[0]
                .post(1, Frame { envelope, payload: Vec::new() })
                .unwrap();
        }
        let tags: Vec<_> = (0..4)
            .map(|_| universe[1].next_frame().unwrap().envelope.tag)
            .collect();
        assert_eq!(tags, vec![0, 1, 2, 3]);
        assert!(universe[1].try_next_frame().unwrap().is_none());
    }
}
