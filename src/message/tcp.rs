//! Provides a message-passing transport based on TCP sockets.
//!
//! TCP is a connection-oriented protocol, which means that a connection must
//! be established between the sending and receiving ends of the socket in
//! order to read from or write to a stream.

use super::transport::{Envelope, Frame, Kind, Transport};
use super::util;
use crate::error::{Error, Result, TransportError};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const CONNECT_ATTEMPTS: usize = 200;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(25);
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Frames claiming a longer payload than this are rejected unread.
pub const MAX_FRAME_LEN: usize = 1 << 30;

type SendS = Sender<(usize, SocketAddr, Vec<u8>)>;
type SendR = Receiver<(usize, SocketAddr, Vec<u8>)>;
type RecvS = Sender<std::result::Result<Frame, TransportError>>;
type RecvR = Receiver<std::result::Result<Frame, TransportError>>;

/// Where one process of a TCP group listens, and where its peers listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    pub rank: usize,
    pub peers: Vec<SocketAddr>,
}

impl TcpConfig {
    /// Environment variable holding this process's rank.
    pub const RANK_VAR: &'static str = "PEERCOMM_RANK";

    /// Environment variable holding the comma-separated `host:port` list of
    /// every process in the group, in rank order.
    pub const PEERS_VAR: &'static str = "PEERCOMM_PEERS";

    /// Read the configuration from the environment. Returns `Ok(None)` when
    /// neither variable is set.
    pub fn from_env() -> Result<Option<Self>> {
        match (std::env::var(Self::RANK_VAR), std::env::var(Self::PEERS_VAR)) {
            (Ok(rank), Ok(peers)) => Self::parse(&rank, &peers).map(Some),
            (Err(_), Err(_)) => Ok(None),
            _ => Err(Error::Session(format!(
                "{} and {} must be set together",
                Self::RANK_VAR,
                Self::PEERS_VAR
            ))),
        }
    }

    pub fn parse(rank: &str, peers: &str) -> Result<Self> {
        let rank = rank
            .trim()
            .parse::<usize>()
            .map_err(|e| Error::Session(format!("bad rank {:?}: {}", rank, e)))?;
        let peers = peers
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<SocketAddr>()
                    .map_err(|e| Error::Session(format!("bad peer address {:?}: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        if rank >= peers.len() {
            return Err(Error::Session(format!(
                "rank {} is outside a group of {} peers",
                rank,
                peers.len()
            )));
        }
        Ok(Self { rank, peers })
    }

    /// A group of `size` processes on the loopback interface, listening on
    /// consecutive ports starting at `base_port`.
    pub fn localhost(rank: usize, size: usize, base_port: u16) -> Self {
        let peers = (0..size)
            .map(|r| SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), base_port + r as u16))
            .collect();
        Self { rank, peers }
    }
}

/// Maintains a cache of ingoing and outgoing TCP connections.
///
/// This object facilitates non-blocking sends and blocking receives from any
/// peer. Communicating with a remote peer only opens a new connection on the
/// first call; subsequent communications with that peer reuse the cached
/// connection. Every accepted connection gets its own reader thread, and
/// all readers feed one queue of incoming frames. Failures on either side
/// are delivered through that queue, so they surface on the next receive.
///
/// Dropping the pool flushes the frames already handed to it, closes every
/// connection, and releases the listening socket.
pub struct ConnectionPool {
    alive: Arc<AtomicBool>,
    send_s: Option<SendS>,
    recv_s: RecvS,
    recv_r: RecvR,
    send_thread: Option<JoinHandle<()>>,
    recv_thread: Option<JoinHandle<()>>,
}

impl ConnectionPool {
    /// Creates a `ConnectionPool` from a `TcpListener`. The listener is
    /// placed in a non-blocking accept mode, so the pre-existing blocking
    /// mode is overwritten.
    pub fn from_listener(listener: TcpListener) -> io::Result<Self> {
        let (send_s, send_r): (SendS, SendR) = unbounded();
        let (recv_s, recv_r): (RecvS, RecvR) = unbounded();
        let alive = Arc::new(AtomicBool::new(true));
        let keep_accepting = alive.clone();

        let failures = recv_s.clone();
        let send_thread = thread::spawn(move || {
            let mut streams: HashMap<SocketAddr, TcpStream> = HashMap::new();
            for (rank, address, bytes) in send_r {
                if !streams.contains_key(&address) {
                    match Self::connect(address) {
                        Ok(stream) => {
                            streams.insert(address, stream);
                        }
                        Err(_) => {
                            let _ = failures.send(Err(TransportError::Disconnected(rank)));
                            continue;
                        }
                    }
                }
                if let Some(stream) = streams.get_mut(&address) {
                    if let Err(e) = stream.write_all(&bytes) {
                        streams.remove(&address);
                        let _ = failures.send(Err(TransportError::Io(e)));
                    }
                }
            }
        });
        listener.set_nonblocking(true)?;

        let incoming = recv_s.clone();
        let recv_thread = thread::spawn(move || {
            let mut readers = Vec::new();
            while keep_accepting.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, address)) => match Self::spawn_reader(stream, incoming.clone()) {
                        Ok(reader) => readers.push(reader),
                        Err(e) => warn!("failed to read from {}: {}", address, e),
                    },
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                    Err(e) => warn!("failed to accept a peer connection: {}", e),
                }
            }
            for (stream, reader) in readers {
                let _ = stream.shutdown(Shutdown::Both);
                let _ = reader.join();
            }
        });

        Ok(Self {
            alive,
            send_s: Some(send_s),
            recv_s,
            recv_r,
            send_thread: Some(send_thread),
            recv_thread: Some(recv_thread),
        })
    }

    /// Start a reader thread on an accepted stream. Returns a handle on the
    /// stream to shut it down with, and the thread to join.
    fn spawn_reader(stream: TcpStream, recv_s: RecvS) -> io::Result<(TcpStream, JoinHandle<()>)> {
        stream.set_nonblocking(false)?;
        let handle = stream.try_clone()?;
        Ok((handle, thread::spawn(move || Self::read_frames(stream, recv_s))))
    }

    /// Queue bytes for a peer. Fails once the pool is shutting down.
    fn send(&self, rank: usize, address: SocketAddr, bytes: Vec<u8>) -> std::result::Result<(), TransportError> {
        self.send_s
            .as_ref()
            .ok_or(TransportError::Disconnected(rank))?
            .send((rank, address, bytes))
            .map_err(|_| TransportError::Disconnected(rank))
    }

    fn connect(address: SocketAddr) -> io::Result<TcpStream> {
        let mut attempt = 0;
        loop {
            match TcpStream::connect(address) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!("connected to {}", address);
                    return Ok(stream);
                }
                Err(e) if attempt + 1 >= CONNECT_ATTEMPTS => {
                    warn!("giving up on {} after {} attempts: {}", address, CONNECT_ATTEMPTS, e);
                    return Err(e);
                }
                Err(_) => {
                    attempt += 1;
                    thread::sleep(CONNECT_RETRY_DELAY)
                }
            }
        }
    }

    fn read_frames(mut stream: TcpStream, recv_s: RecvS) {
        loop {
            match read_frame(&mut stream) {
                Ok(frame) => {
                    if recv_s.send(Ok(frame)).is_err() {
                        return;
                    }
                }
                Err(e) if util::is_end_of_stream(&e) => return,
                Err(e) => {
                    let _ = recv_s.send(Err(TransportError::Io(e)));
                    return;
                }
            }
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.alive.swap(false, Ordering::Relaxed);
        self.send_s.take();

        for thread in self.send_thread.take().into_iter().chain(self.recv_thread.take()) {
            if thread.join().is_err() {
                warn!("a connection pool thread panicked");
            }
        }
    }
}

/// Serialize a frame as a fixed header followed by the payload.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let e = &frame.envelope;
    let mut bytes = Vec::with_capacity(37 + frame.payload.len());
    bytes.extend_from_slice(&e.context.to_le_bytes());
    bytes.push(e.kind.to_byte());
    bytes.extend_from_slice(&(e.source as u64).to_le_bytes());
    bytes.extend_from_slice(&e.tag.to_le_bytes());
    bytes.extend_from_slice(&(e.count as u64).to_le_bytes());
    bytes.extend_from_slice(&(frame.payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&frame.payload);
    bytes
}

/// Read one frame written by [`encode_frame`].
pub fn read_frame<R: Read>(stream: &mut R) -> io::Result<Frame> {
    let context = util::read_u64(stream)?;
    let kind = Kind::from_byte(util::read_u8(stream)?)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown frame kind"))?;
    let source = util::read_u64(stream)? as usize;
    let tag = util::read_i32(stream)?;
    let count = util::read_u64(stream)? as usize;
    let len = util::read_u64(stream)?;

    if len > MAX_FRAME_LEN as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame payload of {} bytes exceeds the limit of {}", len, MAX_FRAME_LEN),
        ));
    }
    let payload = util::read_bytes_vec(stream, len as usize)?;

    Ok(Frame {
        envelope: Envelope {
            context,
            kind,
            source,
            tag,
            count,
        },
        payload,
    })
}

pub struct TcpTransport {
    rank: usize,
    peers: Vec<SocketAddr>,
    connections: ConnectionPool,
}

impl TcpTransport {
    /// Bind this process's listening socket and start the connection pool.
    pub fn new(config: TcpConfig) -> std::result::Result<Self, TransportError> {
        let address = *config
            .peers
            .get(config.rank)
            .ok_or(TransportError::UnknownPeer(config.rank))?;
        let listener = TcpListener::bind(address)?;
        debug!("rank {} listening on {}", config.rank, address);

        Ok(Self {
            rank: config.rank,
            peers: config.peers,
            connections: ConnectionPool::from_listener(listener)?,
        })
    }
}

impl Transport for TcpTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn name(&self) -> &'static str {
        "tcp"
    }

    fn post(&self, dest: usize, frame: Frame) -> std::result::Result<(), TransportError> {
        if dest == self.rank {
            return self
                .connections
                .recv_s
                .send(Ok(frame))
                .map_err(|_| TransportError::Disconnected(dest));
        }
        let address = *self.peers.get(dest).ok_or(TransportError::UnknownPeer(dest))?;
        self.connections.send(dest, address, encode_frame(&frame))
    }

    fn next_frame(&self) -> std::result::Result<Frame, TransportError> {
        self.connections
            .recv_r
            .recv()
            .map_err(|_| TransportError::Disconnected(self.rank))?
    }

    fn try_next_frame(&self) -> std::result::Result<Option<Frame>, TransportError> {
        match self.connections.recv_r.try_recv() {
            Ok(frame) => frame.map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Disconnected(self.rank)),
        }
    }
}
