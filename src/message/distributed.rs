//! The communicator backed by a message-passing transport.
//!
//! Point-to-point traffic maps one to one onto transport frames. Collectives
//! are built from frames of their own [`Kind`], tagged with a per-communicator
//! epoch that every member advances in lockstep, so the frames of successive
//! collectives can never be confused with each other (or with user traffic)
//! however they interleave in the mailbox.

use super::buffer::ValueBuffer;
use super::comm::{Backend, CommHandle, Communicator, ANY_SOURCE, ANY_TAG};
use super::null::NullCommunicator;
use super::reduce_op::{combine, ReduceOperation};
use super::request::{Request, RequestImpl};
use super::status::{Status, StatusImpl};
use super::transport::{Envelope, Frame, Kind, Mailbox, Pattern, Transport};
use super::util;
use crate::coder::{decode_values, encode_values, CborCoder, Coder, Payload};
use crate::error::{Result, TransportError, WithContext};
use log::{debug, error};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

type TransportResult<T> = std::result::Result<T, TransportError>;

/// Collective frames are tagged with the collective's epoch and the phase
/// within it. A collective has at most this many phases.
const PHASES: i32 = 4;

fn phase(epoch: i32, step: i32) -> i32 {
    epoch.wrapping_mul(PHASES).wrapping_add(step)
}

#[derive(Debug)]
struct DistributedStatus {
    cancelled: bool,
    source: i32,
    tag: i32,
    count: usize,
}

impl StatusImpl for DistributedStatus {
    fn cancelled(&self) -> bool {
        self.cancelled
    }

    fn source(&self) -> i32 {
        self.source
    }

    fn tag(&self) -> i32 {
        self.tag
    }

    fn count(&self) -> usize {
        self.count
    }
}

/// One process's view of a group: the shared mailbox, the context id that
/// keeps the group's traffic apart, and the world rank of every member.
#[derive(Clone)]
struct Endpoint {
    mailbox: Arc<Mailbox>,
    context: u64,
    members: Arc<Vec<usize>>,
    rank: usize,
}

impl Endpoint {
    fn world_rank(&self, rank: usize) -> TransportResult<usize> {
        self.members
            .get(rank)
            .copied()
            .ok_or(TransportError::UnknownPeer(rank))
    }

    fn group_rank(&self, world_rank: usize) -> i32 {
        self.members
            .iter()
            .position(|&member| member == world_rank)
            .map_or(ANY_SOURCE, |rank| rank as i32)
    }

    fn post(&self, dest: usize, kind: Kind, tag: i32, count: usize, payload: Vec<u8>) -> TransportResult<()> {
        let envelope = Envelope {
            context: self.context,
            kind,
            source: self.world_rank(self.rank)?,
            tag,
            count,
        };
        self.mailbox
            .post(self.world_rank(dest)?, Frame { envelope, payload })
    }

    fn pattern(&self, kind: Kind, source: Option<usize>, tag: Option<i32>) -> TransportResult<Pattern> {
        Ok(Pattern {
            context: self.context,
            kind,
            source: source.map(|s| self.world_rank(s)).transpose()?,
            tag,
        })
    }

    fn status(&self, envelope: &Envelope) -> Status {
        Status::new(DistributedStatus {
            cancelled: false,
            source: self.group_rank(envelope.source),
            tag: envelope.tag,
            count: envelope.count,
        })
    }
}

/// Decode a point-to-point payload into the receive buffer.
fn deliver<T, B>(frame: &Frame, buffer: &mut B) -> TransportResult<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    let values: Vec<T> = decode_values(&frame.payload)?;

    if let Some(capacity) = buffer.fixed_len() {
        if values.len() > capacity {
            return Err(TransportError::Truncated {
                capacity,
                count: values.len(),
            });
        }
    }
    buffer.store(values);
    Ok(())
}

fn checked_combine<T, Op>(op: &Op, lhs: &[T], rhs: &[T]) -> TransportResult<Vec<T>>
where
    Op: ReduceOperation<T>,
{
    if lhs.len() != rhs.len() {
        return Err(TransportError::LengthMismatch {
            expected: lhs.len(),
            actual: rhs.len(),
        });
    }
    Ok(combine(op, lhs, rhs))
}

struct SendRequest {
    status: Status,
}

impl RequestImpl for SendRequest {
    fn wait(self: Box<Self>) -> TransportResult<Status> {
        Ok(self.status)
    }

    fn cancel(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

struct ReceiveRequest<'a, T, B: ?Sized> {
    endpoint: Endpoint,
    pattern: Pattern,
    source: i32,
    tag: i32,
    buffer: &'a mut B,
    cancelled: bool,
    values: PhantomData<fn() -> T>,
}

impl<'a, T, B> RequestImpl for ReceiveRequest<'a, T, B>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    fn wait(self: Box<Self>) -> TransportResult<Status> {
        let this = *self;

        if this.cancelled {
            return Ok(Status::new(DistributedStatus {
                cancelled: true,
                source: this.source,
                tag: this.tag,
                count: 0,
            }));
        }
        let frame = this.endpoint.mailbox.receive(&this.pattern)?;
        deliver(&frame, this.buffer)?;
        Ok(this.endpoint.status(&frame.envelope))
    }

    fn cancel(&mut self) -> TransportResult<()> {
        if !self.cancelled && self.endpoint.mailbox.iprobe(&self.pattern)?.is_none() {
            self.cancelled = true
        }
        Ok(())
    }
}

/// A communicator over a group of processes joined by a [`Transport`].
///
/// The communicator built directly on a transport spans the whole transport
/// group (the "world"). Splitting it produces communicators over subgroups
/// that share the same transport and mailbox but never see each other's
/// messages.
pub struct DistributedCommunicator {
    endpoint: Endpoint,
    world: bool,
    epoch: AtomicI32,
    splits: AtomicU64,
}

impl DistributedCommunicator {
    /// Create the world communicator for a transport.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    /// Create the world communicator for a transport that is already shared.
    pub fn from_shared(transport: Arc<dyn Transport>) -> Self {
        let rank = transport.rank();
        let size = transport.size();

        debug!(
            "opening {} transport as rank {} of {}",
            transport.name(),
            rank,
            size
        );
        let endpoint = Endpoint {
            mailbox: Arc::new(Mailbox::new(transport)),
            context: 0,
            members: Arc::new((0..size).collect()),
            rank,
        };
        Self::with_endpoint(endpoint, true)
    }

    fn with_endpoint(endpoint: Endpoint, world: bool) -> Self {
        Self {
            endpoint,
            world,
            epoch: AtomicI32::new(0),
            splits: AtomicU64::new(0),
        }
    }

    /// Returns `true` if this communicator spans its whole transport group.
    pub fn is_world(&self) -> bool {
        self.world
    }

    fn group_size(&self) -> usize {
        self.endpoint.members.len()
    }

    /// Start the next collective. Every member runs the same sequence of
    /// collectives, so the epochs of one collective agree across the group.
    fn next_epoch(&self) -> i32 {
        self.epoch.fetch_add(1, Ordering::Relaxed)
    }

    /// Retire the next collective's epoch without taking part in it. Called
    /// when this process rejected its own arguments, so that its later
    /// collectives still line up with those of its peers.
    pub(crate) fn skip_collective(&self) {
        let epoch = self.next_epoch();
        debug!("{} skipped collective epoch {}", self, epoch);
    }

    /// Map a rank relative to `root` back to a group rank.
    fn actual(&self, virtual_rank: usize, root: usize) -> usize {
        (virtual_rank + root) % self.group_size()
    }

    fn virtual_rank(&self, root: usize) -> usize {
        let p = self.group_size();
        (self.endpoint.rank + p - root) % p
    }

    fn put<V: Payload>(&self, dest: usize, tag: i32, value: &V) -> TransportResult<()> {
        let payload = CborCoder::<V>::new().encode(value)?;
        self.endpoint.post(dest, Kind::Collective, tag, 1, payload)
    }

    fn take<V: Payload>(&self, source: usize, tag: i32) -> TransportResult<V> {
        let pattern = self.endpoint.pattern(Kind::Collective, Some(source), Some(tag))?;
        let frame = self.endpoint.mailbox.receive(&pattern)?;
        CborCoder::<V>::new().decode(&frame.payload)
    }

    fn p2p_pattern(&self, source: i32, tag: i32) -> TransportResult<Pattern> {
        let source = if source == ANY_SOURCE {
            None
        } else {
            Some(source as usize)
        };
        let tag = if tag == ANY_TAG { None } else { Some(tag) };
        self.endpoint.pattern(Kind::PointToPoint, source, tag)
    }

    pub(crate) fn send<T: Payload>(&self, dest: usize, tag: i32, values: &[T]) -> TransportResult<()> {
        self.endpoint
            .post(dest, Kind::PointToPoint, tag, values.len(), encode_values(values)?)
    }

    pub(crate) fn receive_into<T, B>(&self, source: i32, tag: i32, buffer: &mut B) -> TransportResult<Status>
    where
        T: Payload,
        B: ValueBuffer<T> + ?Sized,
    {
        let frame = self.endpoint.mailbox.receive(&self.p2p_pattern(source, tag)?)?;
        deliver(&frame, buffer)?;
        Ok(self.endpoint.status(&frame.envelope))
    }

    /// Sends complete as soon as the transport has taken the frame.
    pub(crate) fn isend<T: Payload>(&self, dest: usize, tag: i32, values: &[T]) -> TransportResult<Request<'static>> {
        self.send(dest, tag, values)?;

        Ok(Request::new(SendRequest {
            status: Status::new(DistributedStatus {
                cancelled: false,
                source: self.endpoint.rank as i32,
                tag,
                count: values.len(),
            }),
        }))
    }

    pub(crate) fn ireceive<'a, T, B>(&self, source: i32, tag: i32, buffer: &'a mut B) -> TransportResult<Request<'a>>
    where
        T: Payload,
        B: ValueBuffer<T> + ?Sized + 'a,
    {
        Ok(Request::new(ReceiveRequest {
            endpoint: self.endpoint.clone(),
            pattern: self.p2p_pattern(source, tag)?,
            source,
            tag,
            buffer,
            cancelled: false,
            values: PhantomData,
        }))
    }

    pub(crate) fn probe(&self, source: i32, tag: i32) -> TransportResult<Status> {
        let envelope = self.endpoint.mailbox.probe(&self.p2p_pattern(source, tag)?)?;
        Ok(self.endpoint.status(&envelope))
    }

    pub(crate) fn iprobe(&self, source: i32, tag: i32) -> TransportResult<Status> {
        let found = self.endpoint.mailbox.iprobe(&self.p2p_pattern(source, tag)?)?;
        Ok(found.map_or_else(Status::empty, |envelope| self.endpoint.status(&envelope)))
    }

    /// Binomial tree broadcast from `root`. Only the root's `value` is used.
    fn tree_broadcast<V: Payload>(&self, tag: i32, root: usize, value: V) -> TransportResult<V> {
        let p = self.group_size();
        let v = self.virtual_rank(root);

        let value = if v == 0 {
            value
        } else {
            let parent = v - (v & v.wrapping_neg());
            self.take(self.actual(parent, root), tag)?
        };
        for level in (0..util::ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = one << 1;

            if v % two == 0 && v + one < p {
                self.put(self.actual(v + one, root), tag, &value)?
            }
        }
        Ok(value)
    }

    /// Binomial tree reduce to `root`. Operands are combined in order of
    /// their rank relative to the root. All ranks return `None` except for
    /// the root.
    fn tree_reduce<T, Op>(&self, tag: i32, root: usize, mut values: Vec<T>, op: &Op) -> TransportResult<Option<Vec<T>>>
    where
        T: Payload,
        Op: ReduceOperation<T>,
    {
        let p = self.group_size();
        let v = self.virtual_rank(root);

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = one << 1;

            if v % two == 0 {
                if v + one < p {
                    let other: Vec<T> = self.take(self.actual(v + one, root), tag)?;
                    values = checked_combine(op, &values, &other)?
                }
            } else {
                self.put(self.actual(v - one, root), tag, &values)?;
                return Ok(None);
            }
        }
        Ok(Some(values))
    }

    fn gather_to<T: Payload>(&self, tag: i32, root: usize, values: &[T]) -> TransportResult<Option<Vec<Vec<T>>>> {
        if self.endpoint.rank != root {
            self.put(root, tag, &values.to_vec())?;
            return Ok(None);
        }
        (0..self.group_size())
            .map(|source| {
                if source == root {
                    Ok(values.to_vec())
                } else {
                    self.take(source, tag)
                }
            })
            .collect::<TransportResult<Vec<_>>>()
            .map(Some)
    }

    pub(crate) fn broadcast<V: Payload>(&self, root: usize, value: V) -> TransportResult<V> {
        let epoch = self.next_epoch();
        self.tree_broadcast(phase(epoch, 0), root, value)
    }

    /// Reduce to `root`. Operators with a native equivalent are commutative
    /// and are reduced along a tree rooted at `root`; any other operator is
    /// reduced in rank order at rank 0 and the result forwarded.
    pub(crate) fn reduce<T, Op>(&self, root: usize, values: Vec<T>, op: &Op) -> TransportResult<Option<Vec<T>>>
    where
        T: Payload,
        Op: ReduceOperation<T>,
    {
        let epoch = self.next_epoch();
        self.reduce_in(epoch, root, values, op)
    }

    fn reduce_in<T, Op>(&self, epoch: i32, root: usize, values: Vec<T>, op: &Op) -> TransportResult<Option<Vec<T>>>
    where
        T: Payload,
        Op: ReduceOperation<T>,
    {
        let tag = phase(epoch, 0);

        if <Op as ReduceOperation<T>>::NATIVE.is_some() || root == 0 {
            return self.tree_reduce(tag, root, values, op);
        }
        let reduced = self.tree_reduce(tag, 0, values, op)?;
        let forward = phase(epoch, 1);

        match reduced {
            Some(values) => {
                self.put(root, forward, &values)?;
                Ok(None)
            }
            None if self.endpoint.rank == root => Ok(Some(self.take(0, forward)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn all_reduce<T, Op>(&self, values: Vec<T>, op: &Op) -> TransportResult<Vec<T>>
    where
        T: Payload,
        Op: ReduceOperation<T>,
    {
        let epoch = self.next_epoch();
        let reduced = self.reduce_in(epoch, 0, values, op)?;
        self.tree_broadcast(phase(epoch, 2), 0, reduced.unwrap_or_default())
    }

    /// Every rank's contribution, in rank order, at `root` only.
    pub(crate) fn gather<T: Payload>(&self, root: usize, values: &[T]) -> TransportResult<Option<Vec<Vec<T>>>> {
        let epoch = self.next_epoch();
        self.gather_to(phase(epoch, 0), root, values)
    }

    pub(crate) fn all_gather<T: Payload>(&self, values: &[T]) -> TransportResult<Vec<Vec<T>>> {
        let epoch = self.next_epoch();
        let gathered = self.gather_to(phase(epoch, 0), 0, values)?;
        self.tree_broadcast(phase(epoch, 1), 0, gathered.unwrap_or_default())
    }

    /// Hand `chunks[i]` to rank `i`. Only the root's chunks are used. A root
    /// passing `None` has rejected its arguments; every member then fails
    /// with [`TransportError::Abandoned`] instead of waiting for data.
    pub(crate) fn scatter<T: Payload>(&self, root: usize, chunks: Option<Vec<Vec<T>>>) -> TransportResult<Vec<T>> {
        let tag = phase(self.next_epoch(), 0);

        if self.endpoint.rank != root {
            let chunk: Option<Vec<T>> = self.take(root, tag)?;
            return chunk.ok_or(TransportError::Abandoned(root));
        }
        let chunks: Vec<Option<Vec<T>>> = match chunks {
            Some(chunks) => chunks.into_iter().map(Some).collect(),
            None => vec![None; self.group_size()],
        };
        let mut own = None;

        for (dest, chunk) in chunks.into_iter().enumerate() {
            if dest == root {
                own = chunk
            } else {
                self.put(dest, tag, &chunk)?
            }
        }
        own.ok_or(TransportError::Abandoned(root))
    }

    /// Hand `chunks[i]` to rank `i` and collect one chunk from every rank. A
    /// member passing `None` has rejected its arguments; the others still
    /// hear from it, and fail with [`TransportError::Abandoned`].
    pub(crate) fn all_to_all<T: Payload>(&self, chunks: Option<Vec<Vec<T>>>) -> TransportResult<Vec<Vec<T>>> {
        let tag = phase(self.next_epoch(), 0);
        let rank = self.endpoint.rank;
        let chunks: Vec<Option<Vec<T>>> = match chunks {
            Some(chunks) => chunks.into_iter().map(Some).collect(),
            None => vec![None; self.group_size()],
        };
        let mut own = None;

        for (dest, chunk) in chunks.into_iter().enumerate() {
            if dest == rank {
                own = chunk
            } else {
                self.put(dest, tag, &chunk)?
            }
        }
        let mut received = Vec::with_capacity(self.group_size());

        for source in 0..self.group_size() {
            if source == rank {
                received.push(own.take())
            } else {
                received.push(self.take::<Option<Vec<T>>>(source, tag)?)
            }
        }
        received
            .into_iter()
            .enumerate()
            .map(|(source, chunk)| chunk.ok_or(TransportError::Abandoned(source)))
            .collect()
    }

    /// Inclusive prefix reduction, passed along the ranks in order.
    pub(crate) fn scan<T, Op>(&self, values: Vec<T>, op: &Op) -> TransportResult<Vec<T>>
    where
        T: Payload,
        Op: ReduceOperation<T>,
    {
        let tag = phase(self.next_epoch(), 0);
        let rank = self.endpoint.rank;

        let values = if rank == 0 {
            values
        } else {
            let prefix: Vec<T> = self.take(rank - 1, tag)?;
            checked_combine(op, &prefix, &values)?
        };
        if rank + 1 < self.group_size() {
            self.put(rank + 1, tag, &values)?
        }
        Ok(values)
    }

    fn synchronize(&self) -> TransportResult<()> {
        let epoch = self.next_epoch();
        self.gather_to::<u8>(phase(epoch, 0), 0, &[])?;
        self.tree_broadcast(phase(epoch, 1), 0, ())
    }

    fn split_group(&self, color: i32, key: i32) -> TransportResult<Option<DistributedCommunicator>> {
        let sequence = self.splits.fetch_add(1, Ordering::Relaxed);
        let entries = self.all_gather(&[(color, key)])?;

        if color < 0 {
            return Ok(None);
        }
        let mut chosen: Vec<(i32, usize)> = entries
            .iter()
            .enumerate()
            .filter_map(|(rank, entry)| match entry.first() {
                Some(&(c, k)) if c == color => Some((k, rank)),
                _ => None,
            })
            .collect();
        chosen.sort_unstable();

        let rank = chosen
            .iter()
            .position(|&(_, r)| r == self.endpoint.rank)
            .ok_or(TransportError::UnknownPeer(self.endpoint.rank))?;
        let members = chosen
            .iter()
            .map(|&(_, r)| self.endpoint.world_rank(r))
            .collect::<TransportResult<Vec<_>>>()?;

        let mut hasher = DefaultHasher::new();
        (self.endpoint.context, sequence, color).hash(&mut hasher);

        let endpoint = Endpoint {
            mailbox: self.endpoint.mailbox.clone(),
            context: hasher.finish(),
            members: Arc::new(members),
            rank,
        };
        Ok(Some(Self::with_endpoint(endpoint, false)))
    }
}

impl Communicator for DistributedCommunicator {
    fn rank(&self) -> i32 {
        self.endpoint.rank as i32
    }

    fn size(&self) -> i32 {
        self.group_size() as i32
    }

    fn barrier(&self) -> Result<()> {
        if self.group_size() <= 1 {
            return Ok(());
        }
        self.synchronize()
            .context(|| format!("{} was not able to complete a barrier", self))
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn uses_distributed_transport(&self) -> bool {
        true
    }

    fn is_identical(&self, other: &dyn Communicator) -> bool {
        match other.backend() {
            Backend::Distributed(other) => {
                Arc::ptr_eq(&self.endpoint.mailbox, &other.endpoint.mailbox)
                    && self.endpoint.context == other.endpoint.context
            }
            _ => false,
        }
    }

    fn split_with_key(&self, color: i32, key: i32) -> CommHandle {
        match self.split_group(color, key) {
            Ok(Some(group)) => {
                debug!("{} split with color {} into {}", self, color, group);
                Arc::new(group)
            }
            Ok(None) => NullCommunicator::get(),
            Err(e) => {
                error!("{} was not able to split with color {}: {}", self, color, e);
                NullCommunicator::get()
            }
        }
    }

    fn backend(&self) -> Backend<'_> {
        Backend::Distributed(self)
    }
}

impl fmt::Display for DistributedCommunicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.world { "World " } else { "" };
        write!(
            f,
            "Distributed {}Communicator (rank={}, size={})",
            kind,
            self.rank(),
            self.size()
        )
    }
}
