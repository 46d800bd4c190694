//! Point-to-point transfers, probes, and request completion.
//!
//! Every function here needs a distributed group of at least two processes
//! and raises [`Error::InvalidCommunicator`] otherwise, before any transport
//! is touched.

use super::buffer::ValueBuffer;
use super::comm::{check_rank, point_to_point_route, Communicator};
use super::request::Request;
use super::status::Status;
use crate::coder::Payload;
use crate::error::{Error, Result, TransportError, WithContext};

/// Blocking send of `values` to `dest`. Returns once the transport has
/// taken the message.
pub fn send<T: Payload>(comm: &dyn Communicator, dest: i32, tag: i32, values: &[T]) -> Result<()> {
    let distributed = point_to_point_route(comm, "blocking send")?;
    check_rank(comm, dest, "destination process", false)?;

    distributed.send(dest as usize, tag, values).context(|| {
        format!(
            "{} was not able to send to destination process {} with tag {}",
            comm, dest, tag
        )
    })
}

/// Blocking send of one value. The receiver sees a message of one value,
/// however many elements a container `value` holds.
pub fn send_value<T: Payload>(comm: &dyn Communicator, dest: i32, tag: i32, value: &T) -> Result<()> {
    send(comm, dest, tag, std::slice::from_ref(value))
}

/// Blocking receive from `source` (or [`super::ANY_SOURCE`]) with `tag` (or
/// [`super::ANY_TAG`]). A growable buffer takes the message's length; a
/// fixed view must be at least as long as the message.
pub fn receive<T, B>(comm: &dyn Communicator, source: i32, tag: i32, buffer: &mut B) -> Result<Status>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    let distributed = point_to_point_route(comm, "blocking receive")?;
    check_rank(comm, source, "source process", true)?;

    distributed.receive_into(source, tag, buffer).context(|| {
        format!(
            "{} was not able to receive from source process {} with tag {}",
            comm, source, tag
        )
    })
}

/// Blocking receive of a message holding exactly one value.
pub fn receive_value<T: Payload>(comm: &dyn Communicator, source: i32, tag: i32) -> Result<(T, Status)> {
    let mut values = Vec::new();
    let status = receive(comm, source, tag, &mut values)?;

    match values.len() {
        1 => Ok((values.remove(0), status)),
        count => Err(Error::Communication {
            context: format!(
                "{} expected a single value from source process {} with tag {}",
                comm,
                status.source(),
                status.tag()
            ),
            source: TransportError::LengthMismatch {
                expected: 1,
                actual: count,
            },
        }),
    }
}

/// Start a send and return at once. The message is handed to the transport
/// before this returns, so `values` may be reused immediately.
pub fn isend<T: Payload>(comm: &dyn Communicator, dest: i32, tag: i32, values: &[T]) -> Result<Request<'static>> {
    let distributed = point_to_point_route(comm, "non-blocking send")?;
    check_rank(comm, dest, "destination process", false)?;

    distributed.isend(dest as usize, tag, values).context(|| {
        format!(
            "{} was not able to start a send to destination process {} with tag {}",
            comm, dest, tag
        )
    })
}

/// Start a receive into `buffer` and return at once. The buffer stays
/// borrowed until the request has been waited on.
pub fn ireceive<'a, T, B>(comm: &dyn Communicator, source: i32, tag: i32, buffer: &'a mut B) -> Result<Request<'a>>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized + 'a,
{
    let distributed = point_to_point_route(comm, "non-blocking receive")?;
    check_rank(comm, source, "source process", true)?;

    distributed.ireceive(source, tag, buffer).context(|| {
        format!(
            "{} was not able to start a receive from source process {} with tag {}",
            comm, source, tag
        )
    })
}

/// Block until a message from `source` with `tag` is waiting, and describe
/// it without receiving it.
pub fn probe(comm: &dyn Communicator, source: i32, tag: i32) -> Result<Status> {
    let distributed = point_to_point_route(comm, "blocking probe")?;
    check_rank(comm, source, "source process", true)?;

    distributed.probe(source, tag).context(|| {
        format!(
            "{} was not able to probe source process {} with tag {}",
            comm, source, tag
        )
    })
}

/// [`probe`] for a message with any tag.
pub fn probe_source(comm: &dyn Communicator, source: i32) -> Result<Status> {
    probe(comm, source, comm.any_tag_value())
}

/// [`probe`] for a message with `tag` from any source.
pub fn probe_tag(comm: &dyn Communicator, tag: i32) -> Result<Status> {
    probe(comm, comm.any_source_value(), tag)
}

/// [`probe`] for any message at all.
pub fn probe_any(comm: &dyn Communicator) -> Result<Status> {
    probe(comm, comm.any_source_value(), comm.any_tag_value())
}

/// Describe a waiting message from `source` with `tag` if there is one.
/// Otherwise the returned status has no message details.
pub fn iprobe(comm: &dyn Communicator, source: i32, tag: i32) -> Result<Status> {
    let distributed = point_to_point_route(comm, "non-blocking probe")?;
    check_rank(comm, source, "source process", true)?;

    distributed.iprobe(source, tag).context(|| {
        format!(
            "{} was not able to probe source process {} with tag {}",
            comm, source, tag
        )
    })
}

pub fn iprobe_source(comm: &dyn Communicator, source: i32) -> Result<Status> {
    iprobe(comm, source, comm.any_tag_value())
}

pub fn iprobe_tag(comm: &dyn Communicator, tag: i32) -> Result<Status> {
    iprobe(comm, comm.any_source_value(), tag)
}

pub fn iprobe_any(comm: &dyn Communicator) -> Result<Status> {
    iprobe(comm, comm.any_source_value(), comm.any_tag_value())
}

/// Block until the request's operation completes.
pub fn wait(comm: &dyn Communicator, request: Request<'_>) -> Result<Status> {
    point_to_point_route(comm, "wait")?;
    request.wait()
}

/// Wait for every request, in order, and return their statuses.
pub fn wait_all<'a, I>(comm: &dyn Communicator, requests: I) -> Result<Vec<Status>>
where
    I: IntoIterator<Item = Request<'a>>,
{
    point_to_point_route(comm, "wait")?;
    requests.into_iter().map(Request::wait).collect()
}
