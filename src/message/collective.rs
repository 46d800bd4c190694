//! Collective operations.
//!
//! Every process in the group must make the same sequence of collective
//! calls with compatible arguments. A group of one answers every call
//! locally and never touches a transport; the null group is rejected.
//!
//! Outputs are written through [`ValueBuffer`]. A growable output takes
//! whatever length the operation produces. A fixed output view must be at
//! least as long as what the operation writes, and only that leading part
//! is overwritten.
//!
//! A process whose own arguments are rejected still takes its part in the
//! exchange (or retires it, when it cannot take part), so the collectives
//! that follow line up across the group. Output views are checked once the
//! exchange is done and are left untouched when they are rejected.

use super::buffer::{shortfall, ValueBuffer};
use super::comm::{check_rank, collective_route, Communicator, Route};
use super::reduce_op::ReduceOperation;
use super::serial::{ignore_root, scatterv_local};
use crate::coder::Payload;
use crate::error::{Error, Result, TransportError, WithContext};
use log::warn;

fn require_room<T, B>(buffer: &B, needed: usize) -> Result<()>
where
    B: ValueBuffer<T> + ?Sized,
{
    match shortfall(buffer, needed) {
        Some(actual) => Err(Error::InvalidBuffer {
            expected: needed,
            actual,
        }),
        None => Ok(()),
    }
}

/// Check room for `values` and store them.
fn deposit<T, B>(output: &mut B, values: Vec<T>) -> Result<()>
where
    B: ValueBuffer<T> + ?Sized,
{
    require_room(output, values.len())?;
    output.store(values);
    Ok(())
}

/// Validate `root` and tell whether this process is it. A single process is
/// the root whatever was asked for. A process of a distributed group that
/// rejects the root retires the collective it will not take part in.
fn resolve_root(comm: &dyn Communicator, route: &Route<'_>, operation: &str, root: i32) -> Result<bool> {
    match route {
        Route::Local => {
            ignore_root(operation, root);
            Ok(true)
        }
        Route::Distributed(distributed) => match check_rank(comm, root, "root process", false) {
            Ok(()) => Ok(comm.rank() == root),
            Err(e) => {
                distributed.skip_collective();
                Err(e)
            }
        },
    }
}

/// Check that `sizes` (and `offsets`, when given) describe every process.
fn require_layout(sizes: &[usize], offsets: Option<&[usize]>, processes: usize) -> Result<()> {
    for len in std::iter::once(sizes.len()).chain(offsets.map(|o| o.len())) {
        if len < processes {
            return Err(Error::InvalidBuffer {
                expected: processes,
                actual: len,
            });
        }
    }
    Ok(())
}

/// `Err` unless `len` values split evenly over `processes`.
fn require_even(len: usize, processes: usize) -> Result<()> {
    if len % processes != 0 {
        return Err(Error::InvalidBuffer {
            expected: (len / processes + 1) * processes,
            actual: len,
        });
    }
    Ok(())
}

/// Output positions for a variable layout: the given offsets, or the
/// running total of the sizes.
fn displacements(sizes: &[usize], offsets: Option<&[usize]>) -> Vec<usize> {
    match offsets {
        Some(offsets) => offsets.iter().take(sizes.len()).copied().collect(),
        None => sizes
            .iter()
            .scan(0, |total, size| {
                let offset = *total;
                *total += size;
                Some(offset)
            })
            .collect(),
    }
}

/// Split `input` into `processes` equal blocks.
fn blocks<T: Clone>(input: &[T], processes: usize) -> Vec<Vec<T>> {
    let each = input.len() / processes;
    (0..processes)
        .map(|i| input[i * each..(i + 1) * each].to_vec())
        .collect()
}

/// Concatenate equally long contributions, checking that they are.
fn flatten<T>(parts: Vec<Vec<T>>, each: usize, context: impl FnOnce() -> String) -> Result<Vec<T>> {
    if let Some(part) = parts.iter().find(|part| part.len() != each) {
        return Err(Error::Communication {
            context: context(),
            source: TransportError::LengthMismatch {
                expected: each,
                actual: part.len(),
            },
        });
    }
    Ok(parts.into_iter().flatten().collect())
}

fn single<T>(values: Vec<T>, context: impl FnOnce() -> String) -> Result<T> {
    let count = values.len();
    values.into_iter().next().ok_or_else(|| Error::Communication {
        context: context(),
        source: TransportError::LengthMismatch {
            expected: 1,
            actual: count,
        },
    })
}

/// Every process contributes `input`; every process receives all
/// contributions in rank order, rank `i`'s at offset `i * input.len()`.
pub fn all_gather<T, B>(comm: &dyn Communicator, input: &[T], output: &mut B) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    let gathered = match collective_route(comm)? {
        Route::Local => input.to_vec(),
        Route::Distributed(distributed) => {
            let describe = || format!("{} was not able to gather to all processes", comm);
            let parts = distributed.all_gather(input).context(describe)?;
            flatten(parts, input.len(), describe)?
        }
    };
    deposit(output, gathered)
}

/// Every process receives the element-wise reduction of every process's
/// `input`.
pub fn all_reduce<T, B, Op>(comm: &dyn Communicator, input: &[T], output: &mut B, op: Op) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
    Op: ReduceOperation<T>,
{
    let reduced = match collective_route(comm)? {
        Route::Local => input.to_vec(),
        Route::Distributed(distributed) => distributed
            .all_reduce(input.to_vec(), &op)
            .context(|| format!("{} was not able to reduce to all processes", comm))?,
    };
    deposit(output, reduced)
}

/// [`all_reduce`] that reduces into the buffer holding the contribution.
pub fn all_reduce_in_place<T, B, Op>(comm: &dyn Communicator, buffer: &mut B, op: Op) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
    Op: ReduceOperation<T>,
{
    let input = buffer.values().to_vec();
    all_reduce(comm, &input, buffer, op)
}

pub fn all_reduce_value<T, Op>(comm: &dyn Communicator, value: &T, op: Op) -> Result<T>
where
    T: Payload,
    Op: ReduceOperation<T>,
{
    let mut output = Vec::with_capacity(1);
    all_reduce(comm, std::slice::from_ref(value), &mut output, op)?;
    single(output, || format!("{} produced no reduced value", comm))
}

/// Every process sends `input.len() / size` values to each process, the
/// block at offset `i * n` going to rank `i`, and receives one block from
/// each, rank `i`'s at offset `i * n`.
pub fn all_to_all<T, B>(comm: &dyn Communicator, input: &[T], output: &mut B) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    let route = collective_route(comm)?;
    let processes = comm.size() as usize;
    let even = require_even(input.len(), processes);

    let exchanged = match route {
        Route::Local => {
            even?;
            input.to_vec()
        }
        Route::Distributed(distributed) => {
            let describe = || format!("{} was not able to exchange values between all processes", comm);
            let chunks = even.as_ref().ok().map(|_| blocks(input, processes));
            let parts = distributed.all_to_all(chunks).context(describe);
            even?;
            flatten(parts?, input.len() / processes, describe)?
        }
    };
    deposit(output, exchanged)
}

/// Replicate the root's `buffer` to every process.
pub fn broadcast<T, B>(comm: &dyn Communicator, buffer: &mut B, root: i32) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    let route = collective_route(comm)?;
    let is_root = resolve_root(comm, &route, "broadcast", root)?;

    match route {
        Route::Local => {}
        Route::Distributed(distributed) => {
            let describe = || format!("{} was not able to broadcast from root process {}", comm, root);
            let value = if is_root {
                buffer.values().to_vec()
            } else {
                Vec::new()
            };
            let value = distributed.broadcast(root as usize, value).context(describe)?;

            if let Some(capacity) = buffer.fixed_len() {
                if value.len() > capacity {
                    return Err(Error::Communication {
                        context: describe(),
                        source: TransportError::Truncated {
                            capacity,
                            count: value.len(),
                        },
                    });
                }
            }
            buffer.store(value)
        }
    }
    Ok(())
}

pub fn broadcast_value<T: Payload>(comm: &dyn Communicator, value: &mut T, root: i32) -> Result<()> {
    broadcast(comm, std::slice::from_mut(value), root)
}

/// The root receives every process's `input`, rank `i`'s at offset
/// `i * input.len()`. Other processes' `output` is left alone.
pub fn gather<T, B>(comm: &dyn Communicator, input: &[T], output: &mut B, root: i32) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    let route = collective_route(comm)?;
    resolve_root(comm, &route, "gather", root)?;

    let gathered = match route {
        Route::Local => input.to_vec(),
        Route::Distributed(distributed) => {
            let describe = || format!("{} was not able to gather to root process {}", comm, root);

            match distributed.gather(root as usize, input).context(describe)? {
                Some(parts) => flatten(parts, input.len(), describe)?,
                None => return Ok(()),
            }
        }
    };
    deposit(output, gathered)
}

/// Like [`gather`], but contributions may differ in length. The root
/// receives them concatenated in rank order.
pub fn gatherv<T, B>(comm: &dyn Communicator, input: &[T], output: &mut B, root: i32) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    let route = collective_route(comm)?;
    resolve_root(comm, &route, "gatherv", root)?;

    let gathered = match route {
        Route::Local => input.to_vec(),
        Route::Distributed(distributed) => {
            let parts = distributed
                .gather(root as usize, input)
                .context(|| format!("{} was not able to gather to root process {}", comm, root))?;
            match parts {
                Some(parts) => parts.into_iter().flatten().collect(),
                None => return Ok(()),
            }
        }
    };
    deposit(output, gathered)
}

/// Like [`gather`], with the layout at the root given explicitly: the root
/// places the first `sizes[i]` values from rank `i` at output position
/// `offsets[i]`, or packed in rank order when no offsets are given. With
/// offsets, the output must already span the whole layout; positions not
/// covered keep their values. `sizes` and `offsets` are only read at the
/// root.
pub fn gatherv_with_sizes<T, B>(
    comm: &dyn Communicator,
    input: &[T],
    output: &mut B,
    sizes: &[usize],
    offsets: Option<&[usize]>,
    root: i32,
) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    let route = collective_route(comm)?;
    let processes = comm.size() as usize;
    resolve_root(comm, &route, "gatherv", root)?;

    let parts = match route {
        Route::Local => vec![input.to_vec()],
        Route::Distributed(distributed) => {
            let parts = distributed
                .gather(root as usize, input)
                .context(|| format!("{} was not able to gather to root process {}", comm, root))?;
            match parts {
                Some(parts) => parts,
                None => return Ok(()),
            }
        }
    };
    require_layout(sizes, offsets, processes)?;
    let sizes = &sizes[..processes];

    if offsets.is_none() && output.fixed_len().is_none() {
        let packed = parts
            .into_iter()
            .zip(sizes)
            .enumerate()
            .flat_map(|(rank, (part, &size))| take_leading(part, size, rank))
            .collect();
        output.store(packed);
        return Ok(());
    }
    let positions = displacements(sizes, offsets);
    let total = positions
        .iter()
        .zip(sizes)
        .map(|(offset, size)| offset + size)
        .max()
        .unwrap_or(0);
    let actual = output.values().len();

    if actual < total {
        return Err(Error::InvalidBuffer {
            expected: total,
            actual,
        });
    }
    let mut placed = output.values().to_vec();

    for (rank, (part, (&size, &offset))) in parts
        .into_iter()
        .zip(sizes.iter().zip(&positions))
        .enumerate()
    {
        let part = take_leading(part, size, rank);
        let end = offset + part.len();
        placed[offset..end].clone_from_slice(&part);
    }
    output.store(placed);
    Ok(())
}

/// The first `size` values of a contribution, or all of it (with a
/// warning) if it is shorter.
fn take_leading<T>(mut part: Vec<T>, size: usize, rank: usize) -> Vec<T> {
    if part.len() < size {
        warn!(
            "process {} contributed {} values where {} were expected",
            rank,
            part.len(),
            size
        );
    }
    part.truncate(size);
    part
}

/// The root's `input` is split into `size` equal blocks and block `i` is
/// delivered to rank `i`. `input` is only read at the root. When the root
/// rejects its input, the other processes fail too.
pub fn scatter<T, B>(comm: &dyn Communicator, input: &[T], output: &mut B, root: i32) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    let route = collective_route(comm)?;
    let processes = comm.size() as usize;
    let is_root = resolve_root(comm, &route, "scatter", root)?;
    let even = if is_root {
        require_even(input.len(), processes)
    } else {
        Ok(())
    };

    let block = match route {
        Route::Local => {
            even?;
            input.to_vec()
        }
        Route::Distributed(distributed) => {
            let chunks = match &even {
                Ok(()) if is_root => Some(blocks(input, processes)),
                _ => None,
            };
            let block = distributed
                .scatter(root as usize, chunks)
                .context(|| format!("{} was not able to scatter from root process {}", comm, root));
            even?;
            block?
        }
    };
    deposit(output, block)
}

/// The inverse of [`gatherv_with_sizes`]: rank `i` receives `sizes[i]` of
/// the root's `input` values starting at `offsets[i]`, or packed in rank
/// order when no offsets are given. Blocks reaching past the end of the
/// input, or longer than a fixed output view, are cut short with a warning.
/// `input`, `sizes`, and `offsets` are only read at the root. When the root
/// rejects its layout, the other processes fail too.
pub fn scatterv<T, B>(
    comm: &dyn Communicator,
    input: &[T],
    output: &mut B,
    sizes: &[usize],
    offsets: Option<&[usize]>,
    root: i32,
) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
{
    let route = collective_route(comm)?;
    let processes = comm.size() as usize;
    let is_root = resolve_root(comm, &route, "scatterv", root)?;
    let layout = if is_root {
        require_layout(sizes, offsets, processes)
    } else {
        Ok(())
    };

    let block = match route {
        Route::Local => {
            layout?;
            let positions = displacements(&sizes[..1], offsets);
            scatterv_local(input, sizes[0], positions[0], output.fixed_len())
        }
        Route::Distributed(distributed) => {
            let chunks = match &layout {
                Ok(()) if is_root => Some(
                    displacements(&sizes[..processes], offsets)
                        .into_iter()
                        .zip(sizes)
                        .map(|(offset, &size)| scatterv_local(input, size, offset, None))
                        .collect(),
                ),
                _ => None,
            };
            let block = distributed
                .scatter(root as usize, chunks)
                .context(|| format!("{} was not able to scatter from root process {}", comm, root));
            layout?;
            let mut block = block?;

            if let Some(capacity) = output.fixed_len() {
                if block.len() > capacity {
                    warn!(
                        "scatterv output only has room for {} of {} values; the rest will be ignored",
                        capacity,
                        block.len()
                    );
                    block.truncate(capacity)
                }
            }
            block
        }
    };
    output.store(block);
    Ok(())
}

/// The root receives the element-wise reduction of every process's `input`.
/// Other processes' `output` is left alone.
pub fn reduce<T, B, Op>(comm: &dyn Communicator, input: &[T], output: &mut B, op: Op, root: i32) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
    Op: ReduceOperation<T>,
{
    let route = collective_route(comm)?;
    resolve_root(comm, &route, "reduce", root)?;

    let reduced = match route {
        Route::Local => input.to_vec(),
        Route::Distributed(distributed) => {
            let reduced = distributed
                .reduce(root as usize, input.to_vec(), &op)
                .context(|| format!("{} was not able to reduce to root process {}", comm, root))?;
            match reduced {
                Some(reduced) => reduced,
                None => return Ok(()),
            }
        }
    };
    deposit(output, reduced)
}

/// The reduction of one value per process, delivered to the root only.
pub fn reduce_value<T, Op>(comm: &dyn Communicator, value: &T, op: Op, root: i32) -> Result<Option<T>>
where
    T: Payload,
    Op: ReduceOperation<T>,
{
    let mut output = Vec::new();
    reduce(comm, std::slice::from_ref(value), &mut output, op, root)?;

    if comm.rank() == root || comm.size() == 1 {
        single(output, || format!("{} produced no reduced value", comm)).map(Some)
    } else {
        Ok(None)
    }
}

/// Inclusive prefix reduction: rank `i` receives the element-wise
/// reduction of the inputs of ranks `0..=i`.
pub fn scan<T, B, Op>(comm: &dyn Communicator, input: &[T], output: &mut B, op: Op) -> Result<()>
where
    T: Payload,
    B: ValueBuffer<T> + ?Sized,
    Op: ReduceOperation<T>,
{
    let scanned = match collective_route(comm)? {
        Route::Local => input.to_vec(),
        Route::Distributed(distributed) => distributed
            .scan(input.to_vec(), &op)
            .context(|| format!("{} was not able to scan", comm))?,
    };
    deposit(output, scanned)
}

pub fn scan_value<T, Op>(comm: &dyn Communicator, value: &T, op: Op) -> Result<T>
where
    T: Payload,
    Op: ReduceOperation<T>,
{
    let mut output = Vec::with_capacity(1);
    scan(comm, std::slice::from_ref(value), &mut output, op)?;
    single(output, || format!("{} produced no scanned value", comm))
}
