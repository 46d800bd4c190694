use peercomm::message::{DistributedCommunicator, LocalTransport};

/// Run `f` once per rank of an in-process group of `size`, each on its own
/// thread, and return the results in rank order.
pub fn run_group<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&DistributedCommunicator) -> R + Sync,
{
    let f = &f;
    std::thread::scope(|scope| {
        let handles: Vec<_> = LocalTransport::universe(size)
            .into_iter()
            .map(|transport| scope.spawn(move || f(&DistributedCommunicator::new(transport))))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// The group sizes every collective is checked against.
#[allow(dead_code)]
pub const GROUP_SIZES: [usize; 2] = [1, 5];
