mod common;

use common::run_group;
use peercomm::message::{self, Communicator, Plus};

#[test]
fn splitting_by_parity_partitions_the_group() {
    let results = run_group(5, |comm| {
        let group = comm.split(comm.rank() % 2);
        let members = message::all_reduce_value(group.as_ref(), &1, Plus).unwrap();
        let mut ranks = Vec::new();
        message::all_gather(group.as_ref(), &[comm.rank()], &mut ranks).unwrap();
        (group.rank(), group.size(), members, ranks)
    });

    let evens: Vec<_> = results.iter().step_by(2).collect();
    let odds: Vec<_> = results.iter().skip(1).step_by(2).collect();
    assert_eq!(evens.len() + odds.len(), 5);

    for (new_rank, (rank, size, members, ranks)) in evens.into_iter().enumerate() {
        assert_eq!((*rank, *size, *members), (new_rank as i32, 3, 3));
        assert_eq!(ranks, &vec![0, 2, 4]);
    }
    for (new_rank, (rank, size, members, ranks)) in odds.into_iter().enumerate() {
        assert_eq!((*rank, *size, *members), (new_rank as i32, 2, 2));
        assert_eq!(ranks, &vec![1, 3]);
    }
}

#[test]
fn split_groups_can_be_split_again() {
    let results = run_group(6, |comm| {
        let halves = comm.split(comm.rank() / 3);
        let singles = halves.split(halves.rank());
        (halves.size(), singles.size(), singles.rank(), singles.is_identical(halves.as_ref()))
    });
    assert!(results.into_iter().all(|r| r == (3, 1, 0, false)));
}

#[test]
fn a_group_of_one_answers_collectives_locally() {
    let results = run_group(3, |comm| {
        let alone = comm.split(comm.rank());
        let mut output = Vec::new();
        message::all_gather(alone.as_ref(), &[comm.rank()], &mut output).unwrap();
        let send = message::send(alone.as_ref(), 0, 0, &[1]).unwrap_err();
        (alone.size(), output, send.is_invalid_communicator())
    });
    for (rank, (size, output, rejected)) in results.into_iter().enumerate() {
        assert_eq!((size, output, rejected), (1, vec![rank as i32], true));
    }
}

#[test]
fn opting_out_yields_the_null_communicator() {
    let results = run_group(4, |comm| {
        let color = if comm.rank() == 0 { -1 } else { 0 };
        let group = comm.split(color);
        let rejected = message::all_reduce_value(group.as_ref(), &1, Plus).is_err();
        (group.to_string(), rejected)
    });
    assert_eq!(results[0], ("Null Communicator".to_string(), true));
    assert_eq!(
        results[3],
        ("Distributed Communicator (rank=2, size=3)".to_string(), false)
    );
}
