mod common;

use common::run_group;
use peercomm::message::{self, Communicator, ANY_SOURCE, ANY_TAG};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[test]
fn blocking_receive_reports_the_sender_and_tag() {
    let results = run_group(2, |comm| {
        if comm.rank() == 0 {
            message::send_value(comm, 1, 7, &"hello".to_string()).unwrap();
            None
        } else {
            let (value, status): (String, _) = message::receive_value(comm, 0, 7).unwrap();
            Some((value, status.source(), status.tag(), status.cancelled(), status.count()))
        }
    });
    assert_eq!(
        results[1],
        Some(("hello".to_string(), 0, 7, false, 1))
    );
}

#[test]
fn messages_with_the_same_tag_arrive_in_send_order() {
    let results = run_group(2, |comm| {
        let mut received = Vec::new();
        if comm.rank() == 0 {
            for (tag, word) in [(1, "a"), (2, "b"), (1, "c")] {
                message::send_value(comm, 1, tag, &word.to_string()).unwrap();
            }
        } else {
            for tag in [2, 1, 1] {
                let (word, _): (String, _) = message::receive_value(comm, 0, tag).unwrap();
                received.push(word);
            }
        }
        received
    });
    assert_eq!(results[1], vec!["b", "a", "c"]);
}

#[test]
fn wildcards_match_any_sender_and_tag() {
    let results = run_group(3, |comm| {
        let mut sources = Vec::new();
        if comm.rank() == 0 {
            for _ in 0..2 {
                let mut buffer = Vec::<i32>::new();
                let status = message::receive(comm, ANY_SOURCE, ANY_TAG, &mut buffer).unwrap();
                assert_eq!(buffer, vec![status.source() * 10]);
                assert_eq!(status.tag(), status.source() + 20);
                sources.push(status.source());
            }
            sources.sort_unstable();
        } else {
            message::send(comm, 0, comm.rank() + 20, &[comm.rank() * 10]).unwrap();
        }
        sources
    });
    assert_eq!(results[0], vec![1, 2]);
}

#[test]
fn probing_does_not_consume_the_message() {
    let results = run_group(2, |comm| {
        if comm.rank() == 0 {
            message::send(comm, 1, 5, &[1.5, 2.5, 3.5]).unwrap();
            return None;
        }
        let probed = message::probe(comm, 0, 5).unwrap();
        let again = message::probe_source(comm, 0).unwrap();
        let mut buffer = Vec::<f64>::new();
        let received = message::receive(comm, 0, 5, &mut buffer).unwrap();
        let after = message::iprobe_any(comm).unwrap();

        Some((
            probed.count(),
            again.tag(),
            received.source(),
            buffer,
            after.has_message_details(),
        ))
    });
    assert_eq!(results[1], Some((3, 5, 0, vec![1.5, 2.5, 3.5], false)));
}

#[test]
fn iprobe_reports_nothing_until_a_message_is_waiting() {
    let results = run_group(2, |comm| {
        if comm.rank() == 0 {
            comm.barrier().unwrap();
            message::send_value(comm, 1, 11, &42u64).unwrap();
            return (true, 0);
        }
        let before = message::iprobe(comm, 0, 11).unwrap();
        comm.barrier().unwrap();

        let status = loop {
            let status = message::iprobe_source(comm, 0).unwrap();
            if status.has_message_details() {
                break status;
            }
            std::thread::yield_now();
        };
        let (value, _): (u64, _) = message::receive_value(comm, 0, 11).unwrap();
        (!before.has_message_details() && status.tag() == 11, value)
    });
    assert_eq!(results[1], (true, 42));
}

#[test]
fn probing_by_tag_matches_any_sender() {
    let results = run_group(3, |comm| {
        if comm.rank() != 0 {
            message::send_value(comm, 0, 20 + comm.rank(), &comm.rank()).unwrap();
            return Vec::new();
        }
        let mut seen = Vec::new();

        for &tag in &[22, 21] {
            let status = message::probe_tag(comm, tag).unwrap();
            assert_eq!(status.tag(), tag);
            let (value, _): (i32, _) = message::receive_value(comm, status.source(), tag).unwrap();
            seen.push((status.source(), value));
        }
        assert!(!message::iprobe_tag(comm, 21).unwrap().has_message_details());
        seen
    });
    assert_eq!(results[0], vec![(2, 2), (1, 1)]);
}

#[test]
fn non_blocking_transfers_complete_on_wait() {
    let results = run_group(2, |comm| {
        if comm.rank() == 0 {
            let request = message::isend(comm, 1, 3, &[1, 2, 3]).unwrap();
            let status = message::wait(comm, request).unwrap();
            (status.source(), status.tag(), status.count(), [0; 5])
        } else {
            let mut buffer = [0; 5];
            let request = message::ireceive(comm, 0, 3, &mut buffer).unwrap();
            let status = message::wait(comm, request).unwrap();
            (status.source(), status.tag(), status.count(), buffer)
        }
    });
    assert_eq!(results[0], (0, 3, 3, [0; 5]));
    assert_eq!(results[1], (0, 3, 3, [1, 2, 3, 0, 0]));
}

#[test]
fn cancelling_an_unmatched_receive_leaves_the_buffer_alone() {
    let results = run_group(2, |comm| {
        if comm.rank() == 0 {
            let mut request = message::isend(comm, 1, 8, &["sent".to_string()]).unwrap();
            request.cancel().unwrap();
            let status = request.wait().unwrap();
            comm.barrier().unwrap();
            return (status.cancelled(), Vec::new());
        }
        let mut buffer = vec!["untouched".to_string()];
        let mut request = message::ireceive(comm, 0, 99, &mut buffer).unwrap();
        request.cancel().unwrap();
        let status = message::wait(comm, request).unwrap();
        assert!(status.cancelled());

        comm.barrier().unwrap();
        let (sent, _): (String, _) = message::receive_value(comm, 0, 8).unwrap();
        buffer.push(sent);
        (status.cancelled(), buffer)
    });
    assert_eq!(results[0], (false, Vec::new()));
    assert_eq!(
        results[1],
        (true, vec!["untouched".to_string(), "sent".to_string()])
    );
}

#[test]
fn cancelling_a_matched_receive_has_no_effect() {
    let results = run_group(2, |comm| {
        if comm.rank() == 0 {
            message::send_value(comm, 1, 4, &'x').unwrap();
            comm.barrier().unwrap();
            return None;
        }
        comm.barrier().unwrap();
        let mut buffer = Vec::<char>::new();
        let mut request = message::ireceive(comm, 0, 4, &mut buffer).unwrap();
        request.cancel().unwrap();
        let status = request.wait().unwrap();
        Some((status.cancelled(), buffer))
    });
    assert_eq!(results[1], Some((false, vec!['x'])));
}

#[test]
fn wait_all_returns_statuses_in_request_order() {
    let results = run_group(2, |comm| {
        if comm.rank() == 0 {
            let requests = (0..3)
                .map(|tag| message::isend(comm, 1, tag, &[tag; 2]).unwrap())
                .collect::<Vec<_>>();
            let statuses = message::wait_all(comm, requests).unwrap();
            return statuses.iter().map(|s| s.tag()).collect::<Vec<_>>();
        }
        let (mut a, mut b, mut c) = (Vec::<i32>::new(), Vec::<i32>::new(), Vec::<i32>::new());
        let requests = vec![
            message::ireceive(comm, 0, 2, &mut c).unwrap(),
            message::ireceive(comm, 0, 0, &mut a).unwrap(),
            message::ireceive(comm, 0, 1, &mut b).unwrap(),
        ];
        let statuses = message::wait_all(comm, requests).unwrap();
        assert_eq!((a, b, c), (vec![0, 0], vec![1, 1], vec![2, 2]));
        statuses.iter().map(|s| s.tag()).collect()
    });
    assert_eq!(results[0], vec![0, 1, 2]);
    assert_eq!(results[1], vec![2, 0, 1]);
}

#[test]
fn containers_travel_as_a_single_value() {
    let results = run_group(2, |comm| {
        if comm.rank() == 0 {
            let mut table = BTreeMap::new();
            table.insert("alpha".to_string(), vec![1u8, 2]);
            table.insert("beta".to_string(), vec![]);
            message::send_value(comm, 1, 0, &table).unwrap();
            return None;
        }
        let (table, status): (BTreeMap<String, Vec<u8>>, _) =
            message::receive_value(comm, 0, 0).unwrap();
        Some((table.len(), table["alpha"].clone(), status.count()))
    });
    assert_eq!(results[1], Some((2, vec![1, 2], 1)));
}

#[test]
fn messages_longer_than_a_fixed_view_are_rejected() {
    let results = run_group(2, |comm| {
        if comm.rank() == 0 {
            message::send(comm, 1, 0, &[1, 2, 3, 4]).unwrap();
            return true;
        }
        let mut buffer = [0; 2];
        let error = message::receive(comm, 0, 0, &mut buffer).unwrap_err();
        error.is_communication_error() && buffer == [0, 0]
    });
    assert!(results.into_iter().all(|ok| ok));
}

#[test]
fn peers_outside_the_group_are_rejected() {
    let results = run_group(2, |comm| {
        let send = message::send(comm, 2, 0, &[1]).unwrap_err();
        let probe = message::iprobe(comm, -4, 0).unwrap_err();
        send.is_invalid_communicator() && probe.is_invalid_communicator()
    });
    assert!(results.into_iter().all(|ok| ok));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Particle {
    id: u32,
    position: [f64; 3],
    label: String,
}

#[test]
fn user_structs_travel_as_values() {
    let results = run_group(2, |comm| {
        if comm.rank() == 0 {
            let particle = Particle {
                id: 7,
                position: [0.5, -1.0, 2.0],
                label: "tracer".to_string(),
            };
            message::send_value(comm, 1, 1, &particle).unwrap();
            None
        } else {
            let (particle, status): (Particle, _) = message::receive_value(comm, 0, 1).unwrap();
            assert_eq!(status.count(), 1);
            Some(particle)
        }
    });
    assert_eq!(
        results[1],
        Some(Particle {
            id: 7,
            position: [0.5, -1.0, 2.0],
            label: "tracer".to_string(),
        })
    );
}
