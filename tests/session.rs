use peercomm::message::{self, Communicator, LocalTransport};
use peercomm::Session;

/// The session is process-wide, so its whole lifecycle is checked in one
/// test.
#[test]
fn session_lifecycle_selects_the_backend() {
    peercomm::logging::init();

    assert!(!Session::is_initialized());
    assert!(!Session::is_distributed_transport_used());
    assert_eq!((Session::rank(), Session::size()), (0, 1));

    let serial = message::default_communicator();
    assert!(!serial.uses_distributed_transport());
    assert_eq!(serial.to_string(), "Serial Communicator (rank=0, size=1)");
    assert!(Session::finalize().is_err());

    let mut universe = LocalTransport::universe(1);
    Session::initialize(universe.remove(0)).unwrap();
    assert!(Session::is_initialized());
    assert!(Session::is_distributed_transport_used());
    assert_eq!((Session::rank(), Session::size()), (0, 1));

    let world = message::default_communicator();
    assert!(world.uses_distributed_transport());
    assert!(world.is_identical(message::default_communicator().as_ref()));
    assert!(!world.is_identical(serial.as_ref()));
    assert_eq!(world.to_string(), "Distributed World Communicator (rank=0, size=1)");
    assert_eq!(message::all_reduce_value(world.as_ref(), &5, message::Plus).unwrap(), 5);

    let again = LocalTransport::universe(1).remove(0);
    assert!(matches!(Session::initialize(again), Err(peercomm::Error::Session(_))));

    let mut timer = Session::create_timer();
    timer.start();
    assert!(timer.is_running());
    timer.stop();
    assert!(timer.elapsed() >= 0.0);
    assert!(Session::wall_time() >= 0.0);

    Session::finalize().unwrap();
    assert!(Session::is_finalized());
    assert!(!Session::is_distributed_transport_used());
    assert!(!message::default_communicator().uses_distributed_transport());
    assert!(Session::finalize().is_err());

    let late = LocalTransport::universe(1).remove(0);
    assert!(Session::initialize(late).is_err());
}
