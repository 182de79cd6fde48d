//! Smoke tests for the public API surface.

use nanoloop::prelude::*;

#[compio::test]
async fn test_prelude_pair_roundtrip() {
    nanoloop::dev_tracing::init_tracing();

    let a = NnSocket::inproc(Protocol::Pair).unwrap();
    a.bind("inproc://facade-pair").unwrap();
    let b = NnSocket::inproc(Protocol::Pair).unwrap();
    b.connect("inproc://facade-pair").unwrap();

    b.send(Bytes::from_static(b"hi")).await.unwrap();
    assert_eq!(a.recv().await.unwrap(), "hi");
    assert_eq!(a.endpoints(), vec!["inproc://facade-pair".to_string()]);

    a.close();
    b.close();
}

#[test]
fn test_reexported_modules() {
    let endpoint = nanoloop::endpoint::Endpoint::parse("inproc://facade").unwrap();
    assert!(endpoint.is_inproc());
    assert_eq!(nanoloop::protocol::Protocol::Sub as u16, 33);
    assert_eq!(nanoloop::options::SocketOptions::default().recv_queue_max_size, 500);
}
