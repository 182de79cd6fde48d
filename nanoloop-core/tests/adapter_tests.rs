//! Adapter behaviour against a scripted transport and a hand-cranked loop.

mod common;

use common::{mock_socket, msg, poll_once};
use nanoloop_core::error::SocketError;
use nanoloop_core::handler::HandlerState;
use nanoloop_core::monitor::SocketEvent;
use nanoloop_core::options::SocketOptions;
use nanoloop_core::socket::SocketState;
use nanoloop_core::transport::{Direction, EndpointId};
use std::task::Poll;

#[test]
fn test_send_fast_path() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());

    let mut fut = Box::pin(socket.send("hello"));
    assert!(matches!(poll_once(fut.as_mut()), Poll::Ready(Ok(()))));

    assert_eq!(state.borrow().sent, vec![msg("hello")]);
    assert_eq!(socket.send_queue_len(), 0);
    assert_eq!(reactor.adds(), 0);
    assert_eq!(socket.stats().foreground_sends, 1);
}

#[test]
fn test_send_suspends_until_writable() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().send_blocked = true;

    let mut fut = Box::pin(socket.send("hello"));
    assert!(poll_once(fut.as_mut()).is_pending());
    assert_eq!(socket.handler_state(Direction::Send), HandlerState::Registered);
    assert!(state.borrow().sent.is_empty());

    state.borrow_mut().send_blocked = false;
    assert!(reactor.fire(Direction::Send));

    assert!(matches!(poll_once(fut.as_mut()), Poll::Ready(Ok(()))));
    assert_eq!(state.borrow().sent, vec![msg("hello")]);
    assert_eq!(socket.handler_state(Direction::Send), HandlerState::Idle);
    assert!(!reactor.is_registered(Direction::Send));
    assert_eq!(reactor.adds(), 1);
    assert_eq!(reactor.removes(), 1);
}

#[test]
fn test_queued_sends_complete_in_order() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().send_blocked = true;

    let mut first = Box::pin(socket.send("1"));
    let mut second = Box::pin(socket.send("2"));
    let mut third = Box::pin(socket.send("3"));
    assert!(poll_once(first.as_mut()).is_pending());
    assert!(poll_once(second.as_mut()).is_pending());
    assert!(poll_once(third.as_mut()).is_pending());
    assert_eq!(socket.send_queue_len(), 3);
    // One registration serves the whole queue.
    assert_eq!(reactor.adds(), 1);

    state.borrow_mut().send_blocked = false;
    reactor.fire(Direction::Send);

    assert!(matches!(poll_once(first.as_mut()), Poll::Ready(Ok(()))));
    assert!(matches!(poll_once(second.as_mut()), Poll::Ready(Ok(()))));
    assert!(matches!(poll_once(third.as_mut()), Poll::Ready(Ok(()))));
    assert_eq!(state.borrow().sent, vec![msg("1"), msg("2"), msg("3")]);

    let stats = socket.stats();
    assert_eq!(stats.background_sends, 3);
    assert_eq!(stats.batched_sends, 2);
}

#[test]
fn test_new_send_waits_behind_queue() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().send_blocked = true;

    let mut first = Box::pin(socket.send("first"));
    assert!(poll_once(first.as_mut()).is_pending());

    // Transport is writable again but the callback has not run yet.
    state.borrow_mut().send_blocked = false;
    let mut second = Box::pin(socket.send("second"));
    assert!(poll_once(second.as_mut()).is_pending());
    assert!(state.borrow().sent.is_empty());

    reactor.fire(Direction::Send);
    assert_eq!(state.borrow().sent, vec![msg("first"), msg("second")]);
}

#[test]
fn test_partial_flush_keeps_handler_registered() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().send_blocked = true;

    let mut first = Box::pin(socket.send("a"));
    assert!(poll_once(first.as_mut()).is_pending());

    // Still blocked when the callback runs.
    reactor.fire(Direction::Send);
    assert!(poll_once(first.as_mut()).is_pending());
    assert_eq!(socket.send_queue_len(), 1);
    assert_eq!(socket.handler_state(Direction::Send), HandlerState::Registered);
}

#[test]
fn test_send_queue_overflow() {
    let options = SocketOptions::new().with_send_queue_max_size(2);
    let (socket, _reactor, state) = mock_socket(options);
    state.borrow_mut().send_blocked = true;

    let mut a = Box::pin(socket.send("a"));
    let mut b = Box::pin(socket.send("b"));
    assert!(poll_once(a.as_mut()).is_pending());
    assert!(poll_once(b.as_mut()).is_pending());

    let mut c = Box::pin(socket.send("c"));
    match poll_once(c.as_mut()) {
        Poll::Ready(Err(SocketError::QueueOverflow { max })) => assert_eq!(max, 2),
        other => panic!("expected overflow, got {other:?}"),
    }
    assert_eq!(socket.send_queue_len(), 2);
    assert_eq!(socket.stats().send_overflows, 1);
}

#[test]
fn test_fast_path_send_error_is_surfaced() {
    let (socket, _reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().send_error = Some("peer gone".into());

    let mut fut = Box::pin(socket.send("x"));
    assert!(matches!(
        poll_once(fut.as_mut()),
        Poll::Ready(Err(SocketError::Transport(_)))
    ));
    assert_eq!(socket.send_queue_len(), 0);
}

#[test]
fn test_queued_send_error_fails_only_that_send() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().send_blocked = true;

    let mut a = Box::pin(socket.send("a"));
    let mut b = Box::pin(socket.send("b"));
    assert!(poll_once(a.as_mut()).is_pending());
    assert!(poll_once(b.as_mut()).is_pending());

    {
        let mut state = state.borrow_mut();
        state.send_blocked = false;
        state.send_error = Some("transient".into());
    }
    reactor.fire(Direction::Send);

    assert!(matches!(
        poll_once(a.as_mut()),
        Poll::Ready(Err(SocketError::Transport(_)))
    ));
    assert!(matches!(poll_once(b.as_mut()), Poll::Ready(Ok(()))));
    assert_eq!(state.borrow().sent, vec![msg("b")]);
}

#[test]
fn test_reactor_refusal_rolls_back_send() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().send_blocked = true;
    reactor.fail_next_add.set(true);

    let mut fut = Box::pin(socket.send("a"));
    assert!(matches!(
        poll_once(fut.as_mut()),
        Poll::Ready(Err(SocketError::Reactor(_)))
    ));
    assert_eq!(socket.send_queue_len(), 0);
    assert_eq!(socket.handler_state(Direction::Send), HandlerState::Idle);
}

#[test]
fn test_abandoned_send_is_never_written() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().send_blocked = true;

    let mut kept = Box::pin(socket.send("kept"));
    let mut dropped = Box::pin(socket.send("dropped"));
    assert!(poll_once(kept.as_mut()).is_pending());
    assert!(poll_once(dropped.as_mut()).is_pending());
    drop(dropped);

    state.borrow_mut().send_blocked = false;
    reactor.fire(Direction::Send);

    assert!(matches!(poll_once(kept.as_mut()), Poll::Ready(Ok(()))));
    assert_eq!(state.borrow().sent, vec![msg("kept")]);
    assert_eq!(socket.handler_state(Direction::Send), HandlerState::Idle);
}

#[test]
fn test_recv_fast_path() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().inbound.push_back(msg("ready"));

    let mut fut = Box::pin(socket.recv());
    match poll_once(fut.as_mut()) {
        Poll::Ready(Ok(m)) => assert_eq!(m, "ready"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(reactor.adds(), 0);
    assert_eq!(socket.stats().foreground_recvs, 1);
}

#[test]
fn test_recv_suspends_then_resolves_directly() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());

    let mut fut = Box::pin(socket.recv());
    assert!(poll_once(fut.as_mut()).is_pending());
    assert!(socket.has_pending_recv());
    assert_eq!(socket.handler_state(Direction::Recv), HandlerState::Registered);

    state.borrow_mut().inbound.push_back(msg("x"));
    reactor.fire(Direction::Recv);

    match poll_once(fut.as_mut()) {
        Poll::Ready(Ok(m)) => assert_eq!(m, "x"),
        other => panic!("unexpected {other:?}"),
    }
    // Delivered to the waiter, not through the queue.
    assert_eq!(socket.recv_queue_len(), 0);
    assert!(!socket.has_pending_recv());
    assert_eq!(socket.handler_state(Direction::Recv), HandlerState::Idle);
}

#[test]
fn test_second_recv_is_rejected() {
    let (socket, _reactor, _state) = mock_socket(SocketOptions::default());

    let mut first = Box::pin(socket.recv());
    assert!(poll_once(first.as_mut()).is_pending());

    let mut second = Box::pin(socket.recv());
    assert!(matches!(
        poll_once(second.as_mut()),
        Poll::Ready(Err(SocketError::AlreadyPending))
    ));
    assert!(socket.has_pending_recv());
}

#[test]
fn test_abandoned_recv_keeps_message() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());

    let mut first = Box::pin(socket.recv());
    assert!(poll_once(first.as_mut()).is_pending());
    drop(first);

    state.borrow_mut().inbound.push_back(msg("late"));
    reactor.fire(Direction::Recv);
    assert_eq!(socket.recv_queue_len(), 1);

    let mut next = Box::pin(socket.recv());
    match poll_once(next.as_mut()) {
        Poll::Ready(Ok(m)) => assert_eq!(m, "late"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_abandoned_recv_does_not_block_next() {
    let (socket, _reactor, _state) = mock_socket(SocketOptions::default());

    let mut first = Box::pin(socket.recv());
    assert!(poll_once(first.as_mut()).is_pending());
    drop(first);

    let mut second = Box::pin(socket.recv());
    assert!(poll_once(second.as_mut()).is_pending());
    assert!(socket.has_pending_recv());
}

#[test]
fn test_buffered_messages_arrive_in_order() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state
        .borrow_mut()
        .inbound
        .extend([msg("a"), msg("b"), msg("c")]);

    assert!(socket.resume_recv().unwrap());
    reactor.fire(Direction::Recv);
    assert_eq!(socket.recv_queue_len(), 3);
    assert_eq!(socket.handler_state(Direction::Recv), HandlerState::Idle);

    for expected in ["a", "b", "c"] {
        let mut fut = Box::pin(socket.recv());
        match poll_once(fut.as_mut()) {
            Poll::Ready(Ok(m)) => assert_eq!(m, expected),
            other => panic!("unexpected {other:?}"),
        }
    }

    let mut fourth = Box::pin(socket.recv());
    assert!(poll_once(fourth.as_mut()).is_pending());
}

#[test]
fn test_waiter_takes_first_rest_are_queued() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());

    let mut fut = Box::pin(socket.recv());
    assert!(poll_once(fut.as_mut()).is_pending());

    state
        .borrow_mut()
        .inbound
        .extend([msg("a"), msg("b"), msg("c")]);
    reactor.fire(Direction::Recv);

    match poll_once(fut.as_mut()) {
        Poll::Ready(Ok(m)) => assert_eq!(m, "a"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(socket.recv_queue_len(), 2);
}

#[test]
fn test_recv_backpressure_and_resume() {
    let options = SocketOptions::new().with_recv_queue_max_size(2);
    let (socket, reactor, state) = mock_socket(options);
    state
        .borrow_mut()
        .inbound
        .extend(["1", "2", "3", "4", "5"].map(msg));

    assert!(socket.resume_recv().unwrap());
    reactor.fire(Direction::Recv);

    assert_eq!(socket.recv_queue_len(), 2);
    assert_eq!(socket.handler_state(Direction::Recv), HandlerState::Idle);
    assert!(!reactor.is_registered(Direction::Recv));
    // Left at the transport, not dropped.
    assert_eq!(state.borrow().inbound.len(), 3);

    // Nothing to re-arm while the queue is full.
    assert!(!socket.resume_recv().unwrap());

    let mut received = Vec::new();
    for _ in 0..2 {
        let mut fut = Box::pin(socket.recv());
        if let Poll::Ready(Ok(m)) = poll_once(fut.as_mut()) {
            received.push(m);
        }
    }
    assert_eq!(state.borrow().inbound.len(), 3);

    while !state.borrow().inbound.is_empty() {
        assert!(socket.resume_recv().unwrap());
        reactor.fire(Direction::Recv);
        while socket.recv_queue_len() > 0 {
            let mut fut = Box::pin(socket.recv());
            if let Poll::Ready(Ok(m)) = poll_once(fut.as_mut()) {
                received.push(m);
            }
        }
    }
    assert_eq!(received, ["1", "2", "3", "4", "5"].map(msg).to_vec());
}

#[test]
fn test_recv_error_with_waiter() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());

    let mut fut = Box::pin(socket.recv());
    assert!(poll_once(fut.as_mut()).is_pending());

    state.borrow_mut().recv_error = Some("reset".into());
    reactor.fire(Direction::Recv);

    assert!(matches!(
        poll_once(fut.as_mut()),
        Poll::Ready(Err(SocketError::Transport(_)))
    ));
    assert_eq!(socket.handler_state(Direction::Recv), HandlerState::Idle);
}

#[test]
fn test_recv_error_without_waiter_is_deferred() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().recv_error = Some("reset".into());

    assert!(socket.resume_recv().unwrap());
    reactor.fire(Direction::Recv);

    let mut fut = Box::pin(socket.recv());
    assert!(matches!(
        poll_once(fut.as_mut()),
        Poll::Ready(Err(SocketError::Transport(_)))
    ));

    // Reported once.
    let mut again = Box::pin(socket.recv());
    assert!(poll_once(again.as_mut()).is_pending());
}

#[test]
fn test_close_fails_suspended_send() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    state.borrow_mut().send_blocked = true;

    let mut fut = Box::pin(socket.send("stuck"));
    assert!(poll_once(fut.as_mut()).is_pending());

    socket.close();
    assert!(matches!(
        poll_once(fut.as_mut()),
        Poll::Ready(Err(SocketError::SocketClosed))
    ));
    assert!(!reactor.is_registered(Direction::Send));
    assert!(state.borrow().sent.is_empty());
}

#[test]
fn test_close_fails_suspended_recv() {
    let (socket, reactor, _state) = mock_socket(SocketOptions::default());

    let mut fut = Box::pin(socket.recv());
    assert!(poll_once(fut.as_mut()).is_pending());

    socket.close();
    assert!(matches!(
        poll_once(fut.as_mut()),
        Poll::Ready(Err(SocketError::SocketClosed))
    ));
    assert!(!reactor.is_registered(Direction::Recv));
}

#[test]
fn test_close_is_idempotent() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    socket.bind("mock://a").unwrap();
    socket.connect("mock://b").unwrap();

    socket.close();
    socket.close();

    assert_eq!(socket.state(), SocketState::Closed);
    assert_eq!(state.borrow().shutdowns.len(), 2);
    assert_eq!(reactor.removes(), 0);
    assert!(socket.endpoints().is_empty());

    let mut fut = Box::pin(socket.send("late"));
    assert!(matches!(
        poll_once(fut.as_mut()),
        Poll::Ready(Err(SocketError::SocketClosed))
    ));
}

#[test]
fn test_close_twice_with_both_handlers_registered() {
    let (socket, reactor, state) = mock_socket(SocketOptions::default());
    socket.bind("mock://a").unwrap();
    socket.connect("mock://b").unwrap();
    state.borrow_mut().send_blocked = true;

    let mut send = Box::pin(socket.send("stuck"));
    let mut recv = Box::pin(socket.recv());
    assert!(poll_once(send.as_mut()).is_pending());
    assert!(poll_once(recv.as_mut()).is_pending());
    assert_eq!(socket.handler_state(Direction::Send), HandlerState::Registered);
    assert_eq!(socket.handler_state(Direction::Recv), HandlerState::Registered);

    socket.close();
    socket.close();

    assert_eq!(reactor.removes(), 2);
    assert_eq!(reactor.stray_removes(), 0);
    assert!(!reactor.is_registered(Direction::Send));
    assert!(!reactor.is_registered(Direction::Recv));
    assert_eq!(socket.handler_state(Direction::Send), HandlerState::Idle);
    assert_eq!(socket.handler_state(Direction::Recv), HandlerState::Idle);
    assert_eq!(state.borrow().shutdowns, vec![EndpointId(2), EndpointId(1)]);

    assert!(matches!(
        poll_once(send.as_mut()),
        Poll::Ready(Err(SocketError::SocketClosed))
    ));
    assert!(matches!(
        poll_once(recv.as_mut()),
        Poll::Ready(Err(SocketError::SocketClosed))
    ));
}

#[test]
fn test_monitor_events_carry_addresses_verbatim() {
    let (socket, _reactor, _state) = mock_socket(SocketOptions::default());
    let monitor = socket.monitor();

    // Not a scheme any transport parses; the adapter passes it through.
    socket.bind("mock://Peer-A:7").unwrap();
    socket.connect("mock://b").unwrap();

    let events: Vec<SocketEvent> = monitor.drain().collect();
    assert_eq!(
        events,
        vec![
            SocketEvent::Bound("mock://Peer-A:7".into()),
            SocketEvent::Connected("mock://b".into()),
        ]
    );
}

#[test]
fn test_drop_shuts_down_endpoints() {
    let (socket, _reactor, state) = mock_socket(SocketOptions::default());
    socket.bind("mock://a").unwrap();
    drop(socket);
    assert_eq!(state.borrow().shutdowns, vec![EndpointId(1)]);
}

#[test]
fn test_shutdown_keeps_socket_open() {
    let (socket, _reactor, state) = mock_socket(SocketOptions::default());
    socket.bind("mock://a").unwrap();
    socket.shutdown();

    assert_eq!(state.borrow().shutdowns.len(), 1);
    assert!(!socket.is_closed());

    let mut fut = Box::pin(socket.send("still open"));
    assert!(matches!(poll_once(fut.as_mut()), Poll::Ready(Ok(()))));
}
