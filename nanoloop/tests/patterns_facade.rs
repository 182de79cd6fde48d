//! Patterns through the facade crate.

use nanoloop::prelude::*;
use std::time::Duration;

#[compio::test]
async fn test_call_through_facade() {
    let server = CallServer::inproc(
        ServerOptions::default().with_poll_interval(Duration::from_millis(10)),
    )
    .unwrap();
    server.bind("inproc://facade-rpc").unwrap();
    server
        .register("echo", |args: CallArgs| async move {
            args.get::<_, String>(&BincodeCodec, 0)
        })
        .unwrap();
    server.start();

    let client = CallClient::inproc(SocketOptions::default()).unwrap();
    client.connect("inproc://facade-rpc").unwrap();

    let args = CallArgs::new().arg(&BincodeCodec, &"ping").unwrap();
    let reply: String = client.call("echo", args).await.unwrap();
    assert_eq!(reply, "ping");

    server.close();
    client.close();
    server.wait_stopped().await;
}
