/// PAIR Echo Example
///
/// Two inproc PAIR sockets on one compio runtime:
/// - the server echoes every message back
/// - the client sends a burst larger than the peer's pipe, so some sends
///   take the slow path and complete from the readiness callback
///
/// Run with `RUST_LOG=trace` to watch handlers being armed and disarmed.
use nanoloop::dev_tracing::init_tracing;
use nanoloop::prelude::*;
use tracing::info;

const MESSAGES: usize = 64;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("=== PAIR Echo Example ===");

    let server = NnSocket::new(
        InprocTransport::with_options(Protocol::Pair, InprocOptions::default().with_pipe_capacity(8)),
        SocketOptions::default(),
    )?;
    server.bind("inproc://pair-echo")?;

    let client = NnSocket::inproc(Protocol::Pair)?;
    client.connect("inproc://pair-echo")?;

    let echo = async {
        for _ in 0..MESSAGES {
            let msg = server.recv().await?;
            server.send(msg).await?;
        }
        Ok::<_, SocketError>(())
    };

    let drive = async {
        let sends = async {
            for i in 0..MESSAGES {
                client.send(format!("message {i}")).await?;
            }
            Ok::<_, SocketError>(())
        };
        let recvs = async {
            let mut received = Vec::with_capacity(MESSAGES);
            for _ in 0..MESSAGES {
                received.push(client.recv().await?);
            }
            Ok::<_, SocketError>(received)
        };
        let (sent, received) = futures::join!(sends, recvs);
        sent?;
        received
    };

    let (echoed, received) = futures::join!(echo, drive);
    echoed?;
    let received = received?;

    info!("received {} echoes, last = {:?}", received.len(), received.last());
    info!("client stats: {:?}", client.stats());
    info!("server stats: {:?}", server.stats());

    client.close();
    server.close();
    Ok(())
}
