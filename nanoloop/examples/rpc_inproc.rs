/// Remote Call Example
///
/// A call server exposing `add` and `divide` over an inproc PAIR, and a
/// client calling both. Dividing by zero fails on the server and comes back
/// as a `RemoteException`.
use nanoloop::dev_tracing::init_tracing_with_default;
use nanoloop::prelude::*;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug)]
struct DivisionByZero;

impl std::fmt::Display for DivisionByZero {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("cannot divide by zero")
    }
}

impl std::error::Error for DivisionByZero {}

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing_with_default("info");

    info!("=== Remote Call Example ===");

    let server = CallServer::inproc(ServerOptions::default())?;
    server.bind("inproc://calculator")?;
    server.register("add", |args: CallArgs| async move {
        let a: f64 = args.get(&BincodeCodec, 0)?;
        let b: f64 = args.get(&BincodeCodec, 1)?;
        Ok::<_, RpcError>(a + b)
    })?;
    server.register("divide", |args: CallArgs| async move {
        let a: f64 = args.get(&BincodeCodec, 0).map_err(|_| DivisionByZero)?;
        let b: f64 = args.get(&BincodeCodec, 1).map_err(|_| DivisionByZero)?;
        if b == 0.0 {
            return Err(DivisionByZero);
        }
        Ok(a / b)
    })?;
    server.start();

    let client = CallClient::inproc(SocketOptions::default())?;
    client.connect("inproc://calculator")?;

    let args = CallArgs::new().arg(&BincodeCodec, &1.5f64)?.arg(&BincodeCodec, &2.0f64)?;
    let sum: f64 = client.call("add", args).await?;
    info!("add(1.5, 2.0) = {sum}");

    let args = CallArgs::new().arg(&BincodeCodec, &1.0f64)?.arg(&BincodeCodec, &0.0f64)?;
    match client
        .call_timeout::<f64>("divide", args, Duration::from_secs(1))
        .await
    {
        Ok(v) => info!("divide(1, 0) = {v}"),
        Err(RpcError::Remote(e)) => warn!("divide failed remotely: {e}"),
        Err(e) => return Err(e.into()),
    }

    server.stop();
    server.wait_stopped().await;
    client.close();
    server.close();
    Ok(())
}
