/// Topic Router Example
///
/// One publisher, one subscriber, three topics:
/// - `trade` and `quote` have listeners
/// - `news` is published but nobody subscribed, so the transport filters it
///
/// Frames travel as `topic|payload`; listeners receive only the payload.
use nanoloop::dev_tracing::init_tracing_with_default;
use nanoloop::prelude::*;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tracing::info;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing_with_default("info");

    info!("=== Topic Router Example ===");

    let publisher = Publisher::inproc()?;
    publisher.bind("inproc://market")?;

    let subscriber = Subscriber::inproc(SubscriberOptions::default())?;
    subscriber.connect("inproc://market")?;

    let trades = Rc::new(Cell::new(0u32));
    let counter = trades.clone();
    subscriber.subscribe("trade", move |payload| {
        let counter = counter.clone();
        async move {
            counter.set(counter.get() + 1);
            info!("[trade] {}", String::from_utf8_lossy(&payload));
        }
    })?;
    subscriber.subscribe("quote", |payload| async move {
        info!("[quote] {}", String::from_utf8_lossy(&payload));
    })?;
    subscriber.start()?;

    for i in 0..5 {
        publisher.publish("trade", format!("BTC {}", 100 + i)).await?;
        publisher.publish("quote", format!("ETH bid {}", 50 + i)).await?;
        publisher.publish("news", "ignored").await?;
    }

    compio::time::sleep(Duration::from_millis(50)).await;
    info!("trades seen: {}", trades.get());

    subscriber.stop();
    subscriber.wait_stopped().await;
    subscriber.close();
    publisher.close();
    Ok(())
}
