//! Minimal end-to-end demo — a simulated TCP device plus a watching session.
//!
//! Run with:
//!   cargo run --example tcp-watch

use std::time::Duration;

use fieldlink::session::{Session, SessionConfig};
use fieldlink::stage::integrity::seal;
use fieldlink::stage::{EventSinks, StageRegistry, DEFAULT_EVENT_CAPACITY};
use fieldlink::transport::TcpTransport;
use tokio::io::AsyncWriteExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    // Simulated device: one sealed reading every 500ms.
    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        for n in 0u32.. {
            let frame = seal(format!("reading={n}").as_bytes(), true);
            if stream.write_all(&frame).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    });

    let transport = TcpTransport::connect(&addr.to_string()).await?;
    let identity = format!("{}:{}:TCP", addr.ip(), addr.port());
    eprintln!("watching {identity}");

    let (sinks, mut signals, mut alarms) = EventSinks::bounded(DEFAULT_EVENT_CAPACITY);
    let mut session = Session::new(identity, StageRegistry::with_builtins(), sinks)
        .with_config(SessionConfig::default());

    session.init(transport).await?;
    let mut output = session.take_output().ok_or("output already taken")?;
    session.run().await?;

    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            eprintln!("signal: {signal:?}");
        }
    });
    tokio::spawn(async move {
        while let Some(alarm) = alarms.recv().await {
            eprintln!("alarm: {alarm:?}");
        }
    });

    for _ in 0..5 {
        if let Some(frame) = output.recv().await {
            println!("{}", String::from_utf8_lossy(&frame));
        }
    }

    session.shutdown().await;
    Ok(())
}
