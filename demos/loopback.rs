//! Loopback demo - a fake session feeding the relay at 60 fps.
//!
//! This example demonstrates:
//! - Building and starting an `AirPlaySource`
//! - A producer thread standing in for the protocol session
//! - A consumer pulling frames, then unlocking to stop
//!
//! # Running
//!
//! ```text
//! RUST_LOG=airplay_relay=debug cargo run --example loopback
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use airplay_relay::frame::FrameType;
use airplay_relay::session::loopback::LoopbackBackend;
use airplay_relay::{AirPlaySource, FlowError};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let backend = LoopbackBackend::new();
    let driver = backend.driver();

    let source = Arc::new(
        AirPlaySource::builder()
            .session_backend(Arc::new(backend.clone()))
            .discovery(Arc::new(backend))
            .max_buffers(8)
            .on_connected_changed(|connected| println!("connected: {connected}"))
            .build()?,
    );
    source.start()?;
    println!("advertised: {:?}", driver.advertised());

    let producer = thread::spawn(move || {
        driver.connect();
        for i in 0u32..240 {
            let frame_type = if i % 60 == 0 {
                FrameType::Idr
            } else {
                FrameType::NonIdr
            };
            let size = 20_000 + (i as usize % 7) * 10_000;
            driver.send_video(&vec![0u8; size], u64::from(i), frame_type);
            thread::sleep(Duration::from_millis(16));
        }
        driver.disconnect();
    });

    let consumer_source = source.clone();
    let consumer = thread::spawn(move || {
        let mut dest = vec![0u8; consumer_source.blocksize()];
        let mut frames = 0usize;
        let mut bytes = 0usize;
        loop {
            match consumer_source.fill_next_output(&mut dest) {
                Ok(n) => {
                    frames += 1;
                    bytes += n;
                }
                Err(FlowError::Flushing) => break,
                Err(e) => {
                    eprintln!("fill failed: {e}");
                    break;
                }
            }
        }
        (frames, bytes)
    });

    producer.join().map_err(|_| "producer panicked")?;
    thread::sleep(Duration::from_millis(100));
    source.request_unlock();

    let (frames, bytes) = consumer.join().map_err(|_| "consumer panicked")?;
    source.stop();

    println!("received {frames} frames ({bytes} bytes)");
    println!("{}", serde_json::to_string_pretty(&source.stats())?);
    Ok(())
}
