//! Pacer HAL Motion Probe
//!
//! Streams accelerometer readings from the I2C platform, or from a trace
//! file when one is given, and prints the gravity-free magnitude of each.
//!
//! ```text
//! cargo run -p pacer-hal --example motion_probe [/dev/i2c-1 | trace.jsonl]
//! ```

use pacer_hal::{I2cAccelerometerPlatform, MotionPlatform, ScriptedPlatform, ADXL345};
use std::path::Path;
use std::time::Duration;

const READINGS: usize = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("pacer_hal=debug")
        .init();

    println!("=== Pacer Motion Probe ===\n");

    let source = std::env::args().nth(1).unwrap_or_else(|| "/dev/i2c-1".to_string());

    if source.ends_with(".jsonl") {
        let platform = ScriptedPlatform::from_trace_file(Path::new(&source))?;
        println!("Replaying {} readings from {}", platform.len(), source);
        stream(platform).await
    } else {
        println!("Using ADXL345 at 0x{:02X} on {}", ADXL345::DEFAULT_ADDRESS, source);
        stream(I2cAccelerometerPlatform::new(&source, ADXL345::DEFAULT_ADDRESS)).await
    }
}

async fn stream<P: MotionPlatform>(mut platform: P) -> Result<(), Box<dyn std::error::Error>> {
    if !platform.is_available().await {
        println!("  [Not connected]");
        return Ok(());
    }
    if !platform.request_permission().await {
        println!("  [Permission denied]");
        return Ok(());
    }

    let mut readings = platform.subscribe(Duration::from_millis(250))?;
    for _ in 0..READINGS {
        let Some(reading) = readings.recv().await else {
            break;
        };
        println!("  x={:+.3} y={:+.3} z={:+.3}  motion={:.3} g",
            reading.x, reading.y, reading.z, (reading.magnitude() - 1.0).abs());
    }

    platform.unsubscribe();
    println!("\nDone.");
    Ok(())
}
