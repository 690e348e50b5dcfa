use ergolink::{ConnectionManager, Result, TrainerScanner, TrainerType};
use futures::StreamExt;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("📊 Ergolink Live Telemetry Example");
    info!("Scanning for a trainer or power meter...");

    let scanner = TrainerScanner::new().await?;
    let mut discoveries = scanner.scan().await?;

    let mut target = None;
    while let Some(device) = discoveries.next().await {
        info!("📡 Found: {}", device);
        if matches!(
            device.r#type,
            TrainerType::SmartTrainer | TrainerType::PowerMeter
        ) {
            target = Some(device);
            break;
        }
    }
    drop(discoveries);

    let Some(device) = target else {
        warn!("No trainer or power meter found");
        return Ok(());
    };

    info!("🔗 Connecting to {}...", device.name);
    let manager = ConnectionManager::new().await?;

    // Surface state transitions while the stream runs
    let mut states = manager.state_changes();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            info!("🔄 Connection state: {}", *states.borrow());
        }
    });

    let mut telemetry = match manager.connect(&device).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("❌ Failed to connect: {}", e);
            return Err(e);
        }
    };
    info!("✅ Connected, streaming telemetry (Ctrl+C to stop)");

    let mut samples = 0u64;
    while let Some(sample) = telemetry.next().await {
        samples += 1;
        println!("{sample}");
    }

    info!("🔌 Stream ended after {} sample(s)", samples);
    manager.disconnect().await;
    Ok(())
}
