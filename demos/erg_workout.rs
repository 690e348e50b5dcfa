use ergolink::{
    ConnectionManager, Result, TrainerScanner, TrainerType, WorkoutSequencer, WorkoutStep,
};
use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{error, info, warn};

const FTP_WATTS: u16 = 250;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🚴 Ergolink ERG Workout Example");
    info!("Scanning for a smart trainer...");

    let scanner = TrainerScanner::new().await?;
    let mut discoveries = scanner.scan().await?;

    let mut trainer = None;
    while let Some(device) = discoveries.next().await {
        info!("📡 Found: {}", device);
        if device.r#type == TrainerType::SmartTrainer {
            trainer = Some(device);
            break;
        }
    }
    drop(discoveries);

    let Some(device) = trainer else {
        warn!("No smart trainer found, cannot run an ERG workout");
        return Ok(());
    };

    info!("🔗 Connecting to {}...", device.name);
    let manager = Arc::new(ConnectionManager::new().await?);
    let mut telemetry = match manager.connect(&device).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("❌ Failed to connect: {}", e);
            return Err(e);
        }
    };

    // Drain telemetry in the background while the workout runs
    let reader = tokio::spawn(async move {
        while let Some(sample) = telemetry.next().await {
            println!("{sample}");
        }
        telemetry
    });

    // A short plan: warm up, two hard efforts, cool down
    let plan = vec![
        WorkoutStep::SteadyState {
            duration: 60,
            power: 0.5,
        },
        WorkoutStep::IntervalsT {
            repeat: 2,
            on_duration: 30,
            on_power: 1.1,
            off_duration: 30,
            off_power: 0.5,
        },
        WorkoutStep::SteadyState {
            duration: 60,
            power: 0.45,
        },
    ];

    let sequencer = WorkoutSequencer::new(manager.clone());
    info!("▶️  Starting workout at FTP {} W", FTP_WATTS);
    sequencer.start(plan, FTP_WATTS).await;

    sleep(Duration::from_secs(20)).await;

    if let Some(session) = sequencer.current_session() {
        info!(
            "⏱️  {}s elapsed, step {}/{}",
            session.elapsed_time,
            session.current_step + 1,
            session.total_steps
        );
    }

    info!("⏸️  Pausing for 5 seconds...");
    sequencer.pause();
    sleep(Duration::from_secs(5)).await;
    sequencer.resume();
    info!("▶️  Resumed");

    info!("⏭️  Skipping to the next step...");
    sequencer.skip_to_next_step().await;

    sleep(Duration::from_secs(20)).await;

    info!("⏹️  Stopping workout");
    sequencer.stop().await;

    // Dropping the stream disconnects; do it explicitly for clarity.
    manager.disconnect().await;
    reader.abort();

    info!("🎉 Workout example completed!");
    Ok(())
}
