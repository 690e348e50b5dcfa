use ergolink::{Result, TrainerScanner};
use futures::StreamExt;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🔍 Ergolink Device Scan Example");
    info!("Scanning for BLE fitness devices...");

    let scanner = match TrainerScanner::new().await {
        Ok(scanner) => scanner,
        Err(e) => {
            error!("❌ Failed to initialize Bluetooth: {}", e);
            return Err(e);
        }
    };

    let mut discoveries = scanner.scan().await?;

    // The same device can be reported more than once as its signal
    // strength updates; keep the best-known entry per address.
    let mut devices: Vec<ergolink::TrainerDevice> = Vec::new();

    while let Some(device) = discoveries.next().await {
        info!(
            "📡 {} [{}] {} dBm",
            device.name, device.r#type, device.signal_strength
        );

        if let Some(known) = devices.iter_mut().find(|d| d.id == device.id) {
            if device.supersedes(known) {
                *known = device;
            }
        } else {
            devices.push(device);
        }
    }

    info!("✅ Scan complete, {} device(s) found", devices.len());

    devices.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));
    for device in &devices {
        println!(
            "  {:<28} {:<18} {:>4} dBm  ({})",
            device.name, device.r#type, device.signal_strength, device.id
        );
    }

    if devices.is_empty() {
        println!("  No fitness devices in range. Is your trainer awake?");
    }

    Ok(())
}
