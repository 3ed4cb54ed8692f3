//! `geowatch simulate` - run the engine against a synthetic track.
//!
//! An [`InMemoryPlatform`] plays the role of the device: every second it
//! emits a GPS fix and a coarser network fix moving north-east. Halfway
//! through, GPS drops out for two seconds so the watch's active provider
//! set can be seen shrinking and growing again.
//!
//! Output is one JSON object per line on stdout:
//!
//! ```text
//! {"kind":"watch","id":"sim","report":{...}}
//! {"kind":"request","id":"request","report":{...}}
//! ```

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use geowatch::config::GeowatchConfig;
use geowatch::provider::InMemoryPlatform;
use geowatch::reading::{PositionReport, ProviderId, Reading};
use geowatch::time;
use geowatch::watch::WatchCallback;
use geowatch::Coordinator;
use tracing::{debug, info, warn};

use crate::error::CliError;

const START: (f64, f64) = (48.137_2, 11.575_6);
const STEP_DEGREES: f64 = 0.000_1;
const GPS_ACCURACY_METERS: f64 = 5.0;
const NETWORK_ACCURACY_METERS: f64 = 45.0;
const GPS_OUTAGE_SECONDS: u64 = 2;

/// Arguments for `geowatch simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Length of the synthetic track in seconds
    #[arg(long, default_value = "10")]
    pub seconds: u64,

    /// Restrict the watch and the one-shot request to GPS
    #[arg(long)]
    pub high_accuracy: bool,

    /// Id of the simulated watch
    #[arg(long, default_value = "sim")]
    pub watch_id: String,
}

/// Run the simulation to completion or until Ctrl-C.
pub fn run(config: &GeowatchConfig, args: SimulateArgs) -> Result<(), CliError> {
    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    runtime.block_on(simulate(config, args))
}

async fn simulate(config: &GeowatchConfig, args: SimulateArgs) -> Result<(), CliError> {
    let platform = Arc::new(InMemoryPlatform::new());
    let watch_options = config
        .watch
        .to_options()
        .with_high_accuracy(args.high_accuracy);
    let coordinator = Coordinator::new(
        platform.clone(),
        platform.clone(),
        config.coordinator_config().with_watch(watch_options),
    );

    info!(
        seconds = args.seconds,
        high_accuracy = args.high_accuracy,
        watch_id = %args.watch_id,
        "Starting simulation"
    );

    let track = tokio::spawn(drive_track(Arc::clone(&platform), args.seconds));

    let callback: Arc<dyn WatchCallback> = {
        let id = args.watch_id.clone();
        Arc::new(move |reading: &Reading| print_report("watch", &id, reading))
    };
    let watch_id = coordinator.watch_position_with_defaults(Some(&args.watch_id), callback)?;

    let request_options = config
        .request
        .to_options()
        .with_high_accuracy(args.high_accuracy);
    match coordinator.get_current_position(request_options).await {
        Ok(reading) => print_report("request", "request", &reading),
        Err(e) => warn!(error = %e, code = e.code(), "One-shot request failed"),
    }

    tokio::select! {
        _ = track => debug!("Track finished"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    if let Some(info) = coordinator.watch_info(&watch_id) {
        info!(
            watch_id = %info.id,
            providers = ?info.active_providers,
            "Watch state at end of track"
        );
    }
    coordinator.clear_watch(&watch_id);
    coordinator.shutdown();
    Ok(())
}

/// Emit one GPS and one network fix per second along a straight line.
async fn drive_track(platform: Arc<InMemoryPlatform>, seconds: u64) {
    let outage = gps_outage(seconds);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    for tick in 0..seconds {
        ticker.tick().await;

        let gps_available = !outage.contains(&tick);
        platform.set_provider_enabled(ProviderId::Gps, gps_available);

        let step = STEP_DEGREES * tick as f64;
        let (latitude, longitude) = (START.0 + step, START.1 + step / 2.0);
        let now = time::now_millis();

        if gps_available {
            let fix = Reading::new(
                ProviderId::Gps,
                latitude,
                longitude,
                GPS_ACCURACY_METERS,
                now,
            )
            .with_altitude(519.0)
            .with_speed(1.4);
            platform.set_last_known(fix.clone());
            platform.emit(fix);
        }

        let cell = Reading::new(
            ProviderId::Network,
            latitude + 0.000_3,
            longitude - 0.000_2,
            NETWORK_ACCURACY_METERS,
            now,
        );
        platform.set_last_known(cell.clone());
        platform.emit(cell);

        debug!(tick, gps_available, "Simulated tick");
    }
}

/// Ticks during which GPS is switched off. Short tracks have no outage.
fn gps_outage(seconds: u64) -> Range<u64> {
    if seconds < 2 * GPS_OUTAGE_SECONDS {
        return 0..0;
    }
    let start = seconds / 2;
    start..start + GPS_OUTAGE_SECONDS
}

fn print_report(kind: &str, id: &str, reading: &Reading) {
    let line = serde_json::json!({
        "kind": kind,
        "id": id,
        "report": PositionReport::from(reading),
    });
    println!("{line}");
}
