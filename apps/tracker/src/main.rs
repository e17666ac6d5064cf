mod config;
mod session;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::TrackerConfig;
use iox::{NdjsonTripStore, TripStore};
use motion_ingest_udp::{UdpSensorConfig, UdpSensorSource};
use trip_engine::{HttpSyncTransport, TripEngine};

enum Command {
    Run,
    Export(PathBuf),
    Summary,
}

fn parse_args() -> Result<(PathBuf, Command)> {
    let mut config_path = PathBuf::from("tracker.yaml");
    let mut command = Command::Run;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config_path = args.next().map(PathBuf::from).context("--config needs a path")?;
            }
            "run" => command = Command::Run,
            "summary" => command = Command::Summary,
            "export" => {
                let dest = args.next().map(PathBuf::from).context("export needs a destination csv")?;
                command = Command::Export(dest);
            }
            other => bail!("unknown argument {other:?} (usage: trip-tracker [-c config.yaml] [run | summary | export <file.csv>])"),
        }
    }
    Ok((config_path, command))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trip_tracker=info,trip_engine=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (config_path, command) = parse_args()?;
    let config = TrackerConfig::load(&config_path)?;
    let store_path = config.store_path();
    let store = Arc::new(NdjsonTripStore::open(&store_path)?);
    info!("trip store at {}", store_path.display());

    match command {
        Command::Run => run(config, store).await,
        Command::Summary => {
            for trip in store.all() {
                println!("{}", analysis::trip_summary(&trip));
            }
            Ok(())
        }
        Command::Export(dest) => {
            let trips = store.all();
            iox::export_points_csv(&trips, &dest)?;
            info!("exported {} trips to {}", trips.len(), dest.display());
            Ok(())
        }
    }
}

async fn run(config: TrackerConfig, store: Arc<NdjsonTripStore>) -> Result<()> {
    info!(
        vehicle = %config.engine.vehicle_id,
        pending = store.unsynced_count()?,
        "tracker starting"
    );

    let mut engine = TripEngine::new(config.engine.clone(), store);
    let mut probe = None;
    if let Some(endpoint) = &config.sync_endpoint {
        let transport = HttpSyncTransport::new(
            endpoint.clone(),
            Duration::from_millis(config.engine.sync_timeout_ms),
        )?;
        engine.spawn_sync(Arc::new(transport));
        match session::probe_target(endpoint) {
            Some(target) => {
                probe = Some(session::spawn_connectivity_probe(
                    engine.connectivity(),
                    target,
                    Duration::from_millis(config.connectivity_probe_ms.max(1)),
                ));
            }
            None => warn!("cannot probe {endpoint}, assuming online"),
        }
        if probe.is_none() {
            engine.connectivity().set_online(true);
        }
        info!("syncing finished trips to {endpoint}");
    } else {
        info!("no sync endpoint configured, trips stay local");
    }

    let source = UdpSensorSource::new(UdpSensorConfig { bind_addr: config.bind_addr.clone() });
    let (rx, source_task) = session::run_source(source);

    let interrupted = tokio::select! {
        _ = engine.run(rx) => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        info!("interrupted");
        if let Err(e) = engine.close(trip_engine::now_ms()) {
            warn!("could not close active trip: {e}");
        }
    }

    source_task.abort();
    if let Some(p) = probe {
        p.abort();
    }
    info!(pending = engine.state().pending_sync_count, "tracker stopped");
    Ok(())
}
