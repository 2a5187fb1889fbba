use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use aether_sim::{
    build_headless_app, build_persistent_app, load_aether_config_from_env, run_tick, save_now,
    with_world_store, AetherMetrics, CellCoord, ClassificationId, CorruptionTelemetry,
    FileBackend, GridHost,
};

const STEP: u64 = 100;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless aether and corruption demo run", long_about = None)]
struct Args {
    /// Number of simulation ticks to run
    #[arg(long, default_value_t = 48_000)]
    ticks: u64,

    /// Directory for saved world state; nothing is persisted when omitted
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

fn demo_host() -> GridHost {
    GridHost::new()
        .with_density("forest", &[("herba", 12), ("arbor", 8), ("aer", 4)])
        .with_density("swamp", &[("aqua", 6), ("herba", 3), ("vitium", 2)])
        .with_density("wasteland", &[("terra", 2), ("vitium", 4)])
        .with_area("forest", (0, 12), (0, 12))
        .with_area("swamp", (12, 20), (0, 8))
        .with_area("wasteland", (12, 16), (8, 12))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Args { ticks, state_dir } = Args::parse();

    let mut app = match &state_dir {
        Some(dir) => {
            let (config, _) = load_aether_config_from_env();
            match build_persistent_app(demo_host(), config, FileBackend::new(dir)) {
                Ok(app) => app,
                Err(err) => {
                    warn!(
                        target: "aether::harness",
                        dir = %dir.display(),
                        error = %err,
                        "harness.load_failed"
                    );
                    std::process::exit(1);
                }
            }
        }
        None => build_headless_app(demo_host()),
    };

    with_world_store(&mut app, |store, host: &GridHost| {
        let seeded = store
            .inject_vitium(host, CellCoord::new(3, 3), 30)
            .unwrap_or_default();
        store.force_corruption(&ClassificationId::new("wasteland"), 2);
        info!(target: "aether::harness", seeded, "harness.vitium_injected");
    });

    let mut elapsed = 0;
    while elapsed < ticks {
        app.world.resource_mut::<GridHost>().advance(STEP);
        run_tick(&mut app);
        elapsed += STEP;
    }

    let telemetry = app.world.resource::<CorruptionTelemetry>().clone();
    let metrics = app.world.resource::<AetherMetrics>().clone();
    info!(
        target: "aether::harness",
        ticks = elapsed,
        windows = telemetry.windows_total,
        markers = telemetry.markers_total,
        transfers = telemetry.transfers_total,
        aether_consumed = telemetry.aether_consumed_total,
        dead_zones = telemetry.dead_zones_total,
        faults = telemetry.faults_total,
        "harness.telemetry"
    );
    info!(
        target: "aether::harness",
        ledgers = metrics.ledgers,
        temporary_dead_zones = metrics.temporary_dead_zones,
        permanent_dead_zones = metrics.permanent_dead_zones,
        tainted = metrics.tainted_cells,
        corrupted = metrics.corrupted_cells,
        regenerating = metrics.regenerating_cells,
        "harness.metrics"
    );

    let regions = with_world_store(&mut app, |store, _: &GridHost| store.list_corrupted_regions());
    for region in &regions {
        info!(
            target: "aether::harness",
            classification = %region.classification,
            representative = %region.representative,
            cells = region.cells.len(),
            "harness.corrupted_region"
        );
    }

    if state_dir.is_some() {
        match save_now(&mut app) {
            Ok(written) => info!(target: "aether::harness", written, "harness.saved"),
            Err(err) => warn!(target: "aether::harness", error = %err, "harness.save_failed"),
        }
    }
}
