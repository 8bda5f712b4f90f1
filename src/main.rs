mod config;
mod session;
mod world;

mod transports {
    pub mod https;
}

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use session::registry::SessionRegistry;
use world::service::{run_world, world_channel, World};

#[cfg(feature = "jemalloc")]
mod allocator {
    #[cfg(not(target_env = "msvc"))]
    use tikv_jemallocator::Jemalloc;
    #[cfg(not(target_env = "msvc"))]
    #[global_allocator]
    static GLOBAL: Jemalloc = Jemalloc;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ================
    //      Tracing
    // ================
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    format!("{}=info,tower_http=debug", env!("CARGO_CRATE_NAME")).into()
                })
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env();
    info!(
        data_dir = %cfg.data_dir.display(),
        seed = cfg.world_seed,
        max_query_tiles = cfg.max_query_tiles,
        "configuration loaded"
    );

    // World task: single owner of the chunk store and generator. Seeds the
    // origin tile on a fresh data directory.
    let world_state = World::open(cfg.data_dir.clone(), cfg.world_seed, cfg.max_query_tiles)?;
    let (world, world_rx) = world_channel(1024);
    let world_task = tokio::spawn(run_world(world_rx, world_state));

    // Live-connection registry shared with the HTTP surface
    let sessions = SessionRegistry::new();

    // Tokio
    let http = tokio::spawn(transports::https::serve(
        cfg.clone(),
        world.clone(),
        sessions.clone(),
    ));

    // Print
    info!("hexcrawl v{}", env!("CARGO_PKG_VERSION"));

    tokio::select! {
        _ = http => {},
        _ = world_task => {
            error!("world task terminated unexpectedly");
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
