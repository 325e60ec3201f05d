use tracing::info;

use tilehawk_application::infrastructure_config::Config;

pub fn print_monitor_info(config: &Config) {
    info!("Remote tile source: {}", config.remote.tile_base_url);
    info!(
        "Projects: {} | Tiles: {} | Snapshots: {}",
        config.directories.projects_dir.display(),
        config.directories.tiles_dir.display(),
        config.directories.snapshots_dir.display()
    );
    info!(
        "Polling {} tiles per cycle, ~{}s between cycles",
        config.watch.polls_per_cycle, config.watch.cycle_seconds
    );
}
