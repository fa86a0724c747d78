use std::str::FromStr;
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;

use parkour_movement::networking_plugin::{NetSimConfig, NetworkingPlugin};

fn env_value<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

fn main() -> AppExit {
    let defaults = NetSimConfig::default();
    let config = NetSimConfig {
        ticks: env_value("NETSIM_TICKS").unwrap_or(defaults.ticks),
        seed: env_value("NETSIM_SEED").unwrap_or(defaults.seed),
        latency: env_value("NETSIM_LATENCY").unwrap_or(defaults.latency),
        server_obstacle: env_value::<u8>("NETSIM_OBSTACLE").is_some_and(|flag| flag != 0),
        settings_path: std::env::var("MOVEMENT_SETTINGS").ok(),
        ..defaults
    };

    // Ticks run back to back on the simulated clock
    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)))
        .add_plugins(LogPlugin::default())
        .add_plugins(NetworkingPlugin { config })
        .run()
}
