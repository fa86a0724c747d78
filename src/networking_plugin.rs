use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::game_logic::{FIXED_TIMESTEP, MovementSettings, StaticGeometry, SurfacePatch};
use crate::movement::{
    AnimationLog, CharacterState, MovementComponent, MovementMode, NetRole, PlayerInput,
    ProxyFlags, ProxyObserver,
};
use crate::networking::{
    ClientMessage, ClientMoveData, CorrectionData, ProxyUpdateData, ServerMessage, SimulatedLink,
    decode_client_message, decode_server_message, encode_message,
};
use crate::prediction::{ClientPrediction, Correction, MoveResponse, ServerReconciler};

const SPAWN: Vec3 = Vec3::new(0.0, 90.15, 0.0);
const PING_INTERVAL: u64 = 60;

/// Knobs for the headless client/server run.
#[derive(Resource, Clone, Debug)]
pub struct NetSimConfig {
    pub ticks: u64,
    pub seed: u64,
    /// One-way latency in seconds
    pub latency: f64,
    pub jitter: f64,
    /// Put a wall only the server knows about in front of the spawn
    pub server_obstacle: bool,
    pub stats_interval: u64,
    pub settings_path: Option<String>,
}

impl Default for NetSimConfig {
    fn default() -> Self {
        Self {
            ticks: 1800,
            seed: 67,
            latency: 0.05,
            jitter: 0.02,
            server_obstacle: false,
            stats_interval: 300,
            settings_path: None,
        }
    }
}

#[derive(Resource)]
pub struct ClientWorld(pub StaticGeometry);

#[derive(Resource)]
pub struct ServerWorld(pub StaticGeometry);

#[derive(Resource)]
pub struct Uplink(pub SimulatedLink);

#[derive(Resource)]
pub struct Downlink(pub SimulatedLink);

/// Seeded stand-in for a player: holds a random input for a random number
/// of ticks, then picks another.
#[derive(Resource)]
pub struct InputScript {
    rng: StdRng,
    current: PlayerInput,
    remaining: u32,
}

impl InputScript {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            current: PlayerInput::default(),
            remaining: 0,
        }
    }

    pub fn next_input(&mut self) -> PlayerInput {
        if self.remaining == 0 {
            let angle = self.rng.random_range(0.0..std::f32::consts::TAU);
            let move_direction = if self.rng.random_bool(0.8) {
                Vec3::new(angle.cos(), 0.0, angle.sin())
            } else {
                Vec3::ZERO
            };
            self.current = PlayerInput {
                move_direction,
                jump: self.rng.random_bool(0.25),
                crouch: self.rng.random_bool(0.1),
                sprint: self.rng.random_bool(0.5),
                slide: self.rng.random_bool(0.15),
                dash: self.rng.random_bool(0.1),
                prone: self.rng.random_bool(0.03),
                climb: self.rng.random_bool(0.2),
            };
            self.remaining = self.rng.random_range(15..90);
        }
        self.remaining -= 1;
        self.current
    }
}

/// What a third party watching the server's character sees.
#[derive(Resource, Default)]
pub struct RemoteView {
    observer: ProxyObserver,
    pub animation: AnimationLog,
    pub location: Vec3,
    pub mode: Option<MovementMode>,
}

impl RemoteView {
    pub fn observe(&mut self, update: &ProxyUpdateData) {
        self.location = Vec3::from_array(update.location);
        self.mode = MovementMode::from_byte(update.movement_mode);
        let played = self.observer.observe(update.flags(), &mut self.animation);
        if played > 0 {
            debug!("remote view replayed {} montage(s)", played);
        }
    }
}

pub struct NetworkingPlugin {
    pub config: NetSimConfig,
}

impl Plugin for NetworkingPlugin {
    fn build(&self, app: &mut App) {
        let config = self.config.clone();
        let settings = match &config.settings_path {
            Some(path) => MovementSettings::load(path).unwrap_or_else(|err| {
                warn!("could not load movement settings from {}: {}", path, err);
                MovementSettings::default()
            }),
            None => MovementSettings::default(),
        };

        let client_world = StaticGeometry::proving_ground();
        let mut server_world = client_world.clone();
        if config.server_obstacle {
            server_world.push(SurfacePatch::wall(
                99,
                Vec3::new(0.0, 100.0, -400.0),
                Vec3::Z,
                250.0,
                100.0,
            ));
        }

        // One fixed step per frame, whatever the wall clock says
        let step = Duration::from_secs_f64(FIXED_TIMESTEP as f64);
        info!(
            "net sim: {} ticks, latency {:.0}ms +{:.0}ms jitter, server obstacle {}",
            config.ticks,
            config.latency * 1000.0,
            config.jitter * 1000.0,
            config.server_obstacle
        );

        app.insert_resource(settings)
            .insert_resource(Time::<Fixed>::from_duration(step))
            .insert_resource(TimeUpdateStrategy::ManualDuration(step))
            .insert_resource(ClientWorld(client_world))
            .insert_resource(ServerWorld(server_world))
            .insert_resource(Uplink(SimulatedLink::new(config.latency, config.jitter, config.seed ^ 0x55)))
            .insert_resource(Downlink(SimulatedLink::new(config.latency, config.jitter, config.seed ^ 0xAA)))
            .insert_resource(InputScript::new(config.seed))
            .insert_resource(RemoteView::default())
            .insert_resource(config)
            .add_systems(Startup, spawn_characters)
            .add_systems(
                FixedUpdate,
                (
                    client_tick_system,
                    server_receive_system,
                    client_receive_system,
                    stats_system,
                    finish_system,
                )
                    .chain(),
            );
    }
}

fn spawn_characters(mut commands: Commands, settings: Res<MovementSettings>) {
    let settings = MovementSettings::clone(&settings);
    let spawn = CharacterState::new(SPAWN, MovementMode::Walking);
    let client = MovementComponent::new(spawn.clone(), settings.clone(), NetRole::AutonomousProxy);
    let server = MovementComponent::new(spawn, settings, NetRole::Authority);
    commands.insert_resource(ClientPrediction::new(client));
    commands.insert_resource(ServerReconciler::new(server));
}

fn send_message<T: serde::Serialize>(link: &mut SimulatedLink, now: f64, message: &T) -> Option<usize> {
    match encode_message(message) {
        Ok(payload) => {
            let len = payload.len();
            link.send(now, payload);
            Some(len)
        }
        Err(err) => {
            warn!("failed to encode message: {}", err);
            None
        }
    }
}

fn client_tick_system(
    mut prediction: ResMut<ClientPrediction>,
    mut script: ResMut<InputScript>,
    world: Res<ClientWorld>,
    mut uplink: ResMut<Uplink>,
    time: Res<Time<Fixed>>,
) {
    let now = time.elapsed_secs_f64();
    let input = script.next_input();
    if prediction.stats.tick_count % PING_INTERVAL == 0 {
        send_message(&mut uplink.0, now, &ClientMessage::Ping { timestamp: now });
    }

    let Some(saved) = prediction.tick(&input, time.delta_secs(), &world.0) else {
        return;
    };
    let message = ClientMessage::Move(ClientMoveData::from_saved(&saved));
    if let Some(len) = send_message(&mut uplink.0, now, &message) {
        prediction.stats.bits_sent += len as u64 * 8;
    }
}

fn server_receive_system(
    mut reconciler: ResMut<ServerReconciler>,
    world: Res<ServerWorld>,
    mut uplink: ResMut<Uplink>,
    mut downlink: ResMut<Downlink>,
    time: Res<Time<Fixed>>,
    mut last_proxy: Local<ProxyFlags>,
) {
    let now = time.elapsed_secs_f64();
    for payload in uplink.0.receive(now) {
        let reply = match decode_client_message(&payload) {
            Ok(ClientMessage::Move(data)) => match reconciler.receive(&data.to_server_move(), &world.0) {
                MoveResponse::Ack { timestamp } => ServerMessage::Ack { timestamp },
                MoveResponse::Correction(correction) => {
                    ServerMessage::Correction(CorrectionData::from(&correction))
                }
            },
            Ok(ClientMessage::Ping { timestamp }) => ServerMessage::Pong { timestamp },
            Err(err) => {
                warn!("dropping client datagram: {}", err);
                continue;
            }
        };
        send_message(&mut downlink.0, now, &reply);
    }

    let flags = reconciler.proxy_flags();
    if flags != *last_proxy {
        *last_proxy = flags;
        let state = &reconciler.component.state;
        let update = ServerMessage::ProxyUpdate(ProxyUpdateData {
            location: state.kinematics.location.to_array(),
            movement_mode: state.mode.to_byte(),
            dash: flags.dash,
            short_mantle: flags.short_mantle,
            tall_mantle: flags.tall_mantle,
        });
        send_message(&mut downlink.0, now, &update);
    }
}

fn client_receive_system(
    mut prediction: ResMut<ClientPrediction>,
    world: Res<ClientWorld>,
    mut downlink: ResMut<Downlink>,
    mut remote: ResMut<RemoteView>,
    time: Res<Time<Fixed>>,
) {
    let now = time.elapsed_secs_f64();
    for payload in downlink.0.receive(now) {
        match decode_server_message(&payload) {
            Ok(ServerMessage::Ack { timestamp }) => prediction.apply_ack(timestamp),
            Ok(ServerMessage::Correction(data)) => match Correction::try_from(&data) {
                Ok(correction) => prediction.apply_correction(&correction, &world.0),
                Err(err) => warn!("ignoring correction: {}", err),
            },
            Ok(ServerMessage::ProxyUpdate(update)) => remote.observe(&update),
            Ok(ServerMessage::Pong { timestamp }) => {
                debug!("round trip {:.1}ms", (now - timestamp) * 1000.0);
            }
            Err(err) => warn!("dropping server datagram: {}", err),
        }
    }
}

fn stats_system(
    prediction: Res<ClientPrediction>,
    reconciler: Res<ServerReconciler>,
    config: Res<NetSimConfig>,
) {
    let client = &prediction.stats;
    if config.stats_interval == 0 || client.tick_count % config.stats_interval != 0 {
        return;
    }
    let server = &reconciler.stats;
    info!(
        "tick {}: mode {:?}, {} moves unacked, {} bits sent, {} corrections (mean error {:.2}cm)",
        client.tick_count,
        prediction.component.current_mode(),
        prediction.buffer.len(),
        client.bits_sent,
        server.correction_count,
        server.mean_correction_error()
    );
}

fn finish_system(
    config: Res<NetSimConfig>,
    mut prediction: ResMut<ClientPrediction>,
    mut reconciler: ResMut<ServerReconciler>,
    remote: Res<RemoteView>,
    mut exit: EventWriter<AppExit>,
) {
    let ticks = prediction.stats.tick_count;
    if ticks < config.ticks {
        return;
    }

    let location = prediction.component.state.kinematics.location;
    let server_location = reconciler.component.state.kinematics.location;
    info!(
        "finished after {} ticks: {} corrections, client at {:?}, server at {:?}, remote saw {} montage(s)",
        ticks,
        reconciler.stats.correction_count,
        location,
        server_location,
        remote.animation.played.len()
    );
    prediction.component.shutdown();
    reconciler.component.shutdown();
    exit.write(AppExit::Success);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Step the app until the run asks to exit.
    fn run(config: NetSimConfig) -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, NetworkingPlugin { config }));
        for _ in 0..10_000 {
            app.update();
            if app.should_exit().is_some() {
                break;
            }
        }
        app
    }

    #[test]
    fn test_clean_run_needs_no_corrections() {
        let config = NetSimConfig {
            ticks: 600,
            ..Default::default()
        };
        let app = run(config);

        let server = app.world().resource::<ServerReconciler>();
        let client = app.world().resource::<ClientPrediction>();
        assert_eq!(server.stats.correction_count, 0);
        assert_eq!(client.stats.tick_count, 600);
        assert!(server.stats.tick_count > 500);
        assert!(client.stats.bits_sent > 0);
        assert!(app.should_exit().is_some());
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let config = NetSimConfig {
            ticks: 300,
            seed: 11,
            ..Default::default()
        };
        let a = run(config.clone());
        let b = run(config);
        assert_eq!(
            a.world().resource::<ClientPrediction>().component.state,
            b.world().resource::<ClientPrediction>().component.state
        );
        assert_eq!(
            a.world().resource::<ServerReconciler>().component.state,
            b.world().resource::<ServerReconciler>().component.state
        );
    }

    #[test]
    fn test_one_fixed_step_per_update() {
        let config = NetSimConfig {
            ticks: 100,
            ..Default::default()
        };
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, NetworkingPlugin { config }));
        // The first frame only starts the clock
        app.update();
        assert_eq!(app.world().resource::<ClientPrediction>().stats.tick_count, 0);
        for _ in 0..10 {
            app.update();
        }
        assert_eq!(app.world().resource::<ClientPrediction>().stats.tick_count, 10);
        let elapsed = app.world().resource::<Time<Fixed>>().elapsed_secs_f64();
        assert!((elapsed - 10.0 * FIXED_TIMESTEP as f64).abs() < 1e-6);
        assert!(app.should_exit().is_none());
    }

    #[test]
    fn test_settings_resource_feeds_both_characters() {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, NetworkingPlugin { config: NetSimConfig::default() }));
        app.world_mut().resource_mut::<MovementSettings>().max_walk_speed = 123.0;
        app.update();
        let client = app.world().resource::<ClientPrediction>();
        let server = app.world().resource::<ServerReconciler>();
        assert_eq!(client.component.settings().max_walk_speed, 123.0);
        assert_eq!(server.component.settings().max_walk_speed, 123.0);
    }

    #[test]
    fn test_input_script_holds_inputs() {
        let mut script = InputScript::new(3);
        let first = script.next_input();
        assert_eq!(script.next_input(), first);
        assert!(first.move_direction.length() <= 1.0 + 1e-6);
    }
}
