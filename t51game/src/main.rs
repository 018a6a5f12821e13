//! Client binary. Thin CLI glue around `t51core`'s client-side primitives: connects to a
//! dedicated server, predicts local movement, and reconciles against authoritative snapshots.
//! Input device polling and rendering are out of scope; movement is driven by simple textual
//! commands read from stdin instead.

use log::{info, warn};
use std::cell::RefCell;
use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use t51core::adapter::client::network_tick;
use t51core::adapter::ClientAdapter;
use t51core::clock::RealClock;
use t51core::config::{ClientNetworkConfig, GameConfig};
use t51core::net::{Host, HostConfig, PeerId, SendFlags};
use t51core::physics::Vec2;
use t51core::player::{Player, Reconciliation};
use t51core::protocol::dispatch::{dispatch_fn_table, PacketHandler};
use t51core::protocol::packets::*;
use t51core::tick::FixedTimestepDriver;

struct Args {
    debug: bool,
    connect: SocketAddr,
}

fn parse_args() -> Args {
    let mut args = Args {
        debug: false,
        connect: format!("127.0.0.1:{}", t51core::config::DEFAULT_BIND_PORT).parse().unwrap(),
    };
    for arg in std::env::args().skip(1) {
        if arg == "--debug" {
            args.debug = true;
        } else if let Some(value) = arg.strip_prefix("--connect=") {
            if let Ok(addr) = value.parse() {
                args.connect = addr;
            }
        }
    }
    args
}

struct ClientState {
    player: Option<Player>,
    my_id: Option<u32>,
    game: GameConfig,
}

impl ClientState {
    fn new(game: GameConfig) -> ClientState {
        ClientState {
            player: None,
            my_id: None,
            game,
        }
    }
}

struct ClientHandler<'a> {
    state: &'a RefCell<ClientState>,
}

impl<'a> PacketHandler for ClientHandler<'a> {
    fn handle_cs_player_join_request(&mut self, _pkt: &CSPlayerJoinRequest, peer: PeerId) {
        warn!("client received server-bound CSPlayerJoinRequest from peer {}", peer);
    }

    fn handle_sc_player_join_response(&mut self, pkt: &SCPlayerJoinResponse, _peer: PeerId) {
        if pkt.success == 0 {
            warn!("join request refused by server");
            return;
        }

        let mut state = self.state.borrow_mut();
        let capacity = state.game.input_buffer_capacity;
        state.my_id = Some(pkt.player_id);
        state.player = Some(Player::new(
            pkt.player_id,
            format!("player-{}", pkt.player_id),
            Vec2::new(pkt.spawn_x, pkt.spawn_y),
            capacity,
        ));
        info!(
            "joined as player {}, world bounds [{}, {}]",
            pkt.player_id,
            pkt.world_l,
            pkt.world_l + pkt.world_w
        );
    }

    fn handle_cs_player_input_snapshot(&mut self, _pkt: &CSPlayerInputSnapshot, peer: PeerId) {
        warn!("client received server-bound CSPlayerInputSnapshot from peer {}", peer);
    }

    fn handle_sc_player_state_snapshot(&mut self, pkt: &SCPlayerStateSnapshot, _peer: PeerId) {
        let mut state = self.state.borrow_mut();
        let speed = state.game.player_speed;
        let dt = 1.0 / state.game.server_tick_rate_hz as f32;
        let max_diversion = state.game.max_diversion;
        let max_teleport = state.game.max_teleport_distance;

        if let Some(player) = state.player.as_mut() {
            let server_pos = Vec2::new(pkt.x_pos, pkt.y_pos);
            match player.reconcile(pkt.tick_number, server_pos, speed, dt, max_diversion, max_teleport) {
                Reconciliation::Agreed => {}
                Reconciliation::Corrected(pos) => info!("reconciled: corrected to {:?}", pos),
                Reconciliation::Teleported(pos) => warn!("reconciled: teleported to {:?}", pos),
                Reconciliation::UnknownTick => {}
            }
        }
    }

    fn handle_sc_player_create(&mut self, pkt: &SCPlayerCreate, _peer: PeerId) {
        let state = self.state.borrow();
        if state.my_id != Some(pkt.player_id) {
            info!("player {} joined at ({}, {})", pkt.player_id, pkt.spawn_x, pkt.spawn_y);
        }
    }

    fn handle_cs_tower_build_request(&mut self, _pkt: &CSTowerBuildRequest, peer: PeerId) {
        warn!("client received server-bound CSTowerBuildRequest from peer {}", peer);
    }

    fn handle_sc_tower_create(&mut self, pkt: &SCTowerCreate, _peer: PeerId) {
        info!("tower {} created at ({}, {})", pkt.tower_id, pkt.x_pos, pkt.y_pos);
    }
}

/// The latest steady-state movement axis, updated by the stdin command thread and read once
/// per tick in place of real input device polling (explicitly out of scope).
struct InputState {
    axis_x: i32,
    axis_y: i32,
}

fn spawn_command_loop(input: Arc<Mutex<InputState>>, stop_requested: Arc<AtomicBool>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let mut parts = line.trim().split_whitespace();
            match parts.next() {
                Some("move") => {
                    let x = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
                    let y = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
                    let mut input = input.lock().unwrap();
                    input.axis_x = x;
                    input.axis_y = y;
                }
                Some("stop") => {
                    let mut input = input.lock().unwrap();
                    input.axis_x = 0;
                    input.axis_y = 0;
                }
                Some("quit") => {
                    stop_requested.store(true, Ordering::Relaxed);
                    break;
                }
                Some(other) => println!("unknown command: {}", other),
                None => {}
            }
        }
    });
}

fn main() {
    let args = parse_args();
    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let net_config = ClientNetworkConfig::new(args.connect, t51core::config::DEFAULT_CHANNEL_LIMIT);
    let host = match Host::create(HostConfig::from(&net_config)) {
        Ok(host) => host,
        Err(err) => {
            eprintln!("failed to create client socket: {}", err);
            std::process::exit(1);
        }
    };

    info!("connecting to {}", args.connect);
    if let Err(err) = host.client_connect() {
        eprintln!("failed to connect to {}: {}", args.connect, err);
        std::process::exit(1);
    }
    let server_peer = host.server_peer().expect("connected host has a server peer");
    info!("connected to {}", args.connect);

    let mut adapter = ClientAdapter::new();
    adapter.mark_connected(server_peer);

    let game_config = GameConfig::default();
    let state = RefCell::new(ClientState::new(game_config));
    let table = dispatch_fn_table::<ClientHandler>();

    if adapter.send(&host, SendFlags::Reliable, &CSPlayerJoinRequest {}.into()).is_err() {
        warn!("failed to queue join request");
    }

    let input = Arc::new(Mutex::new(InputState { axis_x: 0, axis_y: 0 }));
    let stop_requested = Arc::new(AtomicBool::new(false));
    spawn_command_loop(input.clone(), stop_requested.clone());

    let clock = RealClock;
    let mut driver = FixedTimestepDriver::new(clock, game_config.server_tick_rate_hz);

    info!("client tick loop starting at {} Hz", game_config.server_tick_rate_hz);

    while !stop_requested.load(Ordering::Relaxed) {
        let frame_started = Instant::now();
        let steps = driver.begin_frame();

        for _ in 0..steps {
            let tick_number = driver.advance_tick();

            let mut handler = ClientHandler { state: &state };
            network_tick(
                &mut adapter,
                &host,
                &mut handler,
                &table,
                |peer| info!("connected to peer {}", peer),
                |peer| warn!("disconnected from peer {}, stopping", peer),
            );

            let (axis_x, axis_y) = {
                let input = input.lock().unwrap();
                (input.axis_x, input.axis_y)
            };

            let dt = driver.dt_secs();
            let mut state = state.borrow_mut();
            let speed = state.game.player_speed;
            if let Some(player) = state.player.as_mut() {
                player.predict_move(tick_number, axis_x, axis_y, speed, dt);
            }
            drop(state);

            if axis_x != 0 || axis_y != 0 {
                let pkt: AnyPacket = CSPlayerInputSnapshot {
                    input_command: InputCommand {
                        tick_number,
                        axis_x,
                        axis_y,
                    },
                }
                .into();
                let _ = adapter.send(&host, SendFlags::Unsequenced, &pkt);
            }
        }

        if let Ok(remaining) = driver.remaining_or_overrun(frame_started) {
            thread::sleep(remaining);
        }
    }

    info!("client shutting down");
    host.destroy();
}
