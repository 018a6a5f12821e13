//! Dedicated server binary. Thin CLI glue around `t51core`'s server-side primitives: parses
//! `--debug`/`--port`, runs the 30 Hz authoritative tick loop, and accepts `stop`/`status` on
//! stdin until shutdown.

use log::{info, warn};
use std::cell::RefCell;
use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use hashbrown::HashMap;

use t51core::adapter::{server::network_tick, ServerAdapter, SessionId};
use t51core::clock::RealClock;
use t51core::config::{GameConfig, PhysicsConfig, ServerNetworkConfig};
use t51core::entity::EntityManager;
use t51core::net::{Host, HostConfig, PeerId, SendFlags};
use t51core::physics::Vec2;
use t51core::player::PlayerRegistry;
use t51core::protocol::dispatch::{dispatch_fn_table, PacketHandler};
use t51core::protocol::packets::*;
use t51core::tick::{FixedTimestepDriver, RollingWindow};

struct Args {
    debug: bool,
    port: u16,
}

fn parse_args() -> Args {
    let mut args = Args {
        debug: false,
        port: t51core::config::DEFAULT_BIND_PORT,
    };
    for arg in std::env::args().skip(1) {
        if arg == "--debug" {
            args.debug = true;
        } else if let Some(value) = arg.strip_prefix("--port=") {
            if let Ok(port) = value.parse() {
                args.port = port;
            }
        }
    }
    args
}

/// An outgoing packet queued by a handler, drained after `network_tick` returns so handlers
/// never need their own `&ServerAdapter` while `network_tick` holds it mutably.
enum Outbound {
    Unicast(SessionId, AnyPacket),
    Broadcast(AnyPacket),
}

const WORLD_L: i32 = -1000;
const WORLD_W: i32 = 2000;

struct ServerState {
    players: PlayerRegistry,
    entities: EntityManager,
    peer_to_session: HashMap<PeerId, SessionId>,
    session_to_peer: HashMap<SessionId, PeerId>,
    peer_to_player: HashMap<PeerId, u32>,
    player_to_session: HashMap<u32, SessionId>,
    next_tower_id: u32,
    game: GameConfig,
}

impl ServerState {
    fn new(game: GameConfig) -> ServerState {
        ServerState {
            players: PlayerRegistry::new(),
            entities: EntityManager::new(256),
            peer_to_session: HashMap::new(),
            session_to_peer: HashMap::new(),
            peer_to_player: HashMap::new(),
            player_to_session: HashMap::new(),
            next_tower_id: 1,
            game,
        }
    }

    fn on_connect(&mut self, session: SessionId, peer: PeerId) {
        self.peer_to_session.insert(peer, session);
        self.session_to_peer.insert(session, peer);
    }

    fn on_disconnect(&mut self, session: SessionId) -> Option<u32> {
        let peer = self.session_to_peer.remove(&session)?;
        self.peer_to_session.remove(&peer);
        if let Some(player_id) = self.peer_to_player.remove(&peer) {
            self.player_to_session.remove(&player_id);
            self.players.remove(player_id);
            return Some(player_id);
        }
        None
    }
}

/// Borrows `state` only for the span of each handler call, so the connect/disconnect
/// closures `network_tick` also drives can hold their own short-lived borrow of the same
/// `RefCell` without conflicting with the handler's.
struct ServerHandler<'a> {
    state: &'a RefCell<ServerState>,
    outbox: Vec<Outbound>,
}

impl<'a> PacketHandler for ServerHandler<'a> {
    fn handle_cs_player_join_request(&mut self, _pkt: &CSPlayerJoinRequest, peer: PeerId) {
        let mut state = self.state.borrow_mut();

        if state.peer_to_player.contains_key(&peer) {
            return;
        }
        let session = match state.peer_to_session.get(&peer).copied() {
            Some(session) => session,
            None => {
                warn!("join request from peer {} with no known session", peer);
                return;
            }
        };

        let spawn = Vec2::new(0.0, 0.0);
        let capacity = state.game.input_buffer_capacity;
        let id = state.players.create(format!("player-{}", peer), spawn, capacity);
        state.peer_to_player.insert(peer, id);
        state.player_to_session.insert(id, session);

        info!("player {} joined (peer {}, session {})", id, peer, session);

        self.outbox.push(Outbound::Unicast(
            session,
            SCPlayerJoinResponse {
                success: 1,
                player_id: id,
                world_l: WORLD_L,
                world_w: WORLD_W,
                spawn_x: spawn.x,
                spawn_y: spawn.y,
            }
            .into(),
        ));
        self.outbox.push(Outbound::Broadcast(
            SCPlayerCreate {
                player_id: id,
                spawn_x: spawn.x,
                spawn_y: spawn.y,
            }
            .into(),
        ));
    }

    fn handle_sc_player_join_response(&mut self, _pkt: &SCPlayerJoinResponse, peer: PeerId) {
        warn!("server received client-bound SCPlayerJoinResponse from peer {}", peer);
    }

    fn handle_cs_player_input_snapshot(&mut self, pkt: &CSPlayerInputSnapshot, peer: PeerId) {
        let mut state = self.state.borrow_mut();
        let player_id = match state.peer_to_player.get(&peer).copied() {
            Some(id) => id,
            None => {
                warn!("input snapshot from unjoined peer {}", peer);
                return;
            }
        };

        let speed = state.game.player_speed;
        let dt = 1.0 / state.game.server_tick_rate_hz as f32;
        if let Some(player) = state.players.get_mut(player_id) {
            player.apply_authoritative_move(
                pkt.input_command.tick_number,
                pkt.input_command.axis_x,
                pkt.input_command.axis_y,
                speed,
                dt,
            );
        }
    }

    fn handle_sc_player_state_snapshot(&mut self, _pkt: &SCPlayerStateSnapshot, peer: PeerId) {
        warn!("server received client-bound SCPlayerStateSnapshot from peer {}", peer);
    }

    fn handle_sc_player_create(&mut self, _pkt: &SCPlayerCreate, peer: PeerId) {
        warn!("server received client-bound SCPlayerCreate from peer {}", peer);
    }

    fn handle_cs_tower_build_request(&mut self, pkt: &CSTowerBuildRequest, peer: PeerId) {
        let mut state = self.state.borrow_mut();
        if !state.peer_to_player.contains_key(&peer) {
            warn!("tower build request from unjoined peer {}", peer);
            return;
        }

        let tower_id = state.next_tower_id;
        state.next_tower_id = state.next_tower_id.wrapping_add(1).max(1);

        self.outbox.push(Outbound::Broadcast(
            SCTowerCreate {
                x_pos: pkt.x_pos,
                y_pos: pkt.y_pos,
                tower_def_index: pkt.tower_def_index,
                tower_id,
            }
            .into(),
        ));
    }

    fn handle_sc_tower_create(&mut self, _pkt: &SCTowerCreate, peer: PeerId) {
        warn!("server received client-bound SCTowerCreate from peer {}", peer);
    }
}

fn main() {
    let args = parse_args();
    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let bind_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse().expect("bind address");
    let net_config = ServerNetworkConfig::new(
        bind_addr,
        t51core::config::DEFAULT_MAX_SESSIONS,
        t51core::config::DEFAULT_CHANNEL_LIMIT,
    );
    let host = match Host::create(HostConfig::from(&net_config)) {
        Ok(host) => host,
        Err(err) => {
            eprintln!("failed to bind {}: {}", bind_addr, err);
            std::process::exit(1);
        }
    };
    info!("server listening on {}", host.local_addr());

    let mut adapter = ServerAdapter::new(net_config.max_sessions);
    let game_config = GameConfig::default();
    let physics_config = PhysicsConfig::default();
    let state = RefCell::new(ServerState::new(game_config));
    let table = dispatch_fn_table::<ServerHandler>();

    let stop_requested = Arc::new(AtomicBool::new(false));
    let status_line = Arc::new(Mutex::new(String::from("starting")));
    spawn_command_loop(stop_requested.clone(), status_line.clone());

    let clock = RealClock;
    let mut driver = FixedTimestepDriver::new(clock, game_config.server_tick_rate_hz);
    let mut tps_window = RollingWindow::new();
    let mut cpu_window = RollingWindow::new();

    info!("server tick loop starting at {} Hz", game_config.server_tick_rate_hz);

    while !stop_requested.load(Ordering::Relaxed) {
        let frame_started = Instant::now();
        let steps = driver.begin_frame();

        for _ in 0..steps {
            driver.advance_tick();

            let mut handler = ServerHandler {
                state: &state,
                outbox: Vec::new(),
            };
            network_tick(
                &mut adapter,
                &host,
                &mut handler,
                &table,
                |session, peer| {
                    state.borrow_mut().on_connect(session, peer);
                    info!("session {} connected (peer {})", session, peer);
                },
                |session| {
                    if let Some(player_id) = state.borrow_mut().on_disconnect(session) {
                        info!("session {} disconnected, player {} removed", session, player_id);
                    }
                },
            );

            for outbound in handler.outbox {
                match outbound {
                    Outbound::Unicast(session, pkt) => adapter.send(&host, session, SendFlags::Reliable, &pkt),
                    Outbound::Broadcast(pkt) => adapter.broadcast(&host, SendFlags::Reliable, &pkt),
                }
            }

            let dt = driver.dt_secs();
            let expired = state.borrow_mut().entities.physics_step(dt, &physics_config);
            for id in expired {
                state.borrow_mut().entities.free(id);
            }

            let dirty = state.borrow_mut().players.drain_dirty();
            for id in dirty {
                let mut s = state.borrow_mut();
                let session = s.player_to_session.get(&id).copied();
                if let (Some(player), Some(session)) = (s.players.get(id), session) {
                    adapter.send(
                        &host,
                        session,
                        SendFlags::Unsequenced,
                        &SCPlayerStateSnapshot {
                            tick_number: player.last_processed_input_tick,
                            x_pos: player.position.x,
                            y_pos: player.position.y,
                        }
                        .into(),
                    );
                }
            }
        }

        if steps > 0 {
            tps_window.push(steps as f32 * game_config.server_tick_rate_hz as f32);
        }

        match driver.remaining_or_overrun(frame_started) {
            Ok(remaining) => {
                cpu_window.push(1.0 - remaining.as_secs_f32() * game_config.server_tick_rate_hz as f32);
                thread::sleep(remaining);
            }
            Err(overrun) => {
                warn!("server overloaded: tick overran by {:?}", overrun);
                cpu_window.push(1.0);
            }
        }

        *status_line.lock().unwrap() = format!(
            "players={} sessions={} tps={:.1} cpu={:.0}%",
            state.borrow().players.len(),
            adapter.session_count(),
            tps_window.average(),
            cpu_window.average() * 100.0,
        );
    }

    info!("server shutting down");
    host.destroy();
}

fn spawn_command_loop(stop_requested: Arc<AtomicBool>, status_line: Arc<Mutex<String>>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            match line.trim() {
                "stop" => {
                    stop_requested.store(true, Ordering::Relaxed);
                    break;
                }
                "status" => println!("{}", status_line.lock().unwrap()),
                other if !other.is_empty() => println!("unknown command: {}", other),
                _ => {}
            }
        }
    });
}
