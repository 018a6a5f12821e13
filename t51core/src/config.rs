//! Plain validated configuration structs, constructed in code (or by out-of-scope CLI glue)
//! and passed by value into `create`/`new` functions. No configuration-file crate: these are
//! small enough to build directly.

use std::net::SocketAddr;

/// Server-side network configuration.
#[derive(Clone, Debug)]
pub struct ServerNetworkConfig {
    /// Empty/unspecified address binds to any interface.
    pub bind_addr: SocketAddr,
    pub max_sessions: usize,
    pub channel_limit: u8,
    pub incoming_bandwidth: u64,
    pub outgoing_bandwidth: u64,
}

impl ServerNetworkConfig {
    pub fn new(bind_addr: SocketAddr, max_sessions: usize, channel_limit: u8) -> ServerNetworkConfig {
        ServerNetworkConfig {
            bind_addr,
            max_sessions,
            channel_limit,
            incoming_bandwidth: 0,
            outgoing_bandwidth: 0,
        }
    }
}

impl Default for ServerNetworkConfig {
    fn default() -> ServerNetworkConfig {
        ServerNetworkConfig::new(
            "0.0.0.0:12345".parse().unwrap(),
            DEFAULT_MAX_SESSIONS,
            DEFAULT_CHANNEL_LIMIT,
        )
    }
}

impl From<&ServerNetworkConfig> for crate::net::HostConfig {
    fn from(cfg: &ServerNetworkConfig) -> crate::net::HostConfig {
        let mut host_cfg = crate::net::HostConfig::server(cfg.bind_addr, cfg.max_sessions, cfg.channel_limit);
        host_cfg.incoming_bandwidth = cfg.incoming_bandwidth;
        host_cfg.outgoing_bandwidth = cfg.outgoing_bandwidth;
        host_cfg
    }
}

/// Client-side network configuration.
#[derive(Clone, Debug)]
pub struct ClientNetworkConfig {
    pub server_addr: SocketAddr,
    pub channel_limit: u8,
    pub incoming_bandwidth: u64,
    pub outgoing_bandwidth: u64,
    pub connect_timeout_ms: u64,
}

impl ClientNetworkConfig {
    pub fn new(server_addr: SocketAddr, channel_limit: u8) -> ClientNetworkConfig {
        ClientNetworkConfig {
            server_addr,
            channel_limit,
            incoming_bandwidth: 0,
            outgoing_bandwidth: 0,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl From<&ClientNetworkConfig> for crate::net::HostConfig {
    fn from(cfg: &ClientNetworkConfig) -> crate::net::HostConfig {
        let mut host_cfg = crate::net::HostConfig::client(cfg.server_addr, cfg.channel_limit);
        host_cfg.incoming_bandwidth = cfg.incoming_bandwidth;
        host_cfg.outgoing_bandwidth = cfg.outgoing_bandwidth;
        host_cfg.connect_timeout_ms = cfg.connect_timeout_ms;
        host_cfg
    }
}

pub const DEFAULT_MAX_SESSIONS: usize = 64;
pub const DEFAULT_CHANNEL_LIMIT: u8 = 2;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BIND_PORT: u16 = 12345;

/// Physics solver tuning. Values match the canonical constants used elsewhere in this crate.
#[derive(Clone, Copy, Debug)]
pub struct PhysicsConfig {
    pub initial_bodies: usize,
    pub max_bodies: usize,
    pub solver_iterations: u32,
    pub positional_correction_percent: f32,
    pub positional_correction_slop: f32,
    pub friction: f32,
    pub restitution: f32,
}

impl Default for PhysicsConfig {
    fn default() -> PhysicsConfig {
        PhysicsConfig {
            initial_bodies: 64,
            max_bodies: 1024,
            solver_iterations: 15,
            positional_correction_percent: 0.8,
            positional_correction_slop: 0.01,
            friction: 0.4,
            restitution: 0.0,
        }
    }
}

/// Game-loop tuning shared by both client and server tick loops.
#[derive(Clone, Copy, Debug)]
pub struct GameConfig {
    pub server_tick_rate_hz: u32,
    pub player_speed: f32,
    pub input_buffer_capacity: usize,
    pub max_diversion: f32,
    pub max_teleport_distance: f32,
}

impl Default for GameConfig {
    fn default() -> GameConfig {
        GameConfig {
            server_tick_rate_hz: 30,
            player_speed: 200.0,
            input_buffer_capacity: 64,
            max_diversion: 1.5,
            max_teleport_distance: 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        let game = GameConfig::default();
        assert!(game.input_buffer_capacity >= 64 && game.input_buffer_capacity <= 256);
        assert!(game.max_diversion < game.max_teleport_distance);

        let physics = PhysicsConfig::default();
        assert_eq!(physics.solver_iterations, 15);
    }
}
