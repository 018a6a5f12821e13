//! Client-side prediction and server reconciliation. `apply_move` is the single movement
//! formula shared by the client's predicted-move site and the server's authoritative-move
//! site, so divergence between them can only come from packet loss, reordering, or differing
//! Δt -- never algorithmic asymmetry.

use crate::physics::Vec2;
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Applies one input tick's movement: normalize the axis pair, scale by `speed * dt`, add.
pub fn apply_move(position: Vec2, axis_x: i32, axis_y: i32, speed: f32, dt: f32) -> Vec2 {
    let direction = Vec2::new(axis_x as f32, axis_y as f32).normalized();
    position.add(direction.scale(speed * dt))
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputSnapshot {
    pub tick_number: u64,
    pub axis_x: i32,
    pub axis_y: i32,
    pub predicted_position: Vec2,
}

/// Outcome of `Player::reconcile`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reconciliation {
    /// `d <= MAX_DIVERSION`: prediction agreed with the server, nothing changes.
    Agreed,
    /// `MAX_DIVERSION < d < MAX_TELEPORT_DISTANCE`: remaining ring entries were replayed on
    /// top of the server position.
    Corrected(Vec2),
    /// `d >= MAX_TELEPORT_DISTANCE`: the ring was cleared and the player snapped to the
    /// server position.
    Teleported(Vec2),
    /// The acked tick wasn't at the head of the ring; nothing was popped or changed.
    UnknownTick,
}

/// A connected player: identity, authoritative/predicted position, and (client-side) the
/// ring of recent input snapshots used to reconcile against server acks.
pub struct Player {
    pub id: u32,
    pub name: String,
    pub position: Vec2,
    pub last_processed_input_tick: u64,
    pub dirty: bool,
    input_ring: VecDeque<InputSnapshot>,
    capacity: usize,
}

impl Player {
    pub fn new(id: u32, name: String, position: Vec2, capacity: usize) -> Player {
        Player {
            id,
            name,
            position,
            last_processed_input_tick: 0,
            dirty: false,
            input_ring: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn input_ring_len(&self) -> usize {
        self.input_ring.len()
    }

    pub fn ring_ticks(&self) -> Vec<u64> {
        self.input_ring.iter().map(|s| s.tick_number).collect()
    }

    /// Client side: predicts this tick's move, stores it, and returns the predicted
    /// position (same value now held in `self.position`).
    pub fn predict_move(&mut self, tick_number: u64, axis_x: i32, axis_y: i32, speed: f32, dt: f32) -> Vec2 {
        let predicted = apply_move(self.position, axis_x, axis_y, speed, dt);
        self.position = predicted;

        if self.input_ring.len() >= self.capacity {
            self.input_ring.pop_front();
        }
        self.input_ring.push_back(InputSnapshot {
            tick_number,
            axis_x,
            axis_y,
            predicted_position: predicted,
        });

        predicted
    }

    /// Server side: applies the same move formula to the authoritative position, records
    /// the last processed input tick, and marks the player dirty so a snapshot goes out.
    pub fn apply_authoritative_move(&mut self, tick_number: u64, axis_x: i32, axis_y: i32, speed: f32, dt: f32) {
        self.position = apply_move(self.position, axis_x, axis_y, speed, dt);
        self.last_processed_input_tick = tick_number;
        self.dirty = true;
    }

    /// Client side: reconciles against an `s2c_player_state_snapshot` ack.
    pub fn reconcile(
        &mut self,
        acked_tick: u64,
        server_pos: Vec2,
        speed: f32,
        dt: f32,
        max_diversion: f32,
        max_teleport_distance: f32,
    ) -> Reconciliation {
        while let Some(front) = self.input_ring.front() {
            if front.tick_number < acked_tick {
                self.input_ring.pop_front();
            } else {
                break;
            }
        }

        let predicted = match self.input_ring.front() {
            Some(front) if front.tick_number == acked_tick => {
                self.input_ring.pop_front().unwrap().predicted_position
            }
            _ => return Reconciliation::UnknownTick,
        };

        let divergence = server_pos.sub(predicted);
        let d = divergence.length();

        if d <= max_diversion {
            Reconciliation::Agreed
        } else if d < max_teleport_distance {
            let mut corrected = server_pos;
            for snapshot in &self.input_ring {
                corrected = apply_move(corrected, snapshot.axis_x, snapshot.axis_y, speed, dt);
            }
            self.position = corrected;
            Reconciliation::Corrected(corrected)
        } else {
            self.input_ring.clear();
            self.position = server_pos;
            Reconciliation::Teleported(server_pos)
        }
    }
}

/// Keyed by player id; `IndexMap` keeps iteration in insertion order so the server's
/// per-tick dirty-player sweep visits players in a stable, deterministic sequence instead of
/// whatever order a hash map happens to yield.
pub struct PlayerRegistry {
    players: IndexMap<u32, Player>,
    next_id: u32,
}

impl PlayerRegistry {
    pub fn new() -> PlayerRegistry {
        PlayerRegistry {
            players: IndexMap::new(),
            next_id: 1,
        }
    }

    pub fn create(&mut self, name: String, position: Vec2, input_buffer_capacity: usize) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.players.insert(id, Player::new(id, name, position, input_buffer_capacity));
        id
    }

    pub fn remove(&mut self, id: u32) -> Option<Player> {
        self.players.shift_remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&u32, &mut Player)> {
        self.players.iter_mut()
    }

    /// Players with a pending state snapshot to send (at most once per server tick per
    /// dirty player). Clears the dirty flag as it yields each one.
    pub fn drain_dirty(&mut self) -> Vec<u32> {
        let mut dirty = Vec::new();
        for (id, player) in self.players.iter_mut() {
            if player.dirty {
                player.dirty = false;
                dirty.push(*id);
            }
        }
        dirty
    }
}

impl Default for PlayerRegistry {
    fn default() -> PlayerRegistry {
        PlayerRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEED: f32 = 200.0;
    const DT: f32 = 1.0 / 30.0;
    const MAX_DIVERSION: f32 = 1.5;
    const MAX_TELEPORT: f32 = 5.0;

    #[test]
    fn agreed_prediction_leaves_remaining_ring_entries_intact() {
        let mut player = Player::new(1, "p".into(), Vec2::ZERO, 64);

        let p1 = player.predict_move(1, 1, 0, SPEED, DT);
        let p2 = player.predict_move(2, 1, 0, SPEED, DT);
        let p3 = player.predict_move(3, 1, 0, SPEED, DT);

        assert!((p1.x - 6.666_667).abs() < 1e-3);
        assert!((p2.x - 13.333_334).abs() < 1e-3);
        assert!((p3.x - 20.0).abs() < 1e-3);

        let result = player.reconcile(1, p1, SPEED, DT, MAX_DIVERSION, MAX_TELEPORT);
        assert_eq!(result, Reconciliation::Agreed);
        assert_eq!(player.ring_ticks(), vec![2, 3]);
    }

    #[test]
    fn small_divergence_is_accepted_without_correction() {
        let mut player = Player::new(1, "p".into(), Vec2::ZERO, 64);
        let predicted = player.predict_move(1, 1, 0, SPEED, DT);

        let server_pos = predicted.add(Vec2::new(1.0, 0.0));
        let result = player.reconcile(1, server_pos, SPEED, DT, MAX_DIVERSION, MAX_TELEPORT);
        assert_eq!(result, Reconciliation::Agreed);
    }

    #[test]
    fn moderate_divergence_replays_remaining_ring() {
        let mut player = Player::new(1, "p".into(), Vec2::ZERO, 64);
        player.predict_move(1, 1, 0, SPEED, DT);
        player.predict_move(2, 1, 0, SPEED, DT);
        player.predict_move(3, 1, 0, SPEED, DT);

        let server_pos_for_tick1 = Vec2::new(6.666_667 + 3.0, 0.0);
        let result = player.reconcile(1, server_pos_for_tick1, SPEED, DT, MAX_DIVERSION, MAX_TELEPORT);

        match result {
            Reconciliation::Corrected(pos) => {
                let expected = apply_move(
                    apply_move(server_pos_for_tick1, 1, 0, SPEED, DT),
                    1,
                    0,
                    SPEED,
                    DT,
                );
                assert!((pos.x - expected.x).abs() < 1e-3);
            }
            other => panic!("expected Corrected, got {:?}", other),
        }
        assert_eq!(player.ring_ticks(), vec![2, 3]);
    }

    #[test]
    fn large_divergence_clears_ring_and_teleports() {
        let mut player = Player::new(1, "p".into(), Vec2::ZERO, 64);
        player.predict_move(1, 1, 0, SPEED, DT);
        player.predict_move(2, 1, 0, SPEED, DT);

        let server_pos = Vec2::new(1000.0, 0.0);
        let result = player.reconcile(1, server_pos, SPEED, DT, MAX_DIVERSION, MAX_TELEPORT);

        assert_eq!(result, Reconciliation::Teleported(server_pos));
        assert_eq!(player.position, server_pos);
        assert!(player.ring_ticks().is_empty());
    }

    #[test]
    fn ack_for_unknown_tick_does_not_reconcile() {
        let mut player = Player::new(1, "p".into(), Vec2::ZERO, 64);
        player.predict_move(5, 1, 0, SPEED, DT);

        let result = player.reconcile(99, Vec2::ZERO, SPEED, DT, MAX_DIVERSION, MAX_TELEPORT);
        assert_eq!(result, Reconciliation::UnknownTick);
        assert_eq!(player.ring_ticks(), vec![5]);
    }

    #[test]
    fn server_apply_authoritative_move_marks_dirty_and_records_tick() {
        let mut player = Player::new(1, "p".into(), Vec2::ZERO, 64);
        player.apply_authoritative_move(7, 0, 1, SPEED, DT);
        assert_eq!(player.last_processed_input_tick, 7);
        assert!(player.dirty);
    }

    #[test]
    fn registry_assigns_ids_and_tracks_dirty_players() {
        let mut registry = PlayerRegistry::new();
        let a = registry.create("a".into(), Vec2::ZERO, 64);
        let b = registry.create("b".into(), Vec2::ZERO, 64);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry.get_mut(a).unwrap().apply_authoritative_move(1, 1, 0, SPEED, DT);
        assert_eq!(registry.drain_dirty(), vec![a]);
        assert_eq!(registry.drain_dirty(), Vec::<u32>::new());

        registry.remove(a);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(a).is_none());
    }
}
