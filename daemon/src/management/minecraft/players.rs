use chrono::{DateTime, TimeDelta, Utc};
use mcpanel_protocol::management::server::{PlayerStats, Position};
use mcpanel_protocol::v1::event::PlayerSnapshot;
use std::collections::{BTreeMap, HashMap};

/// Roster, positions and cumulative stats derived from the server log.
///
/// Every mutator reports whether it changed anything so the caller decides
/// what to broadcast. A position exists exactly for the players in the
/// roster; stats outlive a leave.
#[derive(Debug, Default)]
pub struct PlayerStateStore {
    roster: Vec<String>,
    positions: BTreeMap<String, Position>,
    stats: BTreeMap<String, PlayerStats>,
    sessions: HashMap<String, DateTime<Utc>>,
}

impl PlayerStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn players(&self) -> &[String] {
        &self.roster
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roster.iter().any(|p| p == name)
    }

    pub fn position(&self, name: &str) -> Option<&Position> {
        self.positions.get(name)
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn stats(&self, name: &str) -> Option<&PlayerStats> {
        self.stats.get(name)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            players: self.roster.clone(),
            positions: self.positions.clone(),
            stats: self.stats.clone(),
        }
    }

    pub fn add_player(&mut self, name: &str) -> bool {
        self.add_player_at(name, Utc::now())
    }

    pub fn add_player_at(&mut self, name: &str, now: DateTime<Utc>) -> bool {
        if self.contains(name) {
            return false;
        }
        self.roster.push(name.to_string());
        self.positions.insert(name.to_string(), Position::default());
        self.stats
            .entry(name.to_string())
            .and_modify(|stats| {
                stats.join_count += 1;
                stats.last_join = Some(now);
            })
            .or_insert_with(|| PlayerStats::first_seen(now));
        self.sessions.insert(name.to_string(), now);
        true
    }

    pub fn remove_player(&mut self, name: &str) -> bool {
        self.remove_player_at(name, Utc::now())
    }

    pub fn remove_player_at(&mut self, name: &str, now: DateTime<Utc>) -> bool {
        let Some(index) = self.roster.iter().position(|p| p == name) else {
            return false;
        };
        self.roster.remove(index);
        self.positions.remove(name);
        self.close_session(name, now);
        true
    }

    /// Coordinates are rounded to whole blocks, halves towards positive
    /// infinity. The world is kept when `world` is `None`.
    pub fn update_position(
        &mut self,
        name: &str,
        x: f64,
        y: f64,
        z: f64,
        world: Option<&str>,
    ) -> bool {
        let Some(position) = self.positions.get_mut(name) else {
            return false;
        };
        position.x = to_block(x);
        position.y = to_block(y);
        position.z = to_block(z);
        if let Some(world) = world {
            position.world = world.to_string();
        }
        true
    }

    pub fn update_world(&mut self, name: &str, world: &str) -> bool {
        match self.positions.get_mut(name) {
            Some(position) => {
                position.world = world.to_string();
                true
            }
            None => false,
        }
    }

    pub fn record_death(&mut self, name: &str) -> bool {
        self.with_stats(name, |stats| stats.deaths += 1)
    }

    pub fn record_kill(&mut self, name: &str) -> bool {
        self.with_stats(name, |stats| stats.kills += 1)
    }

    /// Achievements are kept once each, in the order they were first earned.
    /// Returns `false` for unknown players and repeated achievements.
    pub fn record_achievement(&mut self, name: &str, achievement: &str) -> bool {
        match self.stats.get_mut(name) {
            Some(stats) if !stats.achievements.iter().any(|a| a == achievement) => {
                stats.achievements.push(achievement.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn record_command(&mut self, name: &str) -> bool {
        self.with_stats(name, |stats| stats.commands_used += 1)
    }

    /// Reconciles the roster with an authoritative list. Returns whether the
    /// roster changed.
    pub fn sync_player_list(&mut self, names: &[String]) -> bool {
        self.sync_player_list_at(names, Utc::now())
    }

    pub fn sync_player_list_at(&mut self, names: &[String], now: DateTime<Utc>) -> bool {
        let gone: Vec<String> = self
            .roster
            .iter()
            .filter(|p| !names.contains(p))
            .cloned()
            .collect();

        let mut changed = false;
        for name in &gone {
            changed |= self.remove_player_at(name, now);
        }
        for name in names {
            changed |= self.add_player_at(name, now);
        }

        let roster = &self.roster;
        self.positions.retain(|name, _| roster.contains(name));
        changed
    }

    pub fn update_play_times(&mut self) {
        self.update_play_times_at(Utc::now())
    }

    /// Moves the elapsed whole seconds of every open session into the
    /// cumulative play time. The session clock advances by exactly the
    /// accrued amount so the sub-second remainder carries over.
    pub fn update_play_times_at(&mut self, now: DateTime<Utc>) {
        for (name, started) in self.sessions.iter_mut() {
            let secs = (now - *started).num_seconds();
            if secs <= 0 {
                continue;
            }
            if let Some(stats) = self.stats.get_mut(name) {
                stats.play_time += secs as u64;
            }
            *started += TimeDelta::seconds(secs);
        }
    }

    /// Empties the roster and positions. Open sessions are accrued and
    /// closed; stats stay.
    pub fn reset(&mut self) {
        self.reset_at(Utc::now())
    }

    pub fn reset_at(&mut self, now: DateTime<Utc>) {
        self.update_play_times_at(now);
        self.sessions.clear();
        self.roster.clear();
        self.positions.clear();
    }

    fn close_session(&mut self, name: &str, now: DateTime<Utc>) {
        if let Some(started) = self.sessions.remove(name) {
            let secs = (now - started).num_seconds();
            if let (true, Some(stats)) = (secs > 0, self.stats.get_mut(name)) {
                stats.play_time += secs as u64;
            }
        }
    }

    fn with_stats<F: FnOnce(&mut PlayerStats)>(&mut self, name: &str, f: F) -> bool {
        match self.stats.get_mut(name) {
            Some(stats) => {
                f(stats);
                true
            }
            None => false,
        }
    }
}

fn to_block(coordinate: f64) -> i64 {
    (coordinate + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, millis: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, millis * 1_000_000)
            .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_double_add_keeps_one_entry() {
        let mut store = PlayerStateStore::new();
        assert!(store.add_player_at("Alice", at(0, 0)));
        assert!(!store.add_player_at("Alice", at(5, 0)));

        assert_eq!(store.players(), ["Alice"]);
        assert_eq!(store.stats("Alice").unwrap().join_count, 1);
        assert_eq!(store.position("Alice"), Some(&Position::default()));
    }

    #[test]
    fn test_rejoin_keeps_stats_and_drops_position() {
        let mut store = PlayerStateStore::new();
        store.add_player_at("Bob", at(0, 0));
        store.record_death("Bob");
        store.update_position("Bob", 10.4, 70.6, -3.5, Some("the_nether"));
        assert!(store.remove_player_at("Bob", at(30, 0)));
        assert!(!store.remove_player_at("Bob", at(31, 0)));
        assert_eq!(store.position("Bob"), None);

        store.add_player_at("Bob", at(100, 0));
        let stats = store.stats("Bob").unwrap();
        assert_eq!(stats.join_count, 2);
        assert_eq!(stats.deaths, 1);
        assert_eq!(stats.play_time, 30);
        assert_eq!(stats.first_join, Some(at(0, 0)));
        assert_eq!(stats.last_join, Some(at(100, 0)));
        assert_eq!(store.position("Bob"), Some(&Position::default()));
    }

    #[test]
    fn test_sync_player_list() {
        let mut store = PlayerStateStore::new();
        store.add_player_at("a", at(0, 0));
        store.add_player_at("c", at(0, 0));
        store.record_kill("a");

        assert!(store.sync_player_list_at(&names(&["a", "b"]), at(10, 0)));
        assert_eq!(store.players(), ["a", "b"]);
        assert_eq!(store.position("c"), None);
        assert!(store.position("b").is_some());

        let a = store.stats("a").unwrap();
        assert_eq!(a.kills, 1);
        assert_eq!(a.join_count, 1);
        assert_eq!(store.stats("c").unwrap().play_time, 10);

        assert!(!store.sync_player_list_at(&names(&["a", "b"]), at(11, 0)));
        assert!(store.sync_player_list_at(&[], at(12, 0)));
        assert!(store.is_empty());
        assert!(store.positions().is_empty());
    }

    #[test]
    fn test_play_time_accrues_each_span_once() {
        let mut store = PlayerStateStore::new();
        store.add_player_at("Alice", at(0, 0));

        store.update_play_times_at(at(60, 0));
        assert_eq!(store.stats("Alice").unwrap().play_time, 60);
        store.update_play_times_at(at(120, 0));
        assert_eq!(store.stats("Alice").unwrap().play_time, 120);
        store.update_play_times_at(at(120, 0));
        assert_eq!(store.stats("Alice").unwrap().play_time, 120);

        store.remove_player_at("Alice", at(150, 0));
        assert_eq!(store.stats("Alice").unwrap().play_time, 150);
    }

    #[test]
    fn test_sub_second_remainder_carries_over() {
        let mut store = PlayerStateStore::new();
        store.add_player_at("Alice", at(0, 0));

        store.update_play_times_at(at(1, 600));
        store.update_play_times_at(at(2, 200));
        store.update_play_times_at(at(3, 100));
        assert_eq!(store.stats("Alice").unwrap().play_time, 3);
    }

    #[test]
    fn test_reset_keeps_stats() {
        let mut store = PlayerStateStore::new();
        store.add_player_at("Alice", at(0, 0));
        assert!(store.record_achievement("Alice", "Stone Age"));
        assert!(!store.record_achievement("Alice", "Stone Age"));
        store.record_command("Alice");

        store.reset_at(at(45, 0));
        assert!(store.is_empty());
        assert!(store.positions().is_empty());

        let stats = store.stats("Alice").unwrap();
        assert_eq!(stats.achievements, ["Stone Age"]);
        assert_eq!(stats.commands_used, 1);
        assert_eq!(stats.play_time, 45);

        // the session is closed, later ticks add nothing
        store.update_play_times_at(at(500, 0));
        assert_eq!(store.stats("Alice").unwrap().play_time, 45);
    }

    #[test]
    fn test_unknown_players_are_ignored() {
        let mut store = PlayerStateStore::new();
        assert!(!store.record_death("ghost"));
        assert!(!store.record_kill("ghost"));
        assert!(!store.record_achievement("ghost", "x"));
        assert!(!store.record_command("ghost"));
        assert!(!store.update_position("ghost", 1.0, 2.0, 3.0, None));
        assert!(!store.update_world("ghost", "the_end"));
        assert!(store.stats("ghost").is_none());
        assert!(store.positions().is_empty());
    }

    #[test]
    fn test_position_rounding_and_world() {
        let mut store = PlayerStateStore::new();
        store.add_player_at("Alice", at(0, 0));
        store.update_position("Alice", 10.5, 63.4, -3.6, None);
        store.update_world("Alice", "the_end");
        store.update_position("Alice", 1.2, 2.0, 3.0, None);

        assert_eq!(
            store.position("Alice"),
            Some(&Position {
                x: 1,
                y: 2,
                z: 3,
                world: "the_end".into()
            })
        );
    }

    #[test]
    fn test_halves_round_up() {
        let mut store = PlayerStateStore::new();
        store.add_player_at("Alice", at(0, 0));
        store.update_position("Alice", -3.5, 2.5, -0.5, None);

        let position = store.position("Alice").unwrap();
        assert_eq!((position.x, position.y, position.z), (-3, 3, 0));

        store.update_position("Alice", -3.51, 2.49, 0.5, None);
        let position = store.position("Alice").unwrap();
        assert_eq!((position.x, position.y, position.z), (-4, 2, 1));
    }
}
