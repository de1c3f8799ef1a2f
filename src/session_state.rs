use std::collections::BTreeSet;

use crate::engine::LiveEnemy;
use crate::session_store::PersistedSession;
use crate::types::{Coord, LevelResult};

/// Authoritative progress record owned by [`crate::engine::GameSession`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    pub player_position: Coord,
    pub player_start: Coord,
    pub exit_position: Coord,
    pub collectibles_collected: u32,
    pub collectible_total: u32,
    pub keys_collected: u32,
    pub key_total: u32,
    /// Derived from the key counters; recomputed whenever they change.
    pub exit_unlocked: bool,
    pub deaths: u32,
    pub current_task_id: Option<String>,
    pub completed_task_ids: BTreeSet<String>,
    pub start_time_ms: Option<u64>,
    pub is_game_active: bool,
    pub is_timer_running: bool,
    pub live_enemies: Vec<LiveEnemy>,
    /// Collectibles picked up over the whole session.
    pub total_collectibles: u32,
    pub level_results: Vec<LevelResult>,
}

impl SessionState {
    pub fn fresh() -> Self {
        Self::default()
    }

    /// Rebuilds the persisted subset. Unknown task ids are dropped so a
    /// stale save cannot hide tasks that were removed from the pack.
    pub fn restored(saved: &PersistedSession, known_ids: &BTreeSet<String>) -> Self {
        let completed_task_ids = saved
            .completed_set()
            .into_iter()
            .filter(|id| known_ids.contains(id))
            .collect();
        Self {
            deaths: saved.deaths,
            current_task_id: saved
                .current_task_id
                .clone()
                .filter(|id| known_ids.contains(id)),
            completed_task_ids,
            total_collectibles: saved.collectibles_collected,
            level_results: saved.level_results.clone(),
            ..Self::default()
        }
    }

    pub fn to_persisted(&self) -> PersistedSession {
        let mut saved = PersistedSession::new(&self.completed_task_ids, self.deaths);
        saved.current_task_id = self.current_task_id.clone();
        saved.collectibles_collected = self.total_collectibles;
        saved.level_results = self.level_results.clone();
        saved
    }

    pub fn refresh_exit_lock(&mut self) -> bool {
        let was_unlocked = self.exit_unlocked;
        self.exit_unlocked = self.keys_collected == self.key_total;
        !was_unlocked && self.exit_unlocked
    }

    pub fn enemy_at(&self, at: Coord) -> bool {
        self.live_enemies.iter().any(|enemy| enemy.position == at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_round_trip_keeps_progress() {
        let mut state = SessionState::fresh();
        state.deaths = 3;
        state.total_collectibles = 7;
        state.current_task_id = Some("b".to_string());
        state.completed_task_ids = ["a", "b"].iter().map(|id| id.to_string()).collect();

        let known: BTreeSet<String> = ["a", "b", "c"].iter().map(|id| id.to_string()).collect();
        let restored = SessionState::restored(&state.to_persisted(), &known);
        assert_eq!(restored.deaths, 3);
        assert_eq!(restored.total_collectibles, 7);
        assert_eq!(restored.current_task_id.as_deref(), Some("b"));
        assert_eq!(restored.completed_task_ids, state.completed_task_ids);
        assert!(!restored.is_game_active);
    }

    #[test]
    fn restore_drops_ids_missing_from_the_pack() {
        let completed: BTreeSet<String> = ["a", "gone"].iter().map(|id| id.to_string()).collect();
        let mut saved = PersistedSession::new(&completed, 1);
        saved.current_task_id = Some("gone".to_string());
        let known: BTreeSet<String> = ["a"].iter().map(|id| id.to_string()).collect();

        let restored = SessionState::restored(&saved, &known);
        assert_eq!(restored.completed_task_ids.len(), 1);
        assert!(restored.completed_task_ids.contains("a"));
        assert_eq!(restored.current_task_id, None);
    }

    #[test]
    fn exit_lock_reports_only_the_opening_transition() {
        let mut state = SessionState {
            key_total: 2,
            ..SessionState::fresh()
        };
        assert!(!state.refresh_exit_lock());
        state.keys_collected = 2;
        assert!(state.refresh_exit_lock());
        assert!(state.exit_unlocked);
        assert!(!state.refresh_exit_lock());
    }
}
