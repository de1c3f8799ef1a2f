use std::collections::{BTreeSet, VecDeque};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{CyclePolicy, SessionOptions};
use crate::constants::{MAX_PENDING_EVENTS, NO_HELP_TEXT};
use crate::error::LoadError;
use crate::input::{click_direction, key_direction, TiltAccumulator};
use crate::maze::{CellKind, Grid, Task};
use crate::rng::Rng;
use crate::selector::{next_task, Selection};
use crate::session_state::SessionState;
use crate::session_store::SessionStore;
use crate::types::{
    Coord, Direction, LevelResult, Phase, SessionEvent, SessionSummary, Snapshot, TrapCause,
};

mod enemy_system;
pub mod utils;

pub use self::enemy_system::{EnemyScheduler, LiveEnemy};
use self::utils::format_clock;

/// Why a move request did or did not change the player's position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The game is not started or no level is in play.
    Ignored,
    NotAStep,
    OutOfBounds,
    Wall,
    ExitLocked,
    Moved,
}

/// One player's run through the task pool.
///
/// Owns the session record, the live grid of the current level and the
/// enemy clock. Every mutation goes through these methods; the host feeds
/// input and elapsed time and renders from [`GameSession::build_snapshot`].
pub struct GameSession {
    options: SessionOptions,
    tasks: Vec<Task>,
    task_snapshot: Option<Vec<Value>>,
    rng: Rng,
    store: Box<dyn SessionStore>,
    state: SessionState,
    grid: Grid,
    phase: Phase,
    current_task: Option<usize>,
    scheduler: EnemyScheduler,
    tilt: TiltAccumulator,
    events: VecDeque<SessionEvent>,
    level_started_at_ms: Option<u64>,
    timer_stopped_at_ms: Option<u64>,
}

impl GameSession {
    /// Restores saved progress (or starts fresh) and sets up the first
    /// level. The session stays inactive until [`GameSession::start`].
    pub fn new(
        tasks: Vec<Task>,
        mut store: Box<dyn SessionStore>,
        rng: Rng,
        options: SessionOptions,
    ) -> Result<Self, LoadError> {
        if tasks.is_empty() {
            return Err(LoadError::Malformed("no playable task".to_string()));
        }

        let known_ids: BTreeSet<String> = tasks.iter().map(|task| task.id.clone()).collect();
        let state = match store.load() {
            Ok(Some(saved)) => {
                let state = SessionState::restored(&saved, &known_ids);
                info!(
                    completed = state.completed_task_ids.len(),
                    deaths = state.deaths,
                    current = ?state.current_task_id,
                    "restored saved session"
                );
                state
            }
            Ok(None) => {
                info!("no saved session, starting fresh");
                SessionState::fresh()
            }
            Err(error) => {
                warn!(%error, "discarding unreadable saved session");
                if let Err(error) = store.clear() {
                    warn!(%error, "failed to clear unreadable session");
                }
                SessionState::fresh()
            }
        };

        let task_snapshot = if options.persist_task_snapshot {
            Some(
                tasks
                    .iter()
                    .filter_map(|task| serde_json::to_value(task).ok())
                    .collect(),
            )
        } else {
            None
        };

        let mut session = Self {
            options,
            tasks,
            task_snapshot,
            rng,
            store,
            state,
            grid: Grid::default(),
            phase: Phase::Loading,
            current_task: None,
            scheduler: EnemyScheduler::new(options.enemy_tick_ms),
            tilt: TiltAccumulator::new(options.tilt_scale),
            events: VecDeque::new(),
            level_started_at_ms: None,
            timer_stopped_at_ms: None,
        };
        session.begin_first_level();
        Ok(session)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.current_task.and_then(|index| self.tasks.get(index))
    }

    pub fn help_text(&self) -> &str {
        self.current_task()
            .and_then(|task| task.help.as_deref())
            .unwrap_or(NO_HELP_TEXT)
    }

    /// The "Start Game" action: enables input, enemies and the clock.
    /// A finished session only reopens through `restart`.
    pub fn start(&mut self, now_ms: u64) {
        if self.state.is_game_active || !matches!(self.phase, Phase::Playing | Phase::Ready) {
            return;
        }
        self.state.is_game_active = true;
        self.state.is_timer_running = self.phase == Phase::Playing;
        self.state.start_time_ms = Some(now_ms);
        self.timer_stopped_at_ms = None;
        if self.phase == Phase::Playing && self.level_started_at_ms.is_none() {
            self.level_started_at_ms = Some(now_ms);
        }
        self.scheduler.reset();
        info!(task = ?self.state.current_task_id, "session started");
        self.save_session();
    }

    /// Clears all progress and the saved blob, then draws a new first task.
    /// The session is left inactive, waiting for `start`.
    pub fn restart(&mut self) {
        info!("restarting session");
        self.state = SessionState::fresh();
        self.events.clear();
        self.level_started_at_ms = None;
        self.timer_stopped_at_ms = None;
        if let Err(error) = self.store.clear() {
            warn!(%error, "failed to clear saved session");
        }
        self.load_next_level(None);
    }

    /// Leaves the level-complete pause: sets up the next task or ends the
    /// session when the cycle is exhausted.
    pub fn advance(&mut self, now_ms: u64) -> Phase {
        if self.phase == Phase::Won {
            self.load_next_level(Some(now_ms));
        }
        self.phase
    }

    pub fn move_dir(&mut self, dir: Direction, now_ms: u64) -> MoveOutcome {
        let (dx, dy) = dir.delta();
        self.attempt_move(dx, dy, now_ms)
    }

    pub fn handle_key(&mut self, key: &str, now_ms: u64) -> Option<MoveOutcome> {
        let dir = key_direction(key)?;
        Some(self.move_dir(dir, now_ms))
    }

    pub fn handle_click(&mut self, target: Coord, now_ms: u64) -> Option<MoveOutcome> {
        if !self.accepts_input() {
            return None;
        }
        let dir = click_direction(self.state.player_position, target)?;
        Some(self.move_dir(dir, now_ms))
    }

    pub fn handle_tilt(&mut self, beta: f64, gamma: f64, now_ms: u64) -> Vec<MoveOutcome> {
        if !self.accepts_input() {
            return Vec::new();
        }
        self.tilt
            .feed(beta, gamma)
            .into_iter()
            .map(|dir| self.move_dir(dir, now_ms))
            .collect()
    }

    /// Single orthogonal step. Blocked moves leave the state untouched.
    pub fn attempt_move(&mut self, dx: i32, dy: i32, now_ms: u64) -> MoveOutcome {
        if !self.accepts_input() {
            return MoveOutcome::Ignored;
        }
        if Direction::from_delta(dx, dy).is_none() {
            return MoveOutcome::NotAStep;
        }
        let target = self.state.player_position.offset(dx, dy);
        let Some(cell) = self.grid.get(target) else {
            return MoveOutcome::OutOfBounds;
        };
        if cell == CellKind::Wall {
            return MoveOutcome::Wall;
        }
        if cell == CellKind::Exit && !self.state.exit_unlocked {
            return MoveOutcome::ExitLocked;
        }

        self.state.player_position = target;
        self.push_event(SessionEvent::PlayerMoved {
            x: target.x,
            y: target.y,
        });

        match cell {
            CellKind::Collectible => {
                self.grid.set(target, CellKind::Empty);
                self.state.collectibles_collected += 1;
                self.state.total_collectibles += 1;
                self.push_event(SessionEvent::CollectiblePicked {
                    x: target.x,
                    y: target.y,
                });
            }
            CellKind::Key => {
                self.grid.set(target, CellKind::Empty);
                self.state.keys_collected = (self.state.keys_collected + 1).min(self.state.key_total);
                self.push_event(SessionEvent::KeyPicked {
                    x: target.x,
                    y: target.y,
                });
            }
            CellKind::Trap => self.trap(TrapCause::TrapCell),
            _ => {}
        }
        if self.state.enemy_at(self.state.player_position) {
            self.trap(TrapCause::Enemy);
        }

        self.save_session();
        self.check_win(now_ms);
        MoveOutcome::Moved
    }

    /// Sends the player back to the level start and counts a death.
    /// Items already picked up in this level stay picked up.
    pub fn trap(&mut self, cause: TrapCause) {
        self.state.player_position = self.state.player_start;
        self.state.deaths += 1;
        debug!(?cause, deaths = self.state.deaths, "player trapped");
        self.push_event(SessionEvent::PlayerTrapped {
            cause,
            deaths: self.state.deaths,
        });
        self.save_session();
    }

    pub fn is_won(&self) -> bool {
        self.state.keys_collected == self.state.key_total
            && self.state.player_position == self.state.exit_position
    }

    /// Opens the exit once every key is held and completes the level when
    /// the player stands on it.
    pub fn check_win(&mut self, now_ms: u64) -> bool {
        if self.state.refresh_exit_lock() {
            let exit = self.state.exit_position;
            self.push_event(SessionEvent::ExitOpened {
                x: exit.x,
                y: exit.y,
            });
        }
        let won = self.is_won();
        if won && self.phase == Phase::Playing {
            self.complete_level(now_ms);
        }
        won
    }

    /// Host-driven enemy clock. Enemies only move while a level is in play
    /// and the session is active. Returns the number of steps applied.
    pub fn tick(&mut self, delta_ms: u64) -> u32 {
        if !self.state.is_game_active
            || self.phase != Phase::Playing
            || self.state.live_enemies.is_empty()
        {
            self.scheduler.reset();
            return 0;
        }
        let steps = self.scheduler.due_steps(delta_ms);
        for _ in 0..steps {
            self.step_enemies();
        }
        steps
    }

    /// Advances every enemy by one path step, trapping the player on contact.
    pub fn step_enemies(&mut self) {
        for idx in 0..self.state.live_enemies.len() {
            self.state.live_enemies[idx].advance();
            if self.state.live_enemies[idx].position == self.state.player_position {
                self.trap(TrapCause::Enemy);
            }
        }
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        let Some(start) = self.state.start_time_ms else {
            return 0;
        };
        let end = if self.state.is_timer_running {
            now_ms
        } else {
            self.timer_stopped_at_ms.unwrap_or(now_ms)
        };
        end.saturating_sub(start)
    }

    pub fn summary(&self, now_ms: u64) -> SessionSummary {
        let total_time_ms = self.elapsed_ms(now_ms);
        SessionSummary {
            total_time_ms,
            clock: format_clock(total_time_ms),
            collectibles: self.state.total_collectibles,
            collectible_target: self.options.collectible_target,
            deaths: self.state.deaths,
            levels: self.state.level_results.clone(),
        }
    }

    /// `include_events` drains the pending event feed into the snapshot.
    pub fn build_snapshot(&mut self, now_ms: u64, include_events: bool) -> Snapshot {
        let events: Vec<SessionEvent> = if include_events {
            self.events.drain(..).collect()
        } else {
            self.events.iter().cloned().collect()
        };
        let task = self.current_task();
        let elapsed_ms = self.elapsed_ms(now_ms);
        Snapshot {
            phase: self.phase,
            active: self.state.is_game_active,
            task_id: task.map(|task| task.id.clone()),
            difficulty: task.and_then(|task| task.difficulty.clone()),
            help: self.help_text().to_string(),
            tiles: self.grid.to_rows(),
            player: self.state.player_position,
            exit: self.state.exit_position,
            exit_open: self.state.exit_unlocked,
            enemies: self
                .state
                .live_enemies
                .iter()
                .map(|enemy| enemy.position)
                .collect(),
            collectibles: self.state.collectibles_collected,
            collectible_total: self.state.collectible_total,
            keys: self.state.keys_collected,
            key_total: self.state.key_total,
            deaths: self.state.deaths,
            elapsed_ms,
            clock: format_clock(elapsed_ms),
            completed_tasks: self.state.completed_task_ids.len(),
            total_tasks: self.tasks.len(),
            last_level: self.state.level_results.last().cloned(),
            summary: (self.phase == Phase::SessionComplete).then(|| self.summary(now_ms)),
            events,
        }
    }

    fn accepts_input(&self) -> bool {
        self.state.is_game_active && self.phase == Phase::Playing
    }

    fn begin_first_level(&mut self) {
        let resume = self
            .state
            .current_task_id
            .clone()
            .and_then(|id| self.tasks.iter().position(|task| task.id == id));
        match resume {
            Some(index) => {
                let id = self.tasks[index].id.clone();
                info!(task = %id, "resuming saved task");
                self.state.completed_task_ids.insert(id);
                self.setup(index, None);
            }
            None => self.load_next_level(None),
        }
    }

    fn load_next_level(&mut self, now_ms: Option<u64>) {
        self.phase = Phase::Loading;
        let mut selected = self.select_next();
        if selected.is_none() && self.options.cycle_policy == CyclePolicy::LoopForever {
            info!("task cycle complete, starting a new cycle");
            self.state.completed_task_ids.clear();
            selected = self.select_next();
        }
        match selected {
            Some(index) => self.setup(index, now_ms),
            None => self.finish_session(now_ms),
        }
    }

    fn select_next(&mut self) -> Option<usize> {
        let id = match next_task(
            &self.tasks,
            &mut self.state.completed_task_ids,
            &mut self.rng,
        ) {
            Selection::Task(task) => task.id.clone(),
            Selection::Exhausted => return None,
        };
        self.tasks.iter().position(|task| task.id == id)
    }

    /// Instantiates a task into the live grid and resets per-level counters.
    /// Cumulative deaths carry over.
    fn setup(&mut self, index: usize, now_ms: Option<u64>) {
        let Some(task) = self.tasks.get(index) else {
            warn!(index, "task index out of range, skipping setup");
            return;
        };
        self.phase = Phase::Loading;

        let start = task.player_start();
        let exit = task.exit();
        let collectible_total = task.maze.count(CellKind::Collectible) as u32;
        let key_total = task.maze.count(CellKind::Key) as u32;
        let task_id = task.id.clone();
        let live_enemies: Vec<LiveEnemy> =
            task.enemies.iter().filter_map(LiveEnemy::from_def).collect();
        self.grid = task.maze.clone();

        self.state.player_start = start;
        self.state.player_position = start;
        self.state.exit_position = exit;
        self.state.collectible_total = collectible_total;
        self.state.key_total = key_total;
        self.state.collectibles_collected = 0;
        self.state.keys_collected = 0;
        self.state.exit_unlocked = false;
        self.state.refresh_exit_lock();
        self.state.live_enemies = live_enemies;
        self.state.current_task_id = Some(task_id.clone());
        self.state.is_timer_running = self.state.is_game_active;
        self.current_task = Some(index);
        self.level_started_at_ms = if self.state.is_game_active {
            now_ms
        } else {
            None
        };
        self.timer_stopped_at_ms = None;
        self.scheduler.reset();
        self.tilt.reset();

        self.phase = Phase::Ready;
        info!(
            task = %task_id,
            collectibles = collectible_total,
            keys = key_total,
            enemies = self.state.live_enemies.len(),
            "level ready"
        );
        self.push_event(SessionEvent::LevelStarted { task_id });
        self.phase = Phase::Playing;
        self.save_session();
    }

    fn complete_level(&mut self, now_ms: u64) {
        let elapsed_ms = self
            .level_started_at_ms
            .map(|started| now_ms.saturating_sub(started))
            .unwrap_or(0);
        let task = self.current_task();
        let result = LevelResult {
            task_id: task.map(|task| task.id.clone()).unwrap_or_default(),
            difficulty: task.and_then(|task| task.difficulty.clone()),
            elapsed_ms,
            collectibles: self.state.collectibles_collected,
            collectible_total: self.state.collectible_total,
            keys: self.state.keys_collected,
            key_total: self.state.key_total,
            deaths: self.state.deaths,
        };
        info!(task = %result.task_id, elapsed_ms, deaths = result.deaths, "level complete");
        self.push_event(SessionEvent::LevelWon {
            task_id: result.task_id.clone(),
            elapsed_ms,
        });
        self.state.level_results.push(result);
        self.state.current_task_id = None;
        self.state.is_timer_running = false;
        self.timer_stopped_at_ms = Some(now_ms);
        self.scheduler.reset();
        self.phase = Phase::Won;
        self.save_session();
    }

    /// The cycle is over: keep the summary in memory, drop the saved blob so
    /// the next launch starts a new cycle.
    fn finish_session(&mut self, now_ms: Option<u64>) {
        self.phase = Phase::SessionComplete;
        self.current_task = None;
        self.grid = Grid::default();
        self.state.current_task_id = None;
        self.state.live_enemies.clear();
        if self.state.is_timer_running {
            self.timer_stopped_at_ms = now_ms;
        }
        self.state.is_timer_running = false;
        self.state.is_game_active = false;
        self.scheduler.reset();
        info!(
            deaths = self.state.deaths,
            collectibles = self.state.total_collectibles,
            levels = self.state.level_results.len(),
            "session complete"
        );
        self.push_event(SessionEvent::SessionComplete);
        if let Err(error) = self.store.clear() {
            warn!(%error, "failed to clear finished session");
        }
    }

    /// Best effort: a failed save is logged and play continues.
    fn save_session(&mut self) {
        let mut saved = self.state.to_persisted();
        saved.tasks = self.task_snapshot.clone();
        if let Err(error) = self.store.save(&saved) {
            warn!(%error, "failed to save session");
        }
    }

    fn push_event(&mut self, event: SessionEvent) {
        if self.events.len() >= MAX_PENDING_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}
