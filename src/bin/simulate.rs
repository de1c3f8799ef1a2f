use clap::Parser;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use tilt_maze::config::{CyclePolicy, SessionOptions};
use tilt_maze::constants::ENEMY_TICK_MS;
use tilt_maze::engine::utils::now_ms;
use tilt_maze::engine::{GameSession, MoveOutcome};
use tilt_maze::maze::{CellKind, Grid, Task};
use tilt_maze::rng::Rng;
use tilt_maze::session_store::MemorySessionStore;
use tilt_maze::task_repository::load_catalog;
use tilt_maze::types::{Coord, Direction, Phase};

/// Simulated time between two autopilot moves.
const MOVE_INTERVAL_MS: u64 = ENEMY_TICK_MS / 2;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, default_value = "data/tasks.json")]
    tasks: PathBuf,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 1)]
    runs: u32,
    #[arg(long, default_value_t = 2_000)]
    max_steps: u32,
    /// Play two full cycles per run instead of stopping after one.
    #[arg(long)]
    loop_forever: bool,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum LevelOutcome {
    Won,
    Stalled,
}

#[derive(Clone, Debug, Serialize)]
struct LevelResultLine {
    run: u32,
    seed: u32,
    task: String,
    outcome: LevelOutcome,
    steps: u32,
    deaths: u32,
    keys: u32,
    #[serde(rename = "keyTotal")]
    key_total: u32,
    collectibles: u32,
    #[serde(rename = "collectibleTotal")]
    collectible_total: u32,
    #[serde(rename = "elapsedMs")]
    elapsed_ms: u64,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    task: String,
    step: u32,
    message: String,
}

#[derive(Clone, Debug)]
struct RunOutcome {
    levels: Vec<LevelResultLine>,
    anomaly_records: Vec<AnomalyRecord>,
    session_complete: bool,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "runCount")]
    run_count: u32,
    #[serde(rename = "levelCount")]
    level_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageSteps")]
    average_steps: u32,
    #[serde(rename = "outcomeCounts")]
    outcome_counts: BTreeMap<String, usize>,
    levels: Vec<LevelResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<String>,
    details: Value,
}

fn main() {
    let cli = Cli::parse();
    let run_started_at_ms = now_ms();
    let base_seed = normalize_seed(cli.seed.unwrap_or(run_started_at_ms));
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(base_seed, run_started_at_ms));

    let catalog = match load_catalog(&cli.tasks) {
        Ok(catalog) => catalog,
        Err(error) => {
            emit_log(
                "error",
                "tasks_load_failed",
                &run_id,
                None,
                None,
                None,
                json!({
                    "path": cli.tasks.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
    };

    let mut has_anomaly = false;
    let mut total_anomalies = 0usize;
    for rejected in &catalog.rejected {
        emit_log(
            "warn",
            "task_rejected",
            &run_id,
            None,
            None,
            None,
            json!({ "error": rejected.to_string() }),
        );
        has_anomaly = true;
        total_anomalies += 1;
    }

    let options = SessionOptions {
        cycle_policy: if cli.loop_forever {
            CyclePolicy::LoopForever
        } else {
            CyclePolicy::EndSession
        },
        persist_task_snapshot: false,
        ..SessionOptions::default()
    };
    let level_budget = catalog.tasks.len() * if cli.loop_forever { 2 } else { 1 };

    let mut level_results = Vec::new();
    let mut outcome_counts: BTreeMap<String, usize> = BTreeMap::new();
    for run in 0..cli.runs.max(1) {
        let seed = normalize_seed(base_seed as u64 + run as u64);
        emit_log(
            "info",
            "run_started",
            &run_id,
            Some(run),
            Some(seed),
            None,
            json!({
                "tasks": catalog.tasks.len(),
                "loopForever": cli.loop_forever,
            }),
        );

        let outcome = match run_session(
            catalog.tasks.clone(),
            run,
            seed,
            options,
            cli.max_steps,
            level_budget,
        ) {
            Ok(outcome) => outcome,
            Err(message) => {
                emit_log(
                    "error",
                    "session_failed",
                    &run_id,
                    Some(run),
                    Some(seed),
                    None,
                    json!({ "error": message }),
                );
                std::process::exit(2);
            }
        };

        for anomaly in &outcome.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &run_id,
                Some(run),
                Some(seed),
                Some(&anomaly.task),
                json!({
                    "step": anomaly.step,
                    "message": anomaly.message,
                }),
            );
        }
        if !outcome.anomaly_records.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += outcome.anomaly_records.len();

        for level in &outcome.levels {
            *outcome_counts
                .entry(outcome_key(level.outcome))
                .or_insert(0) += 1;
            match serde_json::to_string(level) {
                Ok(line) => println!("{line}"),
                Err(error) => emit_log(
                    "error",
                    "result_serialize_failed",
                    &run_id,
                    Some(run),
                    Some(seed),
                    Some(&level.task),
                    json!({ "error": error.to_string() }),
                ),
            }
        }

        emit_log(
            "info",
            "run_finished",
            &run_id,
            Some(run),
            Some(seed),
            None,
            json!({
                "levels": outcome.levels.len(),
                "sessionComplete": outcome.session_complete,
                "anomalyCount": outcome.anomaly_records.len(),
            }),
        );
        level_results.extend(outcome.levels);
    }

    let summary = build_run_summary(
        run_id.clone(),
        run_started_at_ms,
        now_ms(),
        cli.runs.max(1),
        level_results,
        outcome_counts,
        total_anomalies,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &run_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "simulation_finished",
        &run_id,
        None,
        None,
        None,
        json!({
            "runCount": summary.run_count,
            "levelCount": summary.level_count,
            "anomalyCount": summary.anomaly_count,
            "averageSteps": summary.average_steps,
            "outcomeCounts": summary.outcome_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

/// Plays one session until the cycle ends, the level budget is spent, or a
/// level stalls.
fn run_session(
    tasks: Vec<Task>,
    run: u32,
    seed: u32,
    options: SessionOptions,
    max_steps: u32,
    level_budget: usize,
) -> Result<RunOutcome, String> {
    let mut session = GameSession::new(
        tasks,
        Box::new(MemorySessionStore::new()),
        Rng::new(seed),
        options,
    )
    .map_err(|error| error.to_string())?;

    let mut clock_ms = 0u64;
    session.start(clock_ms);

    let mut levels = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();

    while session.phase() == Phase::Playing && levels.len() < level_budget {
        let task = session
            .current_task()
            .map(|task| task.id.clone())
            .unwrap_or_default();
        let deaths_before = session.state().deaths;
        let started_at_ms = clock_ms;
        let mut steps = 0u32;
        let mut anomalies = Vec::new();

        while session.phase() == Phase::Playing {
            if steps >= max_steps {
                push_anomaly(
                    &mut anomalies,
                    &mut anomaly_records,
                    &mut anomaly_seen,
                    &task,
                    steps,
                    format!("step limit exceeded: {max_steps}"),
                );
                break;
            }
            let Some(dir) = autopilot_step(&session) else {
                push_anomaly(
                    &mut anomalies,
                    &mut anomaly_records,
                    &mut anomaly_seen,
                    &task,
                    steps,
                    "unsolvable maze: no path to the next key or the exit".to_string(),
                );
                break;
            };
            clock_ms += MOVE_INTERVAL_MS;
            let outcome = session.move_dir(dir, clock_ms);
            steps += 1;
            if outcome != MoveOutcome::Moved {
                push_anomaly(
                    &mut anomalies,
                    &mut anomaly_records,
                    &mut anomaly_seen,
                    &task,
                    steps,
                    format!("planned move rejected: {outcome:?}"),
                );
                break;
            }
            session.tick(MOVE_INTERVAL_MS);
        }

        let state = session.state();
        let won = session.phase() == Phase::Won;
        levels.push(LevelResultLine {
            run,
            seed,
            task,
            outcome: if won {
                LevelOutcome::Won
            } else {
                LevelOutcome::Stalled
            },
            steps,
            deaths: state.deaths - deaths_before,
            keys: state.keys_collected,
            key_total: state.key_total,
            collectibles: state.collectibles_collected,
            collectible_total: state.collectible_total,
            elapsed_ms: clock_ms - started_at_ms,
            anomalies,
        });
        if !won {
            break;
        }
        clock_ms += MOVE_INTERVAL_MS;
        session.advance(clock_ms);
    }

    Ok(RunOutcome {
        levels,
        anomaly_records,
        session_complete: session.phase() == Phase::SessionComplete,
    })
}

/// Next step towards the nearest remaining key, or the exit once every key
/// is held.
fn autopilot_step(session: &GameSession) -> Option<Direction> {
    let grid = session.grid();
    let state = session.state();
    let keys = grid.positions_of(CellKind::Key);
    let targets = if keys.is_empty() {
        vec![state.exit_position]
    } else {
        keys
    };
    first_step_towards(grid, state.player_position, &targets, state.exit_unlocked)
}

fn first_step_towards(
    grid: &Grid,
    from: Coord,
    targets: &[Coord],
    exit_open: bool,
) -> Option<Direction> {
    const DIRECTIONS: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    let mut visited = HashSet::from([from]);
    let mut queue: VecDeque<(Coord, Option<Direction>)> = VecDeque::from([(from, None)]);
    while let Some((at, first)) = queue.pop_front() {
        if first.is_some() && targets.contains(&at) {
            return first;
        }
        for dir in DIRECTIONS {
            let (dx, dy) = dir.delta();
            let next = at.offset(dx, dy);
            let passable = match grid.get(next) {
                None | Some(CellKind::Wall) | Some(CellKind::Trap) => false,
                Some(CellKind::Exit) => exit_open,
                Some(_) => true,
            };
            if passable && visited.insert(next) {
                queue.push_back((next, first.or(Some(dir))));
            }
        }
    }
    None
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    task: &str,
    step: u32,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        task: task.to_string(),
        step,
        message: message.clone(),
    });
    if anomaly_seen.insert(format!("{task}:{message}")) {
        anomalies.push(message);
    }
}

fn default_run_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    run_count: u32,
    levels: Vec<LevelResultLine>,
    outcome_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
) -> RunSummary {
    let level_count = levels.len();
    let total_steps: u64 = levels.iter().map(|level| level.steps as u64).sum();
    let average_steps = if level_count == 0 {
        0
    } else {
        (total_steps / level_count as u64) as u32
    };
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        run_count,
        level_count,
        anomaly_count,
        average_steps,
        outcome_counts,
        levels,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    run_id: &str,
    run: Option<u32>,
    seed: Option<u32>,
    task: Option<&str>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        run_id: run_id.to_string(),
        run,
        seed,
        task: task.map(|value| value.to_string()),
        details,
    };
    match serde_json::to_string(&log_line) {
        Ok(line) => eprintln!("{line}"),
        Err(error) => eprintln!("{{\"level\":\"error\",\"event\":\"log_serialize_failed\",\"error\":\"{error}\"}}"),
    }
}

fn outcome_key(outcome: LevelOutcome) -> String {
    match outcome {
        LevelOutcome::Won => "won",
        LevelOutcome::Stalled => "stalled",
    }
    .to_string()
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}
