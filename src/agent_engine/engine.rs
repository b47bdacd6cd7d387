use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::history::{JournalEntry, TaskJournal};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{StepRecord, TaskOutcome, TaskState};
use crate::agent_engine::tools::ToolRunner;
use crate::artifacts::{record_image, ArtifactSink, NullSink};
use crate::config::{ExecutorConfig, OracleRole};
use crate::errors::{PilotError, PilotResult};
use crate::oracle::{ExecutionOracle, PlanningOracle};
use crate::session::SessionManager;

/// Planner reply that ends the loop.
pub const COMPLETE: &str = "complete";

/// Bounded perceive-act loop over one live session.
pub struct TaskExecutor {
    session: Arc<SessionManager>,
    planner: Arc<dyn PlanningOracle>,
    executor: Arc<dyn ExecutionOracle>,
    tools: Arc<dyn ToolRunner>,
    sink: Arc<dyn ArtifactSink>,
    journal_dir: Option<PathBuf>,
    max_turns: u32,
    settle: Duration,
}

impl TaskExecutor {
    pub fn new(
        session: Arc<SessionManager>,
        planner: Arc<dyn PlanningOracle>,
        executor: Arc<dyn ExecutionOracle>,
        tools: Arc<dyn ToolRunner>,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            session,
            planner,
            executor,
            tools,
            sink: Arc::new(NullSink),
            journal_dir: None,
            max_turns: config.max_turns.max(1),
            settle: config.settle(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Write a JSONL journal per task into `dir`.
    pub fn with_journal_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.journal_dir = Some(dir.into());
        self
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Drive `goal` until the planner replies `complete` or the turn budget
    /// runs out (`PilotError::TaskIncomplete`).
    pub async fn run(&self, goal: &str) -> PilotResult<TaskOutcome> {
        let mut journal = match &self.journal_dir {
            Some(dir) => TaskJournal::in_dir(dir),
            None => TaskJournal::in_memory(),
        };
        journal.record(JournalEntry::new("goal", 0, goal));

        let mut loop_ctrl = LoopController::new(self.max_turns);
        let mut state = TaskState::Planning { turn: 0 };
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut planning_calls = 0u32;
        // Frame the planner saw; the execution oracle acts on the same one.
        let mut frame = self.session.cached_frame();

        tracing::info!(task = %journal.task_id, goal, max_turns = self.max_turns, "task started");

        loop {
            tracing::debug!(?state, "task state");
            match state {
                // ── Planning: capture + ask for the next step ─────────────
                TaskState::Planning { turn } => {
                    frame = self.session.capture_frame().await?;
                    let artifact = record_image(self.sink.as_ref(), &frame, "planning-frame").await;

                    let reply = self.planner.next_step(&frame, goal).await?;
                    planning_calls += 1;
                    journal.record(
                        JournalEntry::new(OracleRole::Planner.as_str(), turn, reply.clone())
                            .with_artifact(artifact.map(|f| f.location)),
                    );

                    if is_complete(&reply) {
                        tracing::info!(turn, "planner reported completion");
                        state = TaskState::Complete { turns: turn };
                    } else {
                        let instruction = reply.trim().to_string();
                        tracing::info!(turn, instruction = %instruction, "Planning → Acting");
                        state = TaskState::Acting { turn, instruction };
                    }
                }

                // ── Acting: execution oracle performs the step ────────────
                TaskState::Acting { turn, instruction } => {
                    let report = self
                        .executor
                        .perform(&frame, &instruction, self.tools.as_ref())
                        .await?;
                    tracing::info!(turn, report = %report, "step performed");
                    journal.record(JournalEntry::new(OracleRole::Executor.as_str(), turn, report.clone()));
                    steps.push(StepRecord {
                        turn,
                        instruction,
                        report,
                        timestamp: chrono::Utc::now(),
                    });

                    tokio::time::sleep(self.settle).await;
                    loop_ctrl.record_turn();

                    state = if loop_ctrl.should_stop() {
                        TaskState::Exhausted { turns: loop_ctrl.turn() }
                    } else {
                        TaskState::Planning { turn: loop_ctrl.turn() }
                    };
                }

                TaskState::Complete { turns } => {
                    journal.record(JournalEntry::new("outcome", turns, "complete"));
                    tracing::info!(
                        task = %journal.task_id,
                        planning_calls,
                        elapsed_ms = loop_ctrl.elapsed().as_millis() as u64,
                        "task complete"
                    );
                    return Ok(TaskOutcome {
                        goal: goal.to_string(),
                        planning_calls,
                        steps,
                    });
                }

                TaskState::Exhausted { turns } => {
                    journal.record(JournalEntry::new("outcome", turns, "exhausted"));
                    tracing::warn!(task = %journal.task_id, turns, "turn budget exhausted");
                    return Err(PilotError::TaskIncomplete {
                        goal: goal.to_string(),
                        turns,
                    });
                }
            }
        }
    }
}

/// Trim, lowercase, then strip trailing periods and surrounding quotes
/// until stable.
pub fn normalize_step(reply: &str) -> String {
    let mut s = reply.trim().to_lowercase();
    loop {
        let stripped = s
            .trim()
            .trim_end_matches('.')
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'')
            .to_string();
        if stripped == s {
            return s;
        }
        s = stripped;
    }
}

pub fn is_complete(reply: &str) -> bool {
    normalize_step(reply) == COMPLETE
}
