use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use serve_executor::{ExecutorClient, ExecutorConfig, RuntimeState};
use serve_ledger::{AppendLog, DedupeMap, Normalizer, TransportHeaders};
use serve_notify::{always_emit, decide, GatingDecision, Notifier};
use serve_types::{
    methods, now_millis, EventSource, IdGenerator, Notification, OutcomeRecord, OutcomeStatus,
    Thread, Turn, TurnState,
};
use tokio::sync::mpsc::Receiver;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::DispatcherConfig;
use crate::decision::{Decision, DecisionRecord};
use crate::error::DispatcherError;
use crate::lane::{LaneMap, QueuedItem};
use crate::status::{RunState, StatusSnapshot};
use crate::turns::TurnTable;

/// What `accept` did with an incoming envelope, returned to the ingress
/// handler for its HTTP response. Ingress always returns `202` once the
/// envelope is durably logged, regardless of what happened downstream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AcceptOutcome {
    Forwarded,
    Duplicate,
    LaneFull,
    NormalizeFailed,
}

/// Central coordinator: owns every session lane, the turn table, the
/// durable logs, and the single executor client.
pub struct Dispatcher {
    config: DispatcherConfig,
    normalizer: Normalizer,
    dedupe: DedupeMap,
    lanes: LaneMap,
    turns: TurnTable,
    threads: Mutex<HashMap<String, Thread>>,
    thread_ids: IdGenerator,
    rejected_ids: IdGenerator,
    notifier: Notifier,
    executor: ExecutorClient,
    global: Semaphore,
    events_log: AppendLog,
    decisions_log: AppendLog,
    actions_log: AppendLog,
    activity_log: AppendLog,
    paused: AtomicBool,
    started_at: i64,
}

impl Dispatcher {
    pub async fn new(
        config: DispatcherConfig,
        state_dir: &Path,
        executor_config: ExecutorConfig,
    ) -> Result<Arc<Self>, DispatcherError> {
        let dedupe = DedupeMap::new(config.processed_keys_cap, state_dir.join("state.json"));
        dedupe.load().await?;

        let events_log = AppendLog::open(state_dir.join("events.ndjson")).await?;
        let decisions_log = AppendLog::open(state_dir.join("decisions.ndjson")).await?;
        let actions_log = AppendLog::open(state_dir.join("actions.ndjson")).await?;
        let activity_log = AppendLog::open(state_dir.join("activity-ledger.ndjson")).await?;

        let started_at = now_millis();
        let mut threads = HashMap::new();
        threads.insert("main".to_string(), Thread::main(started_at));

        let dispatcher = Arc::new(Self {
            global: Semaphore::new(config.global_concurrency),
            lanes: LaneMap::new(config.lane_queue_cap),
            turns: TurnTable::new(),
            threads: Mutex::new(threads),
            thread_ids: IdGenerator::new("thread"),
            rejected_ids: IdGenerator::new("rejected"),
            notifier: Notifier::new(serve_notify::DEFAULT_SUBSCRIBER_BUFFER),
            executor: ExecutorClient::new(executor_config),
            normalizer: Normalizer::new(),
            dedupe,
            events_log,
            decisions_log,
            actions_log,
            activity_log,
            paused: AtomicBool::new(false),
            started_at,
            config,
        });
        Ok(dispatcher)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        info!("dispatcher paused");
    }

    /// Clears the pause flag and re-kicks any lane left with queued work
    /// but no running worker, covering the race where the last item in a
    /// lane drained (and its worker exited) while paused.
    pub fn resume(self: &Arc<Self>) {
        self.paused.store(false, Ordering::Release);
        info!("dispatcher resumed");
        for session_key in self.lanes.session_keys() {
            if let Some(lane) = self.lanes.get(&session_key) {
                if lane.queue_len() > 0 {
                    let dispatcher = self.clone();
                    let key = session_key.clone();
                    tokio::spawn(async move { dispatcher.run_lane(key).await });
                }
            }
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: if self.is_paused() { RunState::Paused } else { RunState::Running },
            events_processed: self.dedupe.events_processed(),
            last_event_at: self.dedupe.last_event_at(),
            active_lanes: self.lanes.lane_count(),
            uptime_ms: now_millis().saturating_sub(self.started_at),
        }
    }

    pub fn persist_dedupe(&self) -> impl std::future::Future<Output = Result<(), DispatcherError>> + '_ {
        async move { Ok(self.dedupe.persist().await?) }
    }

    /// Bounded tail of one of the durable NDJSON logs, for `holon/logStream`.
    /// Returns `None` for an unrecognized log name.
    pub async fn log_tail(
        &self,
        log: &str,
        limit: usize,
    ) -> Result<Option<Vec<serde_json::Value>>, DispatcherError> {
        let log = match log {
            "events" => &self.events_log,
            "decisions" => &self.decisions_log,
            "actions" => &self.actions_log,
            "activity" => &self.activity_log,
            _ => return Ok(None),
        };
        Ok(Some(log.tail(limit).await?))
    }

    pub fn start_thread(&self, requested_session_key: Option<String>) -> Thread {
        let id = self.thread_ids.next();
        let session_key = requested_session_key.unwrap_or_else(|| id.clone());
        let thread = Thread::new(id.clone(), session_key, now_millis());
        self.threads
            .lock()
            .expect("thread table mutex poisoned")
            .insert(id, thread.clone());
        self.notifier.broadcast(Notification::new(
            methods::THREAD_STARTED,
            json!({"thread_id": thread.id, "session_id": thread.session_key, "started_at": thread.started_at}),
        ));
        thread
    }

    pub fn get_thread(&self, thread_id: &str) -> Option<Thread> {
        self.threads
            .lock()
            .expect("thread table mutex poisoned")
            .get(thread_id)
            .cloned()
    }

    pub fn get_turn(&self, turn_id: &str) -> Option<Turn> {
        self.turns.get(turn_id)
    }

    /// Ingests a raw payload from a webhook/timer source. Always durably
    /// logs before returning, and never blocks on lane capacity: a full
    /// lane records `skipped(lane_full)` instead of rejecting the caller.
    pub async fn accept(
        self: &Arc<Self>,
        source: EventSource,
        payload: serde_json::Value,
        headers: TransportHeaders,
    ) -> Result<AcceptOutcome, DispatcherError> {
        let envelope = match self.normalizer.normalize(source, payload, headers) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "failed to normalize inbound payload");
                let event_id = self.rejected_ids.next();
                self.log_raw_decision(
                    &event_id,
                    "unknown",
                    "unknown",
                    Decision::SkippedNormalizeFailed,
                    "normalize_failed",
                )
                .await?;
                return Ok(AcceptOutcome::NormalizeFailed);
            }
        };

        self.events_log.append(&envelope).await?;

        let duplicate = self
            .dedupe
            .check_and_insert(&envelope.dedupe_key, envelope.received_at, &envelope.id);
        if duplicate {
            self.log_decision(&envelope, Decision::SkippedDuplicate, "dedupe key already seen")
                .await?;
            return Ok(AcceptOutcome::Duplicate);
        }

        let session_key = envelope.session_key();
        let outcome = self
            .enqueue_envelope(session_key, envelope.clone(), None)
            .await?;
        Ok(outcome)
    }

    /// `turn/start`: rejects synchronously with `SessionFull` before any
    /// envelope/log entry exists if the lane is already at capacity (the
    /// asymmetry with `accept`'s lane-full handling is intentional: RPC
    /// callers get a synchronous error, webhook callers get a recorded
    /// skip).
    pub async fn start_turn(
        self: &Arc<Self>,
        thread_id: &str,
        input: serde_json::Value,
    ) -> Result<Turn, DispatcherError> {
        let thread = self
            .get_thread(thread_id)
            .ok_or_else(|| DispatcherError::ThreadNotFound(thread_id.to_string()))?;
        let lane = self.lanes.get_or_create(&thread.session_key);
        if lane.queue_len() >= self.config.lane_queue_cap {
            return Err(DispatcherError::SessionFull(thread.session_key));
        }

        let envelope = self.normalizer.normalize(
            EventSource::Rpc,
            json!({"thread_id": thread.id, "input": input}),
            TransportHeaders::default(),
        )?;
        self.events_log.append(&envelope).await?;

        let turn = self.turns.create(&thread.id, &envelope.id);
        self.enqueue_envelope(thread.session_key, envelope, Some(turn.turn_id.clone()))
            .await?;
        Ok(turn)
    }

    /// `turn/steer`: appends additional input to a turn that is still
    /// queued or active, without creating a new turn id.
    pub async fn steer_turn(
        self: &Arc<Self>,
        turn_id: &str,
        input: serde_json::Value,
    ) -> Result<Turn, DispatcherError> {
        let turn = self
            .turns
            .get(turn_id)
            .ok_or_else(|| DispatcherError::TurnNotFound(turn_id.to_string()))?;
        if turn.state.is_terminal() {
            return Err(DispatcherError::TurnTerminal(turn_id.to_string()));
        }
        let thread = self
            .get_thread(&turn.thread_id)
            .ok_or_else(|| DispatcherError::ThreadNotFound(turn.thread_id.clone()))?;

        let envelope = self.normalizer.normalize(
            EventSource::Rpc,
            json!({"thread_id": thread.id, "turn_id": turn_id, "input": input, "steer": true}),
            TransportHeaders::default(),
        )?;
        self.events_log.append(&envelope).await?;
        self.enqueue_envelope(thread.session_key, envelope, Some(turn_id.to_string()))
            .await?;
        Ok(turn)
    }

    /// `turn/interrupt`: if the turn never left the lane queue it is
    /// finalized immediately with no executor round-trip; if already
    /// active, the lane epoch is bumped and cancellation is requested
    /// best-effort.
    pub async fn interrupt_turn(
        self: &Arc<Self>,
        turn_id: &str,
        reason: &str,
    ) -> Result<Turn, DispatcherError> {
        let turn = self
            .turns
            .get(turn_id)
            .ok_or_else(|| DispatcherError::TurnNotFound(turn_id.to_string()))?;
        if turn.state.is_terminal() {
            return Err(DispatcherError::TurnTerminal(turn_id.to_string()));
        }
        let thread = self
            .get_thread(&turn.thread_id)
            .ok_or_else(|| DispatcherError::ThreadNotFound(turn.thread_id.clone()))?;
        let lane = self.lanes.get_or_create(&thread.session_key);

        if let Some(item) = lane.remove_queued_turn(turn_id) {
            let event_id = item.envelope.id.clone();
            return self.finalize_interrupted(turn_id, &event_id, reason).await;
        }

        lane.bump_epoch();
        let updated = self.turns.transition(turn_id, TurnState::CancelRequested)?;
        if let Some(event_id) = self.turns.event_id_for(turn_id) {
            if let Err(err) = self.executor.cancel(&event_id).await {
                warn!(turn_id, error = %err, "best-effort executor cancel failed");
            }
        }
        Ok(updated)
    }

    async fn finalize_interrupted(
        &self,
        turn_id: &str,
        event_id: &str,
        reason: &str,
    ) -> Result<Turn, DispatcherError> {
        let turn = self.turns.transition(turn_id, TurnState::Interrupted)?;
        let outcome = OutcomeRecord {
            event_id: event_id.to_string(),
            status: OutcomeStatus::Interrupted,
            has_action: false,
            action_refs: vec![],
            message: reason.to_string(),
            completed_at: now_millis(),
        };
        self.actions_log.append(&outcome).await?;
        self.notifier.broadcast(Notification::new(
            methods::TURN_INTERRUPTED,
            json!({"turn_id": turn_id, "reason": reason}),
        ));
        Ok(turn)
    }

    async fn enqueue_envelope(
        self: &Arc<Self>,
        session_key: String,
        envelope: serve_types::Envelope,
        turn_id: Option<String>,
    ) -> Result<AcceptOutcome, DispatcherError> {
        let lane = self.lanes.get_or_create(&session_key);
        let item = QueuedItem {
            envelope: envelope.clone(),
            turn_id,
            enqueued_epoch: 0,
        };
        match lane.enqueue(item) {
            Ok(spawn) => {
                if spawn {
                    let dispatcher = self.clone();
                    tokio::spawn(async move { dispatcher.run_lane(session_key).await });
                }
                Ok(AcceptOutcome::Forwarded)
            }
            Err(_) => {
                self.log_decision(&envelope, Decision::SkippedLaneFull, "lane at capacity")
                    .await?;
                Ok(AcceptOutcome::LaneFull)
            }
        }
    }

    async fn log_decision(
        &self,
        envelope: &serve_types::Envelope,
        decision: Decision,
        reason: &str,
    ) -> Result<(), DispatcherError> {
        self.log_raw_decision(&envelope.id, &envelope.dedupe_key, &envelope.session_key(), decision, reason)
            .await
    }

    async fn log_raw_decision(
        &self,
        event_id: &str,
        dedupe_key: &str,
        session_key: &str,
        decision: Decision,
        reason: &str,
    ) -> Result<(), DispatcherError> {
        self.decisions_log
            .append(&DecisionRecord {
                event_id: event_id.to_string(),
                dedupe_key: dedupe_key.to_string(),
                session_key: session_key.to_string(),
                decision,
                reason: reason.to_string(),
                at: now_millis(),
            })
            .await?;
        Ok(())
    }

    /// Drains a single lane until empty, running at most one item at a
    /// time, bounded globally by `self.global`. While paused, non-RPC
    /// items are skipped rather than forwarded to the executor; RPC-driven
    /// turns are still processed so `turn/start` keeps working during a
    /// pause.
    async fn run_lane(self: Arc<Self>, session_key: String) {
        let Some(lane) = self.lanes.get(&session_key) else { return };
        loop {
            let Some(item) = lane.dequeue() else { return };

            if lane.is_stale(item.enqueued_epoch) {
                self.finalize_skipped(item, Decision::SkippedEpochStale, "lane epoch advanced")
                    .await;
                continue;
            }

            if self.is_paused() && item.envelope.source != EventSource::Rpc {
                self.finalize_skipped(item, Decision::SkippedPaused, "dispatcher paused")
                    .await;
                continue;
            }

            if let Err(err) = self.log_decision(&item.envelope, Decision::Forwarded, "dequeued for execution").await {
                error!(event_id = %item.envelope.id, error = %err, "failed to log forwarded decision");
            }

            let permit = match self.global.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            self.execute_item(&session_key, item).await;
            drop(permit);
        }
    }

    /// Finalizes an item pulled from a lane but never forwarded to the
    /// executor: a decision record plus an `OutcomeRecord` with
    /// `status: skipped`, so every dequeued envelope still gets exactly
    /// one outcome. If it belongs to a turn, the turn moves to
    /// `interrupted` rather than being left active forever.
    async fn finalize_skipped(&self, item: QueuedItem, decision: Decision, reason: &str) {
        let QueuedItem { envelope, turn_id, .. } = item;
        if let Err(err) = self.log_decision(&envelope, decision, reason).await {
            error!(event_id = %envelope.id, error = %err, "failed to log skip decision");
        }
        if let Some(turn_id) = &turn_id {
            if let Err(err) = self.turns.transition(turn_id, TurnState::Interrupted) {
                warn!(turn_id, error = %err, "turn transition on skip failed");
            }
            self.notifier.broadcast(Notification::new(
                methods::TURN_INTERRUPTED,
                json!({"turn_id": turn_id, "reason": reason}),
            ));
        }
        self.record_outcome(&envelope, &turn_id, OutcomeStatus::Skipped, false, vec![], reason.to_string())
            .await;
    }

    async fn execute_item(&self, session_key: &str, item: QueuedItem) {
        let envelope = item.envelope;
        let turn_id = item.turn_id;

        if let Some(turn_id) = &turn_id {
            if let Err(err) = self.turns.transition(turn_id, TurnState::Active) {
                warn!(turn_id, error = %err, "turn already terminal before dispatch");
                return;
            }
            self.notifier.broadcast(Notification::new(
                methods::TURN_STARTED,
                json!({"turn_id": turn_id}),
            ));
        }

        let mut ticks = match self.executor.forward(&envelope, session_key).await {
            Ok(ticks) => ticks,
            Err(err) => {
                error!(event_id = %envelope.id, error = %err, "executor forward failed");
                self.record_outcome(&envelope, &turn_id, OutcomeStatus::Failed, false, vec![], err.to_string())
                    .await;
                return;
            }
        };

        self.drain_ticks(&envelope, &turn_id, &mut ticks).await;
    }

    async fn drain_ticks(
        &self,
        envelope: &serve_types::Envelope,
        turn_id: &Option<String>,
        ticks: &mut Receiver<serve_executor::StatusTick>,
    ) {
        while let Some(tick) = ticks.recv().await {
            if let Some(turn_id) = turn_id {
                self.turns.record_progress(turn_id, &tick.text, &tick.output);
                self.notifier.broadcast(Notification::new(
                    methods::TURN_PROGRESS,
                    json!({"turn_id": turn_id, "text": tick.text, "elapsed_ms": tick.elapsed_ms}),
                ));
            }

            if tick.state.is_terminal() {
                let status = match tick.state {
                    RuntimeState::Completed => OutcomeStatus::Ok,
                    RuntimeState::Interrupted => OutcomeStatus::Interrupted,
                    _ => OutcomeStatus::Failed,
                };
                if let Some(turn_id) = turn_id {
                    let next = match status {
                        OutcomeStatus::Ok => TurnState::Completed,
                        OutcomeStatus::Interrupted => TurnState::Interrupted,
                        _ => TurnState::Failed,
                    };
                    if let Err(err) = self.turns.transition(turn_id, next) {
                        warn!(turn_id, error = %err, "turn transition at terminal tick failed");
                    }
                    let method = match status {
                        OutcomeStatus::Ok => methods::TURN_COMPLETED,
                        OutcomeStatus::Interrupted => methods::TURN_INTERRUPTED,
                        _ => methods::TURN_FAILED,
                    };
                    self.notifier.broadcast(Notification::new(
                        method,
                        json!({"turn_id": turn_id, "error": tick.error}),
                    ));
                }

                let message = if status == OutcomeStatus::Interrupted
                    && !self.config.preserve_partial_output_on_interrupt
                {
                    String::new()
                } else {
                    tick.output.clone()
                };
                self.record_outcome(envelope, turn_id, status, tick.has_action, tick.action_refs, message)
                    .await;
                return;
            }
        }
    }

    async fn record_outcome(
        &self,
        envelope: &serve_types::Envelope,
        turn_id: &Option<String>,
        status: OutcomeStatus,
        has_action: bool,
        action_refs: Vec<String>,
        message: String,
    ) {
        let outcome = OutcomeRecord {
            event_id: envelope.id.clone(),
            status,
            has_action,
            action_refs,
            message,
            completed_at: now_millis(),
        };
        if let Err(err) = self.actions_log.append(&outcome).await {
            error!(event_id = %envelope.id, error = %err, "failed to append action outcome");
        }

        let type_is_always_emit = always_emit(&envelope.kind, &self.config.always_emit_event_types);
        match decide(&outcome, type_is_always_emit) {
            GatingDecision::Emit => {
                self.notifier.broadcast(Notification::new(
                    methods::ITEM_CREATED,
                    json!({
                        "kind": "system_announce",
                        "event_id": envelope.id,
                        "turn_id": turn_id,
                        "status": outcome.status,
                        "message": outcome.message,
                    }),
                ));
            }
            GatingDecision::Suppress => {
                if let Err(err) = self.activity_log.append(&json!({
                    "event_id": envelope.id,
                    "status": outcome.status,
                    "gated": true,
                })).await {
                    error!(event_id = %envelope.id, error = %err, "failed to append suppressed activity");
                }
            }
        }
    }
}
