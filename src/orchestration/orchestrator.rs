//! End-to-end driver for a single work item.
//!
//! The orchestrator owns the control loop of a run: it decomposes the work
//! item, builds the dependency graph and scheduler, dispatches groups to
//! executors and folds their results back into the scheduler, the report
//! and the trace. Executor calls run as spawned tasks; only the control
//! loop mutates scheduling state.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, OrchestratorConfig, Strategy};
use crate::core::dag::DependencyGraph;
use crate::core::task::{ExecutorKind, Task, TaskId};
use crate::core::work_item::WorkItem;
use crate::error::{Error, Result};
use crate::extract::TaskExtractor;
use crate::lifecycle::{
    LifecycleMirror, LifecycleState, LifecycleStateMachine, MirroredTransition, TransitionContext,
};
use crate::orchestration::escalation::{EscalationCategory, EscalationPolicy};
use crate::orchestration::executor::{ExecutorOutcome, ExecutorRegistry};
use crate::orchestration::plan::{ExecutionPlan, SessionId};
use crate::orchestration::report::{ExecutionReport, JsonReportSink, ReportSink, TaskResult};
use crate::orchestration::scheduler::{
    FailOutcome, GroupId, Scheduler, SchedulerEvent, SchedulerOptions, SchedulerStatus,
};
use crate::trace::{ExecutionSpan, SpanStatus, TraceRecorder};

/// Actor name recorded on lifecycle transitions.
const ACTOR: &str = "coordinator";

/// Outcome of one task attempt, produced by a spawned executor call.
#[derive(Debug)]
struct TaskAttempt {
    task_id: TaskId,
    executor: ExecutorKind,
    attempt: u32,
    outcome: ExecutorOutcome,
    status: SpanStatus,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

/// All attempts of one group dispatch.
#[derive(Debug)]
struct GroupRun {
    group_id: GroupId,
    attempts: Vec<TaskAttempt>,
}

/// Everything a dispatched group needs, cheap to clone into spawned work.
#[derive(Clone)]
struct Dispatcher {
    registry: Arc<ExecutorRegistry>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl Dispatcher {
    /// Run every task of a group concurrently and wait for all of them.
    ///
    /// A failing task never affects its siblings.
    async fn run_group(
        self,
        group_id: GroupId,
        batch: Vec<(Task, u32)>,
        delay: Option<Duration>,
    ) -> GroupRun {
        if let Some(delay) = delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {}
            }
        }

        let mut meta = Vec::with_capacity(batch.len());
        let mut handles = Vec::with_capacity(batch.len());
        for (task, attempt) in batch {
            meta.push((task.id.clone(), task.assigned_executor, attempt));
            handles.push(tokio::spawn(self.clone().run_task(task, attempt)));
        }

        let joined = futures::future::join_all(handles).await;
        let attempts = meta
            .into_iter()
            .zip(joined)
            .map(|((task_id, executor, attempt), joined)| {
                joined.unwrap_or_else(|e| {
                    let now = Utc::now();
                    TaskAttempt {
                        task_id,
                        executor,
                        attempt,
                        outcome: ExecutorOutcome::failure(Error::TaskJoin(e.to_string()).to_string()),
                        status: SpanStatus::Failure,
                        started_at: now,
                        finished_at: now,
                    }
                })
            })
            .collect();

        GroupRun { group_id, attempts }
    }

    async fn run_task(self, task: Task, attempt: u32) -> TaskAttempt {
        let started_at = Utc::now();
        let (outcome, status) = self.call_executor(&task).await;
        TaskAttempt {
            task_id: task.id,
            executor: task.assigned_executor,
            attempt,
            outcome,
            status,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn call_executor(&self, task: &Task) -> (ExecutorOutcome, SpanStatus) {
        let cancelled = || (ExecutorOutcome::failure(Error::Cancelled.to_string()), SpanStatus::Cancelled);

        let executor = match self.registry.get(task.assigned_executor) {
            Ok(executor) => executor,
            Err(e) => return (ExecutorOutcome::failure(e.to_string()), SpanStatus::Failure),
        };

        let _permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return cancelled(),
            },
            _ = self.cancel.cancelled() => return cancelled(),
        };
        if self.cancel.is_cancelled() {
            return cancelled();
        }

        debug!(task_id = %task.id, executor = %task.assigned_executor, "dispatching task");
        let token = self.cancel.child_token();
        tokio::select! {
            result = tokio::time::timeout(self.timeout, executor.execute(task, token.clone())) => {
                match result {
                    Ok(outcome) => {
                        let status = if outcome.is_success() {
                            SpanStatus::Success
                        } else if self.cancel.is_cancelled() {
                            SpanStatus::Cancelled
                        } else {
                            SpanStatus::Failure
                        };
                        (outcome, status)
                    }
                    Err(_) => {
                        token.cancel();
                        (
                            ExecutorOutcome::failure(Error::Timeout(self.timeout).to_string()),
                            SpanStatus::Timeout,
                        )
                    }
                }
            }
            _ = self.cancel.cancelled() => cancelled(),
        }
    }
}

/// Mutable state of one run, owned by the control loop.
struct RunState {
    session_id: SessionId,
    run_id: String,
    lifecycle: LifecycleStateMachine,
    report: ExecutionReport,
    /// Attempts started per task.
    attempts: HashMap<TaskId, u32>,
    /// Tasks to re-run on the next dispatch of a retrying group.
    retry_tasks: HashMap<GroupId, Vec<TaskId>>,
}

/// Drives work items from decomposition to a final report.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use conductor::{Config, ExecutorRegistry, Orchestrator, WorkItem};
///
/// let registry = ExecutorRegistry::new().with(Arc::new(MyCodeGen));
/// let orchestrator = Orchestrator::new(Config::default(), Arc::new(registry));
/// let report = orchestrator
///     .run(&WorkItem::new("Add login", "- [ ] Model\n- [ ] API #1\n"))
///     .await?;
/// assert_eq!(report.summary.success_rate, 100.0);
/// ```
pub struct Orchestrator {
    config: OrchestratorConfig,
    escalation_policy: EscalationPolicy,
    registry: Arc<ExecutorRegistry>,
    extractor: TaskExtractor,
    report_sink: Option<Arc<dyn ReportSink>>,
    mirror: Option<Arc<dyn LifecycleMirror>>,
    recorder: Arc<TraceRecorder>,
    scheduler_events: Option<mpsc::Sender<SchedulerEvent>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator with an in-memory trace recorder and no
    /// report sink.
    pub fn new(config: Config, registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            config: config.orchestrator,
            escalation_policy: config.escalation,
            registry,
            extractor: TaskExtractor::new(),
            report_sink: None,
            mirror: None,
            recorder: Arc::new(TraceRecorder::new()),
            scheduler_events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create an orchestrator that writes reports and traces to the
    /// directories named in `config`.
    pub fn with_storage(config: Config, registry: Arc<ExecutorRegistry>) -> Result<Self> {
        let reports = config.reports_dir()?;
        let traces = config.traces_dir()?;
        Ok(Self::new(config, registry)
            .with_report_sink(Arc::new(JsonReportSink::new(reports)))
            .with_recorder(Arc::new(TraceRecorder::with_dir(traces))))
    }

    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.report_sink = Some(sink);
        self
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn LifecycleMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<TraceRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_escalation_policy(mut self, policy: EscalationPolicy) -> Self {
        self.escalation_policy = policy;
        self
    }

    /// Forward scheduler events of every run to `tx`.
    pub fn with_scheduler_events(mut self, tx: mpsc::Sender<SchedulerEvent>) -> Self {
        self.scheduler_events = Some(tx);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn recorder(&self) -> &Arc<TraceRecorder> {
        &self.recorder
    }

    /// Token that cancels every current and future run of this
    /// orchestrator.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shut down all registered executors.
    pub async fn close(&self) -> Result<()> {
        self.registry.close().await
    }

    /// Decompose a work item and run its tasks.
    pub async fn run(&self, work_item: &WorkItem) -> Result<ExecutionReport> {
        let tasks = self.extractor.extract(work_item);
        self.run_with_tasks(work_item, tasks).await
    }

    /// Run an already decomposed task list.
    ///
    /// Task failures, cycles and cancellation are reported in the returned
    /// [`ExecutionReport`], not as errors.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty task list. Errors from the lifecycle or
    /// scheduler indicate a bug in the control loop.
    pub async fn run_with_tasks(
        &self,
        work_item: &WorkItem,
        tasks: Vec<Task>,
    ) -> Result<ExecutionReport> {
        if tasks.is_empty() {
            return Err(Error::Validation("work item produced no tasks".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = tasks.iter().find(|t| !seen.insert(&t.id)) {
            return Err(Error::Validation(format!("duplicate task id: {}", dup.id)));
        }
        if tasks
            .iter()
            .all(|t| t.assigned_executor == ExecutorKind::Coordinator)
        {
            return Err(Error::TransitionRejected {
                from: LifecycleState::Analyzing.to_string(),
                to: LifecycleState::Implementing.to_string(),
                reason: "no task is assigned to a worker executor".to_string(),
            });
        }

        let session_id = SessionId::new();
        let mut run = RunState {
            session_id,
            run_id: session_id.to_string(),
            lifecycle: LifecycleStateMachine::new(),
            report: ExecutionReport::new(session_id, work_item),
            attempts: HashMap::new(),
            retry_tasks: HashMap::new(),
        };

        info!(
            session = %session_id.short(),
            work_item = %run.report.work_item,
            tasks = tasks.len(),
            "starting run"
        );
        self.recorder
            .start_run(&run.run_id, &run.report.work_item, tasks.len())
            .await;

        let no_ctx = TransitionContext::default();
        self.transition(&mut run, LifecycleState::Pending, None, &no_ctx)
            .await?;
        self.transition(&mut run, LifecycleState::Analyzing, None, &no_ctx)
            .await?;

        let graph = DependencyGraph::build(&tasks);
        if graph.has_cycles() {
            self.block_on_cycle(&mut run, &tasks, &graph).await?;
            return Ok(self.finish(run).await);
        }

        let mut plan = ExecutionPlan::new(session_id, tasks, graph, self.config.max_concurrency);
        let mut scheduler = Scheduler::new(
            plan.tasks(),
            plan.graph(),
            SchedulerOptions {
                concurrency: plan.concurrency,
                max_retries: self.config.max_retries,
                gating: self.config.gating,
                granularity: self.config.granularity,
            },
        );
        if let Some(tx) = &self.scheduler_events {
            scheduler = scheduler.with_events(tx.clone());
        }
        debug!(
            session = %session_id.short(),
            concurrency = plan.concurrency,
            groups = scheduler.groups().len(),
            estimated_ms = plan.estimated_duration_ms,
            "plan ready"
        );

        let ctx = TransitionContext {
            assigned_executor: plan
                .tasks()
                .iter()
                .map(|t| t.assigned_executor)
                .find(|k| *k != ExecutorKind::Coordinator),
        };
        self.transition(&mut run, LifecycleState::Implementing, None, &ctx)
            .await?;

        let dispatcher = Dispatcher {
            registry: Arc::clone(&self.registry),
            permits: Arc::new(Semaphore::new(plan.concurrency)),
            cancel: self.cancel.child_token(),
            timeout: self.config.task_timeout(),
        };

        match self.config.strategy {
            Strategy::LevelByLevel => {
                self.run_level_by_level(&mut run, &mut plan, &mut scheduler, &dispatcher)
                    .await?
            }
            Strategy::Continuous => {
                self.run_continuous(&mut run, &mut plan, &mut scheduler, &dispatcher)
                    .await?
            }
        }

        let cancelled = dispatcher.cancel.is_cancelled();
        let abandoned = if cancelled {
            scheduler.abandon_waiting("run cancelled")
        } else {
            scheduler.abandon_blocked("not run: upstream group failed")
        };
        for group_id in abandoned {
            self.record_not_run(&mut run, &plan, &scheduler, group_id);
        }

        info!(session = %session_id.short(), progress = %scheduler.progress_summary(), "execution finished");
        run.report.groups = scheduler.groups().to_vec();

        if cancelled {
            self.transition(&mut run, LifecycleState::Paused, Some("run cancelled".to_string()), &ctx)
                .await?;
        } else if run.report.requires_escalation() {
            let reason = format!("{} escalation(s) raised", run.report.escalations.len());
            self.transition(&mut run, LifecycleState::Blocked, Some(reason), &ctx)
                .await?;
        } else if scheduler.status() == SchedulerStatus::Failed {
            let reason = format!("{} task(s) failed", run.report.summary.failed);
            self.transition(&mut run, LifecycleState::Failed, Some(reason), &ctx)
                .await?;
        } else {
            self.transition(&mut run, LifecycleState::Reviewing, None, &ctx)
                .await?;
            self.transition(&mut run, LifecycleState::Done, None, &ctx)
                .await?;
        }

        Ok(self.finish(run).await)
    }

    /// Dispatch every eligible group as one wave and wait for the whole
    /// wave before asking the scheduler again.
    async fn run_level_by_level(
        &self,
        run: &mut RunState,
        plan: &mut ExecutionPlan,
        scheduler: &mut Scheduler,
        dispatcher: &Dispatcher,
    ) -> Result<()> {
        while !dispatcher.cancel.is_cancelled() {
            let mut wave = Vec::new();
            while let Some(group_id) = scheduler.next_group().map(|g| g.id) {
                let (batch, delay) = self.prepare_dispatch(run, plan, scheduler, group_id)?;
                wave.push(dispatcher.clone().run_group(group_id, batch, delay));
            }
            if wave.is_empty() {
                break;
            }
            for group_run in futures::future::join_all(wave).await {
                self.apply_group(run, plan, scheduler, group_run).await?;
            }
        }
        Ok(())
    }

    async fn run_continuous(
        &self,
        run: &mut RunState,
        plan: &mut ExecutionPlan,
        scheduler: &mut Scheduler,
        dispatcher: &Dispatcher,
    ) -> Result<()> {
        let mut in_flight = FuturesUnordered::new();
        loop {
            if !dispatcher.cancel.is_cancelled() {
                while let Some(group_id) = scheduler.next_group().map(|g| g.id) {
                    let (batch, delay) = self.prepare_dispatch(run, plan, scheduler, group_id)?;
                    in_flight.push(dispatcher.clone().run_group(group_id, batch, delay));
                }
            }
            match in_flight.next().await {
                Some(group_run) => self.apply_group(run, plan, scheduler, group_run).await?,
                None => break,
            }
        }
        Ok(())
    }

    /// Start a group and collect the tasks to send. A retrying group only
    /// re-sends the tasks that failed last time.
    fn prepare_dispatch(
        &self,
        run: &mut RunState,
        plan: &mut ExecutionPlan,
        scheduler: &mut Scheduler,
        group_id: GroupId,
    ) -> Result<(Vec<(Task, u32)>, Option<Duration>)> {
        let group = scheduler.start_group(group_id)?;
        let retrying = group.retry_count > 0;
        let level = group.level;
        let ids = match run.retry_tasks.remove(&group_id) {
            Some(ids) => ids,
            None => group.task_ids.clone(),
        };

        let mut batch = Vec::with_capacity(ids.len());
        for id in ids {
            let attempt = run.attempts.entry(id.clone()).or_insert(0);
            *attempt += 1;
            let attempt = *attempt;
            if let Some(task) = plan.task_mut(&id) {
                task.start();
                batch.push((task.clone(), attempt));
            }
        }

        debug!(
            session = %run.session_id.short(),
            group_id,
            level,
            tasks = batch.len(),
            retrying,
            "dispatching group"
        );
        Ok((batch, retrying.then(|| self.config.retry_delay())))
    }

    /// Fold a finished group back into task status, report, trace and
    /// scheduler.
    async fn apply_group(
        &self,
        run: &mut RunState,
        plan: &mut ExecutionPlan,
        scheduler: &mut Scheduler,
        group_run: GroupRun,
    ) -> Result<()> {
        let group_id = group_run.group_id;
        let mut failures: Vec<(TaskId, String)> = Vec::new();
        let mut cancelled = false;

        for attempt in group_run.attempts {
            self.recorder
                .record_span(
                    &run.run_id,
                    ExecutionSpan {
                        task_id: attempt.task_id.clone(),
                        group_id,
                        executor: attempt.executor,
                        attempt: attempt.attempt,
                        started_at: attempt.started_at,
                        ended_at: attempt.finished_at,
                        duration_ms: (attempt.finished_at - attempt.started_at)
                            .num_milliseconds()
                            .max(0) as u64,
                        status: attempt.status,
                        error: attempt.outcome.error.clone(),
                    },
                )
                .await;

            let result = if attempt.outcome.is_success() {
                if let Some(task) = plan.task_mut(&attempt.task_id) {
                    task.complete();
                }
                TaskResult::completed(attempt.task_id, attempt.executor, attempt.outcome.payload)
            } else {
                if let Some(task) = plan.task_mut(&attempt.task_id) {
                    task.fail();
                }
                cancelled |= attempt.status == SpanStatus::Cancelled;
                let error = attempt
                    .outcome
                    .error
                    .unwrap_or_else(|| "executor reported failure".to_string());
                warn!(
                    session = %run.session_id.short(),
                    task_id = %attempt.task_id,
                    attempt = attempt.attempt,
                    error = %error,
                    "task failed"
                );
                failures.push((attempt.task_id.clone(), error.clone()));
                TaskResult::failed(attempt.task_id, attempt.executor, error)
            };
            run.report
                .record(result.with_timing(attempt.started_at, attempt.finished_at));
        }

        if failures.is_empty() {
            return scheduler.complete_group(group_id);
        }

        let summary = failures
            .iter()
            .map(|(id, e)| format!("{}: {}", id, e))
            .collect::<Vec<_>>()
            .join("; ");

        match scheduler.fail_group(group_id, &summary)? {
            FailOutcome::Retrying { retry_count } if !cancelled => {
                info!(group_id, retry_count, failed = failures.len(), "group will be retried");
                let ids: Vec<TaskId> = failures.into_iter().map(|(id, _)| id).collect();
                for id in &ids {
                    if let Some(task) = plan.task_mut(id) {
                        task.reset();
                    }
                }
                run.retry_tasks.insert(group_id, ids);
            }
            FailOutcome::Retrying { .. } => {}
            FailOutcome::Exhausted => {
                if self.config.escalate_on_exhausted_retries && !cancelled {
                    let ids: Vec<TaskId> = failures.into_iter().map(|(id, _)| id).collect();
                    let mut blocked: Vec<String> = ids
                        .iter()
                        .flat_map(|id| plan.graph().dependents_of(id))
                        .map(|id| id.to_string())
                        .collect();
                    blocked.sort();
                    blocked.dedup();
                    let mut reason = format!(
                        "group {} exhausted {} retries",
                        group_id, self.config.max_retries
                    );
                    if !blocked.is_empty() {
                        reason.push_str(&format!("; blocks {}", blocked.join(", ")));
                    }
                    for id in &ids {
                        run.report.mark_escalated(id, &reason);
                    }
                    let escalation = self.escalation_policy.escalate(
                        EscalationCategory::RetriesExhausted,
                        reason,
                        ids,
                    );
                    warn!(
                        session = %run.session_id.short(),
                        severity = %escalation.severity,
                        target = %escalation.target,
                        "escalating exhausted group"
                    );
                    self.recorder
                        .record_escalation(&run.run_id, escalation.clone())
                        .await;
                    run.report.add_escalation(escalation);
                }
            }
        }
        Ok(())
    }

    /// Escalate a dependency cycle and move the work item to blocked.
    async fn block_on_cycle(
        &self,
        run: &mut RunState,
        tasks: &[Task],
        graph: &DependencyGraph,
    ) -> Result<()> {
        let members: Vec<String> = graph
            .cycle_members()
            .iter()
            .map(|c| {
                c.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            })
            .collect();
        let reason = format!("dependency cycle detected: {}", members.join(", "));

        let escalation = self.escalation_policy.escalate(
            EscalationCategory::CycleDetected,
            reason.clone(),
            graph.unresolved().to_vec(),
        );
        warn!(
            session = %run.session_id.short(),
            severity = %escalation.severity,
            target = %escalation.target,
            %reason,
            "escalating"
        );
        self.recorder
            .record_escalation(&run.run_id, escalation.clone())
            .await;
        run.report.add_escalation(escalation);

        for task in tasks {
            let why = if graph.unresolved().contains(&task.id) {
                "part of or downstream of a dependency cycle"
            } else {
                "not scheduled: dependency cycle in run"
            };
            if run.report.result(&task.id).is_none() {
                run.report
                    .record(TaskResult::escalated(task.id.clone(), task.assigned_executor, why));
            }
        }

        self.transition(
            run,
            LifecycleState::Blocked,
            Some(reason),
            &TransitionContext::default(),
        )
        .await
    }

    /// Record a failed result for tasks of an abandoned group that never
    /// produced one.
    fn record_not_run(
        &self,
        run: &mut RunState,
        plan: &ExecutionPlan,
        scheduler: &Scheduler,
        group_id: GroupId,
    ) {
        let Some(group) = scheduler.group(group_id) else {
            return;
        };
        let reason = group
            .last_error
            .clone()
            .unwrap_or_else(|| "not run".to_string());
        for id in &group.task_ids {
            if run.report.result(id).is_some() {
                continue;
            }
            let executor = plan
                .task(id)
                .map(|t| t.assigned_executor)
                .unwrap_or(ExecutorKind::CodeGen);
            let unmet: Vec<String> = plan
                .graph()
                .dependencies_of(id)
                .into_iter()
                .filter(|dep| run.report.result(dep).map_or(true, |r| !r.is_success()))
                .map(|dep| dep.to_string())
                .collect();
            let error = if unmet.is_empty() {
                reason.clone()
            } else {
                format!("{} (waiting on {})", reason, unmet.join(", "))
            };
            run.report
                .record(TaskResult::failed(id.clone(), executor, error).with_attempts(0));
        }
    }

    /// Apply a lifecycle transition and publish it to the trace and mirror.
    async fn transition(
        &self,
        run: &mut RunState,
        target: LifecycleState,
        reason: Option<String>,
        ctx: &TransitionContext,
    ) -> Result<()> {
        let record = run.lifecycle.transition(target, ACTOR, reason, ctx)?;
        info!(
            session = %run.session_id.short(),
            from = ?record.from,
            to = %record.to,
            "lifecycle transition"
        );

        self.recorder
            .record_transition(&run.run_id, record.clone())
            .await;

        if let Some(mirror) = &self.mirror {
            let mirror = Arc::clone(mirror);
            let event = MirroredTransition {
                work_item: run.report.work_item.clone(),
                transition: record,
            };
            tokio::spawn(async move {
                if let Err(e) = mirror.mirror(event).await {
                    warn!(error = %e, "lifecycle mirror failed");
                }
            });
        }
        Ok(())
    }

    /// Finalize the report and hand it to the sink and the trace store.
    /// Both writes are best-effort.
    async fn finish(&self, mut run: RunState) -> ExecutionReport {
        run.report.finalize(run.lifecycle.current());

        if let Some(sink) = &self.report_sink {
            if let Err(e) = sink.persist(&run.report).await {
                warn!(session = %run.session_id.short(), error = %e, "failed to persist report");
            }
        }
        if let Err(e) = self.recorder.persist(&run.run_id).await {
            warn!(session = %run.session_id.short(), error = %e, "failed to persist trace");
        }

        info!(
            session = %run.session_id.short(),
            state = ?run.report.final_state,
            completed = run.report.summary.completed,
            failed = run.report.summary.failed,
            escalated = run.report.summary.escalated,
            success_rate = run.report.summary.success_rate,
            "run finished"
        );
        run.report
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("has_report_sink", &self.report_sink.is_some())
            .field("has_mirror", &self.mirror.is_some())
            .finish()
    }
}
