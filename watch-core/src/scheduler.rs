//! One cancellable polling loop per active project.
//!
//! Each loop runs cycles strictly one after another: re-read the record,
//! retrieve, decide, write back, notify, then sleep for the project's interval.
//! Stopping a loop cancels its token and then takes the loop's commit gate, so
//! once [`Scheduler::stop`] returns no further write or event can come from that
//! loop, even if a retrieval is still in flight.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use futures_util::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerSettings;
use crate::detector::{self, Outcome};
use crate::error::CycleError;
use crate::notify::{NotificationPolicy, WatchEvent};
use crate::project::{OwnerId, ProjectId};
use crate::retrieval::Retriever;
use crate::store::ProjectStore;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type LoopKey = (OwnerId, ProjectId);

struct LoopHandle {
    cancel: CancellationToken,
    gate: Arc<Mutex<()>>,
    join: JoinHandle<()>,
}

impl LoopHandle {
    /// Returns once the loop can no longer commit; the task itself may still be
    /// waiting on a retrieval whose result will be dropped.
    async fn stop(self) -> JoinHandle<()> {
        self.cancel.cancel();
        drop(self.gate.lock().await);
        self.join
    }
}

/// Everything a loop needs, owned by the spawned task.
struct LoopContext {
    owner: OwnerId,
    project: ProjectId,
    store: ProjectStore,
    retriever: Arc<dyn Retriever>,
    policy: NotificationPolicy,
    settings: SchedulerSettings,
    events: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
    gate: Arc<Mutex<()>>,
}

enum CycleStep {
    Continue(Duration),
    Stop,
}

pub struct Scheduler {
    store: ProjectStore,
    retriever: Arc<dyn Retriever>,
    policy: NotificationPolicy,
    settings: SchedulerSettings,
    events: mpsc::Sender<WatchEvent>,
    loops: Mutex<HashMap<LoopKey, LoopHandle>>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        store: ProjectStore,
        retriever: Arc<dyn Retriever>,
        settings: SchedulerSettings,
        events: mpsc::Sender<WatchEvent>,
    ) -> Self {
        Self {
            store,
            retriever,
            policy: NotificationPolicy::from_settings(&settings),
            settings,
            events,
            loops: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Starts the loop for a project unless one is already running.
    ///
    /// Returns `false` when a live loop already exists for the key.
    pub async fn start(&self, owner: &OwnerId, project: ProjectId) -> bool {
        let key = (owner.clone(), project);
        let mut loops = self.loops.lock().await;
        if let Some(existing) = loops.get(&key) {
            if !existing.join.is_finished() {
                return false;
            }
        }

        let cancel = self.cancel.child_token();
        let gate = Arc::new(Mutex::new(()));
        let ctx = LoopContext {
            owner: owner.clone(),
            project,
            store: self.store.clone(),
            retriever: Arc::clone(&self.retriever),
            policy: self.policy,
            settings: self.settings.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
            gate: Arc::clone(&gate),
        };
        let join = tokio::spawn(run_loop(ctx));
        loops.insert(key, LoopHandle { cancel, gate, join });
        true
    }

    /// Cancels the project's loop. Returns `false` if none was registered.
    pub async fn stop(&self, owner: &OwnerId, project: ProjectId) -> bool {
        let handle = self.loops.lock().await.remove(&(owner.clone(), project));
        match handle {
            Some(handle) => {
                // the task winds down on its own once any in-flight retrieval returns
                drop(handle.stop().await);
                debug!(owner = %owner, project = %project, "loop cancelled");
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, owner: &OwnerId, project: ProjectId) -> bool {
        self.loops
            .lock()
            .await
            .get(&(owner.clone(), project))
            .is_some_and(|handle| !handle.join.is_finished())
    }

    pub async fn running_count(&self) -> usize {
        self.loops
            .lock()
            .await
            .values()
            .filter(|handle| !handle.join.is_finished())
            .count()
    }

    /// Cancels every loop and waits a bounded time for the tasks to exit.
    pub async fn shutdown(&self) {
        info!("shutting down scheduler");
        self.cancel.cancel();

        let handles: Vec<LoopHandle> = self.loops.lock().await.drain().map(|(_, h)| h).collect();
        let joins = join_all(handles.into_iter().map(LoopHandle::stop)).await;
        let exited = join_all(
            joins
                .into_iter()
                .map(|join| tokio::time::timeout(SHUTDOWN_GRACE, join)),
        )
        .await;

        let stragglers = exited.iter().filter(|r| r.is_err()).count();
        if stragglers > 0 {
            warn!(stragglers, "loops still waiting on retrieval at shutdown");
        }
        info!("scheduler shut down");
    }
}

async fn run_loop(ctx: LoopContext) {
    info!(owner = %ctx.owner, project = %ctx.project, "monitoring loop started");
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let pause = match AssertUnwindSafe(run_cycle(&ctx)).catch_unwind().await {
            Ok(Ok(CycleStep::Continue(interval))) => interval.max(ctx.settings.min_interval()),
            Ok(Ok(CycleStep::Stop)) => break,
            Ok(Err(err)) => {
                error!(owner = %ctx.owner, project = %ctx.project, error = %err, "cycle failed, backing off");
                ctx.settings.error_backoff()
            }
            Err(panic) => {
                let err = CycleError::Panicked(panic_message(panic.as_ref()));
                error!(owner = %ctx.owner, project = %ctx.project, error = %err, "cycle failed, backing off");
                ctx.settings.error_backoff()
            }
        };

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
    info!(owner = %ctx.owner, project = %ctx.project, "monitoring loop stopped");
}

async fn run_cycle(ctx: &LoopContext) -> Result<CycleStep, CycleError> {
    let started_at = Utc::now();

    // always work from the current record, settings may have changed
    let project = match ctx.store.get(&ctx.owner, ctx.project).await {
        Some(project) if project.active => project,
        Some(_) | None => {
            debug!(owner = %ctx.owner, project = %ctx.project, "project gone or inactive, loop exits");
            return Ok(CycleStep::Stop);
        }
    };

    let observation = detector::observe(&project, ctx.retriever.as_ref()).await;

    let _gate = ctx.gate.lock().await;
    if ctx.cancel.is_cancelled() {
        debug!(owner = %ctx.owner, project = %ctx.project, "discarding result of cancelled cycle");
        return Ok(CycleStep::Stop);
    }

    let now = Utc::now();
    let policy = ctx.policy;
    let (updated, (outcome, event)) = ctx
        .store
        .update_with(&ctx.owner, ctx.project, move |current| {
            let verdict = detector::decide(&current, observation, started_at);
            let patched = verdict.patch.apply(current);
            let (patched, event) = policy.apply(&verdict.outcome, patched, now);
            (patched, (verdict.outcome, event))
        })
        .await?;

    match &outcome {
        Outcome::Unchanged => {
            debug!(owner = %ctx.owner, project = %ctx.project, url = %updated.target, "no change")
        }
        Outcome::FetchFailed(reason) => {
            warn!(owner = %ctx.owner, project = %ctx.project, url = %updated.target, error = %reason, "check failed")
        }
        Outcome::FeedNewItems(items) => {
            info!(owner = %ctx.owner, project = %ctx.project, url = %updated.target, new_items = items.len(), "new feed items")
        }
        other => {
            info!(owner = %ctx.owner, project = %ctx.project, url = %updated.target, outcome = other.label(), "check completed")
        }
    }

    if let Some(event) = event {
        tokio::select! {
            sent = ctx.events.send(event) => sent.map_err(|_| CycleError::EventChannelClosed)?,
            _ = ctx.cancel.cancelled() => return Ok(CycleStep::Stop),
        }
    }

    Ok(CycleStep::Continue(Duration::from_secs(updated.interval_seconds)))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
