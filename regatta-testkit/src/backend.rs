use async_trait::async_trait;
use parking_lot::Mutex;
use regatta::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Scripted behavior for one submitted task: the statuses successive polls
/// see, then the outcome fetched once a terminal status is reached.
#[derive(Clone, Debug)]
pub struct TaskScript {
    pub statuses: Vec<TaskStatus>,
    pub outcome: TaskOutcome,
}

impl TaskScript {
    pub fn performance(score: f64) -> Self {
        Self {
            statuses: vec![TaskStatus::Success],
            outcome: TaskOutcome::Performance { score },
        }
    }

    pub fn completion(success: bool) -> Self {
        Self {
            statuses: vec![TaskStatus::Success],
            outcome: TaskOutcome::Completion {
                success,
                error_message: None,
            },
        }
    }

    pub fn completion_error(message: &str) -> Self {
        Self {
            statuses: vec![TaskStatus::Success],
            outcome: TaskOutcome::Completion {
                success: false,
                error_message: Some(message.to_string()),
            },
        }
    }

    pub fn failed() -> Self {
        Self {
            statuses: vec![TaskStatus::Failure],
            outcome: TaskOutcome::Completion {
                success: false,
                error_message: Some("Worker failed".to_string()),
            },
        }
    }

    /// Prepend `polls` running statuses so the task stays in flight for
    /// that many polls before resolving.
    pub fn with_running_polls(mut self, polls: usize) -> Self {
        let mut statuses = vec![TaskStatus::Running; polls];
        statuses.extend(self.statuses);
        self.statuses = statuses;
        self
    }
}

#[derive(Clone, Debug)]
pub struct SubmitRecord {
    pub handle: TaskHandle,
    pub lane: ExecutionLane,
    pub op: TaskOp,
    pub method_name: String,
    pub attempt: u32,
}

#[derive(Clone, Debug)]
struct ScriptedTask {
    method_name: String,
    statuses: VecDeque<TaskStatus>,
    outcome: TaskOutcome,
}

type ScriptKey = (String, TaskOp);

/// In-memory [`TaskBackend`] with per-method scripts.
///
/// Scripts queue up per `(method, op)` pair and are consumed one per
/// submit; the last script for a key repeats for any further submits, so
/// a single script also covers retried attempts. Submits and revocations
/// are recorded for assertions.
#[derive(Clone)]
pub struct InMemoryTaskBackend {
    scripts: Arc<Mutex<HashMap<ScriptKey, VecDeque<TaskScript>>>>,
    default_script: Arc<Mutex<TaskScript>>,
    tasks: Arc<Mutex<HashMap<TaskHandle, ScriptedTask>>>,
    submits: Arc<Mutex<Vec<SubmitRecord>>>,
    revoked: Arc<Mutex<Vec<TaskHandle>>>,
    reject_gpu: Arc<Mutex<bool>>,
    failing_submits: Arc<Mutex<HashMap<String, u32>>>,
    failing_statuses: Arc<Mutex<HashMap<String, u32>>>,
    failing_results: Arc<Mutex<HashMap<String, u32>>>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl InMemoryTaskBackend {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(HashMap::new())),
            default_script: Arc::new(Mutex::new(TaskScript::completion(true))),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            submits: Arc::new(Mutex::new(Vec::new())),
            revoked: Arc::new(Mutex::new(Vec::new())),
            reject_gpu: Arc::new(Mutex::new(false)),
            failing_submits: Arc::new(Mutex::new(HashMap::new())),
            failing_statuses: Arc::new(Mutex::new(HashMap::new())),
            failing_results: Arc::new(Mutex::new(HashMap::new())),
            latency: Arc::new(Mutex::new(None)),
        }
    }

    /// Queue a script for the next submit of `method` performing `op`.
    pub fn script(&self, method: &str, op: TaskOp, script: TaskScript) {
        self.scripts
            .lock()
            .entry((method.to_string(), op))
            .or_default()
            .push_back(script);
    }

    /// Behavior for submits no script was queued for.
    pub fn set_default_script(&self, script: TaskScript) {
        *self.default_script.lock() = script;
    }

    /// Reject submits to the GPU lane, as a backend with no GPU workers
    /// would.
    pub fn set_reject_gpu(&self, reject: bool) {
        *self.reject_gpu.lock() = reject;
    }

    /// Fail the next `count` submits of `method` at the transport level,
    /// whatever lane they target.
    pub fn fail_submits_for(&self, method: &str, count: u32) {
        self.failing_submits
            .lock()
            .insert(method.to_string(), count);
    }

    /// Fail the next `count` status polls against `method`'s tasks at the
    /// transport level, as a broker that stops answering would.
    pub fn fail_statuses_for(&self, method: &str, count: u32) {
        self.failing_statuses
            .lock()
            .insert(method.to_string(), count);
    }

    /// Fail the next `count` result fetches against `method`'s tasks at
    /// the transport level.
    pub fn fail_results_for(&self, method: &str, count: u32) {
        self.failing_results
            .lock()
            .insert(method.to_string(), count);
    }

    /// Delay every submit and status poll, simulating a slow broker.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn submits(&self) -> Vec<SubmitRecord> {
        self.submits.lock().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submits.lock().len()
    }

    pub fn submit_count_for(&self, method: &str) -> usize {
        self.submits
            .lock()
            .iter()
            .filter(|record| record.method_name == method)
            .count()
    }

    pub fn assert_submit_count_eq(&self, expected: usize) {
        assert_eq!(
            self.submits.lock().len(),
            expected,
            "Expected {} submits, got {}",
            expected,
            self.submits.lock().len()
        );
    }

    pub fn revoked_handles(&self) -> Vec<TaskHandle> {
        self.revoked.lock().clone()
    }

    pub fn revoke_count_for(&self, handle: TaskHandle) -> usize {
        self.revoked
            .lock()
            .iter()
            .filter(|revoked| **revoked == handle)
            .count()
    }

    /// Method names of every revoked task, in revocation order.
    pub fn revoked_methods(&self) -> Vec<String> {
        let tasks = self.tasks.lock();
        self.revoked
            .lock()
            .iter()
            .filter_map(|handle| {
                tasks.get(handle).map(|task| task.method_name.clone())
            })
            .collect()
    }

    pub fn clear(&self) {
        self.submits.lock().clear();
        self.revoked.lock().clear();
    }

    fn next_script(&self, method: &str, op: TaskOp) -> TaskScript {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&(method.to_string(), op)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue.front().unwrap().clone(),
            _ => self.default_script.lock().clone(),
        }
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for InMemoryTaskBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskBackend for InMemoryTaskBackend {
    async fn submit(
        &self,
        lane: ExecutionLane,
        payload: TaskPayload,
    ) -> anyhow::Result<TaskHandle> {
        self.simulate_latency().await;

        {
            let mut failing = self.failing_submits.lock();
            if let Some(remaining) = failing.get_mut(&payload.method_name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!(
                        "Scripted submit failure for {}",
                        payload.method_name
                    );
                }
            }
        }
        if lane == ExecutionLane::Gpu && *self.reject_gpu.lock() {
            anyhow::bail!("No gpu workers available");
        }

        let script = self.next_script(&payload.method_name, payload.op);
        let handle = TaskHandle::new();
        tracing::debug!(
            "Scripted submit: {} {} on {}",
            payload.op,
            payload.method_name,
            lane
        );

        self.tasks.lock().insert(
            handle,
            ScriptedTask {
                method_name: payload.method_name.clone(),
                statuses: script.statuses.into(),
                outcome: script.outcome,
            },
        );
        self.submits.lock().push(SubmitRecord {
            handle,
            lane,
            op: payload.op,
            method_name: payload.method_name,
            attempt: payload.attempt,
        });
        Ok(handle)
    }

    async fn status(&self, handle: TaskHandle) -> anyhow::Result<TaskStatus> {
        self.simulate_latency().await;

        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.get_mut(&handle) else {
            anyhow::bail!("Unknown task handle: {}", handle);
        };
        {
            let mut failing = self.failing_statuses.lock();
            if let Some(remaining) = failing.get_mut(&task.method_name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!(
                        "Scripted status failure for {}",
                        task.method_name
                    );
                }
            }
        }
        // The last scripted status repeats for every later poll.
        if task.statuses.len() > 1 {
            Ok(task.statuses.pop_front().unwrap())
        } else {
            Ok(task.statuses.front().copied().unwrap_or(TaskStatus::Pending))
        }
    }

    async fn result(&self, handle: TaskHandle) -> anyhow::Result<TaskOutcome> {
        let tasks = self.tasks.lock();
        let Some(task) = tasks.get(&handle) else {
            anyhow::bail!("Unknown task handle: {}", handle);
        };
        {
            let mut failing = self.failing_results.lock();
            if let Some(remaining) = failing.get_mut(&task.method_name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!(
                        "Scripted result failure for {}",
                        task.method_name
                    );
                }
            }
        }
        Ok(task.outcome.clone())
    }

    async fn revoke(
        &self,
        handle: TaskHandle,
        _terminate: bool,
    ) -> anyhow::Result<()> {
        tracing::debug!("Scripted revoke: {}", handle);
        self.revoked.lock().push(handle);
        Ok(())
    }
}
