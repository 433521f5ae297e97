//! Scripted `DesignServices` for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{DesignServices, ParseOutcome, RenderRequest, TaskStatus};
use crate::error::{StudioError, StudioResult};
use crate::session::{SourceFile, StoredAsset, WhiteboxAsset};

/// Replays queued responses and records every call.
///
/// Unscripted calls fail with a transport error, except `poll_task`, which
/// reports the task as still pending.
#[derive(Default)]
pub(crate) struct ScriptedServices {
    latency: Duration,
    call_latency: HashMap<&'static str, Duration>,
    store: Mutex<VecDeque<StudioResult<StoredAsset>>>,
    parse: Mutex<VecDeque<StudioResult<ParseOutcome>>>,
    polls: Mutex<HashMap<String, VecDeque<StudioResult<TaskStatus>>>>,
    whitebox: Mutex<VecDeque<StudioResult<WhiteboxAsset>>>,
    renders: Mutex<VecDeque<StudioResult<Vec<String>>>>,
    refines: Mutex<VecDeque<StudioResult<String>>>,
    calls: Mutex<Vec<String>>,
    render_requests: Mutex<Vec<RenderRequest>>,
}

impl ScriptedServices {
    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay calls of one kind (e.g. `"refine"`) by `latency` instead.
    pub fn with_call_latency(mut self, call: &'static str, latency: Duration) -> Self {
        self.call_latency.insert(call, latency);
        self
    }

    pub fn with_store(self, result: StudioResult<StoredAsset>) -> Self {
        self.store.lock().unwrap().push_back(result);
        self
    }

    pub fn with_parse(self, result: StudioResult<ParseOutcome>) -> Self {
        self.parse.lock().unwrap().push_back(result);
        self
    }

    pub fn with_polls(self, task_id: &str, results: Vec<StudioResult<TaskStatus>>) -> Self {
        self.polls
            .lock()
            .unwrap()
            .entry(task_id.to_string())
            .or_default()
            .extend(results);
        self
    }

    pub fn with_whitebox(self, result: StudioResult<WhiteboxAsset>) -> Self {
        self.whitebox.lock().unwrap().push_back(result);
        self
    }

    pub fn with_render(self, result: StudioResult<Vec<String>>) -> Self {
        self.renders.lock().unwrap().push_back(result);
        self
    }

    pub fn with_refine(self, result: StudioResult<String>) -> Self {
        self.refines.lock().unwrap().push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn render_requests(&self) -> Vec<RenderRequest> {
        self.render_requests.lock().unwrap().clone()
    }

    async fn record(&self, call: String) {
        let kind = call.split(':').next().unwrap_or_default();
        let latency = self
            .call_latency
            .get(kind)
            .copied()
            .unwrap_or(self.latency);
        self.calls.lock().unwrap().push(call);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn unscripted<T>(call: &str) -> StudioResult<T> {
    Err(StudioError::transport(format!("unscripted call: {}", call)))
}

#[async_trait]
impl DesignServices for ScriptedServices {
    async fn store_asset(&self, file: &SourceFile) -> StudioResult<StoredAsset> {
        self.record(format!("store_asset:{}", file.name)).await;
        let next = self.store.lock().unwrap().pop_front();
        next.unwrap_or_else(|| unscripted("store_asset"))
    }

    async fn begin_structural_parse(&self, file: &SourceFile) -> StudioResult<ParseOutcome> {
        self.record(format!("begin_structural_parse:{}", file.name))
            .await;
        let next = self.parse.lock().unwrap().pop_front();
        next.unwrap_or_else(|| unscripted("begin_structural_parse"))
    }

    async fn poll_task(&self, task_id: &str) -> StudioResult<TaskStatus> {
        self.record(format!("poll_task:{}", task_id)).await;
        let next = self
            .polls
            .lock()
            .unwrap()
            .get_mut(task_id)
            .and_then(|q| q.pop_front());
        next.unwrap_or(Ok(TaskStatus::Pending { progress: None }))
    }

    async fn generate_whitebox(&self, stored: &StoredAsset) -> StudioResult<WhiteboxAsset> {
        self.record(format!("generate_whitebox:{}", stored.storage_ref))
            .await;
        let next = self.whitebox.lock().unwrap().pop_front();
        next.unwrap_or_else(|| unscripted("generate_whitebox"))
    }

    async fn render_batch(&self, request: &RenderRequest) -> StudioResult<Vec<String>> {
        self.render_requests.lock().unwrap().push(request.clone());
        self.record("render_batch".to_string()).await;
        let next = self.renders.lock().unwrap().pop_front();
        next.unwrap_or_else(|| unscripted("render_batch"))
    }

    async fn refine(&self, image_ref: &str, _instruction: &str) -> StudioResult<String> {
        self.record(format!("refine:{}", image_ref)).await;
        let next = self.refines.lock().unwrap().pop_front();
        next.unwrap_or_else(|| unscripted("refine"))
    }
}
