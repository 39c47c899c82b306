//! Clients for the external collaborators executions dispatch into: the
//! agent-message executor, the workflow-execution API and the
//! activity-tracking API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};

/// Usage and cost metadata an executor may report alongside its response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentUsage {
    #[serde(default)]
    pub context_used: Option<i64>,
    #[serde(default)]
    pub context_max: Option<i64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub tool_calls: Option<i64>,
    #[serde(default)]
    pub execution_log: Option<String>,
}

/// What a successful executor call yields.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentReply {
    pub response: String,
    #[serde(default)]
    pub usage: AgentUsage,
}

/// Dispatches a schedule's message payload to the target agent by name.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(
        &self,
        agent_name: &str,
        message: &str,
        timeout: Duration,
    ) -> Result<AgentReply>;
}

/// HTTP implementation: `POST {base}/api/agents/{name}/execute` with
/// `{"message", "timeout"}`.
pub struct HttpAgentExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAgentExecutor {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl AgentExecutor for HttpAgentExecutor {
    async fn execute(
        &self,
        agent_name: &str,
        message: &str,
        timeout: Duration,
    ) -> Result<AgentReply> {
        let url = format!("{}/api/agents/{}/execute", self.base_url, agent_name);
        debug!(agent_name, %url, "dispatching to agent executor");

        let resp = self
            .client
            .post(&url)
            .json(&json!({
                "message": message,
                "timeout": timeout.as_secs(),
            }))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| SchedulerError::Executor(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SchedulerError::Executor(format!(
                "agent executor returned {status}: {body}"
            )));
        }

        resp.json::<AgentReply>()
            .await
            .map_err(|e| SchedulerError::Executor(format!("bad executor response: {e}")))
    }
}

/// Starts a workflow run and returns the foreign execution identifier.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    async fn start(
        &self,
        process_id: &str,
        triggered_by: &str,
        input_data: Value,
        timeout: Duration,
    ) -> Result<String>;
}

/// HTTP implementation: `POST {base}/api/processes/{process_id}/execute`
/// with `{"triggered_by", "input_data"}`.
pub struct HttpWorkflowExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWorkflowExecutor {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[derive(Deserialize)]
struct WorkflowStartResponse {
    execution_id: String,
}

#[async_trait]
impl WorkflowExecutor for HttpWorkflowExecutor {
    async fn start(
        &self,
        process_id: &str,
        triggered_by: &str,
        input_data: Value,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/api/processes/{}/execute", self.base_url, process_id);
        debug!(process_id, %url, "starting workflow execution");

        let resp = self
            .client
            .post(&url)
            .json(&json!({
                "triggered_by": triggered_by,
                "input_data": input_data,
            }))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| SchedulerError::Executor(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SchedulerError::Executor(format!(
                "workflow API returned {status}: {body}"
            )));
        }

        let started: WorkflowStartResponse = resp
            .json()
            .await
            .map_err(|e| SchedulerError::Executor(format!("bad workflow response: {e}")))?;
        Ok(started.execution_id)
    }
}

/// Fire-and-forget start/completion markers for the activity-tracking API.
/// Failures here are logged and never fail the schedule execution itself.
pub struct ActivityRecorder {
    client: reqwest::Client,
    url: Option<String>,
}

impl ActivityRecorder {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub async fn record(&self, kind: &str, payload: Value) {
        let Some(ref url) = self.url else {
            return;
        };
        let body = json!({ "kind": kind, "data": payload });
        let result = self
            .client
            .post(url)
            .json(&body)
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        if let Err(e) = result {
            warn!(kind, error = %e, "activity marker dropped");
        }
    }
}
