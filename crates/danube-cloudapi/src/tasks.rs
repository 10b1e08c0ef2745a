//! Server task status, cancellation, and the polling state machine.
//!
//! Mutating calls return a task identifier; the work itself runs
//! asynchronously on the server. [`wait_for_task`] drives any
//! [`TaskStatusSource`] until the task reaches the target status, fails, or
//! the polling budget runs out. One status query per iteration; query
//! errors propagate immediately since each dispatch already retried
//! throttled attempts underneath.

use crate::client::CloudApi;
use crate::models::CommonParams;
use crate::Result;
use danube_core::envelope::Envelope;
use danube_core::error::{Error, ResultExt};
use danube_core::request::ApiRequest;
use danube_core::Scoped;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Terminal status of a successfully finished task.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Terminal status of a failed task.
pub const STATUS_FAILED: &str = "FAILED";

/// Default pause between two status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const DEFAULT_POLL_ATTEMPTS: u32 = 150;

/// Status query budget for a snapshot.
const SNAPSHOT_ATTEMPTS: u32 = 15;

/// Result payload reported by a finished task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskInfo {
    /// Human-readable outcome message
    #[serde(alias = "Message")]
    pub message: Option<String>,

    /// Process-style return code
    #[serde(alias = "Returncode")]
    pub returncode: Option<i32>,

    /// Additional failure detail
    #[serde(alias = "Detail")]
    pub detail: Option<String>,
}

/// Envelope returned by the task status and cancel endpoints.
pub type TaskResponse = Envelope<TaskInfo>;

/// Options for creating a machine snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateSnapshotOpts {
    /// Common mutating-call parameters
    #[serde(flatten)]
    pub params: CommonParams,

    /// Snapshot only this disk, counted from 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_id: Option<u32>,

    /// Free-form note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Freeze the guest filesystem during the snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_freeze: Option<bool>,
}

impl Scoped for CreateSnapshotOpts {
    fn datacenter(&self) -> Option<&str> {
        self.params.datacenter()
    }

    fn set_datacenter(&mut self, dc: &str) {
        self.params.set_datacenter(dc);
    }
}

/// Anything that can report the status of a task by identifier.
///
/// [`CloudApi`] implements this over the status endpoint; tests substitute
/// a mock to drive the poller through scripted status sequences.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TaskStatusSource: Send + Sync {
    /// Query the current status of `task_id`.
    async fn task_status(&self, task_id: &str) -> Result<TaskResponse>;
}

/// Polling budget and target for [`wait_for_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskWait {
    /// Status that ends the wait successfully
    pub target: String,
    /// Maximum number of status queries
    pub attempts: u32,
    /// Pause between queries
    pub interval: Duration,
}

impl Default for TaskWait {
    fn default() -> Self {
        Self {
            target: STATUS_SUCCESS.to_string(),
            attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl TaskWait {
    /// A wait for `SUCCESS` with the given query budget.
    #[must_use]
    pub fn attempts(attempts: u32) -> Self {
        Self {
            attempts,
            ..Self::default()
        }
    }

    /// A wait for `SUCCESS` sized so `attempts * interval` covers `total`.
    #[must_use]
    pub fn for_duration(total: Duration) -> Self {
        let wait = Self::default();
        let interval = wait.interval.as_millis().max(1);
        let attempts = total.as_millis().div_ceil(interval).max(1);
        Self {
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            ..wait
        }
    }

    /// Override the pause between queries.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the target status.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

/// Poll `source` until `task_id` reaches the target status.
///
/// Returns the task's result payload on success. A `FAILED` status or an
/// exhausted budget yields a typed error naming the task; a query error
/// propagates as-is.
///
/// # Errors
///
/// [`Error::TaskFailed`], [`Error::TaskTimeout`], or any error from the
/// status source.
pub async fn wait_for_task<S>(source: &S, task_id: &str, wait: &TaskWait) -> Result<TaskInfo>
where
    S: TaskStatusSource + ?Sized,
{
    let mut remaining = wait.attempts.max(1);
    loop {
        let response = source.task_status(task_id).await?;
        match response.status.as_deref() {
            Some(status) if status == wait.target => {
                return Ok(response.result.unwrap_or_default());
            }
            Some(STATUS_FAILED) => {
                return Err(Error::TaskFailed {
                    task_id: task_id.to_string(),
                });
            }
            status => {
                debug!(task_id, ?status, remaining, "task not terminal yet");
                remaining -= 1;
                if remaining == 0 {
                    return Err(Error::TaskTimeout {
                        task_id: task_id.to_string(),
                    });
                }
                sleep(wait.interval).await;
            }
        }
    }
}

impl CloudApi {
    /// Query the status of an executed task.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the task is unknown.
    pub async fn get_task_info(&self, task_id: &str) -> Result<TaskResponse> {
        self.core()
            .execute(
                ApiRequest::get(format!("task/{task_id}/status"))
                    .with_accept(&[StatusCode::CREATED, StatusCode::OK]),
            )
            .await
            .op_context(|| format!("failed to get info for task \"{task_id}\""))
    }

    /// List the identifiers of all currently running tasks.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn list_running_tasks(&self) -> Result<Vec<String>> {
        let envelope: Envelope<Vec<String>> = self
            .core()
            .execute(ApiRequest::get("task"))
            .await
            .op_context(|| "failed to get running tasks")?;
        Ok(envelope.into_result())
    }

    /// Cancel a pending or running task.
    ///
    /// A task that already finished reports HTTP 410, which counts as an
    /// accepted outcome.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn cancel_task(&self, task_id: &str, force: bool) -> Result<TaskResponse> {
        self.core()
            .execute(
                ApiRequest::put(format!("task/{task_id}/cancel"), CommonParams::force(force))
                    .with_accept(&[StatusCode::CREATED, StatusCode::OK, StatusCode::GONE]),
            )
            .await
            .op_context(|| format!("failed to cancel task \"{task_id}\""))
    }

    /// Snapshot a machine and wait for the server task to finish.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the snapshot task fails
    /// or times out.
    pub async fn create_snapshot(
        &self,
        machine_id: &str,
        snapshot_name: &str,
        opts: CreateSnapshotOpts,
    ) -> Result<TaskInfo> {
        let context =
            || format!("failed to create snapshot \"{snapshot_name}\" for \"{machine_id}\"");
        let response: TaskResponse = self
            .core()
            .execute(
                ApiRequest::post(format!("vm/{machine_id}/snapshot/{snapshot_name}"), opts)
                    .with_accept(&[StatusCode::CREATED, StatusCode::OK]),
            )
            .await
            .op_context(context)?;

        let task_id = response.task_id.unwrap_or_default();
        wait_for_task(self, &task_id, &TaskWait::attempts(SNAPSHOT_ATTEMPTS))
            .await
            .op_context(context)
    }
}

#[async_trait::async_trait]
impl TaskStatusSource for CloudApi {
    async fn task_status(&self, task_id: &str) -> Result<TaskResponse> {
        self.get_task_info(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn response(status: &str) -> TaskResponse {
        TaskResponse {
            status: Some(status.to_string()),
            ..TaskResponse::default()
        }
    }

    fn quick_wait(attempts: u32) -> TaskWait {
        TaskWait::attempts(attempts).with_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn reaches_target_after_intermediate_statuses() {
        let mut source = MockTaskStatusSource::new();
        let mut seq = Sequence::new();
        for status in ["QUEUED", "RUNNING"] {
            source
                .expect_task_status()
                .with(eq("t-1"))
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| Ok(response(status)));
        }
        source
            .expect_task_status()
            .with(eq("t-1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(TaskResponse {
                    status: Some(STATUS_SUCCESS.to_string()),
                    result: Some(TaskInfo {
                        message: Some("done".to_string()),
                        returncode: Some(0),
                        detail: None,
                    }),
                    ..TaskResponse::default()
                })
            });

        let info = wait_for_task(&source, "t-1", &quick_wait(10)).await.unwrap();
        assert_eq!(info.message.as_deref(), Some("done"));
        assert_eq!(info.returncode, Some(0));
    }

    #[tokio::test]
    async fn failed_status_is_a_task_failure() {
        let mut source = MockTaskStatusSource::new();
        source
            .expect_task_status()
            .times(1)
            .returning(|_| Ok(response(STATUS_FAILED)));

        let err = wait_for_task(&source, "t-2", &quick_wait(10))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::TaskFailed {
                task_id: "t-2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn budget_exhaustion_times_out_after_exact_query_count() {
        let mut source = MockTaskStatusSource::new();
        source
            .expect_task_status()
            .times(3)
            .returning(|_| Ok(response("RUNNING")));

        let err = wait_for_task(&source, "t-3", &quick_wait(3))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::TaskTimeout {
                task_id: "t-3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn query_error_propagates_immediately() {
        let mut source = MockTaskStatusSource::new();
        source
            .expect_task_status()
            .times(1)
            .returning(|_| Err(Error::HttpError("connection reset".to_string())));

        let err = wait_for_task(&source, "t-4", &quick_wait(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HttpError(_)));
    }

    #[tokio::test]
    async fn missing_result_on_success_yields_default_info() {
        let mut source = MockTaskStatusSource::new();
        source
            .expect_task_status()
            .times(1)
            .returning(|_| Ok(response(STATUS_SUCCESS)));

        let info = wait_for_task(&source, "t-5", &quick_wait(1)).await.unwrap();
        assert_eq!(info, TaskInfo::default());
    }

    #[tokio::test]
    async fn create_snapshot_drives_the_returned_task() {
        use serde_json::json;
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vm/web01/snapshot/nightly/"))
            .and(body_json(json!({"note": "pre-upgrade"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "Status": "PENDING", "Task_id": "t-7"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/task/t-7/status/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Status": "SUCCESS", "Result": {"message": "snapshot created", "returncode": 0}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = danube_core::DanubeConfig::new(server.uri(), "test-key").unwrap();
        config.max_requests_per_minute = 6000;
        let api = CloudApi::new(config).unwrap();

        let opts = CreateSnapshotOpts {
            note: Some("pre-upgrade".to_string()),
            ..CreateSnapshotOpts::default()
        };
        let info = api.create_snapshot("web01", "nightly", opts).await.unwrap();
        assert_eq!(info.message.as_deref(), Some("snapshot created"));
    }

    #[test]
    fn for_duration_rounds_up_and_never_zero() {
        let wait = TaskWait::for_duration(Duration::from_secs(300));
        assert_eq!(wait.attempts, 150);

        let wait = TaskWait::for_duration(Duration::from_secs(3));
        assert_eq!(wait.attempts, 2);

        let wait = TaskWait::for_duration(Duration::ZERO);
        assert_eq!(wait.attempts, 1);
    }
}
