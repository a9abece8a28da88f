use std::{collections::BTreeMap, time::Duration};

use anyhow::bail;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Shown in place of a status reason the backend did not report.
pub const MISSING_STATUS_REASON: &str = "n/a";

/// AWS Batch job description as saved by `get-error`. Carries the fields
/// that matter when debugging a failed task, including every attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub job_id: String,
    pub job_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_definition: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<i64>,
    /// Always written, an empty list means the job never ran.
    #[serde(default)]
    pub attempts: Vec<AttemptInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_strategy: Option<RetryStrategyInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<JobDependencyInfo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub container: ContainerInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_requirements: Vec<ResourceRequirementInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_stream_name: Option<String>,
}

/// One run of the job. Retried jobs have several.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptInfo {
    #[serde(default)]
    pub container: AttemptContainerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptContainerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_stream_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStrategyInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDependencyInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// `VCPU`, `MEMORY` or `GPU` with its value as AWS reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirementInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub name: String,
    pub value: String,
}

impl BatchJob {
    /// Run time of the job, if it has both started and stopped.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.stopped_at) {
            (Some(started), Some(stopped)) if stopped >= started => {
                Some(Duration::from_millis((stopped - started) as u64))
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// Milliseconds since the epoch.
    pub timestamp: Option<i64>,
    pub message: String,
}

/// Contents of one log stream, in the order the backend returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogContents {
    pub events: Vec<LogEvent>,
}

impl LogContents {
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|e| e.message.as_str())
    }

    pub fn to_text(&self) -> String {
        self.messages().join("\n")
    }
}

/// Compute and log backend the inspector queries.
#[async_trait::async_trait]
pub trait JobBackend {
    async fn describe_jobs(&self, job_id: &str)
        -> anyhow::Result<Vec<BatchJob>>;

    async fn get_log_events(
        &self,
        log_stream_name: &str,
    ) -> anyhow::Result<Vec<LogEvent>>;
}

/// Describes a single job. A job the backend no longer knows about is an
/// error: AWS Batch only keeps finished jobs for a limited time.
#[tracing::instrument(level = "debug", skip(backend))]
pub async fn describe_job(
    backend: &impl JobBackend,
    job_id: &str,
) -> anyhow::Result<BatchJob> {
    let Some(job) = backend.describe_jobs(job_id).await?.into_iter().next()
    else {
        bail!(
            "AWS Batch Job ID {job_id} returned nothing. Maybe the job data \
             has been erased?"
        );
    };
    Ok(job)
}

pub fn log_stream_name(job: &BatchJob) -> Option<&str> {
    job.container.log_stream_name.as_deref()
}

/// Returns `(status, status reason, container reason)`.
pub fn job_status(job: &BatchJob) -> (&str, &str, &str) {
    (
        job.status.as_str(),
        job.status_reason.as_deref().unwrap_or(MISSING_STATUS_REASON),
        job.container.reason.as_deref().unwrap_or_default(),
    )
}

#[tracing::instrument(level = "debug", skip(backend))]
pub async fn fetch_log_contents(
    backend: &impl JobBackend,
    log_stream_name: &str,
) -> anyhow::Result<LogContents> {
    Ok(LogContents {
        events: backend.get_log_events(log_stream_name).await?,
    })
}

#[cfg(test)]
pub(crate) mod fake {
    use std::{collections::HashMap, sync::Mutex};

    use super::{
        AttemptContainerInfo, AttemptInfo, BatchJob, ContainerInfo, JobBackend,
        KeyValue, LogEvent, ResourceRequirementInfo, RetryStrategyInfo,
    };

    /// In-memory backend recording the order of calls made against it.
    #[derive(Default)]
    pub struct FakeBackend {
        pub jobs: HashMap<String, BatchJob>,
        pub logs: HashMap<String, Vec<LogEvent>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        pub fn with_job(mut self, job: BatchJob) -> Self {
            self.jobs.insert(job.job_id.clone(), job);
            self
        }

        pub fn with_log(mut self, stream: &str, messages: &[&str]) -> Self {
            self.logs.insert(
                stream.to_string(),
                messages
                    .iter()
                    .enumerate()
                    .map(|(i, m)| LogEvent {
                        timestamp: Some(1_700_000_000_000 + i as i64),
                        message: m.to_string(),
                    })
                    .collect(),
            );
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl JobBackend for FakeBackend {
        async fn describe_jobs(
            &self,
            job_id: &str,
        ) -> anyhow::Result<Vec<BatchJob>> {
            self.calls.lock().unwrap().push(format!("describe:{job_id}"));
            Ok(self.jobs.get(job_id).cloned().into_iter().collect())
        }

        async fn get_log_events(
            &self,
            log_stream_name: &str,
        ) -> anyhow::Result<Vec<LogEvent>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("logs:{log_stream_name}"));
            Ok(self.logs.get(log_stream_name).cloned().unwrap_or_default())
        }
    }

    pub fn failed_job(job_id: &str, job_name: &str) -> BatchJob {
        let log_stream = format!("{job_name}/default/abc");
        BatchJob {
            job_id: job_id.to_string(),
            job_name: job_name.to_string(),
            status: "FAILED".to_string(),
            status_reason: Some("Essential container in task exited".into()),
            started_at: Some(1_700_000_000_000),
            stopped_at: Some(1_700_000_090_000),
            attempts: vec![AttemptInfo {
                container: AttemptContainerInfo {
                    exit_code: Some(137),
                    reason: Some("OutOfMemoryError: Container killed".into()),
                    log_stream_name: Some(log_stream.clone()),
                },
                started_at: Some(1_700_000_000_000),
                stopped_at: Some(1_700_000_090_000),
                status_reason: Some(
                    "Essential container in task exited".into(),
                ),
            }],
            retry_strategy: Some(RetryStrategyInfo { attempts: Some(1) }),
            parameters: [("sample".to_string(), "S1".to_string())].into(),
            container: ContainerInfo {
                vcpus: Some(4),
                resource_requirements: vec![ResourceRequirementInfo {
                    kind: "MEMORY".into(),
                    value: "8000".into(),
                }],
                environment: vec![KeyValue {
                    name: "SAMPLE".into(),
                    value: "S1".into(),
                }],
                exit_code: Some(137),
                reason: Some("OutOfMemoryError: Container killed".into()),
                log_stream_name: Some(log_stream),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[test]
fn job_status_defaults_missing_reasons() {
    let job = BatchJob {
        job_id: "job-1".into(),
        status: "RUNNABLE".into(),
        ..Default::default()
    };
    assert_eq!(job_status(&job), ("RUNNABLE", "n/a", ""));
    assert_eq!(log_stream_name(&job), None);
    assert_eq!(job.duration(), None);
}

#[test]
fn job_status_passes_backend_values_through() {
    let job = fake::failed_job("job-1", "Sharp_Count");
    assert_eq!(
        job_status(&job),
        (
            "FAILED",
            "Essential container in task exited",
            "OutOfMemoryError: Container killed"
        )
    );
    assert_eq!(log_stream_name(&job), Some("Sharp_Count/default/abc"));
    assert_eq!(job.duration(), Some(Duration::from_secs(90)));
}

#[tokio::test]
async fn describe_purged_job_fails_with_job_id() {
    let backend = fake::FakeBackend::default();
    let err = describe_job(&backend, "job-gone").await.unwrap_err();
    assert!(err.to_string().contains("job-gone"), "{err}");
}

#[tokio::test]
async fn log_contents_keep_backend_order() -> anyhow::Result<()> {
    let backend = fake::FakeBackend::default().with_log(
        "stream-1",
        &["starting", "processing", "exit 1"],
    );
    let contents = fetch_log_contents(&backend, "stream-1").await?;
    assert_eq!(
        contents.messages().collect::<Vec<_>>(),
        vec!["starting", "processing", "exit 1"]
    );
    assert_eq!(contents.to_text(), "starting\nprocessing\nexit 1");
    Ok(())
}

#[test]
fn batch_job_json_uses_camel_case() -> anyhow::Result<()> {
    let job = fake::failed_job("job-1", "Sharp_Count");
    let json = serde_json::to_value(&job)?;
    assert_eq!(json["jobId"], "job-1");
    assert_eq!(json["statusReason"], "Essential container in task exited");
    assert_eq!(json["container"]["logStreamName"], "Sharp_Count/default/abc");
    assert_eq!(json["container"]["exitCode"], 137);
    assert_eq!(json["container"]["vcpus"], 4);
    assert_eq!(json["container"]["resourceRequirements"][0]["type"], "MEMORY");
    assert_eq!(json["container"]["resourceRequirements"][0]["value"], "8000");
    assert_eq!(json["container"]["environment"][0]["name"], "SAMPLE");
    assert_eq!(json["parameters"]["sample"], "S1");
    assert_eq!(json["retryStrategy"]["attempts"], 1);

    let attempt = &json["attempts"][0];
    assert_eq!(attempt["container"]["exitCode"], 137);
    assert_eq!(
        attempt["container"]["reason"],
        "OutOfMemoryError: Container killed"
    );
    assert_eq!(
        attempt["container"]["logStreamName"],
        "Sharp_Count/default/abc"
    );
    assert_eq!(attempt["startedAt"], 1_700_000_000_000_i64);
    assert_eq!(attempt["stoppedAt"], 1_700_000_090_000_i64);
    assert_eq!(attempt["statusReason"], "Essential container in task exited");

    assert!(json.get("jobQueue").is_none());
    assert!(json.get("dependsOn").is_none());
    Ok(())
}

#[test]
fn never_run_job_still_has_attempts_key() -> anyhow::Result<()> {
    let job = BatchJob {
        job_id: "job-2".into(),
        status: "SUBMITTED".into(),
        ..Default::default()
    };
    let json = serde_json::to_value(&job)?;
    assert_eq!(json["attempts"], serde_json::json!([]));
    assert!(json["container"].get("environment").is_none());
    Ok(())
}
