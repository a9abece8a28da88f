use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use duration_str::HumanFormat;

use crate::{
    cromwell::{
        failures::{find_failures, FailedCall},
        metadata::WorkflowMetadata,
        task_path::{resolve_job_id, TaskPath},
    },
    inspect::{
        describe_job, fetch_log_contents, job_status, log_stream_name,
        BatchJob, JobBackend, LogContents,
    },
};

pub const DEFAULT_ERRORS_DIR: &str = "errors";
const NOT_AVAILABLE: &str = "N/A";
const IND: &str = "    ";

/// Report on every failed task of a workflow, saving each job description
/// as JSON.
#[derive(Debug, bon::Builder)]
pub struct GetError<'a> {
    pub metadata: &'a WorkflowMetadata,
    /// Directory for the job descriptions. Defaults to `errors`.
    pub out_dir: Option<&'a Path>,
}

impl<'a> GetError<'a> {
    pub async fn run_with(
        self,
        backend: &impl JobBackend,
    ) -> anyhow::Result<ErrorReport> {
        report_errors(self, backend).await
    }
}

#[derive(Debug)]
pub enum ErrorReport {
    NoError,
    Failures(Vec<ReportedFailure>),
}

#[derive(Debug)]
pub struct ReportedFailure {
    pub task_name: String,
    pub job_id: Option<String>,
    pub saved_to: Option<PathBuf>,
}

/// Report on a single task: its job status and the full log.
#[derive(Debug, bon::Builder)]
pub struct GetLog<'a> {
    pub metadata: &'a WorkflowMetadata,
    pub task: &'a TaskPath,
    /// Prefix each log line with its local time.
    #[builder(default)]
    pub timestamps: bool,
}

impl<'a> GetLog<'a> {
    pub async fn run_with(
        self,
        backend: &impl JobBackend,
    ) -> anyhow::Result<LogReport> {
        report_log(self, backend).await
    }
}

#[derive(Debug)]
pub struct LogReport {
    pub job_id: String,
    pub job: BatchJob,
    pub contents: Option<LogContents>,
}

pub fn error_file_name(job_id: &str, job_name: &str) -> String {
    format!("{job_id}-{job_name}.json")
}

#[tracing::instrument(level = "info", skip_all)]
async fn report_errors(
    args: GetError<'_>,
    backend: &impl JobBackend,
) -> anyhow::Result<ErrorReport> {
    tracing::info!(
        id = ?args.metadata.id,
        name = ?args.metadata.workflow_name,
        status = %args.metadata.status,
        "Inspecting workflow."
    );
    if !args.metadata.is_failed() {
        println!("There is no error.");
        return Ok(ErrorReport::NoError);
    }

    let out_dir = args.out_dir.unwrap_or(Path::new(DEFAULT_ERRORS_DIR));
    tokio::fs::create_dir_all(out_dir).await.with_context(|| {
        format!("Could not create output directory: {}", out_dir.display())
    })?;

    let failed = find_failures(&args.metadata.calls)?;
    if failed.is_empty() {
        tracing::warn!("Workflow failed but no failed task attempt was found.");
    }

    let mut reported = Vec::with_capacity(failed.len());

    for call in failed {
        println!("Task: {}", call_label(&call));
        for msg in call.attempt.root_cause_messages() {
            println!("{IND}{msg}");
        }

        let Some(job_id) = call.job_id() else {
            tracing::warn!(task = call.task_name, "Failed call has no job ID.");
            println!("AWS Batch Job ID: {NOT_AVAILABLE}");
            println!();
            reported.push(ReportedFailure {
                task_name: call.task_name.to_string(),
                job_id: None,
                saved_to: None,
            });
            continue;
        };

        let job = describe_job(backend, job_id).await?;
        println!("Job Name: {}", job.job_name);
        println!(
            "AWS Batch Log Stream Name: {}",
            log_stream_name(&job).unwrap_or(NOT_AVAILABLE)
        );
        print_status(&job);

        let path = out_dir.join(error_file_name(job_id, &job.job_name));
        tokio::fs::write(&path, serde_json::to_string_pretty(&job)?)
            .await
            .with_context(|| format!("Could not write {}", path.display()))?;
        tracing::info!("Wrote job description to: {}", path.display());
        println!();

        reported.push(ReportedFailure {
            task_name: call.task_name.to_string(),
            job_id: Some(job_id.to_string()),
            saved_to: Some(path),
        });
    }

    Ok(ErrorReport::Failures(reported))
}

#[tracing::instrument(level = "info", skip_all, fields(task = %args.task))]
async fn report_log(
    args: GetLog<'_>,
    backend: &impl JobBackend,
) -> anyhow::Result<LogReport> {
    let job_id = resolve_job_id(args.metadata, args.task)?;
    println!("AWS Batch Job ID: {job_id}");

    let job = describe_job(backend, job_id).await?;
    let stream = log_stream_name(&job);
    println!(
        "AWS Batch Log Stream Name: {}",
        stream.unwrap_or(NOT_AVAILABLE)
    );
    print_status(&job);

    let contents = match stream {
        Some(stream) => {
            let contents = fetch_log_contents(backend, stream).await?;
            print_log(&contents, args.timestamps);
            Some(contents)
        },
        None => {
            tracing::info!("Job has no log stream; it may never have started.");
            None
        },
    };

    Ok(LogReport {
        job_id: job_id.to_string(),
        job,
        contents,
    })
}

fn call_label(call: &FailedCall) -> String {
    let mut label = call.task_name.to_string();
    if let Some(parent) = call.parent {
        label.push_str(&format!(" (in {parent})"));
    }
    if let Some(shard) = call.attempt.shard() {
        label.push_str(&format!(", shard {shard}"));
    }
    if let Some(attempt) = call.attempt.attempt {
        label.push_str(&format!(", attempt {attempt}"));
    }
    label
}

fn print_status(job: &BatchJob) {
    let (status, status_reason, container_reason) = job_status(job);
    println!("Container Status: {status} - {status_reason}");
    println!("{container_reason}");
    if let Some(d) = job.duration() {
        println!("Duration: {}", d.human_format());
    }
}

fn print_log(contents: &LogContents, timestamps: bool) {
    if !timestamps {
        if !contents.events.is_empty() {
            println!("{}", contents.to_text());
        }
        return;
    }
    for event in &contents.events {
        let time = event
            .timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        match time {
            Some(t) => {
                let local: DateTime<Local> = DateTime::from(t);
                println!("{} {}", local.format("%F %T%.3f"), event.message)
            },
            None => println!("{}", event.message),
        }
    }
}

#[cfg(test)]
use crate::inspect::fake::{failed_job, FakeBackend};

#[cfg(test)]
fn temp_out_dir() -> PathBuf {
    std::env::temp_dir()
        .join(format!("cromlog-errors-{}", uuid::Uuid::new_v4()))
}

#[cfg(test)]
fn parse_metadata(json: &str) -> WorkflowMetadata {
    serde_json::from_str(json).expect("invalid test metadata")
}

#[tokio::test]
async fn get_error_stops_when_workflow_did_not_fail() -> anyhow::Result<()> {
    let metadata = parse_metadata(
        r#"{"status": "Succeeded", "calls": {
            "Wf.Task": [{"executionStatus": "Failed", "jobId": "job-1"}]
        }}"#,
    );
    let backend = FakeBackend::default().with_job(failed_job("job-1", "t"));
    let out_dir = temp_out_dir();

    let report = GetError::builder()
        .metadata(&metadata)
        .out_dir(out_dir.as_path())
        .build()
        .run_with(&backend)
        .await?;

    assert!(matches!(report, ErrorReport::NoError));
    assert!(backend.calls().is_empty());
    assert!(!out_dir.exists());
    Ok(())
}

#[tokio::test]
async fn get_error_writes_job_description() -> anyhow::Result<()> {
    let metadata = parse_metadata(
        r#"{"status":"Failed","calls":{"Wf.Task":[{"executionStatus":"Failed","jobId":"job-1"}]}}"#,
    );
    let backend =
        FakeBackend::default().with_job(failed_job("job-1", "Wf_Task"));
    let out_dir = temp_out_dir();

    let report = GetError::builder()
        .metadata(&metadata)
        .out_dir(out_dir.as_path())
        .build()
        .run_with(&backend)
        .await?;

    let ErrorReport::Failures(failures) = report else {
        panic!("expected failures");
    };
    assert_eq!(failures.len(), 1);
    let expected_path = out_dir.join("job-1-Wf_Task.json");
    assert_eq!(failures[0].saved_to.as_deref(), Some(expected_path.as_path()));

    let text = std::fs::read_to_string(&expected_path)?;
    let saved: BatchJob = serde_json::from_str(&text)?;
    assert_eq!(saved, failed_job("job-1", "Wf_Task"));
    let raw: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(raw["attempts"][0]["container"]["exitCode"], 137);
    assert_eq!(raw["container"]["environment"][0]["value"], "S1");
    assert_eq!(backend.calls(), vec!["describe:job-1"]);

    std::fs::remove_dir_all(&out_dir)?;
    Ok(())
}

#[tokio::test]
async fn get_error_inspects_jobs_in_walk_order() -> anyhow::Result<()> {
    let metadata = parse_metadata(
        r#"{"status": "Failed", "calls": {
            "Wf.Sub": [{
                "executionStatus": "Failed",
                "subWorkflowMetadata": {"status": "Failed", "calls": {
                    "Sub.B": [{"executionStatus": "Failed", "jobId": "job-b"}]
                }}
            }],
            "Wf.NoJob": [{
                "executionStatus": "Failed",
                "failures": [{"message": "Could not submit job"}]
            }],
            "Wf.A": [{"executionStatus": "Failed", "jobId": "job-a"}]
        }}"#,
    );
    let backend = FakeBackend::default()
        .with_job(failed_job("job-a", "a"))
        .with_job(failed_job("job-b", "b"));
    let out_dir = temp_out_dir();

    let report = GetError::builder()
        .metadata(&metadata)
        .out_dir(out_dir.as_path())
        .build()
        .run_with(&backend)
        .await?;

    assert_eq!(backend.calls(), vec!["describe:job-b", "describe:job-a"]);
    let ErrorReport::Failures(failures) = report else {
        panic!("expected failures");
    };
    let tasks = failures
        .iter()
        .map(|f| (f.task_name.as_str(), f.job_id.as_deref()))
        .collect::<Vec<_>>();
    assert_eq!(
        tasks,
        vec![
            ("Sub.B", Some("job-b")),
            ("Wf.NoJob", None),
            ("Wf.A", Some("job-a")),
        ]
    );
    assert!(failures[1].saved_to.is_none());
    assert!(out_dir.join("job-a-a.json").exists());
    assert!(out_dir.join("job-b-b.json").exists());

    std::fs::remove_dir_all(&out_dir)?;
    Ok(())
}

#[tokio::test]
async fn get_error_fails_on_purged_job() {
    let metadata = parse_metadata(
        r#"{"status": "Failed", "calls": {
            "Wf.Task": [{"executionStatus": "Failed", "jobId": "job-old"}]
        }}"#,
    );
    let out_dir = temp_out_dir();

    let err = GetError::builder()
        .metadata(&metadata)
        .out_dir(out_dir.as_path())
        .build()
        .run_with(&FakeBackend::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("job-old"), "{err}");
    let _ = std::fs::remove_dir_all(&out_dir);
}

#[tokio::test]
async fn get_log_resolves_nested_task() -> anyhow::Result<()> {
    let metadata = parse_metadata(
        r#"{"status": "Failed", "calls": {
            "Wf.Sub": [{
                "executionStatus": "Failed",
                "subWorkflowMetadata": {"status": "Failed", "calls": {
                    "Sub.Task": [{"executionStatus": "Failed", "jobId": "job-7"}]
                }}
            }]
        }}"#,
    );
    let job = failed_job("job-7", "Sub_Task");
    let stream = job.container.log_stream_name.clone().unwrap();
    let backend = FakeBackend::default()
        .with_job(job)
        .with_log(&stream, &["reading input", "Killed"]);
    let task = TaskPath::parse("Wf.Sub.Task").map_err(anyhow::Error::msg)?;

    let report = GetLog::builder()
        .metadata(&metadata)
        .task(&task)
        .timestamps(true)
        .build()
        .run_with(&backend)
        .await?;

    assert_eq!(report.job_id, "job-7");
    assert_eq!(
        report.contents.map(|c| c.to_text()).as_deref(),
        Some("reading input\nKilled")
    );
    assert_eq!(
        backend.calls(),
        vec!["describe:job-7".to_string(), format!("logs:{stream}")]
    );
    Ok(())
}

#[tokio::test]
async fn get_log_skips_logs_without_stream() -> anyhow::Result<()> {
    let metadata = parse_metadata(
        r#"{"status": "Running", "calls": {
            "Wf.Task": [{"executionStatus": "Starting", "jobId": "job-2"}]
        }}"#,
    );
    let mut job = failed_job("job-2", "Wf_Task");
    job.container.log_stream_name = None;
    let backend = FakeBackend::default().with_job(job);
    let task = TaskPath::parse("Wf.Task").map_err(anyhow::Error::msg)?;

    let report = GetLog::builder()
        .metadata(&metadata)
        .task(&task)
        .build()
        .run_with(&backend)
        .await?;

    assert!(report.contents.is_none());
    assert_eq!(backend.calls(), vec!["describe:job-2"]);
    Ok(())
}
