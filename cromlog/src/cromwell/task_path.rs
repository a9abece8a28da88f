use std::fmt;

use anyhow::{anyhow, bail};

use super::metadata::{CallAttempt, Calls, WorkflowMetadata};

/// Largest edit distance for which an unknown call name gets a suggestion.
const SUGGESTION_MAX_DISTANCE: usize = 4;

/// Dotted path to a task, either directly in the root workflow
/// (`Workflow.Task`) or one sub-workflow down (`Workflow.SubWorkflow.Task`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPath {
    Task {
        workflow: Box<str>,
        task: Box<str>,
    },
    SubWorkflowTask {
        workflow: Box<str>,
        sub_workflow: Box<str>,
        task: Box<str>,
    },
}

impl TaskPath {
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts = s.split('.').collect::<Vec<_>>();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(format!("Invalid task name `{s}`: empty component"));
        }
        match parts.as_slice() {
            [workflow, task] => Ok(TaskPath::Task {
                workflow: (*workflow).into(),
                task: (*task).into(),
            }),
            [workflow, sub_workflow, task] => Ok(TaskPath::SubWorkflowTask {
                workflow: (*workflow).into(),
                sub_workflow: (*sub_workflow).into(),
                task: (*task).into(),
            }),
            _ => Err(format!(
                "Invalid task name `{s}`: expected `Workflow.Task` or \
                 `Workflow.SubWorkflow.Task`, got {} components",
                parts.len()
            )),
        }
    }

    /// Name of the call in the root workflow's `calls`.
    pub fn root_call_name(&self) -> String {
        match self {
            TaskPath::Task { workflow, task } => format!("{workflow}.{task}"),
            TaskPath::SubWorkflowTask {
                workflow,
                sub_workflow,
                ..
            } => format!("{workflow}.{sub_workflow}"),
        }
    }

    /// Name of the call inside the sub-workflow, if the path has one.
    pub fn sub_call_name(&self) -> Option<String> {
        match self {
            TaskPath::Task { .. } => None,
            TaskPath::SubWorkflowTask {
                sub_workflow, task, ..
            } => Some(format!("{sub_workflow}.{task}")),
        }
    }
}

impl fmt::Display for TaskPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPath::Task { workflow, task } => write!(f, "{workflow}.{task}"),
            TaskPath::SubWorkflowTask {
                workflow,
                sub_workflow,
                task,
            } => write!(f, "{workflow}.{sub_workflow}.{task}"),
        }
    }
}

/// Looks up the AWS Batch job ID behind the first attempt of `path`.
#[tracing::instrument(level = "debug", skip_all, fields(path = %path))]
pub fn resolve_job_id<'a>(
    metadata: &'a WorkflowMetadata,
    path: &TaskPath,
) -> anyhow::Result<&'a str> {
    let root_call = path.root_call_name();
    let mut attempt = first_attempt(&metadata.calls, &root_call)?;

    if let Some(sub_call) = path.sub_call_name() {
        let sub = attempt.sub_workflow_metadata.as_deref().ok_or_else(|| {
            anyhow!("Call `{root_call}` is not a sub-workflow")
        })?;
        attempt = first_attempt(&sub.calls, &sub_call)?;
    }

    let job_id = attempt
        .job_id
        .as_deref()
        .ok_or_else(|| anyhow!("Task `{path}` has no AWS Batch job ID"))?;
    tracing::debug!(job_id, "Resolved job ID.");

    Ok(job_id)
}

fn first_attempt<'a>(
    calls: &'a Calls,
    name: &str,
) -> anyhow::Result<&'a CallAttempt> {
    let Some(attempts) = calls.get(name) else {
        match closest_call_name(calls, name) {
            Some(s) => bail!("Call `{name}` not found. Did you mean `{s}`?"),
            None => bail!("Call `{name}` not found"),
        }
    };
    attempts
        .first()
        .ok_or_else(|| anyhow!("Call `{name}` has no attempts"))
}

fn closest_call_name<'a>(calls: &'a Calls, name: &str) -> Option<&'a str> {
    calls
        .names()
        .map(|n| (edit_distance::edit_distance(n, name), n))
        .filter(|(d, _)| *d <= SUGGESTION_MAX_DISTANCE)
        .min_by_key(|(d, _)| *d)
        .map(|(_, n)| n)
}

#[cfg(test)]
fn parse_metadata(json: &str) -> WorkflowMetadata {
    serde_json::from_str(json).expect("invalid test metadata")
}

#[test]
fn parse_task_path_test() {
    assert_eq!(
        TaskPath::parse("Sharp.CiteSeqCount").unwrap(),
        TaskPath::Task {
            workflow: "Sharp".into(),
            task: "CiteSeqCount".into()
        }
    );
    let nested = TaskPath::parse("Sharp.Preprocess.CiteSeqCount").unwrap();
    assert_eq!(nested.root_call_name(), "Sharp.Preprocess");
    assert_eq!(
        nested.sub_call_name().as_deref(),
        Some("Preprocess.CiteSeqCount")
    );
    assert_eq!(nested.to_string(), "Sharp.Preprocess.CiteSeqCount");

    assert!(TaskPath::parse("Sharp").is_err());
    assert!(TaskPath::parse("A.B.C.D").is_err());
    assert!(TaskPath::parse("A..C").is_err());
    assert!(TaskPath::parse("").is_err());
}

#[test]
fn resolve_two_component_path() -> anyhow::Result<()> {
    let metadata = parse_metadata(
        r#"{"status": "Failed", "calls": {
            "Wf.Task": [
                {"executionStatus": "Failed", "jobId": "job-1"},
                {"executionStatus": "Done", "jobId": "job-2"}
            ]
        }}"#,
    );
    let path = TaskPath::parse("Wf.Task").map_err(|e| anyhow!(e))?;
    assert_eq!(resolve_job_id(&metadata, &path)?, "job-1");
    Ok(())
}

#[test]
fn resolve_three_component_path() -> anyhow::Result<()> {
    let metadata = parse_metadata(
        r#"{"status": "Failed", "calls": {
            "Wf.Other": [{"executionStatus": "Done", "jobId": "job-3"}],
            "Wf.Sub": [{
                "executionStatus": "Failed",
                "subWorkflowMetadata": {"status": "Failed", "calls": {
                    "Sub.Task": [{"executionStatus": "Failed", "jobId": "job-7"}]
                }}
            }]
        }}"#,
    );
    let path = TaskPath::parse("Wf.Sub.Task").map_err(|e| anyhow!(e))?;
    assert_eq!(resolve_job_id(&metadata, &path)?, "job-7");
    Ok(())
}

#[test]
fn resolve_reports_missing_pieces() {
    let metadata = parse_metadata(
        r#"{"status": "Failed", "calls": {
            "Wf.Align": [{"executionStatus": "Done", "jobId": "job-1"}],
            "Wf.Pending": [{"executionStatus": "NotStarted"}],
            "Wf.Empty": []
        }}"#,
    );
    let resolve = |p: &str| {
        resolve_job_id(&metadata, &TaskPath::parse(p).unwrap())
            .unwrap_err()
            .to_string()
    };

    assert_eq!(
        resolve("Wf.Alig"),
        "Call `Wf.Alig` not found. Did you mean `Wf.Align`?"
    );
    assert_eq!(
        resolve("Wf.Completely.Different"),
        "Call `Wf.Completely` not found"
    );
    assert_eq!(resolve("Wf.Empty"), "Call `Wf.Empty` has no attempts");
    assert_eq!(
        resolve("Wf.Pending"),
        "Task `Wf.Pending` has no AWS Batch job ID"
    );
    assert_eq!(
        resolve("Wf.Align.Task"),
        "Call `Wf.Align` is not a sub-workflow"
    );
}
