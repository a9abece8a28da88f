use anyhow::bail;

use super::metadata::{CallAttempt, Calls, ExecutionStatus};

/// Sub-workflow nesting deeper than this is treated as a malformed document.
pub const MAX_SUBWORKFLOW_DEPTH: usize = 32;

/// A leaf call attempt that failed.
#[derive(Debug, Clone, Copy)]
pub struct FailedCall<'a> {
    pub task_name: &'a str,
    /// The sub-workflow call this task was found under, if any.
    pub parent: Option<&'a str>,
    pub attempt: &'a CallAttempt,
}

impl<'a> FailedCall<'a> {
    pub fn job_id(&self) -> Option<&'a str> { self.attempt.job_id.as_deref() }
}

/// Collects every failed leaf attempt, descending into sub-workflows. The
/// result follows the order of calls in the document, then attempt order.
pub fn find_failures(calls: &Calls) -> anyhow::Result<Vec<FailedCall<'_>>> {
    let mut failed = vec![];
    walk_calls(calls, None, 0, &mut failed)?;
    tracing::debug!(count = failed.len(), "Collected failed calls.");
    Ok(failed)
}

fn walk_calls<'a>(
    calls: &'a Calls,
    parent: Option<&'a str>,
    depth: usize,
    failed: &mut Vec<FailedCall<'a>>,
) -> anyhow::Result<()> {
    if depth > MAX_SUBWORKFLOW_DEPTH {
        bail!(
            "Sub-workflow nesting under `{}` exceeds {MAX_SUBWORKFLOW_DEPTH} \
             levels",
            parent.unwrap_or("root")
        );
    }

    for (task_name, attempts) in calls.iter() {
        for attempt in attempts {
            if let Some(sub) = &attempt.sub_workflow_metadata {
                tracing::trace!(
                    call = task_name,
                    depth,
                    "Entering sub-workflow."
                );
                walk_calls(&sub.calls, Some(task_name), depth + 1, failed)?;
            } else if attempt.execution_status == ExecutionStatus::Failed {
                failed.push(FailedCall {
                    task_name,
                    parent,
                    attempt,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
use super::metadata::WorkflowMetadata;

#[test]
fn failures_follow_document_order() -> anyhow::Result<()> {
    let metadata: WorkflowMetadata = serde_json::from_str(
        r#"{"status": "Failed", "calls": {
            "Sharp.Count": [
                {"executionStatus": "Failed", "jobId": "job-1"},
                {"executionStatus": "Failed", "jobId": "job-2"}
            ],
            "Sharp.Preprocess": [{
                "executionStatus": "Failed",
                "subWorkflowMetadata": {"status": "Failed", "calls": {
                    "Preprocess.Whitelist": [
                        {"executionStatus": "Done", "jobId": "job-3"}
                    ],
                    "Preprocess.Trim": [
                        {"executionStatus": "Failed", "jobId": "job-4"}
                    ]
                }}
            }],
            "Sharp.Report": [{"executionStatus": "Done", "jobId": "job-5"}],
            "Sharp.Merge": [{"executionStatus": "Failed", "jobId": "job-6"}]
        }}"#,
    )?;

    let failed = find_failures(&metadata.calls)?;
    let found = failed
        .iter()
        .map(|f| (f.task_name, f.parent, f.job_id()))
        .collect::<Vec<_>>();

    assert_eq!(
        found,
        vec![
            ("Sharp.Count", None, Some("job-1")),
            ("Sharp.Count", None, Some("job-2")),
            ("Preprocess.Trim", Some("Sharp.Preprocess"), Some("job-4")),
            ("Sharp.Merge", None, Some("job-6")),
        ]
    );
    Ok(())
}

#[test]
fn failed_sub_workflow_call_is_not_a_leaf() -> anyhow::Result<()> {
    let metadata: WorkflowMetadata = serde_json::from_str(
        r#"{"status": "Failed", "calls": {
            "Wf.Sub": [{
                "executionStatus": "Failed",
                "jobId": "should-not-appear",
                "subWorkflowMetadata": {"status": "Failed", "calls": {
                    "Sub.Inner": [{
                        "executionStatus": "Failed",
                        "subWorkflowMetadata": {"status": "Failed", "calls": {
                            "Inner.Leaf": [
                                {"executionStatus": "Failed", "jobId": "job-9"}
                            ]
                        }}
                    }]
                }}
            }],
            "Wf.NoJob": [{"executionStatus": "Failed"}]
        }}"#,
    )?;

    let failed = find_failures(&metadata.calls)?;
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].task_name, "Inner.Leaf");
    assert_eq!(failed[0].parent, Some("Sub.Inner"));
    assert_eq!(failed[0].job_id(), Some("job-9"));
    assert_eq!(failed[1].task_name, "Wf.NoJob");
    assert_eq!(failed[1].job_id(), None);
    Ok(())
}

#[test]
fn no_failed_leaves_yields_nothing() -> anyhow::Result<()> {
    let metadata: WorkflowMetadata = serde_json::from_str(
        r#"{"status": "Failed", "calls": {
            "Wf.A": [{"executionStatus": "Done", "jobId": "job-1"}],
            "Wf.B": [{"executionStatus": "RetryableFailure", "jobId": "job-2"}]
        }}"#,
    )?;
    assert!(find_failures(&metadata.calls)?.is_empty());
    Ok(())
}

#[test]
fn nesting_beyond_limit_is_rejected() {
    let leaf = CallAttempt {
        execution_status: ExecutionStatus::Failed,
        job_id: Some("job-deep".to_string()),
        ..Default::default()
    };
    let mut calls: Calls = [("Deep.Leaf".to_string(), vec![leaf])]
        .into_iter()
        .collect();

    for level in 0..=MAX_SUBWORKFLOW_DEPTH {
        let attempt = CallAttempt {
            execution_status: ExecutionStatus::Failed,
            sub_workflow_metadata: Some(Box::new(WorkflowMetadata {
                calls,
                ..Default::default()
            })),
            ..Default::default()
        };
        calls = [(format!("Level{level}.Sub"), vec![attempt])]
            .into_iter()
            .collect();
    }

    let err = find_failures(&calls).unwrap_err();
    assert!(err.to_string().contains("exceeds"), "{err}");
}

#[test]
fn nesting_at_limit_is_walked() -> anyhow::Result<()> {
    let leaf = CallAttempt {
        execution_status: ExecutionStatus::Failed,
        job_id: Some("job-deep".to_string()),
        ..Default::default()
    };
    let mut calls: Calls = [("Deep.Leaf".to_string(), vec![leaf])]
        .into_iter()
        .collect();

    for level in 0..MAX_SUBWORKFLOW_DEPTH {
        let attempt = CallAttempt {
            sub_workflow_metadata: Some(Box::new(WorkflowMetadata {
                calls,
                ..Default::default()
            })),
            ..Default::default()
        };
        calls = [(format!("Level{level}.Sub"), vec![attempt])]
            .into_iter()
            .collect();
    }

    let failed = find_failures(&calls)?;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job_id(), Some("job-deep"));
    Ok(())
}
