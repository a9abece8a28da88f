use std::fmt;

use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Deserialize,
    strum_macros::Display,
)]
pub enum WorkflowStatus {
    Submitted,
    Running,
    Aborting,
    Failed,
    Succeeded,
    Aborted,
    #[serde(rename = "On Hold")]
    #[strum(serialize = "On Hold")]
    OnHold,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Deserialize,
    strum_macros::Display,
)]
pub enum ExecutionStatus {
    NotStarted,
    WaitingForQueueSpace,
    QueuedInCromwell,
    Starting,
    Running,
    Aborting,
    Failed,
    RetryableFailure,
    Done,
    Bypassed,
    Aborted,
    Unstartable,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Workflow metadata as returned by the Cromwell metadata endpoint with
/// sub-workflows expanded.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    pub id: Option<String>,
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub calls: Calls,
}

impl WorkflowMetadata {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, WorkflowStatus::Failed)
    }
}

/// A single attempt of a call. Leaf tasks carry a `job_id`, sub-workflow
/// calls carry `sub_workflow_metadata`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAttempt {
    #[serde(default)]
    pub execution_status: ExecutionStatus,
    pub job_id: Option<String>,
    pub sub_workflow_metadata: Option<Box<WorkflowMetadata>>,
    pub shard_index: Option<i64>,
    pub attempt: Option<u32>,
    #[serde(default)]
    pub failures: Vec<Failure>,
}

impl CallAttempt {
    /// Scatter shard of this attempt. Cromwell uses `-1` for unscattered
    /// calls.
    pub fn shard(&self) -> Option<i64> {
        self.shard_index.filter(|i| *i >= 0)
    }

    /// Messages of the innermost causes of every failure on this attempt.
    pub fn root_cause_messages(&self) -> Vec<&str> {
        let mut out = vec![];
        for f in &self.failures {
            f.collect_root_causes(&mut out);
        }
        out
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub caused_by: Vec<Failure>,
}

impl Failure {
    fn collect_root_causes<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.caused_by.is_empty() {
            if !self.message.is_empty() {
                out.push(&self.message);
            }
            return;
        }
        for c in &self.caused_by {
            c.collect_root_causes(out);
        }
    }
}

/// Calls of a workflow keyed by fully-qualified call name. Keeps the order
/// in which the server listed them.
#[derive(Debug, Default, Clone)]
pub struct Calls(Vec<(String, Vec<CallAttempt>)>);

impl Calls {
    pub fn get(&self, name: &str) -> Option<&[CallAttempt]> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, attempts)| attempts.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[CallAttempt])> {
        self.0.iter().map(|(n, a)| (n.as_str(), a.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl FromIterator<(String, Vec<CallAttempt>)> for Calls {
    fn from_iter<T: IntoIterator<Item = (String, Vec<CallAttempt>)>>(
        iter: T,
    ) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for Calls {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        struct CallsVisitor;

        impl<'de> Visitor<'de> for CallsVisitor {
            type Value = Calls;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of call names to call attempts")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> Result<Self::Value, A::Error> {
                let mut calls =
                    Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) =
                    map.next_entry::<String, Vec<CallAttempt>>()?
                {
                    calls.push(entry);
                }
                Ok(Calls(calls))
            }
        }

        deserializer.deserialize_map(CallsVisitor)
    }
}

#[test]
fn calls_keep_document_order() -> anyhow::Result<()> {
    let metadata: WorkflowMetadata = serde_json::from_str(
        r#"{
            "status": "Running",
            "calls": {
                "Wf.Zeta": [{"executionStatus": "Done", "jobId": "j-z"}],
                "Wf.Alpha": [{"executionStatus": "Running", "jobId": "j-a"}],
                "Wf.Mid": []
            }
        }"#,
    )?;

    assert_eq!(metadata.status, WorkflowStatus::Running);
    assert_eq!(
        metadata.calls.names().collect::<Vec<_>>(),
        vec!["Wf.Zeta", "Wf.Alpha", "Wf.Mid"]
    );
    assert_eq!(
        metadata.calls.get("Wf.Alpha").unwrap()[0].job_id.as_deref(),
        Some("j-a")
    );
    assert!(metadata.calls.get("Wf.Mid").unwrap().is_empty());
    assert!(metadata.calls.get("Wf.Missing").is_none());

    Ok(())
}

#[test]
fn unknown_statuses_do_not_fail_parsing() -> anyhow::Result<()> {
    let metadata: WorkflowMetadata = serde_json::from_str(
        r#"{
            "status": "Exploded",
            "calls": {
                "Wf.Task": [{"executionStatus": "Teleported"}]
            }
        }"#,
    )?;

    assert_eq!(metadata.status, WorkflowStatus::Unknown);
    assert_eq!(
        metadata.calls.get("Wf.Task").unwrap()[0].execution_status,
        ExecutionStatus::Unknown
    );
    Ok(())
}

#[test]
fn on_hold_status_round_trips_display() -> anyhow::Result<()> {
    let metadata: WorkflowMetadata =
        serde_json::from_str(r#"{"status": "On Hold"}"#)?;
    assert_eq!(metadata.status, WorkflowStatus::OnHold);
    assert_eq!(metadata.status.to_string(), "On Hold");
    assert!(metadata.calls.is_empty());
    Ok(())
}

#[test]
fn root_causes_are_collected_from_nested_failures() -> anyhow::Result<()> {
    let attempt: CallAttempt = serde_json::from_str(
        r#"{
            "executionStatus": "Failed",
            "shardIndex": -1,
            "attempt": 1,
            "failures": [{
                "message": "Task failed",
                "causedBy": [
                    {"message": "Job exit code 137", "causedBy": []},
                    {"message": "", "causedBy": [{"message": "OOM"}]}
                ]
            }]
        }"#,
    )?;

    assert_eq!(attempt.shard(), None);
    assert_eq!(attempt.attempt, Some(1));
    assert_eq!(attempt.root_cause_messages(), vec!["Job exit code 137", "OOM"]);
    Ok(())
}
