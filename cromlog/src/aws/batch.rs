use aws_sdk_batch::{
    types::{
        AttemptContainerDetail, AttemptDetail, ContainerDetail, JobDependency,
        JobDetail, KeyValuePair, ResourceRequirement,
    },
    Client,
};

use super::config::AwsConfigProvider;
use crate::inspect::{
    AttemptContainerInfo, AttemptInfo, BatchJob, ContainerInfo,
    JobDependencyInfo, KeyValue, ResourceRequirementInfo, RetryStrategyInfo,
};

#[tracing::instrument(level = "debug", skip(config))]
pub async fn describe_jobs(
    config: &impl AwsConfigProvider,
    job_id: &str,
) -> anyhow::Result<Vec<BatchJob>> {
    let client = Client::new(config.get_aws_config());

    let jobs = client
        .describe_jobs()
        .jobs(job_id)
        .send()
        .await?
        .jobs
        .unwrap_or_default();
    tracing::debug!(count = jobs.len(), "Described jobs.");

    Ok(jobs.into_iter().map(BatchJob::from).collect())
}

impl From<JobDetail> for BatchJob {
    fn from(job: JobDetail) -> Self {
        BatchJob {
            job_id: job.job_id.unwrap_or_default(),
            job_name: job.job_name.unwrap_or_default(),
            job_arn: job.job_arn,
            job_queue: job.job_queue,
            job_definition: job.job_definition,
            status: job
                .status
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            status_reason: job.status_reason,
            created_at: job.created_at,
            started_at: job.started_at,
            stopped_at: job.stopped_at,
            attempts: job
                .attempts
                .unwrap_or_default()
                .into_iter()
                .map(AttemptInfo::from)
                .collect(),
            retry_strategy: job.retry_strategy.map(|r| RetryStrategyInfo {
                attempts: r.attempts,
            }),
            depends_on: job
                .depends_on
                .unwrap_or_default()
                .into_iter()
                .map(JobDependencyInfo::from)
                .collect(),
            parameters: job
                .parameters
                .unwrap_or_default()
                .into_iter()
                .collect(),
            container: job
                .container
                .map(ContainerInfo::from)
                .unwrap_or_default(),
        }
    }
}

impl From<ContainerDetail> for ContainerInfo {
    fn from(container: ContainerDetail) -> Self {
        ContainerInfo {
            image: container.image,
            command: container.command.unwrap_or_default(),
            vcpus: container.vcpus,
            memory: container.memory,
            resource_requirements: container
                .resource_requirements
                .unwrap_or_default()
                .into_iter()
                .map(ResourceRequirementInfo::from)
                .collect(),
            environment: container
                .environment
                .unwrap_or_default()
                .into_iter()
                .map(KeyValue::from)
                .collect(),
            exit_code: container.exit_code,
            reason: container.reason,
            log_stream_name: container.log_stream_name,
        }
    }
}

impl From<AttemptDetail> for AttemptInfo {
    fn from(attempt: AttemptDetail) -> Self {
        AttemptInfo {
            container: attempt
                .container
                .map(AttemptContainerInfo::from)
                .unwrap_or_default(),
            started_at: attempt.started_at,
            stopped_at: attempt.stopped_at,
            status_reason: attempt.status_reason,
        }
    }
}

impl From<AttemptContainerDetail> for AttemptContainerInfo {
    fn from(container: AttemptContainerDetail) -> Self {
        AttemptContainerInfo {
            exit_code: container.exit_code,
            reason: container.reason,
            log_stream_name: container.log_stream_name,
        }
    }
}

impl From<JobDependency> for JobDependencyInfo {
    fn from(dep: JobDependency) -> Self {
        JobDependencyInfo {
            job_id: dep.job_id,
            kind: dep.r#type.map(|t| t.as_str().to_string()),
        }
    }
}

impl From<ResourceRequirement> for ResourceRequirementInfo {
    fn from(req: ResourceRequirement) -> Self {
        ResourceRequirementInfo {
            kind: req
                .r#type
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            value: req.value.unwrap_or_default(),
        }
    }
}

impl From<KeyValuePair> for KeyValue {
    fn from(pair: KeyValuePair) -> Self {
        KeyValue {
            name: pair.name.unwrap_or_default(),
            value: pair.value.unwrap_or_default(),
        }
    }
}

#[test]
fn job_detail_keeps_attempts_and_resources() {
    use aws_sdk_batch::types::{JobStatus, ResourceType, RetryStrategy};

    let detail = JobDetail::builder()
        .job_id("job-1")
        .job_name("Sharp_Count")
        .status(JobStatus::Failed)
        .parameters("sample", "S1")
        .retry_strategy(RetryStrategy::builder().attempts(2).build())
        .attempts(
            AttemptDetail::builder()
                .status_reason("Essential container in task exited")
                .started_at(10)
                .stopped_at(20)
                .container(
                    AttemptContainerDetail::builder()
                        .exit_code(137)
                        .reason("OutOfMemoryError: Container killed")
                        .log_stream_name("Sharp_Count/default/a1")
                        .build(),
                )
                .build(),
        )
        .attempts(
            AttemptDetail::builder()
                .container(
                    AttemptContainerDetail::builder()
                        .exit_code(1)
                        .log_stream_name("Sharp_Count/default/a2")
                        .build(),
                )
                .build(),
        )
        .container(
            ContainerDetail::builder()
                .vcpus(4)
                .resource_requirements(
                    ResourceRequirement::builder()
                        .r#type(ResourceType::Memory)
                        .value("8000")
                        .build(),
                )
                .environment(
                    KeyValuePair::builder().name("SAMPLE").value("S1").build(),
                )
                .log_stream_name("Sharp_Count/default/a2")
                .build(),
        )
        .build();

    let job = BatchJob::from(detail);
    assert_eq!(job.status, "FAILED");
    assert_eq!(job.retry_strategy.and_then(|r| r.attempts), Some(2));
    assert_eq!(job.parameters.get("sample").map(String::as_str), Some("S1"));
    assert_eq!(job.attempts.len(), 2);
    assert_eq!(job.attempts[0].container.exit_code, Some(137));
    assert_eq!(
        job.attempts[0].container.log_stream_name.as_deref(),
        Some("Sharp_Count/default/a1")
    );
    assert_eq!(job.attempts[0].started_at, Some(10));
    assert_eq!(job.attempts[1].container.exit_code, Some(1));
    assert_eq!(job.container.vcpus, Some(4));
    assert_eq!(
        job.container.resource_requirements,
        vec![ResourceRequirementInfo {
            kind: "MEMORY".into(),
            value: "8000".into(),
        }]
    );
    assert_eq!(job.container.environment[0].name, "SAMPLE");
}
