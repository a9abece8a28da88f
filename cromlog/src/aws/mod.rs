use std::sync::Arc;

use self::config::{AwsConfigProvider, LogGroupProvider};
use crate::inspect::{BatchJob, JobBackend, LogEvent};

pub mod batch;
pub mod config;
pub mod logs;

/// [`JobBackend`] talking to AWS Batch and CloudWatch Logs.
pub struct AwsJobBackend<C> {
    config: Arc<C>,
}

impl<C> AwsJobBackend<C> {
    pub fn new(config: Arc<C>) -> Self { Self { config } }
}

#[async_trait::async_trait]
impl<C> JobBackend for AwsJobBackend<C>
where
    C: AwsConfigProvider + LogGroupProvider + Send + Sync,
{
    async fn describe_jobs(
        &self,
        job_id: &str,
    ) -> anyhow::Result<Vec<BatchJob>> {
        batch::describe_jobs(&*self.config, job_id).await
    }

    async fn get_log_events(
        &self,
        log_stream_name: &str,
    ) -> anyhow::Result<Vec<LogEvent>> {
        logs::get_log_events(&*self.config, log_stream_name).await
    }
}
