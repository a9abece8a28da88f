use cromlog::{
    cromwell::{client::fetch_metadata, credentials::Credentials},
    report::GetLog as GetLogReport,
};

use super::{Cli, GetLog};

impl Cli {
    pub async fn get_log(&self, args: &GetLog) -> anyhow::Result<()> {
        let credentials = Credentials::load(&args.workflow.key).await?;
        let metadata =
            fetch_metadata(&credentials, &args.workflow.workflow_id).await?;

        let backend = self.mk_job_backend().await?;
        GetLogReport::builder()
            .metadata(&metadata)
            .task(&args.task_name)
            .timestamps(args.timestamps)
            .build()
            .run_with(&backend)
            .await?;

        Ok(())
    }
}
