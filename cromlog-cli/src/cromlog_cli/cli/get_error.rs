use cromlog::{
    cromwell::{client::fetch_metadata, credentials::Credentials},
    report::GetError as GetErrorReport,
};

use super::{Cli, GetError};

impl Cli {
    pub async fn get_error(&self, args: &GetError) -> anyhow::Result<()> {
        let credentials = Credentials::load(&args.workflow.key).await?;
        let metadata =
            fetch_metadata(&credentials, &args.workflow.workflow_id).await?;

        let backend = self.mk_job_backend().await?;
        GetErrorReport::builder()
            .metadata(&metadata)
            .out_dir(args.out_dir.as_path())
            .build()
            .run_with(&backend)
            .await?;

        Ok(())
    }
}
