use std::sync::Arc;

use aws_config::Region;
use cromlog::aws::{
    config::{AwsConfigProvider, LogGroupProvider},
    AwsJobBackend,
};

use super::Cli;

impl Cli {
    /// Loads the AWS configuration. `--region` wins over the default
    /// provider chain; running without any region is an error.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn mk_job_backend(
        &self,
    ) -> anyhow::Result<AwsJobBackend<GenericConfigProvider>> {
        let mut aws_config = aws_config::from_env();
        if let Some(profile) = &self.profile {
            aws_config = aws_config.profile_name(profile.as_ref());
        }
        if let Some(region) = &self.region {
            aws_config =
                aws_config.region(Region::new(region.as_ref().to_owned()));
        }
        let aws_config = aws_config.load().await;

        let Some(region) = aws_config.region() else {
            anyhow::bail!(
                "No AWS region configured. Pass `--region` or set AWS_REGION."
            );
        };
        tracing::debug!(%region, "AWS configuration loaded.");

        Ok(AwsJobBackend::new(Arc::new(GenericConfigProvider {
            aws_config,
            log_group: Arc::clone(&self.log_group),
        })))
    }
}

pub struct GenericConfigProvider {
    aws_config: aws_config::SdkConfig,
    log_group: Arc<str>,
}

impl AwsConfigProvider for GenericConfigProvider {
    fn get_aws_config(&self) -> &aws_config::SdkConfig { &self.aws_config }
}

impl LogGroupProvider for GenericConfigProvider {
    fn get_log_group_name(&self) -> &str { &self.log_group }
}
