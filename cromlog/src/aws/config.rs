use aws_config::SdkConfig;

/// CloudWatch Logs group AWS Batch writes container output to.
pub const DEFAULT_LOG_GROUP: &str = "/aws/batch/job";

pub trait AwsConfigProvider {
    fn get_aws_config(&self) -> &SdkConfig;
}

pub trait LogGroupProvider {
    fn get_log_group_name(&self) -> &str { DEFAULT_LOG_GROUP }
}
