use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand, ValueHint};
use cromlog::{
    aws::config::DEFAULT_LOG_GROUP, cromwell::task_path::TaskPath,
    report::DEFAULT_ERRORS_DIR,
};

pub mod aws;
pub mod get_error;
pub mod get_log;

#[derive(Parser, Debug)]
#[command(about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Whether to run in development mode.
    #[arg(long)]
    pub dev: bool,
    /// The verbosity level (0-3).
    #[arg(long, default_value_t = 1)]
    pub verbosity: u8,
    /// The AWS profile to use.
    #[arg(long, global = true)]
    pub profile: Option<Arc<str>>,
    /// The AWS region to use. Falls back to the AWS default configuration.
    #[arg(long, short, global = true)]
    pub region: Option<Arc<str>>,
    /// The CloudWatch Logs group AWS Batch writes job logs to.
    #[arg(long, global = true, default_value = DEFAULT_LOG_GROUP)]
    pub log_group: Arc<str>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find every failed task of a workflow and save its AWS Batch job
    /// description.
    GetError(GetError),
    /// Print the status and the log of a single task.
    GetLog(GetLog),
}

#[derive(Args, Debug)]
pub struct WorkflowArgs {
    /// Path to the JSON key file with the Cromwell `url`, `username` and
    /// `password`.
    #[arg(long, short, env = "CROMLOG_KEY", value_hint = ValueHint::FilePath)]
    pub key: PathBuf,
    /// The Cromwell workflow ID. A `cromwell-` prefix is ignored.
    #[arg(long, short)]
    pub workflow_id: Box<str>,
}

#[derive(Args, Debug)]
pub struct GetError {
    #[command(flatten)]
    pub workflow: WorkflowArgs,
    /// Directory to save job descriptions to.
    #[arg(
        long,
        short,
        default_value = DEFAULT_ERRORS_DIR,
        value_hint = ValueHint::DirPath
    )]
    pub out_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct GetLog {
    #[command(flatten)]
    pub workflow: WorkflowArgs,
    /// The task to inspect: `Workflow.Task` or `Workflow.SubWorkflow.Task`.
    #[arg(long, short, value_parser = TaskPath::parse)]
    pub task_name: TaskPath,
    /// Prefix log lines with their time.
    #[arg(long)]
    pub timestamps: bool,
}

#[test]
fn cli_definition_test() {
    <Cli as clap::CommandFactory>::command().debug_assert();
}

#[test]
fn parse_get_log_test() -> anyhow::Result<()> {
    let cli = Cli::try_parse_from([
        "cromlog",
        "get-log",
        "-k",
        "secrets.json",
        "-w",
        "cromwell-66431c43",
        "--task-name",
        "Sharp.Preprocess.CiteSeqCount",
        "--region",
        "us-east-1",
    ])?;

    assert_eq!(cli.region.as_deref(), Some("us-east-1"));
    assert_eq!(&*cli.log_group, DEFAULT_LOG_GROUP);
    let Commands::GetLog(get_log) = cli.command else {
        panic!("expected get-log");
    };
    assert_eq!(get_log.workflow.key, PathBuf::from("secrets.json"));
    assert_eq!(&*get_log.workflow.workflow_id, "cromwell-66431c43");
    assert_eq!(get_log.task_name.to_string(), "Sharp.Preprocess.CiteSeqCount");
    assert!(!get_log.timestamps);
    Ok(())
}

#[test]
fn parse_get_error_test() -> anyhow::Result<()> {
    let cli = Cli::try_parse_from([
        "cromlog",
        "--region",
        "eu-west-1",
        "get-error",
        "--key",
        "secrets.json",
        "--workflow-id",
        "66431c43",
    ])?;

    assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
    let Commands::GetError(get_error) = cli.command else {
        panic!("expected get-error");
    };
    assert_eq!(get_error.out_dir, PathBuf::from(DEFAULT_ERRORS_DIR));
    Ok(())
}

#[test]
fn reject_unsupported_task_name_test() {
    let res = Cli::try_parse_from([
        "cromlog",
        "get-log",
        "-k",
        "secrets.json",
        "-w",
        "66431c43",
        "-t",
        "A.B.C.D",
    ]);
    assert!(res.is_err());
}
