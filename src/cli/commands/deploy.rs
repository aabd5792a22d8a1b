use clap::{ArgAction, Args, ValueEnum};
use std::path::PathBuf;

/// Sample directories that carry a deployable manifest
pub const SAMPLE_PATHS: [&str; 3] = ["spring-security-ams", "java-security-ams", "nodejs-ams"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppType {
    Java,
    Node,
}

#[derive(Args, Debug)]
pub struct DeployCommands {
    /// Name of the app; an empty name only cleans the space
    #[arg(short, long)]
    pub name: String,
    /// Sample directory with manifest.yml and the service configs
    #[arg(short, long, value_parser = SAMPLE_PATHS)]
    pub path: Option<String>,
    /// Language build to run before pushing
    #[arg(short = 't', long = "type", value_enum)]
    pub app_type: Option<AppType>,
    /// Directory of the package.json for node builds (defaults to --path)
    #[arg(long)]
    pub package_path: Option<PathBuf>,
    /// Clean the space before deploying
    #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
    pub cleanup: bool,
    /// Create the subscription service and push with tenant variables
    #[arg(long)]
    pub multi_tenant: bool,
    /// Create an audit log service
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub auditlog: bool,
    /// Run the app's test suite after the push
    #[arg(long)]
    pub run_tests: bool,
}
