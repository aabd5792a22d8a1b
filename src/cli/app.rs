use super::commands::{DeployCommands, K8sCommands, TestCommands};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ams-e2e")]
#[command(about = "Deploys the AMS sample applications and runs their end-to-end tests")]
#[command(version)]
pub struct Cli {
    /// Environment file with users, certificates and tenants
    #[arg(long, global = true, default_value = ".env")]
    pub env_file: PathBuf,
    /// Directory holding the sample app sources
    #[arg(long, global = true, default_value = ".")]
    pub samples_root: PathBuf,
    /// Raise the log level (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clean the targeted Cloud Foundry space, provision services and push a sample app
    Deploy(DeployCommands),
    /// Run the end-to-end suites against the apps pushed to Cloud Foundry
    Test(TestCommands),
    /// Deploy to and test on Kyma
    K8s(K8sCommands),
    /// List the test suites and their cases
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::{AppType, K8sSubcommands};
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::parse_from([
            "ams-e2e",
            "deploy",
            "--name",
            "java-ams",
            "--path",
            "java-security-ams",
            "--type",
            "java",
            "--multi-tenant",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Deploy(deploy) = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(deploy.name, "java-ams");
        assert_eq!(deploy.app_type, Some(AppType::Java));
        assert!(deploy.multi_tenant);
        assert!(deploy.cleanup);
        assert!(!deploy.auditlog);
    }

    #[test]
    fn test_parse_cleanup_only() {
        let cli = Cli::parse_from(["ams-e2e", "deploy", "--name", "", "--cleanup", "true"]);
        let Commands::Deploy(deploy) = cli.command else {
            panic!("expected deploy");
        };
        assert!(deploy.name.is_empty());
        assert!(deploy.path.is_none());
    }

    #[test]
    fn test_parse_unknown_path_is_rejected() {
        assert!(Cli::try_parse_from(["ams-e2e", "deploy", "--name", "x", "--path", "other"]).is_err());
    }

    #[test]
    fn test_parse_test_and_k8s() {
        let cli = Cli::parse_from(["ams-e2e", "test", "--suite", "node", "admin_policy"]);
        let Commands::Test(test) = cli.command else {
            panic!("expected test");
        };
        assert_eq!(test.suite.as_deref(), Some("node"));
        assert_eq!(test.cases, vec!["admin_policy"]);

        let cli = Cli::parse_from(["ams-e2e", "k8s", "service-account", "--namespace", "ams"]);
        let Commands::K8s(k8s) = cli.command else {
            panic!("expected k8s");
        };
        assert!(matches!(k8s.command, K8sSubcommands::ServiceAccount { namespace: Some(ns), .. } if ns == "ams"));
    }
}
