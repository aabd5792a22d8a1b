use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct K8sCommands {
    #[command(subcommand)]
    pub command: K8sSubcommands,
}

#[derive(Subcommand, Debug)]
pub enum K8sSubcommands {
    /// Build, push and deploy the spring sample to Kyma, then run its tests
    Test {
        /// Cases to run; all when omitted
        cases: Vec<String>,
    },
    /// Create the namespace and a technical service account with its kubeconfig
    ServiceAccount {
        /// Namespace to create (defaults to K8SNAMESPACE)
        #[arg(short, long)]
        namespace: Option<String>,
        /// Directory with the account manifest and kubeconfig template
        #[arg(short, long, default_value = "k8s")]
        dir: PathBuf,
    },
}
