pub mod deploy;
pub mod k8s;

pub use deploy::{AppType, DeployCommands, SAMPLE_PATHS};
pub use k8s::{K8sCommands, K8sSubcommands};
pub use test::TestCommands;
