pub mod deploy;
pub mod k8s;
pub mod list;
pub mod test;

pub use deploy::{DeployPlan, Deployer, Stage, deploy_command};
pub use k8s::{k8s_service_account_command, k8s_test_command};
pub use list::list_command;
pub use test::{run_cf_suites, test_command};

use anyhow::{Result, bail};
use log::info;
use std::path::Path;
use std::sync::Arc;

use crate::api::{HttpClient, ResilienceConfig};
use crate::cf::{CfApi, CfClient, LOGGED_OFF_MESSAGE, Target, is_logged_off};
use crate::config::Settings;
use crate::process::{CommandRunner, SystemRunner};
use crate::suite::CfContext;

/// Resolves the session of the CF CLI into a context for the Cloud Foundry commands.
/// Fails when the CLI is logged off.
pub async fn connect_cf(settings: &Settings, samples_root: &Path) -> Result<CfContext> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    connect_cf_with(runner, HttpClient::new(ResilienceConfig::default())?, settings, samples_root).await
}

pub async fn connect_cf_with(
    runner: Arc<dyn CommandRunner>,
    http: HttpClient,
    settings: &Settings,
    samples_root: &Path,
) -> Result<CfContext> {
    let cf_cli = settings.cf_cli();
    if is_logged_off(runner.as_ref(), &cf_cli).await {
        bail!("{}", LOGGED_OFF_MESSAGE);
    }
    let target = Target::discover(runner.as_ref(), &cf_cli).await?;
    info!("Landscape apps domain: {}", target.landscape_domain);

    let api = CfApi::for_target(http.clone(), &target);
    Ok(CfContext {
        cf: Arc::new(CfClient::new(runner, api, target, cf_cli)),
        http,
        settings: settings.clone(),
        samples_root: samples_root.to_path_buf(),
    })
}
