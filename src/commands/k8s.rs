use anyhow::{Context, Result, ensure};
use colored::Colorize;
use log::info;
use std::path::Path;
use std::sync::Arc;

use crate::api::{HttpClient, ResilienceConfig};
use crate::config::Settings;
use crate::k8s::service_account::OUTPUT_FILE;
use crate::k8s::{K8sApp, KymaCredentials, KymaTarget, create_service_account};
use crate::process::{CommandRunner, SystemRunner};
use crate::suite::{KymaFixture, Report, kyma};
use crate::ui::prompts::prompt_overwrite_confirmation;

const APP_NAME: &str = "spring-security-ams";
const APP_ROUTER_NAME: &str = "ams-approuter";

/// Images, manifest, DCL upload and health check; the fixture is ready for the cases
async fn deploy(
    app: &K8sApp,
    runner: &dyn CommandRunner,
    http: &HttpClient,
    credentials: &KymaCredentials,
) -> Result<KymaFixture> {
    app.prepare_registry_secret().await?;
    app.prepare_images().await.context("building the images failed")?;
    let identity = app.deploy(http.resilience().dcl_upload).await?;

    let target = KymaTarget::discover(runner, &credentials.namespace).await?;
    KymaFixture::wait_until_healthy(http, &target)
        .await
        .with_context(|| format!("{} did not become healthy", target.sample_url))?;
    Ok(KymaFixture::setup(http.clone(), target, identity, credentials).await?)
}

pub async fn k8s_test_command(settings: &Settings, samples_root: &Path, cases: &[String]) -> Result<()> {
    info!("Executing k8s test command");
    let credentials = KymaCredentials::from_settings(settings)?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let http = HttpClient::new(ResilienceConfig::default())?;
    let suite = kyma::spring();
    ensure!(!suite.select(cases).is_empty(), "no test case matches {:?}", cases);

    let app = K8sApp::new(runner.clone(), APP_NAME, APP_ROUTER_NAME, samples_root, credentials.clone());
    info!("Deploying {}", app);

    let mut report = Report::new();
    match deploy(&app, runner.as_ref(), &http, &credentials).await {
        Ok(mut fixture) => suite.run(&mut fixture, cases, &mut report).await,
        Err(e) => suite.fail_setup(cases, &e, &mut report),
    }
    app.delete()?;

    report.print_summary();
    ensure!(
        report.is_success(),
        "{} of {} tests failed",
        report.failed(),
        report.total()
    );
    Ok(())
}

pub async fn k8s_service_account_command(settings: &Settings, namespace: Option<String>, dir: &Path) -> Result<()> {
    let namespace = match namespace {
        Some(namespace) => namespace,
        None => settings.require_or_prompt("K8SNAMESPACE", "Kyma Namespace to be created/updated", false)?,
    };
    info!("Creating service account in namespace {}", namespace);

    let existing = dir.join(OUTPUT_FILE);
    if existing.exists()
        && settings.is_interactive()
        && !prompt_overwrite_confirmation(&existing.display().to_string())?
    {
        println!("Keeping {}", existing.display());
        return Ok(());
    }

    let kubeconfig = create_service_account(&SystemRunner, &namespace, dir).await?;
    println!("{} wrote {}", "✓".green().bold(), kubeconfig.display());
    println!("  export KUBECONFIG={}", kubeconfig.display());
    Ok(())
}
