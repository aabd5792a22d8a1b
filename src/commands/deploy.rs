use anyhow::{Context, Result};
use colored::Colorize;
use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::test::run_cf_suites;
use crate::cf::{ServiceInstanceRequest, TenantVars};
use crate::cli::commands::{AppType, DeployCommands, SAMPLE_PATHS};
use crate::config::Settings;
use crate::error::E2eError;
use crate::process::CommandLine;
use crate::suite::{CfContext, cf};

/// Orchestrator stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Clean,
    Built,
    Provisioned,
    Deployed,
    Tested,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Clean => "clean",
            Stage::Built => "build",
            Stage::Provisioned => "provision",
            Stage::Deployed => "deploy",
            Stage::Tested => "test",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Validated deploy arguments
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub name: String,
    pub manifest_dir: Option<PathBuf>,
    pub app_type: Option<AppType>,
    pub package_path: Option<PathBuf>,
    pub cleanup: bool,
    pub multi_tenant: bool,
    pub auditlog: bool,
    pub run_tests: bool,
}

impl DeployPlan {
    /// Fails before any side effect when an app is named without a sample directory
    pub fn from_args(args: &DeployCommands, samples_root: &Path) -> Result<Self, E2eError> {
        let manifest_dir = match (&args.path, args.name.is_empty()) {
            (None, false) => {
                return Err(E2eError::Precondition("the --path argument must be set!".into()));
            }
            (Some(path), _) if !SAMPLE_PATHS.contains(&path.as_str()) => {
                return Err(E2eError::Precondition(format!(
                    "--path must be one of {}",
                    SAMPLE_PATHS.join(", ")
                )));
            }
            (path, _) => path.as_ref().map(|path| samples_root.join(path)),
        };
        Ok(Self {
            name: args.name.clone(),
            package_path: args
                .package_path
                .as_ref()
                .map(|path| samples_root.join(path))
                .or_else(|| manifest_dir.clone()),
            manifest_dir,
            app_type: args.app_type,
            cleanup: args.cleanup,
            multi_tenant: args.multi_tenant,
            auditlog: args.auditlog,
            run_tests: args.run_tests,
        })
    }

    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();
        if self.cleanup {
            stages.push(Stage::Clean);
        }
        if !self.name.is_empty() {
            stages.extend([Stage::Built, Stage::Provisioned, Stage::Deployed]);
            if self.run_tests {
                stages.push(Stage::Tested);
            }
        }
        stages.push(Stage::Done);
        stages
    }

    fn manifest_dir(&self) -> Result<&Path, E2eError> {
        self.manifest_dir
            .as_deref()
            .ok_or_else(|| E2eError::Precondition("the --path argument must be set!".into()))
    }
}

/// Runs a [`DeployPlan`] against the targeted space
pub struct Deployer<'a> {
    ctx: &'a CfContext,
}

impl<'a> Deployer<'a> {
    pub fn new(ctx: &'a CfContext) -> Self {
        Self { ctx }
    }

    fn settings(&self) -> &Settings {
        &self.ctx.settings
    }

    /// Executes every stage of `plan`; the first failure aborts without rollback.
    /// Build and provisioning run as one concurrent step.
    pub async fn run(&self, plan: &DeployPlan) -> Result<Stage> {
        let tenants = if plan.multi_tenant && !plan.name.is_empty() {
            Some(self.tenants()?)
        } else {
            None
        };

        let mut reached = Stage::Clean;
        for stage in plan.stages() {
            let started = Instant::now();
            match stage {
                Stage::Clean => self
                    .ctx
                    .cf
                    .teardown(&self.ctx.sms())
                    .await
                    .context("cleaning the space failed")?,
                Stage::Built => self.build_and_provision(plan).await?,
                // Done together with the build
                Stage::Provisioned => continue,
                Stage::Deployed => self.push(plan, tenants.as_ref()).await?,
                Stage::Tested => self.test(plan).await?,
                Stage::Done => {}
            }
            reached = stage;
            println!(
                "{} {} after {:.2}s",
                "✓".green(),
                stage,
                started.elapsed().as_secs_f64()
            );
        }
        Ok(reached)
    }

    fn tenants(&self) -> Result<TenantVars, E2eError> {
        Ok(TenantVars {
            provider: self
                .settings()
                .provider_tenant()
                .ok_or_else(|| E2eError::missing_config("PROVIDER_TENANT_NAME/PROVIDER_TENANT_ID"))?,
            subscriber: self
                .settings()
                .subscriber_tenant()
                .ok_or_else(|| E2eError::missing_config("SUBSCRIBER_TENANT_NAME/SUBSCRIBER_TENANT_ID"))?,
        })
    }

    /// Language build next to identity and audit log creation; the subscription service
    /// needs the identity service and comes after
    async fn build_and_provision(&self, plan: &DeployPlan) -> Result<()> {
        futures::try_join!(
            self.build(plan),
            self.create_identity_service(plan),
            self.create_auditlog_service(plan),
        )?;
        if plan.multi_tenant {
            self.create_subscription_service(plan).await?;
        }
        Ok(())
    }

    async fn build(&self, plan: &DeployPlan) -> Result<()> {
        let command = match plan.app_type {
            Some(AppType::Java) => CommandLine::new("mvn")
                .args(["-q", "clean", "package", "-DskipTests", "--batch-mode"])
                .current_dir(plan.manifest_dir()?),
            Some(AppType::Node) => {
                let package_path = plan.package_path.as_deref().unwrap_or(plan.manifest_dir()?);
                CommandLine::new("npm")
                    .arg("install")
                    .arg(format!("--registry={}", self.settings().npm_registry()))
                    .current_dir(package_path)
            }
            None => {
                info!("no --type given, skipping build of {}", plan.name);
                return Ok(());
            }
        };
        self.ctx
            .cf
            .runner()
            .run_operation(&format!("build {}", plan.name), &command)
            .await
            .with_context(|| format!("build of {} failed", plan.name))?;
        Ok(())
    }

    async fn create_identity_service(&self, plan: &DeployPlan) -> Result<()> {
        let parameters = ServiceInstanceRequest::parameters_from_file(
            &plan.manifest_dir()?.join("ias-config.json"),
            self.ctx.cf.target(),
            Some(plan.multi_tenant),
        )?;
        let request = ServiceInstanceRequest::new("identity", "application", format!("{}-ias", plan.name))
            .with_parameters(parameters);
        self.ctx.cf.create_service_instance(&request).await?;
        Ok(())
    }

    async fn create_auditlog_service(&self, plan: &DeployPlan) -> Result<()> {
        if !plan.auditlog {
            return Ok(());
        }
        let request = ServiceInstanceRequest::new("auditlog", "oauth2", format!("{}-auditlog", plan.name));
        self.ctx.cf.create_service_instance(&request).await?;
        Ok(())
    }

    async fn create_subscription_service(&self, plan: &DeployPlan) -> Result<()> {
        let parameters = ServiceInstanceRequest::parameters_from_file(
            &plan.manifest_dir()?.join("sms-config.json"),
            self.ctx.cf.target(),
            None,
        )?;
        let request = ServiceInstanceRequest::new("subscription-manager", "provider", format!("{}-sms", plan.name))
            .with_parameters(parameters);
        self.ctx.cf.create_service_instance(&request).await?;
        Ok(())
    }

    async fn push(&self, plan: &DeployPlan, tenants: Option<&TenantVars>) -> Result<()> {
        let manifest_dir = plan.manifest_dir()?;
        let approuter = format!("{}-approuter", plan.name);
        futures::try_join!(
            self.ctx.cf.deploy_app(manifest_dir, &plan.name, tenants),
            self.ctx.cf.deploy_app(manifest_dir, &approuter, tenants),
        )?;
        Ok(())
    }

    async fn test(&self, plan: &DeployPlan) -> Result<()> {
        let Some(suite) = cf::suites().into_iter().find(|s| s.app_name == plan.name) else {
            warn!("no test suite for app {}", plan.name);
            return Ok(());
        };
        let report = run_cf_suites(self.ctx, Some(suite.suite.name), &[]).await;
        report.print_summary();
        anyhow::ensure!(
            report.is_success(),
            "{} of {} tests of {} failed",
            report.failed(),
            report.total(),
            plan.name
        );
        Ok(())
    }
}

pub async fn deploy_command(settings: &Settings, samples_root: &Path, args: &DeployCommands) -> Result<()> {
    info!("Executing deploy command for '{}'", args.name);
    let plan = DeployPlan::from_args(args, samples_root)?;
    let ctx = super::connect_cf(settings, samples_root).await?;

    let reached = Deployer::new(&ctx).run(&plan).await?;
    if plan.name.is_empty() {
        println!("{} space cleaned", "✓".green().bold());
    } else {
        println!("{} {} deployed ({})", "✓".green().bold(), plan.name, reached);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(name: &str, path: Option<&str>) -> DeployCommands {
        DeployCommands {
            name: name.to_string(),
            path: path.map(str::to_string),
            app_type: None,
            package_path: None,
            cleanup: true,
            multi_tenant: false,
            auditlog: false,
            run_tests: false,
        }
    }

    #[test]
    fn test_named_app_needs_path() {
        let err = DeployPlan::from_args(&args("java-ams", None), Path::new(".")).unwrap_err();
        assert_eq!(err.to_string(), "the --path argument must be set!");
    }

    #[test]
    fn test_cleanup_only_plan() {
        let plan = DeployPlan::from_args(&args("", None), Path::new(".")).unwrap();
        assert_eq!(plan.stages(), vec![Stage::Clean, Stage::Done]);
    }

    #[test]
    fn test_full_plan_stages() {
        let mut args = args("java-ams", Some("java-security-ams"));
        args.cleanup = false;
        args.run_tests = true;
        let plan = DeployPlan::from_args(&args, Path::new("/samples")).unwrap();
        assert_eq!(
            plan.stages(),
            vec![Stage::Built, Stage::Provisioned, Stage::Deployed, Stage::Tested, Stage::Done]
        );
        assert_eq!(plan.manifest_dir.as_deref(), Some(Path::new("/samples/java-security-ams")));
        assert_eq!(plan.package_path, plan.manifest_dir);
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::Clean < Stage::Built);
        assert!(Stage::Deployed < Stage::Tested);
        assert_eq!(Stage::Provisioned.to_string(), "provision");
    }
}
