use anyhow::{Result, ensure};
use log::info;
use std::path::Path;

use crate::cli::commands::TestCommands;
use crate::config::Settings;
use crate::suite::{CfContext, CfFixture, Report, cf};

/// Runs the selected CF suites. A suite whose fixture cannot be set up reports each of
/// its selected cases as failed; the other suites still run.
pub async fn run_cf_suites(ctx: &CfContext, suite: Option<&str>, cases: &[String]) -> Report {
    let mut report = Report::new();
    for cf_suite in cf::suites() {
        if suite.is_some_and(|name| name != cf_suite.suite.name) {
            continue;
        }
        if cf_suite.suite.select(cases).is_empty() {
            continue;
        }
        info!("Setting up suite {} for {}", cf_suite.suite.name, cf_suite.app_name);
        match CfFixture::setup(ctx, cf_suite.app_name, cf_suite.app_dir).await {
            Ok(mut fixture) => cf_suite.suite.run(&mut fixture, cases, &mut report).await,
            Err(e) => cf_suite.suite.fail_setup(cases, &e, &mut report),
        }
    }
    report
}

pub async fn test_command(settings: &Settings, samples_root: &Path, args: &TestCommands) -> Result<()> {
    info!("Executing test command");
    let ctx = super::connect_cf(settings, samples_root).await?;

    let report = run_cf_suites(&ctx, args.suite.as_deref(), &args.cases).await;
    report.print_summary();
    ensure!(report.total() > 0, "no test case matches {:?}", args.cases);
    ensure!(
        report.is_success(),
        "{} of {} tests failed",
        report.failed(),
        report.total()
    );
    Ok(())
}
