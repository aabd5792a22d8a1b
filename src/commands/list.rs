use anyhow::Result;
use colored::Colorize;

use crate::suite::{cf, kyma};

/// Prints every suite with the app it targets and its case names
pub fn list_command() -> Result<()> {
    println!("{}", "Cloud Foundry (ams-e2e test)".bold());
    for cf_suite in cf::suites() {
        println!(
            "  {} {}",
            cf_suite.suite.name.cyan(),
            format!("({} in {})", cf_suite.app_name, cf_suite.app_dir).dimmed()
        );
        for case in cf_suite.suite.case_names() {
            println!("    {}::{}", cf_suite.suite.name, case);
        }
    }

    let suite = kyma::spring();
    println!("\n{}", "Kyma (ams-e2e k8s test)".bold());
    println!("  {} {}", suite.name.cyan(), "(spring-security-ams)".dimmed());
    for case in suite.case_names() {
        println!("    {}::{}", suite.name, case);
    }
    Ok(())
}
