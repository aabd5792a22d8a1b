use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use log::{LevelFilter, debug};

use ams_e2e::cli::commands::K8sSubcommands;
use ams_e2e::cli::{Cli, Commands};
use ams_e2e::commands::{
    deploy_command, k8s_service_account_command, k8s_test_command, list_command, test_command,
};
use ams_e2e::config::Settings;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG wins over -v
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::List = cli.command {
        return list_command();
    }

    let settings = Settings::load(&cli.env_file)?;
    debug!("loaded settings from {:?}", cli.env_file);

    match cli.command {
        Commands::Deploy(args) => deploy_command(&settings, &cli.samples_root, &args).await,
        Commands::Test(args) => test_command(&settings, &cli.samples_root, &args).await,
        Commands::K8s(k8s) => match k8s.command {
            K8sSubcommands::Test { cases } => k8s_test_command(&settings, &cli.samples_root, &cases).await,
            K8sSubcommands::ServiceAccount { namespace, dir } => {
                k8s_service_account_command(&settings, namespace, &dir).await
            }
        },
        Commands::List => list_command(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
