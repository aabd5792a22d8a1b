use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{E2eError, Result};
use crate::process::{CommandLine, CommandRunner};

static API_ENDPOINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)api endpoint:(.*)").unwrap());
static USER: Lazy<Regex> = Lazy::new(|| Regex::new(r"user:(.*)").unwrap());
static ORG: Lazy<Regex> = Lazy::new(|| Regex::new(r"org:(.*)").unwrap());
static SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"space:(.*)").unwrap());

pub const LOGGED_OFF_MESSAGE: &str = "To run this command you must be logged into CF via \"cf login\"";

/// The CF org/space this run works in, resolved once from the CF CLI session
#[derive(Clone)]
pub struct Target {
    pub api_endpoint: String,
    pub user: String,
    pub org: String,
    pub space: String,
    pub space_guid: String,
    pub landscape_domain: String,
    /// Value of `cf oauth-token`, already in `bearer <jwt>` form
    pub token: String,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("api_endpoint", &self.api_endpoint)
            .field("user", &self.user)
            .field("org", &self.org)
            .field("space", &self.space)
            .field("space_guid", &self.space_guid)
            .field("landscape_domain", &self.landscape_domain)
            .finish()
    }
}

/// Fields of `cf target` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub api_endpoint: String,
    pub user: String,
    pub org: String,
    pub space: String,
}

pub fn parse_target_output(output: &str) -> Result<TargetInfo> {
    let field = |regex: &Regex, name: &str| {
        regex
            .captures(output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| E2eError::parse("cf target output", format!("no {}", name)))
    };
    Ok(TargetInfo {
        api_endpoint: field(&API_ENDPOINT, "api endpoint")?,
        user: field(&USER, "user")?,
        org: field(&ORG, "org")?,
        space: field(&SPACE, "space")?,
    })
}

/// `https://api.cf.eu10.hana.ondemand.com` -> `cfapps.eu10.hana.ondemand.com`
pub fn landscape_domain(api_endpoint: &str) -> String {
    api_endpoint.replace("https://api.cf", "cfapps")
}

/// True unless `cf oauth-token` yields a token
pub async fn is_logged_off(runner: &dyn CommandRunner, cf_cli: &str) -> bool {
    match runner.run(&CommandLine::new(cf_cli).arg("oauth-token")).await {
        Ok(output) => !output.is_success() || output.stdout.starts_with("FAILED"),
        Err(_) => true,
    }
}

impl Target {
    pub async fn discover(runner: &dyn CommandRunner, cf_cli: &str) -> Result<Self> {
        let token = runner
            .run_checked(&CommandLine::new(cf_cli).arg("oauth-token"))
            .await?
            .stdout
            .trim()
            .to_string();
        let target = runner.run_checked(&CommandLine::new(cf_cli).arg("target")).await?;
        let info = parse_target_output(&target.stdout)?;

        let space_guid = runner
            .run_checked(&CommandLine::new(cf_cli).args(["space", info.space.as_str(), "--guid"]))
            .await?
            .stdout
            .trim()
            .to_string();

        let target = Self {
            landscape_domain: landscape_domain(&info.api_endpoint),
            api_endpoint: info.api_endpoint,
            user: info.user,
            org: info.org,
            space: info.space,
            space_guid,
            token,
        };
        info!(
            "Targeting org '{}' space '{}' ({}) on {}",
            target.org, target.space, target.space_guid, target.api_endpoint
        );
        Ok(target)
    }

    /// Public route of an app in this space
    pub fn app_url(&self, app_name: &str) -> String {
        format!("https://{}-{}.{}", app_name, self.space, self.landscape_domain)
    }

    /// Route of an app that requires a client certificate
    pub fn app_cert_url(&self, app_name: &str) -> String {
        format!("https://{}-{}.cert.{}", app_name, self.space, self.landscape_domain)
    }
}
