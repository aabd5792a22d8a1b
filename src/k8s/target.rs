use log::info;

use crate::config::Settings;
use crate::error::Result;
use crate::process::{CommandLine, CommandRunner};

pub const IMAGE_REPOSITORY: &str = "cloud-security-integration.int.repositories.cloud.sap";
pub const IMAGE_VERSION: &str = "e2e-test";

/// Inputs of the Kyma flow; missing values are asked for on a terminal
#[derive(Clone)]
pub struct KymaCredentials {
    pub username: String,
    pub user_uuid: String,
    pub password: String,
    pub namespace: String,
    pub artifactory_user: String,
    pub artifactory_token: String,
}

impl KymaCredentials {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            username: settings.require_or_prompt("CFAMSUSER", "Username", false)?,
            user_uuid: settings.require_or_prompt("CFAMSUSERUUID", "User UUID", false)?,
            password: settings.require_or_prompt("CFAMSPASSWORD", "User API Token", true)?,
            namespace: settings.require_or_prompt("K8SNAMESPACE", "Kyma Namespace", false)?,
            artifactory_user: settings.require_or_prompt("COMMONARTIFACTORYUSER", "Common artifactory user", false)?,
            artifactory_token: settings.require_or_prompt(
                "COMMONARTIFACTORYAPITOKEN",
                "Common artifactory user API Token",
                true,
            )?,
        })
    }
}

impl std::fmt::Debug for KymaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KymaCredentials")
            .field("username", &self.username)
            .field("namespace", &self.namespace)
            .field("artifactory_user", &self.artifactory_user)
            .finish()
    }
}

/// `kubectl -ojsonpath='{...}'` output without the literal quotes
pub fn strip_quotes(output: &str) -> String {
    output.trim().trim_matches('\'').to_string()
}

/// Cluster API server of the current kubeconfig context
pub async fn cluster_server(runner: &dyn CommandRunner) -> Result<String> {
    let output = runner
        .run_checked(&CommandLine::new("kubectl").args([
            "config",
            "view",
            "-ojsonpath='{.clusters[0].cluster.server}'",
        ]))
        .await?;
    Ok(strip_quotes(&output.stdout))
}

/// `https://api.<cluster>` -> `https://ams-sample-app-api.<cluster>`
pub fn sample_app_url(server_url: &str) -> String {
    server_url.replace("api", "ams-sample-app-api")
}

#[derive(Debug, Clone)]
pub struct KymaTarget {
    pub namespace: String,
    pub server_url: String,
    pub sample_url: String,
}

impl KymaTarget {
    pub async fn discover(runner: &dyn CommandRunner, namespace: &str) -> Result<Self> {
        let server_url = cluster_server(runner).await?;
        let target = Self {
            namespace: namespace.to_string(),
            sample_url: sample_app_url(&server_url),
            server_url,
        };
        info!("Kyma namespace '{}' on {}", target.namespace, target.server_url);
        Ok(target)
    }
}
