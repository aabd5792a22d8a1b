//! Run settings from the process environment and the root `.env` file

use is_terminal::IsTerminal;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::Path;

use crate::api::mtls::ClientCertificate;
use crate::api::sms::{CisCredentialMap, CisCredentials};
use crate::api::ias::IasUser;
use crate::error::{E2eError, Result};
use crate::ui::prompts;

pub const DEFAULT_NPM_REGISTRY: &str = "https://int.repositories.cloud.sap/artifactory/api/npm/build-releases-npm/";

/// A named tenant of the multi-tenant sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
    interactive: bool,
}

impl Settings {
    /// Loads `env_file` into the process environment when it exists. Variables already
    /// set in the environment keep their value.
    pub fn load(env_file: &Path) -> Result<Self> {
        if env_file.exists() {
            dotenvy::from_path(env_file)
                .map_err(|e| E2eError::parse(format!("env file {:?}", env_file), e))?;
            info!("Loaded settings from {:?}", env_file);
        } else {
            debug!("No env file at {:?}, using process environment only", env_file);
        }

        Ok(Self {
            values: std::env::vars().collect(),
            interactive: std::io::stdin().is_terminal(),
        })
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            interactive: false,
        }
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Looks up `key`, then its lower-case spelling. Empty values count as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .or_else(|| self.values.get(&key.to_lowercase()))
            .filter(|v| !v.is_empty())
            .cloned()
    }

    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| E2eError::missing_config(key))
    }

    /// Required value; asks on the terminal when unset and stdin is interactive
    pub fn require_or_prompt(&self, key: &str, prompt: &str, secret: bool) -> Result<String> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        if !self.interactive {
            return Err(E2eError::missing_config(key));
        }
        let answer = if secret {
            prompts::prompt_secret(prompt)
        } else {
            prompts::prompt_value(prompt)
        };
        answer
            .map_err(|e| E2eError::Precondition(format!("could not read {}: {}", key, e)))
            .and_then(|value| {
                if value.is_empty() {
                    Err(E2eError::missing_config(key))
                } else {
                    Ok(value)
                }
            })
    }

    pub fn ias_user(&self) -> Result<IasUser> {
        Ok(IasUser {
            username: self.require("CFAMSUSER")?,
            password: self.require("CFAMSPASSWORD")?,
            provider_tenant_id: self.get("PROVIDER_TENANT_ID"),
        })
    }

    /// User of the default identity provider, used for cloud management tokens
    pub fn default_idp_user(&self) -> Result<(String, String)> {
        Ok((self.require("CF_USERNAME")?, self.require("CF_PASSWORD")?))
    }

    pub fn ias_admin_certificate(&self) -> Result<ClientCertificate> {
        Ok(ClientCertificate::new(
            self.require("IAS_ADMIN_CLIENT_CERT")?,
            self.require("IAS_ADMIN_CLIENT_KEY")?,
        ))
    }

    pub fn provider_tenant(&self) -> Option<Tenant> {
        self.tenant("PROVIDER_TENANT_NAME", "PROVIDER_TENANT_ID")
    }

    pub fn subscriber_tenant(&self) -> Option<Tenant> {
        self.tenant("SUBSCRIBER_TENANT_NAME", "SUBSCRIBER_TENANT_ID")
    }

    fn tenant(&self, name_key: &str, id_key: &str) -> Option<Tenant> {
        Some(Tenant {
            name: self.get(name_key)?,
            id: self.get(id_key)?,
        })
    }

    pub fn cis_credentials(&self) -> Result<CisCredentialMap> {
        let raw = self.require("CIS_CREDENTIALS")?;
        serde_json::from_str(&raw).map_err(|e| E2eError::parse("CIS_CREDENTIALS", e))
    }

    pub fn cis_credentials_for(&self, org: &str) -> Result<CisCredentials> {
        self.cis_credentials()?
            .remove(org)
            .ok_or_else(|| E2eError::Precondition(format!("CIS_CREDENTIALS has no entry for org '{}'", org)))
    }

    pub fn npm_registry(&self) -> String {
        self.get("NPM_REGISTRY")
            .unwrap_or_else(|| DEFAULT_NPM_REGISTRY.to_string())
    }

    pub fn cf_cli(&self) -> String {
        self.get("CF_CLI").unwrap_or_else(|| "cf".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_lowercase_fallback_and_empty_values() {
        let settings = Settings::from_pairs([("cfamsuser", "bot"), ("CFAMSPASSWORD", "")]);
        assert_eq!(settings.get("CFAMSUSER").as_deref(), Some("bot"));
        assert!(settings.get("CFAMSPASSWORD").is_none());

        let err = settings.ias_user().unwrap_err();
        assert!(matches!(err, E2eError::MissingConfig { ref key, .. } if key == "CFAMSPASSWORD"));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.npm_registry(), DEFAULT_NPM_REGISTRY);
        assert_eq!(settings.cf_cli(), "cf");
        assert!(settings.provider_tenant().is_none());
    }

    #[test]
    fn test_tenants_need_name_and_id() {
        let settings = Settings::from_pairs([
            ("PROVIDER_TENANT_NAME", "provider"),
            ("PROVIDER_TENANT_ID", "p-1"),
            ("SUBSCRIBER_TENANT_ID", "s-1"),
        ]);
        assert_eq!(
            settings.provider_tenant(),
            Some(Tenant {
                name: "provider".into(),
                id: "p-1".into()
            })
        );
        assert!(settings.subscriber_tenant().is_none());
    }

    #[test]
    fn test_cis_credentials_by_org() {
        let settings = Settings::from_pairs([(
            "CIS_CREDENTIALS",
            r#"{"subscriber-org": {"clientid": "c", "clientsecret": "s", "url": "https://cis"}}"#,
        )]);
        let cis = settings.cis_credentials_for("subscriber-org").unwrap();
        assert_eq!(cis.url, "https://cis");
        assert!(matches!(
            settings.cis_credentials_for("other"),
            Err(E2eError::Precondition(_))
        ));
    }

    #[test]
    fn test_non_interactive_prompt_fails_with_missing_config() {
        let settings = Settings::default();
        let err = settings
            .require_or_prompt("K8SNAMESPACE", "Kubernetes namespace", false)
            .unwrap_err();
        assert!(err.to_string().contains("K8SNAMESPACE"));
    }

    #[test]
    fn test_load_reads_env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "AMS_E2E_SETTINGS_TEST=from-file").unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.get("AMS_E2E_SETTINGS_TEST").as_deref(), Some("from-file"));
    }
}
