use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

use crate::auth::credentials::{IdentityCredentials, SubscriptionCredentials};
use crate::cf::{CfClient, Target};
use crate::error::{E2eError, Result};

/// Credentials of the services bound to a deployed sample app
#[derive(Debug, Clone)]
pub struct BoundServices {
    pub identity: IdentityCredentials,
    /// Guid of the identity instance, the service provider name in IAS
    pub identity_instance_guid: String,
    pub subscription: Option<SubscriptionCredentials>,
}

impl BoundServices {
    pub fn from_vcap(app_name: &str, vcap: Option<&Value>) -> Result<Self> {
        let no_identity = || E2eError::Precondition(format!("No identity service found for '{}'", app_name));
        let identity = vcap
            .and_then(|vcap| vcap.get("identity"))
            .and_then(|bindings| bindings.get(0))
            .ok_or_else(no_identity)?;
        let credentials = identity
            .get("credentials")
            .and_then(Value::as_object)
            .ok_or_else(no_identity)?;

        let mut identity_credentials = IdentityCredentials::from_json(credentials)?;
        if identity_credentials.name.is_none() {
            identity_credentials.name = identity.get("name").and_then(Value::as_str).map(str::to_string);
        }
        let identity_instance_guid = identity
            .get("instance_guid")
            .and_then(Value::as_str)
            .ok_or_else(|| E2eError::MissingCredential {
                service: "identity".into(),
                key: "instance_guid".into(),
            })?
            .to_string();

        let subscription = vcap
            .and_then(|vcap| vcap.get("subscription-manager"))
            .and_then(|bindings| bindings.get(0))
            .and_then(|binding| binding.get("credentials"))
            .and_then(Value::as_object)
            .map(SubscriptionCredentials::from_json)
            .transpose()?;

        Ok(Self {
            identity: identity_credentials,
            identity_instance_guid,
            subscription,
        })
    }
}

/// A sample app pushed to the targeted space
#[derive(Debug)]
pub struct SampleApp {
    pub name: String,
    pub dir: String,
    pub url: String,
    pub cert_url: String,
    services: OnceCell<BoundServices>,
}

impl SampleApp {
    pub fn new(name: &str, dir: &str, target: &Target) -> Self {
        Self {
            name: name.to_string(),
            dir: dir.to_string(),
            url: target.app_url(name),
            cert_url: target.app_cert_url(name),
            services: OnceCell::new(),
        }
    }

    pub fn working_dir(&self, samples_root: &Path) -> PathBuf {
        samples_root.join(&self.dir)
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    pub fn cert_url_for(&self, path: &str) -> String {
        format!("{}{}", self.cert_url, path)
    }

    /// Read from the app environment on first use, then cached
    pub async fn services(&self, cf: &CfClient) -> Result<&BoundServices> {
        self.services
            .get_or_try_init(|| async {
                let vcap = cf.vcap_services(&self.name).await?;
                BoundServices::from_vcap(&self.name, vcap.as_ref())
            })
            .await
    }
}

impl std::fmt::Display for SampleApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let service = self
            .services
            .get()
            .and_then(|services| services.identity.name.as_deref())
            .unwrap_or("-");
        write!(f, "Name: {}, IAS-Service-Name: {}", self.name, service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_vcap_reads_identity_and_subscription() {
        let vcap = json!({
            "identity": [{
                "name": "java-ams-ias",
                "instance_guid": "0f8c-guid",
                "credentials": {
                    "clientid": "cid",
                    "clientsecret": "secret",
                    "url": "https://tenant.accounts.ondemand.com"
                }
            }],
            "subscription-manager": [{
                "credentials": {
                    "subscription_manager_url": "https://sms.example",
                    "app_name": "java-ams",
                    "url": "https://auth.example",
                    "clientid": "sms-cid",
                    "clientsecret": "sms-secret"
                }
            }]
        });

        let services = BoundServices::from_vcap("java-ams", Some(&vcap)).unwrap();
        assert_eq!(services.identity.client_id, "cid");
        assert_eq!(services.identity.name.as_deref(), Some("java-ams-ias"));
        assert_eq!(services.identity_instance_guid, "0f8c-guid");
        assert_eq!(services.subscription.unwrap().app_name, "java-ams");
    }

    #[test]
    fn test_from_vcap_without_identity() {
        let err = BoundServices::from_vcap("node-ams", Some(&json!({ "xsuaa": [] }))).unwrap_err();
        assert_eq!(err.to_string(), "No identity service found for 'node-ams'");

        assert!(BoundServices::from_vcap("node-ams", None).is_err());
    }
}
