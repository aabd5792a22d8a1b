use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::info;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::api::mtls::ClientCertificate;
use crate::error::{E2eError, Result};

const IDENTITY: &str = "identity";
const SUBSCRIPTION: &str = "subscription-manager";

/// Flat string view over a credentials object, with named-key lookups
#[derive(Debug, Clone, Default)]
pub struct CredentialSource {
    service: String,
    values: BTreeMap<String, String>,
}

impl CredentialSource {
    /// From a `VCAP_SERVICES` credentials object. Non-string values are kept as JSON text.
    pub fn from_json(service: &str, credentials: &Map<String, Value>) -> Self {
        let values = credentials
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect();
        Self {
            service: service.to_string(),
            values,
        }
    }

    /// From the `data` map of a Kubernetes secret (base64 encoded values)
    pub fn from_secret_data(service: &str, data: &BTreeMap<String, String>) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (key, encoded) in data {
            let decoded = STANDARD
                .decode(encoded.trim())
                .map_err(|e| E2eError::parse(format!("secret key '{}'", key), e))?;
            let text = String::from_utf8(decoded).map_err(|e| E2eError::parse(format!("secret key '{}'", key), e))?;
            values.insert(key.clone(), text);
        }
        info!("Decoded {} keys of {} secret", values.len(), service);
        Ok(Self {
            service: service.to_string(),
            values,
        })
    }

    pub fn optional(&self, key: &str) -> Option<String> {
        self.values.get(key).filter(|v| !v.is_empty()).cloned()
    }

    pub fn required(&self, key: &str) -> Result<String> {
        self.optional(key).ok_or_else(|| E2eError::MissingCredential {
            service: self.service.clone(),
            key: key.to_string(),
        })
    }
}

/// Credentials of an identity service binding
#[derive(Clone)]
pub struct IdentityCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub url: String,
    pub certificate: Option<String>,
    pub key: Option<String>,
    pub domains: Option<String>,
    pub authorization_instance_id: Option<String>,
    pub authorization_url: Option<String>,
    /// Binding display name, used when the app is started locally
    pub name: Option<String>,
}

impl IdentityCredentials {
    pub fn from_source(source: &CredentialSource) -> Result<Self> {
        Ok(Self {
            client_id: source.required("clientid")?,
            client_secret: source.optional("clientsecret"),
            url: source.required("url")?,
            certificate: source.optional("certificate"),
            key: source.optional("key"),
            domains: source.optional("domains"),
            authorization_instance_id: source.optional("authorization_instance_id"),
            authorization_url: source.optional("authorization_url"),
            name: source.optional("name"),
        })
    }

    pub fn from_json(credentials: &Map<String, Value>) -> Result<Self> {
        Self::from_source(&CredentialSource::from_json(IDENTITY, credentials))
    }

    pub fn from_secret_data(data: &BTreeMap<String, String>) -> Result<Self> {
        Self::from_source(&CredentialSource::from_secret_data(IDENTITY, data)?)
    }

    /// Certificate and key when the binding uses X.509 credentials
    pub fn client_certificate(&self) -> Option<ClientCertificate> {
        match (&self.certificate, &self.key) {
            (Some(cert), Some(key)) => Some(ClientCertificate::new(cert.clone(), key.clone())),
            _ => None,
        }
    }

    pub fn require_client_certificate(&self) -> Result<ClientCertificate> {
        self.client_certificate().ok_or_else(|| E2eError::MissingCredential {
            service: IDENTITY.to_string(),
            key: "certificate".to_string(),
        })
    }

    pub fn require_client_secret(&self) -> Result<&str> {
        self.client_secret.as_deref().ok_or_else(|| E2eError::MissingCredential {
            service: IDENTITY.to_string(),
            key: "clientsecret".to_string(),
        })
    }

    pub fn require_authorization_instance_id(&self) -> Result<&str> {
        self.authorization_instance_id
            .as_deref()
            .ok_or_else(|| E2eError::MissingCredential {
                service: IDENTITY.to_string(),
                key: "authorization_instance_id".to_string(),
            })
    }
}

impl std::fmt::Debug for IdentityCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCredentials")
            .field("client_id", &self.client_id)
            .field("url", &self.url)
            .field("x509", &self.certificate.is_some())
            .field("authorization_instance_id", &self.authorization_instance_id)
            .finish()
    }
}

/// Credentials of a subscription-manager service binding
#[derive(Clone)]
pub struct SubscriptionCredentials {
    pub subscription_manager_url: String,
    pub app_name: String,
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl SubscriptionCredentials {
    pub fn from_json(credentials: &Map<String, Value>) -> Result<Self> {
        let source = CredentialSource::from_json(SUBSCRIPTION, credentials);
        Ok(Self {
            subscription_manager_url: source.required("subscription_manager_url")?,
            app_name: source.required("app_name")?,
            url: source.required("url")?,
            client_id: source.required("clientid")?,
            client_secret: source.required("clientsecret")?,
        })
    }
}

impl std::fmt::Debug for SubscriptionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionCredentials")
            .field("subscription_manager_url", &self.subscription_manager_url)
            .field("app_name", &self.app_name)
            .field("client_id", &self.client_id)
            .finish()
    }
}
