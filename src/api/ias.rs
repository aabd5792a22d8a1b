//! Identity service client: user and client tokens, AMS policies, SCIM group membership

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use log::info;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

use super::auth::Grant;
use super::client::{Auth, Body, HttpClient, HttpResponse};
use super::mtls::ClientCertificate;
use crate::auth::credentials::IdentityCredentials;
use crate::error::{E2eError, Result};

const TOKEN_ENDPOINT: &str = "/oauth2/token";
const AMS_API_ENDPOINT: &str = "/authorization/sap/ams/v1/ams-instances";
const SCIM_PATCH_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// Named IAS user the sample apps are tested with
#[derive(Clone)]
pub struct IasUser {
    pub username: String,
    pub password: String,
    /// Zone the mTLS grants are issued for
    pub provider_tenant_id: Option<String>,
}

impl std::fmt::Debug for IasUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IasUser")
            .field("username", &self.username)
            .field("provider_tenant_id", &self.provider_tenant_id)
            .finish()
    }
}

/// AMS policy as returned by the policies endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    pub id: String,
    pub group_id: Option<String>,
}

#[derive(Debug)]
pub struct IasClient {
    http: HttpClient,
    credentials: IdentityCredentials,
    /// Service provider name in IAS; the identity instance guid on Cloud Foundry, unknown on Kyma
    service_provider: Option<String>,
    user: IasUser,
    token: String,
    client_token: Option<String>,
}

impl IasClient {
    /// Fetches the user token and, for X.509 bindings, the client token
    pub async fn connect(
        http: HttpClient,
        credentials: IdentityCredentials,
        service_provider: Option<String>,
        user: IasUser,
    ) -> Result<Self> {
        let mut client = Self {
            http,
            credentials,
            service_provider,
            user,
            token: String::new(),
            client_token: None,
        };
        client.renew_tokens().await?;
        Ok(client)
    }

    pub fn url(&self) -> &str {
        &self.credentials.url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn client_token(&self) -> Option<&str> {
        self.client_token.as_deref()
    }

    pub fn credentials(&self) -> &IdentityCredentials {
        &self.credentials
    }

    fn token_url(&self) -> String {
        format!("{}{}", self.credentials.url, TOKEN_ENDPOINT)
    }

    fn policies_url(&self) -> Result<String> {
        Ok(format!(
            "{}{}/{}/policies",
            self.credentials.url,
            AMS_API_ENDPOINT,
            self.credentials.require_authorization_instance_id()?
        ))
    }

    async fn renew_tokens(&mut self) -> Result<()> {
        self.token = self.user_token().await?;
        self.client_token = self.technical_token().await?;
        Ok(())
    }

    async fn user_token(&self) -> Result<String> {
        let grant = Grant::Password {
            username: &self.user.username,
            password: &self.user.password,
        };
        match self.credentials.client_certificate() {
            Some(certificate) => {
                self.http
                    .token_via_mtls(
                        &self.token_url(),
                        &self.credentials.client_id,
                        &certificate,
                        grant,
                        self.user.provider_tenant_id.as_deref(),
                    )
                    .await
            }
            None => {
                let url = self.token_url();
                self.http
                    .token_with_secret(
                        &url,
                        &self.credentials.client_id,
                        self.credentials.require_client_secret()?,
                        grant,
                    )
                    .await?
                    .id_token(&url)
            }
        }
    }

    async fn technical_token(&self) -> Result<Option<String>> {
        let Some(certificate) = self.credentials.client_certificate() else {
            return Ok(None);
        };
        let token = self
            .http
            .token_via_mtls(
                &self.token_url(),
                &self.credentials.client_id,
                &certificate,
                Grant::ClientCredentials,
                self.user.provider_tenant_id.as_deref(),
            )
            .await?;
        Ok(Some(token))
    }

    /// Creates a DCL policy and waits until AMS has assigned it a group.
    /// Returns the policy and its `Location`.
    pub async fn create_policy(&self, dcl: &str) -> Result<(Policy, String)> {
        let policies_url = self.policies_url()?;
        info!("Creating policy at {}", policies_url);

        let response = self
            .http
            .send_auth_redirect(
                Method::POST,
                &policies_url,
                Auth::Bearer(&self.token),
                Body::Json(json!({ "dcl_file": { "content": dcl } })),
            )
            .await?
            .expect_status(201)?;
        let location = response
            .location()
            .ok_or_else(|| E2eError::Precondition(format!("policy created at {} without Location header", policies_url)))?
            .to_string();

        let policy_url = format!("{}/authorization{}", self.credentials.url, location);
        let response = self
            .http
            .get_verified(&policy_url, Some(&self.token), has_group_id)
            .await?;
        Ok((response.json()?, location))
    }

    /// Adds a user to the group backing a policy, authenticated with the IAS admin certificate
    pub async fn assign_user_to_policy(
        &self,
        user_uuid: &str,
        group_id: &str,
        admin_certificate: &ClientCertificate,
    ) -> Result<HttpResponse> {
        let patch_url = format!("{}/scim/Groups/{}", self.credentials.url, group_id);
        info!("Assigning user {} to group {}", user_uuid, group_id);
        self.http
            .send_mtls(
                Method::PATCH,
                &patch_url,
                admin_certificate,
                Auth::None,
                Body::JsonAs("application/scim+json", scim_add_member(user_uuid)),
                true,
                204,
            )
            .await?
            .expect_status(204)
    }

    pub async fn delete_policy(&self, policy_id: &str) -> Result<HttpResponse> {
        let delete_url = format!("{}/{}", self.policies_url()?, policy_id);
        info!("Deleting policy {}", delete_url);
        self.http
            .send_auth_redirect(Method::DELETE, &delete_url, Auth::Bearer(&self.token), Body::Empty)
            .await?
            .expect_status(204)
    }

    /// Maps the `ias_admin` assertion attribute onto the service provider, then renews
    /// both tokens so they carry it. Needs an X.509 binding.
    pub async fn add_assertion_attribute(&mut self) -> Result<()> {
        let service_provider = self.service_provider.as_deref().ok_or_else(|| {
            E2eError::Precondition("the service provider of this identity binding is unknown".into())
        })?;
        let certificate = self.credentials.require_client_certificate()?;

        let lookup_url = format!("{}/service/sps?sp_name={}", self.credentials.url, service_provider);
        let response = self
            .http
            .send_mtls(Method::GET, &lookup_url, &certificate, Auth::None, Body::Empty, false, 301)
            .await?
            .expect_status(301)?;
        let service_id = response
            .location()
            .and_then(|location| location.rsplit('/').next())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| E2eError::Precondition(format!("no service provider location in answer of {}", lookup_url)))?
            .to_string();

        let update_url = format!("{}/service/sps/{}", self.credentials.url, service_id);
        self.http
            .send_mtls(
                Method::PUT,
                &update_url,
                &certificate,
                Auth::None,
                Body::Json(json!({
                    "constant_attributes": [
                        { "assertionAttribute": "ias_admin", "value": "${customAttribute1}" }
                    ]
                })),
                true,
                200,
            )
            .await?
            .expect_status(200)?;

        self.renew_tokens().await
    }

    /// Asserts the user token is denied on `url`, polled with the policy-absent window
    pub async fn check_policy_is_not_assigned(&self, url: &str) -> Result<HttpResponse> {
        self.http
            .get_expecting_with(self.http.resilience().policy_absent, url, 403, Some(&self.token))
            .await
    }

    /// Polls `url` with the user token until access is granted
    pub async fn wait_for_policy(&self, url: &str) -> Result<HttpResponse> {
        self.http
            .get_expecting_with(self.http.resilience().policy_propagation, url, 200, Some(&self.token))
            .await
    }
}

fn has_group_id(response: &HttpResponse) -> bool {
    response
        .json::<Value>()
        .map(|policy| !policy["group_id"].is_null())
        .unwrap_or(false)
}

fn scim_add_member(user_uuid: &str) -> Value {
    json!({
        "schemas": [SCIM_PATCH_SCHEMA],
        "Operations": [{
            "op": "add",
            "path": "members",
            "value": [{ "value": user_uuid }]
        }]
    })
}

/// Reads a claim from a JWT payload. The signature is not verified.
pub fn jwt_claim(token: &str, claim: &str) -> Result<String> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| E2eError::parse("token", "not a JWT"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| E2eError::parse("token payload", e))?;
    let claims: Value = serde_json::from_slice(&bytes)?;
    claims[claim]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| E2eError::parse("token payload", format!("no claim '{}'", claim)))
}
