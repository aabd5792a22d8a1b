//! Subscription management: SaaS subscriptions of the multi-tenant sample app

use log::{info, warn};
use reqwest::Method;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::auth::Grant;
use super::client::{Auth, Body, HttpClient};
use super::resilience::{Poll, RetryPolicy};
use crate::auth::credentials::SubscriptionCredentials;
use crate::error::Result;

const SMS_API_PATH: &str = "/subscription-manager/v1/subscriptions/";
const SAAS_API_PATH: &str = "/saas-manager/v1/applications/";

/// Client credentials of the cloud management service of a subscriber subaccount,
/// keyed by org in `CIS_CREDENTIALS`
#[derive(Clone, Deserialize)]
pub struct CisCredentials {
    pub clientid: String,
    pub clientsecret: String,
    pub url: String,
}

impl std::fmt::Debug for CisCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CisCredentials")
            .field("clientid", &self.clientid)
            .field("url", &self.url)
            .finish()
    }
}

pub type CisCredentialMap = BTreeMap<String, CisCredentials>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Accepted,
    /// A subscription from an earlier run is still there
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    NothingToDelete,
    Deleted(usize),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSubscription {
    pub state: Option<String>,
    pub subscription_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionEntry {
    #[serde(default)]
    subscription_id: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionList {
    #[serde(default)]
    subscriptions: Vec<SubscriptionEntry>,
}

#[derive(Debug, Clone)]
pub struct SmsClient {
    http: HttpClient,
}

impl SmsClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Client-credentials token of the subscription-manager binding
    pub async fn sms_token(&self, credentials: &SubscriptionCredentials) -> Result<String> {
        let url = format!("{}/oauth/token", credentials.url);
        self.http
            .token_with_secret(&url, &credentials.client_id, &credentials.client_secret, Grant::ClientCredentials)
            .await?
            .access_token(&url)
    }

    /// Password token of the subscriber's cloud management service, for the
    /// default identity provider user
    pub async fn cis_token(&self, cis: &CisCredentials, username: &str, password: &str) -> Result<String> {
        let url = format!("{}/oauth/token", cis.url);
        self.http
            .token_with_secret(&url, &cis.clientid, &cis.clientsecret, Grant::Password { username, password })
            .await?
            .access_token(&url)
    }

    pub async fn subscribe(&self, sms_url: &str, app_name: &str, token: &str) -> Result<SubscribeOutcome> {
        let url = format!("{}{}{}/subscription", sms_url, SAAS_API_PATH, app_name);
        let response = self
            .http
            .send(Method::POST, &url, Auth::Bearer(token), Body::Empty)
            .await?;
        match response.status {
            202 => Ok(SubscribeOutcome::Accepted),
            409 => {
                warn!(
                    "Subscription already exists. All subscriptions should have been deleted before running the e2e tests"
                );
                Ok(SubscribeOutcome::AlreadySubscribed)
            }
            _ => Err(response.into_unexpected(202)),
        }
    }

    pub async fn subscription_by_name(&self, sms_url: &str, app_name: &str, token: &str) -> Result<ApplicationSubscription> {
        let url = format!("{}{}{}", sms_url, SAAS_API_PATH, app_name);
        self.http.get(&url, Some(token)).await?.expect_status(200)?.json()
    }

    /// Polls until the subscription is `SUBSCRIBED` and returns its URL
    pub async fn subscription_url(&self, sms_url: &str, app_name: &str, token: &str) -> Result<Option<String>> {
        RetryPolicy::new(self.http.resilience().subscription_state)
            .poll(&format!("subscription of {}", app_name), || async move {
                let subscription = match self.subscription_by_name(sms_url, app_name, token).await {
                    Ok(subscription) => subscription,
                    Err(e) => return Poll::retry_on_status(e),
                };
                let state = subscription.state.clone().unwrap_or_default();
                info!("Subscription for {} status is {}", app_name, state);
                if state == "SUBSCRIBED" {
                    Ok(Poll::Ready(subscription.subscription_url))
                } else {
                    Ok(Poll::Pending(format!(
                        "Subscription for {} - status {} != SUBSCRIBED, subscriptionUrl is not available",
                        app_name, state
                    )))
                }
            })
            .await
    }

    /// Ids of all subscriptions of the provider app
    pub async fn list_subscriptions(&self, sms_url: &str, token: &str) -> Result<Vec<String>> {
        let url = format!("{}{}", sms_url, SMS_API_PATH);
        let list: SubscriptionList = self.http.get(&url, Some(token)).await?.expect_status(200)?.json()?;
        Ok(list
            .subscriptions
            .into_iter()
            .map(|s| s.subscription_id)
            .filter(|id| !id.is_empty())
            .collect())
    }

    /// Deletes every subscription and waits until the list is empty
    pub async fn delete_subscriptions(&self, credentials: &SubscriptionCredentials) -> Result<DeleteOutcome> {
        let sms_url = credentials.subscription_manager_url.as_str();
        let token = self.sms_token(credentials).await?;
        let token = token.as_str();

        let ids = self.list_subscriptions(sms_url, token).await?;
        if ids.is_empty() {
            info!("no subscriptions to delete");
            return Ok(DeleteOutcome::NothingToDelete);
        }

        for id in &ids {
            let url = format!("{}{}{}", sms_url, SMS_API_PATH, id);
            let response = self.http.send(Method::DELETE, &url, Auth::Bearer(token), Body::Empty).await?;
            if !response.is_success() {
                return Err(response.into_unexpected(202));
            }
            info!(
                "DELETE request for subscription with id '{}' succeeded - status code:'{}'",
                id, response.status
            );
        }

        RetryPolicy::new(self.http.resilience().subscription_deletion)
            .poll("subscription deletion", || async move {
                let remaining = match self.list_subscriptions(sms_url, token).await {
                    Ok(remaining) => remaining,
                    Err(e) => return Poll::retry_on_status(e),
                };
                if remaining.is_empty() {
                    info!("subscriptions deleted");
                    Ok(Poll::Ready(()))
                } else {
                    Ok(Poll::Pending(format!("{} subscriptions still exist", remaining.len())))
                }
            })
            .await?;
        Ok(DeleteOutcome::Deleted(ids.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::resilience::ResilienceConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> SmsClient {
        SmsClient::new(HttpClient::new(ResilienceConfig::immediate()).unwrap())
    }

    fn credentials(server: &MockServer) -> SubscriptionCredentials {
        SubscriptionCredentials {
            subscription_manager_url: server.uri(),
            app_name: "java-ams".into(),
            url: server.uri(),
            client_id: "sms-client".into(),
            client_secret: "sms-secret".into(),
        }
    }

    async fn token_endpoint(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "sms-token"})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_subscribe_conflict_is_reported_not_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/saas-manager/v1/applications/java-ams/subscription"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let outcome = client().subscribe(&server.uri(), "java-ams", "t").await.unwrap();
        assert_eq!(outcome, SubscribeOutcome::AlreadySubscribed);
    }

    #[tokio::test]
    async fn test_subscription_url_polls_until_subscribed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/saas-manager/v1/applications/java-ams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "IN_PROCESS"})))
            .up_to_n_times(3)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/saas-manager/v1/applications/java-ams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": "SUBSCRIBED",
                "subscriptionUrl": "https://subscriber.cfapps.example.com"
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let url = client().subscription_url(&server.uri(), "java-ams", "t").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://subscriber.cfapps.example.com"));
    }

    #[tokio::test]
    async fn test_delete_waits_until_list_is_empty() {
        let server = MockServer::start().await;
        token_endpoint(&server).await;
        Mock::given(method("GET"))
            .and(path("/subscription-manager/v1/subscriptions/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subscriptions": [{"subscriptionId": "s1"}, {"subscriptionId": "s2"}]
            })))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subscription-manager/v1/subscriptions/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"subscriptions": []})))
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(202))
            .expect(2)
            .mount(&server)
            .await;

        let outcome = client().delete_subscriptions(&credentials(&server)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted(2));
    }

    #[tokio::test]
    async fn test_failed_delete_surfaces_status() {
        let server = MockServer::start().await;
        token_endpoint(&server).await;
        Mock::given(method("GET"))
            .and(path("/subscription-manager/v1/subscriptions/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subscriptions": [{"subscriptionId": "s1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client().delete_subscriptions(&credentials(&server)).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
}
