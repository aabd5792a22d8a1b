//! Cloud Foundry v3 API, authenticated with the CF CLI session token

use log::{debug, info};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::target::Target;
use crate::api::client::{Auth, Body, HttpClient, HttpResponse};
use crate::api::resilience::{Poll, RetryPolicy};
use crate::error::{E2eError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    pub guid: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LastOperation {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInstance {
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub last_operation: Option<LastOperation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Binding {
    pub guid: String,
}

#[derive(Debug, Clone, Deserialize)]
struct JobError {
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Job {
    guid: String,
    state: String,
    #[serde(default)]
    errors: Vec<JobError>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    pagination: Option<Pagination>,
    resources: Vec<T>,
}

#[derive(Debug, Clone)]
pub struct CfApi {
    http: HttpClient,
    base_url: String,
    token: String,
}

impl CfApi {
    pub fn new(http: HttpClient, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn for_target(http: HttpClient, target: &Target) -> Self {
        Self::new(http, target.api_endpoint.clone(), target.token.clone())
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    fn auth(&self) -> Auth<'_> {
        Auth::Raw(&self.token)
    }

    async fn request(&self, method: Method, url: &str, body: Body) -> Result<HttpResponse> {
        debug!("CF API {} {}", method, url);
        self.http.send(method, url, self.auth(), body).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.request(Method::GET, url, Body::Empty).await?.expect_status(200)?.json()
    }

    /// Collects every page of a list endpoint
    async fn list<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<Vec<T>> {
        let mut url = format!("{}{}", self.base_url, path_and_query);
        let mut items = Vec::new();
        loop {
            let page: Page<T> = self.get_json(&url).await?;
            items.extend(page.resources);
            match page.pagination.and_then(|p| p.next) {
                Some(next) => url = next.href,
                None => return Ok(items),
            }
        }
    }

    pub async fn apps(&self, space_guid: &str) -> Result<Vec<Resource>> {
        self.list(&format!("/v3/apps?space_guids={}", space_guid)).await
    }

    pub async fn app_by_name(&self, space_guid: &str, name: &str) -> Result<Option<Resource>> {
        let apps: Vec<Resource> = self
            .list(&format!("/v3/apps?names={}&space_guids={}", name, space_guid))
            .await?;
        Ok(apps.into_iter().next())
    }

    pub async fn app_env(&self, app_guid: &str) -> Result<Value> {
        self.get_json(&format!("{}/v3/apps/{}/env", self.base_url, app_guid)).await
    }

    /// `VCAP_SERVICES` of a named app, `None` if the app does not exist
    pub async fn vcap_services(&self, space_guid: &str, app_name: &str) -> Result<Option<Value>> {
        let Some(app) = self.app_by_name(space_guid, app_name).await? else {
            return Ok(None);
        };
        let env = self.app_env(&app.guid).await?;
        let vcap = &env["system_env_json"]["VCAP_SERVICES"];
        Ok(if vcap.is_null() { None } else { Some(vcap.clone()) })
    }

    pub async fn service_instances(&self, space_guid: &str) -> Result<Vec<ServiceInstance>> {
        self.list(&format!("/v3/service_instances?space_guids={}", space_guid))
            .await
    }

    pub async fn service_instance_by_name(&self, space_guid: &str, name: &str) -> Result<Option<ServiceInstance>> {
        let instances: Vec<ServiceInstance> = self
            .list(&format!("/v3/service_instances?names={}&space_guids={}", name, space_guid))
            .await?;
        Ok(instances.into_iter().next())
    }

    pub async fn service_offering(&self, label: &str) -> Result<Resource> {
        let offerings: Vec<Resource> = self
            .list(&format!("/v3/service_offerings?names={}", label))
            .await?;
        offerings
            .into_iter()
            .next()
            .ok_or_else(|| E2eError::Precondition(format!("service offering '{}' not available", label)))
    }

    pub async fn service_plan(&self, offering_guid: &str, plan: &str, space_guid: &str) -> Result<Resource> {
        let plans: Vec<Resource> = self
            .list(&format!(
                "/v3/service_plans?names={}&service_offering_guids={}&space_guids={}",
                plan, offering_guid, space_guid
            ))
            .await?;
        plans
            .into_iter()
            .next()
            .ok_or_else(|| E2eError::Precondition(format!("service plan '{}' not available in space", plan)))
    }

    /// Requests a managed service instance; provisioning continues asynchronously
    pub async fn create_service_instance(
        &self,
        name: &str,
        space_guid: &str,
        plan_guid: &str,
        parameters: &Value,
    ) -> Result<()> {
        let body = serde_json::json!({
            "type": "managed",
            "name": name,
            "parameters": parameters,
            "relationships": {
                "space": { "data": { "guid": space_guid } },
                "service_plan": { "data": { "guid": plan_guid } }
            }
        });
        let url = format!("{}/v3/service_instances", self.base_url);
        let response = self.request(Method::POST, &url, Body::Json(body)).await?;
        if response.status != 202 && response.status != 201 {
            return Err(response.into_unexpected(202));
        }
        Ok(())
    }

    pub async fn bindings(&self, app_guid: &str, instance_guid: &str) -> Result<Vec<Binding>> {
        self.list(&format!(
            "/v3/service_credential_bindings?app_guids={}&service_instance_guids={}",
            app_guid, instance_guid
        ))
        .await
    }

    pub async fn delete_app(&self, guid: &str) -> Result<()> {
        self.delete(&format!("{}/v3/apps/{}", self.base_url, guid)).await
    }

    pub async fn delete_service_instance(&self, guid: &str) -> Result<()> {
        self.delete(&format!("{}/v3/service_instances/{}", self.base_url, guid))
            .await
    }

    pub async fn delete_binding(&self, guid: &str) -> Result<()> {
        self.delete(&format!("{}/v3/service_credential_bindings/{}", self.base_url, guid))
            .await
    }

    /// Deletes a resource and waits for the deletion job, if the API started one
    async fn delete(&self, url: &str) -> Result<()> {
        let response = self.request(Method::DELETE, url, Body::Empty).await?;
        match response.status {
            202 => match response.location() {
                Some(job) => self.wait_for_job(&job.to_string()).await,
                None => Ok(()),
            },
            204 | 404 => Ok(()),
            _ => Err(response.into_unexpected(202)),
        }
    }

    /// Polls a job until `COMPLETE`; `FAILED` ends the poll with [`E2eError::JobFailed`]
    pub async fn wait_for_job(&self, job_url: &str) -> Result<()> {
        RetryPolicy::new(self.http.resilience().cf_job)
            .poll(&format!("job {}", job_url), || async move {
                let job: Job = match self.get_json(job_url).await {
                    Ok(job) => job,
                    Err(e) => return Poll::retry_on_status(e),
                };
                match job.state.as_str() {
                    "COMPLETE" => Ok(Poll::Ready(())),
                    "FAILED" => Err(E2eError::JobFailed {
                        job: job.guid,
                        errors: job
                            .errors
                            .iter()
                            .map(|e| e.detail.as_str())
                            .collect::<Vec<_>>()
                            .join("; "),
                    }),
                    state => Ok(Poll::Pending(format!("job {} is {}", job.guid, state))),
                }
            })
            .await?;
        info!("job {} completed", job_url);
        Ok(())
    }
}
