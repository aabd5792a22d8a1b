//! Space-level operations: teardown, service provisioning, push

use futures::future::join_all;
use log::{error, info, warn};
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::api::{CfApi, Resource, ServiceInstance};
use super::manifest;
use super::target::Target;
use crate::api::resilience::{OperationLogger, Poll, RetryPolicy};
use crate::api::sms::{DeleteOutcome, SmsClient};
use crate::auth::credentials::SubscriptionCredentials;
use crate::config::Tenant;
use crate::error::{E2eError, Result};
use crate::process::{CommandLine, CommandRunner};

/// A managed service instance to create. Placeholders in the parameters file are
/// replaced before parsing.
#[derive(Debug, Clone)]
pub struct ServiceInstanceRequest {
    pub offering: String,
    pub plan: String,
    pub name: String,
    pub parameters: Value,
}

impl ServiceInstanceRequest {
    pub fn new(offering: &str, plan: &str, name: impl Into<String>) -> Self {
        Self {
            offering: offering.to_string(),
            plan: plan.to_string(),
            name: name.into(),
            parameters: Value::Object(Default::default()),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Reads a JSON parameters file, substituting `((ID))`, `((LANDSCAPE_APPS_DOMAIN))` and
    /// (when given) `((MT))`
    pub fn parameters_from_file(path: &Path, target: &Target, multi_tenant: Option<bool>) -> Result<Value> {
        let raw = std::fs::read_to_string(path)?;
        let mut rendered = raw
            .replace("((ID))", &target.space)
            .replace("((LANDSCAPE_APPS_DOMAIN))", &target.landscape_domain);
        if let Some(mt) = multi_tenant {
            rendered = rendered.replace("((MT))", if mt { "True" } else { "False" });
        }
        serde_json::from_str(&rendered).map_err(|e| E2eError::parse(format!("{:?}", path), e))
    }
}

/// Tenants substituted into multi-tenant manifests
#[derive(Debug, Clone)]
pub struct TenantVars {
    pub provider: Tenant,
    pub subscriber: Tenant,
}

/// Awaits every future, then reports the first failure. Siblings of a failed item run to
/// completion.
pub async fn fan_out<F>(category: &str, operations: Vec<F>) -> Result<usize>
where
    F: Future<Output = Result<()>>,
{
    if operations.is_empty() {
        info!("{}: nothing to do", category);
        return Ok(0);
    }
    let count = operations.len();
    let started = Instant::now();
    let results = join_all(operations).await;

    let mut first_error = None;
    for result in results {
        if let Err(e) = result {
            error!("{}: {}", category, e);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => {
            info!(
                "{}: {} done after {:.2}s",
                category,
                count,
                started.elapsed().as_secs_f64()
            );
            Ok(count)
        }
    }
}

pub struct CfClient {
    runner: Arc<dyn CommandRunner>,
    api: CfApi,
    operations: OperationLogger,
    target: Target,
    cf_cli: String,
}

impl CfClient {
    pub fn new(runner: Arc<dyn CommandRunner>, api: CfApi, target: Target, cf_cli: impl Into<String>) -> Self {
        Self {
            runner,
            api,
            operations: OperationLogger::new(),
            target,
            cf_cli: cf_cli.into(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn api(&self) -> &CfApi {
        &self.api
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub async fn vcap_services(&self, app_name: &str) -> Result<Option<Value>> {
        self.api.vcap_services(&self.target.space_guid, app_name).await
    }

    async fn apps(&self) -> Result<Vec<Resource>> {
        self.api.apps(&self.target.space_guid).await
    }

    /// First binding of `service` in an app's `VCAP_SERVICES`
    fn first_binding<'a>(vcap: &'a Value, service: &str) -> Option<&'a Value> {
        vcap.get(service).and_then(|bindings| bindings.get(0))
    }

    /// Every category in order, each awaited to completion
    pub async fn teardown(&self, sms: &SmsClient) -> Result<()> {
        self.delete_app_subscriptions(sms).await?;
        self.delete_app_bindings().await?;
        self.delete_apps().await?;
        self.delete_services().await?;
        self.delete_orphaned_routes().await
    }

    pub async fn delete_app_subscriptions(&self, sms: &SmsClient) -> Result<usize> {
        let mut credentials = Vec::new();
        for app in self.apps().await? {
            info!("Checking app {}", app.name);
            let Some(vcap) = self.api.app_env(&app.guid).await?.pointer("/system_env_json/VCAP_SERVICES").cloned() else {
                info!("No VCAP_SERVICES found for app {}", app.name);
                continue;
            };
            match Self::first_binding(&vcap, "subscription-manager").and_then(|b| b.get("credentials")) {
                Some(Value::Object(creds)) => credentials.push(SubscriptionCredentials::from_json(creds)?),
                _ => info!("App {} is not bound to SMS service", app.name),
            }
        }

        let operations = credentials
            .iter()
            .map(|creds| async move {
                match sms.delete_subscriptions(creds).await? {
                    DeleteOutcome::NothingToDelete => {}
                    DeleteOutcome::Deleted(n) => info!("deleted {} subscriptions of {}", n, creds.app_name),
                }
                Ok::<(), E2eError>(())
            })
            .collect();
        fan_out("delete-subscriptions", operations).await
    }

    pub async fn delete_app_bindings(&self) -> Result<usize> {
        let mut targets = Vec::new();
        for app in self.apps().await? {
            info!("Checking app {}", app.name);
            let env = self.api.app_env(&app.guid).await?;
            let instance_name = env
                .pointer("/system_env_json/VCAP_SERVICES")
                .and_then(|vcap| Self::first_binding(vcap, "identity"))
                .and_then(|binding| binding.get("instance_name"))
                .and_then(Value::as_str)
                .map(str::to_string);
            match instance_name {
                Some(instance_name) => targets.push((app, instance_name)),
                None => info!("App {} has no identity service bindings", app.name),
            }
        }

        let operations = targets
            .iter()
            .map(|(app, instance_name)| self.unbind_service(app, instance_name))
            .collect();
        fan_out("unbind-service", operations).await
    }

    async fn unbind_service(&self, app: &Resource, instance_name: &str) -> Result<()> {
        let target = format!("{} from {}", instance_name, app.name);
        self.operations
            .track("unbind-service", &target, self.unbind_instance(app, instance_name))
            .await
    }

    async fn unbind_instance(&self, app: &Resource, instance_name: &str) -> Result<()> {
        let Some(instance) = self
            .api
            .service_instance_by_name(&self.target.space_guid, instance_name)
            .await?
        else {
            warn!("service instance {} is already gone", instance_name);
            return Ok(());
        };
        for binding in self.api.bindings(&app.guid, &instance.guid).await? {
            self.api.delete_binding(&binding.guid).await?;
        }
        Ok(())
    }

    pub async fn delete_apps(&self) -> Result<usize> {
        let apps = self.apps().await?;
        let operations = apps
            .iter()
            .map(|app| self.operations.track("delete-app", &app.name, self.api.delete_app(&app.guid)))
            .collect();
        fan_out("delete-app", operations).await
    }

    pub async fn delete_services(&self) -> Result<usize> {
        let instances = self.api.service_instances(&self.target.space_guid).await?;
        let operations = instances
            .iter()
            .map(|instance| {
                self.operations
                    .track("delete-service", &instance.name, self.api.delete_service_instance(&instance.guid))
            })
            .collect();
        fan_out("delete-service", operations).await
    }

    pub async fn delete_orphaned_routes(&self) -> Result<()> {
        let command = CommandLine::new(&self.cf_cli).args(["delete-orphaned-routes", "-f"]);
        self.runner.run_operation("delete-orphaned-routes", &command).await?;
        Ok(())
    }

    /// Creates the instance and waits until its last operation has `succeeded`
    pub async fn create_service_instance(&self, request: &ServiceInstanceRequest) -> Result<ServiceInstance> {
        self.operations
            .track("create-service", &request.name, self.provision(request))
            .await
    }

    async fn provision(&self, request: &ServiceInstanceRequest) -> Result<ServiceInstance> {
        let space_guid = &self.target.space_guid;
        let offering = self.api.service_offering(&request.offering).await?;
        let plan = self.api.service_plan(&offering.guid, &request.plan, space_guid).await?;
        self.api
            .create_service_instance(&request.name, space_guid, &plan.guid, &request.parameters)
            .await?;

        info!("polling service \"{}\" for last_operation succeeded", request.name);
        let instance = RetryPolicy::new(self.api.http().resilience().service_provisioning)
            .poll(&format!("service instance {}", request.name), || async move {
                let listed = match self.api.service_instance_by_name(space_guid, &request.name).await {
                    Ok(listed) => listed,
                    Err(e) => return Poll::retry_on_status(e),
                };
                let Some(instance) = listed else {
                    return Ok(Poll::Pending(format!("{} not listed yet", request.name)));
                };
                let operation = instance.last_operation.clone().unwrap_or_default();
                match operation.state.as_str() {
                    "succeeded" => Ok(Poll::Ready(instance)),
                    "failed" => Err(E2eError::CreationFailed {
                        instance: request.name.clone(),
                        state: operation.state,
                        description: operation.description.unwrap_or_default(),
                    }),
                    state => Ok(Poll::Pending(format!(
                        "last operation {} of {} is '{}'",
                        operation.kind, request.name, state
                    ))),
                }
            })
            .await?;
        Ok(instance)
    }

    /// `cf push` with the space variables; multi-tenant pushes add the tenant variables.
    /// A single-tenant `java-ams` push uses a stripped copy of the manifest.
    pub async fn deploy_app(&self, manifest_dir: &Path, app_name: &str, tenants: Option<&TenantVars>) -> Result<()> {
        let mut vars = vec![
            format!("ID={}", self.target.space),
            format!("LANDSCAPE_APPS_DOMAIN={}", self.target.landscape_domain),
        ];
        let mut single_tenant_manifest = None;
        match tenants {
            Some(tenants) => vars.extend([
                format!("PROVIDER_TENANT_NAME={}", tenants.provider.name),
                format!("PROVIDER_TENANT_ID={}", tenants.provider.id),
                format!("SUBSCRIBER_TENANT_NAME={}", tenants.subscriber.name),
                format!("SUBSCRIBER_TENANT_ID={}", tenants.subscriber.id),
            ]),
            None if app_name.contains("java-ams") => {
                single_tenant_manifest = Some(manifest::write_single_tenant_manifest(manifest_dir)?);
            }
            None => {}
        }

        let mut command = CommandLine::new(&self.cf_cli)
            .args(["push", app_name])
            .current_dir(manifest_dir);
        for var in vars {
            command = command.arg("--var").arg(var);
        }
        if let Some(file) = &single_tenant_manifest {
            command = command.arg("-f").arg(file.path().to_string_lossy().into_owned());
        }

        let result = self
            .runner
            .run_operation(&format!("push {}", app_name), &command)
            .await;
        drop(single_tenant_manifest);
        result.map(|_| ())
    }
}
