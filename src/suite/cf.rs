//! Test cases against the sample apps pushed to Cloud Foundry

use anyhow::{Context, ensure};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Method;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::app::SampleApp;
use super::runner::{CaseResult, Outcome, Suite, TestCase, assert_status};
use crate::api::{Auth, Body, HttpClient, HttpResponse, IasClient, SmsClient, SubscribeOutcome, jwt_claim};
use crate::cf::CfClient;
use crate::config::Settings;
use crate::error::Result;
use crate::process::{CommandLine, wait_for_line};

/// Landscape without multi-tenancy support
pub const DEV_LANDSCAPE_DOMAIN: &str = "cfapps.sap.hana.ondemand.com";

const AUTHENTICATED_MESSAGE: &str = "You are an authenticated user.";
const LOCAL_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

static TOMCAT_STARTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Tomcat started on port\(s\): (\d+)").unwrap());

/// Everything the CF suites share for one run
#[derive(Clone)]
pub struct CfContext {
    pub http: HttpClient,
    pub cf: Arc<CfClient>,
    pub settings: Settings,
    pub samples_root: PathBuf,
}

impl CfContext {
    pub fn sms(&self) -> SmsClient {
        SmsClient::new(self.http.clone())
    }
}

/// Per-suite state: the app under test and an identity client with fresh tokens
pub struct CfFixture {
    pub app: SampleApp,
    pub ias: IasClient,
    ctx: CfContext,
}

impl CfFixture {
    pub async fn setup(ctx: &CfContext, app_name: &str, app_dir: &str) -> anyhow::Result<Self> {
        let app = SampleApp::new(app_name, app_dir, ctx.cf.target());
        let services = app
            .services(&ctx.cf)
            .await
            .with_context(|| format!("failed to read bound services of {}", app_name))?;
        let ias = IasClient::connect(
            ctx.http.clone(),
            services.identity.clone(),
            Some(services.identity_instance_guid.clone()),
            ctx.settings.ias_user()?,
        )
        .await
        .with_context(|| format!("failed to fetch tokens for {}", app_name))?;
        info!("Testing {}", app);

        Ok(Self {
            app,
            ias,
            ctx: ctx.clone(),
        })
    }

    async fn get(&self, path: &str, token: Option<&str>) -> Result<HttpResponse> {
        self.ctx.http.get(&self.app.url_for(path), token).await
    }

    async fn get_with_token(&self, path: &str) -> Result<HttpResponse> {
        self.get(path, Some(self.ias.token())).await
    }

    /// Polled with the policy propagation window until the user is granted access
    async fn get_delayed_with_token(&self, path: &str) -> Result<HttpResponse> {
        let http = &self.ctx.http;
        http.get_expecting_with(
            http.resilience().policy_propagation,
            &self.app.url_for(path),
            200,
            Some(self.ias.token()),
        )
        .await
    }

    async fn get_via_mtls(&self, path: &str, token: Option<&str>) -> Result<HttpResponse> {
        let certificate = self.ias.credentials().require_client_certificate()?;
        self.ctx
            .http
            .send_mtls(
                Method::GET,
                &self.app.cert_url_for(path),
                &certificate,
                Auth::bearer(token),
                Body::Empty,
                true,
                200,
            )
            .await
    }

    /// Grants the token user `dcl` through a freshly created policy and checks `path`
    /// turns from 403 to 200. The policy is deleted afterwards.
    async fn admin_policy_check(&mut self, dcl: &str, path: &str) -> anyhow::Result<()> {
        let url = self.app.url_for(path);
        self.ias.check_policy_is_not_assigned(&url).await?;

        // Only needed while IAS and AMS run in different data centers
        self.ias.add_assertion_attribute().await?;

        let (policy, _) = self.ias.create_policy(dcl).await?;
        let group_id = policy
            .group_id
            .clone()
            .with_context(|| format!("policy {} has no group_id", policy.id))?;
        let user_uuid = jwt_claim(self.ias.token(), "user_uuid")?;
        let admin_certificate = self.ctx.settings.ias_admin_certificate()?;
        self.ias
            .assign_user_to_policy(&user_uuid, &group_id, &admin_certificate)
            .await?;

        let response = self.ias.wait_for_policy(&url).await?;
        assert_status(&response, 200)?;

        self.ias.delete_policy(&policy.id).await?;
        Ok(())
    }
}

/// A CF suite and the app it runs against
pub struct CfSuite {
    pub app_name: &'static str,
    pub app_dir: &'static str,
    pub suite: Suite<CfFixture>,
}

pub fn suites() -> Vec<CfSuite> {
    vec![spring(), java(), node()]
}

fn expect(status: u16, response: Result<HttpResponse>) -> CaseResult {
    assert_status(&response?, status)?;
    Ok(Outcome::Passed)
}

fn is_healthy(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move { expect(200, f.get("/health", None).await) }.boxed_local()
}

fn not_authenticated(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move { expect(401, f.get("/authenticate", None).await) }.boxed_local()
}

fn authenticated(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        let response = f.get_with_token("/authenticate").await?;
        assert_status(&response, 200)?;
        ensure!(
            response.body.contains(AUTHENTICATED_MESSAGE),
            "Expected to find success message in response: {}",
            response.body
        );
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

fn not_authorized(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move { expect(403, f.get_with_token("/read").await) }.boxed_local()
}

// spring-ams

pub fn spring() -> CfSuite {
    CfSuite {
        app_name: "spring-ams",
        app_dir: "spring-security-ams",
        suite: Suite::new(
            "spring",
            vec![
                TestCase::new("is_healthy", is_healthy),
                TestCase::new("not_authenticated", not_authenticated),
                TestCase::new("authenticated", authenticated),
                TestCase::new("not_authorized", not_authorized),
                TestCase::new("authorized", spring_authorized),
                TestCase::new("technical_communication", spring_technical_communication),
                TestCase::new("local_setup", spring_local_setup),
            ],
        ),
    }
}

fn spring_authorized(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    // The technical user has the base policies assigned
    async move { expect(200, f.get_delayed_with_token("/salesOrders/readByCountry/DE").await) }.boxed_local()
}

fn spring_technical_communication(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        const PATH: &str = "/technical-communication";
        let client_token = f.ias.client_token().context("no client token, identity binding has no certificate")?;

        assert_status(&f.get_via_mtls(PATH, Some(client_token)).await?, 200)?;
        assert_status(&f.get_via_mtls(PATH, None).await?, 401)?;
        assert_status(&f.get(PATH, Some(client_token)).await?, 401)?;
        assert_status(&f.get(PATH, None).await?, 401)?;
        assert_status(&f.get_with_token(PATH).await?, 403)?;
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

/// Local VCAP_SERVICES carrying only the secret-based identity binding
fn local_vcap_services(f: &CfFixture) -> Value {
    let identity = f.ias.credentials();
    let domains = identity
        .domains
        .as_deref()
        .map(|domains| serde_json::from_str(domains).unwrap_or_else(|_| Value::from(domains)))
        .unwrap_or(Value::Null);
    json!({
        "identity": [{
            "credentials": {
                "clientid": identity.client_id,
                "clientsecret": identity.client_secret,
                "domains": domains,
            },
            "name": identity.name,
        }]
    })
}

fn spring_local_setup(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        let working_dir = f.app.working_dir(&f.ctx.samples_root);
        let run = CommandLine::new("mvn")
            .args([
                "-q",
                "spring-boot:run",
                "-Dspring-boot.run.arguments=--server.port=0",
                "-Dspring-boot.run.useTestClasspath",
                "-Dspring.profiles.active=local",
            ])
            .current_dir(&working_dir)
            .env("VCAP_APPLICATION", "{}")
            .env("VCAP_SERVICES", local_vcap_services(f).to_string())
            .env_remove("KUBERNETES_SERVICE_HOST");

        let (port, process) = wait_for_line(&run, &TOMCAT_STARTED, LOCAL_STARTUP_TIMEOUT).await?;
        ensure!(port != "0", "port shouldn't be 0");
        let health = f.ctx.http.get(&format!("http://0.0.0.0:{}/health", port), None).await;
        process.terminate().await?;
        assert_status(&health?, 200)?;

        let compile = CommandLine::new("mvn")
            .args(["-q", "dcl-compiler:principalToPolicies"])
            .arg(format!("-DzoneId={}", uuid::Uuid::new_v4()))
            .arg(format!("-DprincipalId={}", uuid::Uuid::new_v4()))
            .arg("-Dpolicies=ams.readAll")
            .current_dir(&working_dir);
        f.ctx
            .cf
            .runner()
            .run_operation("dcl-compiler:principalToPolicies", &compile)
            .await?;
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

// java-ams

pub fn java() -> CfSuite {
    CfSuite {
        app_name: "java-ams",
        app_dir: "java-security-ams",
        suite: Suite::new(
            "java",
            vec![
                TestCase::new("is_healthy", is_healthy),
                TestCase::new("not_authenticated", java_not_authenticated),
                TestCase::new("authenticated", java_authenticated),
                TestCase::new("authorized", java_authorized),
                TestCase::new("value_help", java_value_help),
                TestCase::new("subscription", java_subscription),
            ],
        ),
    }
}

fn java_not_authenticated(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move { expect(401, f.get("/app/hello-java-security", None).await) }.boxed_local()
}

fn java_authenticated(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move { expect(403, f.get_with_token("/app/hello-java-security").await) }.boxed_local()
}

fn java_authorized(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move { expect(200, f.get_delayed_with_token("/app/java-security").await) }.boxed_local()
}

fn java_value_help(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        let client_token = f.ias.client_token().context("no client token, identity binding has no certificate")?;
        for path in [
            "/app/callback/value-help/$metadata",
            "/app/callback/value-help/Country?$skip=0&top=100$filter=contains(ID,%27i%27)",
        ] {
            assert_status(&f.get_via_mtls(path, Some(client_token)).await?, 200)?;
        }
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

fn java_subscription(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        let target = f.ctx.cf.target();
        if target.landscape_domain == DEV_LANDSCAPE_DOMAIN {
            return Ok(Outcome::Skipped("MT can't be tested in dev landscape".into()));
        }
        if f.ctx.settings.subscriber_tenant().is_none() {
            return Ok(Outcome::Skipped(
                "If no subscriber tenant is provided MT is not setup".into(),
            ));
        }

        let services = f.app.services(&f.ctx.cf).await?;
        let sms = services
            .subscription
            .as_ref()
            .context("java-ams has no subscription-manager binding")?;
        let client = f.ctx.sms();
        let cis = f.ctx.settings.cis_credentials_for(&target.org)?;
        let (username, password) = f.ctx.settings.default_idp_user()?;
        let token = client.cis_token(&cis, &username, &password).await?;

        let outcome = client.subscribe(&sms.subscription_manager_url, &sms.app_name, &token).await?;
        ensure!(
            outcome == SubscribeOutcome::Accepted,
            "Expected the response from POST '/saas-manager/v1/applications/subscriptions' to be 202"
        );

        let subscription_url = client
            .subscription_url(&sms.subscription_manager_url, &sms.app_name, &token)
            .await?;
        ensure!(subscription_url.is_some(), "subscriptionUrl shouldn't be None");
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

// node-ams

pub fn node() -> CfSuite {
    CfSuite {
        app_name: "node-ams",
        app_dir: "nodejs-ams",
        suite: Suite::new(
            "node",
            vec![
                TestCase::new("is_healthy", is_healthy),
                TestCase::new("not_authenticated", not_authenticated),
                TestCase::new("authenticated", node_authenticated),
                TestCase::new("authorized", node_authorized),
                TestCase::new("admin_policy", node_admin_policy),
            ],
        ),
    }
}

fn node_authenticated(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move { expect(200, f.get_with_token("/authenticate").await) }.boxed_local()
}

fn node_authorized(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move { expect(200, f.get_delayed_with_token("/read").await) }.boxed_local()
}

fn node_admin_policy(f: &mut CfFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        f.admin_policy_check("POLICY salesOrderDelete { GRANT delete ON salesOrder; }", "/salesOrder/delete")
            .await?;
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_names_and_apps() {
        let suites = suites();
        let names: Vec<_> = suites.iter().map(|s| s.suite.name).collect();
        assert_eq!(names, vec!["spring", "java", "node"]);
        assert_eq!(suites[1].app_name, "java-ams");
        assert_eq!(suites[2].app_dir, "nodejs-ams");
        assert!(suites[0].suite.case_names().contains(&"local_setup"));
        assert!(suites[2].suite.case_names().contains(&"admin_policy"));
    }

    #[test]
    fn test_tomcat_port_pattern() {
        let captures = TOMCAT_STARTED
            .captures("2024-01-01 INFO  o.s.b.w.e.tomcat.TomcatWebServer : Tomcat started on port(s): 43127 (http) with context path ''")
            .unwrap();
        assert_eq!(&captures[1], "43127");
    }
}
