//! Test cases against the spring sample deployed to Kyma

use anyhow::ensure;
use futures::FutureExt;
use futures::future::LocalBoxFuture;

use super::runner::{CaseResult, Outcome, Suite, TestCase, assert_status};
use crate::api::{HttpClient, HttpResponse, IasClient, IasUser};
use crate::auth::credentials::IdentityCredentials;
use crate::error::Result;
use crate::k8s::{KymaCredentials, KymaTarget};

pub struct KymaFixture {
    http: HttpClient,
    target: KymaTarget,
    ias: IasClient,
}

impl KymaFixture {
    /// Fetches the user token from the identity secret of the deployment. The IAS service
    /// provider is not known on Kyma, so the fixture cannot map assertion attributes.
    pub async fn setup(
        http: HttpClient,
        target: KymaTarget,
        identity: IdentityCredentials,
        credentials: &KymaCredentials,
    ) -> Result<Self> {
        let user = IasUser {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            provider_tenant_id: None,
        };
        let ias = IasClient::connect(http.clone(), identity, None, user).await?;
        Ok(Self { http, target, ias })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.target.sample_url, path)
    }

    async fn get(&self, path: &str, token: Option<&str>) -> Result<HttpResponse> {
        self.http.get(&self.url(path), token).await
    }

    /// Waits for `/health` with the health check window
    pub async fn wait_until_healthy(http: &HttpClient, target: &KymaTarget) -> Result<HttpResponse> {
        http.get_expecting_with(
            http.resilience().health_check,
            &format!("{}/health", target.sample_url),
            200,
            None,
        )
        .await
    }
}

pub fn spring() -> Suite<KymaFixture> {
    Suite::new(
        "spring",
        vec![
            TestCase::new("is_healthy", is_healthy),
            TestCase::new("not_authenticated", not_authenticated),
            TestCase::new("authenticated", authenticated),
            TestCase::new("not_authorized", not_authorized),
            TestCase::new("authorized", authorized),
        ],
    )
}

fn is_healthy(f: &mut KymaFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        assert_status(&f.get("/health", None).await?, 200)?;
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

fn not_authenticated(f: &mut KymaFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        assert_status(&f.get("/authenticate", None).await?, 401)?;
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

fn authenticated(f: &mut KymaFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        let response = f.get("/authenticate", Some(f.ias.token())).await?;
        assert_status(&response, 200)?;
        ensure!(
            response.body.contains("You are an authenticated user."),
            "Expected to find success message in response"
        );
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

fn not_authorized(f: &mut KymaFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        assert_status(&f.get("/read", Some(f.ias.token())).await?, 403)?;
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

fn authorized(f: &mut KymaFixture) -> LocalBoxFuture<'_, CaseResult> {
    async move {
        let response = f
            .http
            .get_expecting_with(
                f.http.resilience().policy_propagation,
                &f.url("/salesOrders/readByCountry/DE"),
                200,
                Some(f.ias.token()),
            )
            .await?;
        assert_status(&response, 200)?;
        Ok(Outcome::Passed)
    }
    .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ResilienceConfig;
    use crate::suite::Report;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fake_jwt() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "e30.{}.sig",
            URL_SAFE_NO_PAD.encode(json!({ "user_uuid": "u-1" }).to_string())
        )
    }

    #[tokio::test]
    async fn test_spring_suite_against_mock_app() {
        let server = MockServer::start().await;
        let token = fake_jwt();
        let bearer = format!("Bearer {}", token);

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id_token": token })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/authenticate"))
            .and(header("authorization", bearer.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("You are an authenticated user."))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/read"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        // Policy arrives on the third poll
        Mock::given(method("GET"))
            .and(path("/salesOrders/readByCountry/DE"))
            .respond_with(ResponseTemplate::new(403))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/salesOrders/readByCountry/DE"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let http = HttpClient::new(ResilienceConfig::immediate()).unwrap();
        let target = KymaTarget {
            namespace: "ams-e2e".into(),
            server_url: "https://api.c-1.kyma.ondemand.com".into(),
            sample_url: server.uri(),
        };
        let identity = IdentityCredentials {
            client_id: "cid".into(),
            client_secret: Some("secret".into()),
            url: server.uri(),
            certificate: None,
            key: None,
            domains: None,
            authorization_instance_id: None,
            authorization_url: None,
            name: None,
        };
        let credentials = KymaCredentials {
            username: "bot".into(),
            user_uuid: "u-1".into(),
            password: "pw".into(),
            namespace: "ams-e2e".into(),
            artifactory_user: "artifactory".into(),
            artifactory_token: "token".into(),
        };

        KymaFixture::wait_until_healthy(&http, &target).await.unwrap();
        let mut fixture = KymaFixture::setup(http, target, identity, &credentials).await.unwrap();
        let mut report = Report::new();
        spring().run(&mut fixture, &[], &mut report).await;

        assert_eq!(report.total(), 5);
        assert!(report.is_success());
    }
}
