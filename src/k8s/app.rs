//! A sample application deployed to Kyma: images, manifest, DCL upload, identity secret

use log::info;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::deployment::{self, Images, REGISTRY_SECRET};
use super::target::{IMAGE_REPOSITORY, IMAGE_VERSION, KymaCredentials};
use crate::api::resilience::{Poll, RetryConfig, RetryPolicy};
use crate::auth::credentials::IdentityCredentials;
use crate::error::{E2eError, Result};
use crate::process::{CommandLine, CommandRunner};

pub const RENDERED_MANIFEST: &str = "tmp_deployment.yml";

pub struct K8sApp {
    runner: Arc<dyn CommandRunner>,
    name: String,
    app_router_name: String,
    /// Directory holding the sample sources, one sub-directory per app
    samples_root: PathBuf,
    credentials: KymaCredentials,
}

impl K8sApp {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        name: impl Into<String>,
        app_router_name: impl Into<String>,
        samples_root: impl AsRef<Path>,
        credentials: KymaCredentials,
    ) -> Self {
        Self {
            runner,
            name: name.into(),
            app_router_name: app_router_name.into(),
            samples_root: samples_root.as_ref().to_path_buf(),
            credentials,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn working_dir(&self) -> PathBuf {
        self.samples_root.join(&self.name)
    }

    fn namespace(&self) -> &str {
        &self.credentials.namespace
    }

    pub fn image(&self, app_name: &str) -> String {
        format!("{}/{}:{}", IMAGE_REPOSITORY, app_name, IMAGE_VERSION)
    }

    fn rendered_manifest_path(&self) -> PathBuf {
        self.samples_root.join(RENDERED_MANIFEST)
    }

    /// Pull secret for the image registry. An existing secret is left as is.
    pub async fn prepare_registry_secret(&self) -> Result<()> {
        let command = CommandLine::new("kubectl").args([
            "create".to_string(),
            "secret".to_string(),
            "docker-registry".to_string(),
            REGISTRY_SECRET.to_string(),
            format!("--docker-server={}", IMAGE_REPOSITORY),
            format!("--docker-username={}", self.credentials.artifactory_user),
            format!("--docker-password={}", self.credentials.artifactory_token),
            "-n".to_string(),
            self.namespace().to_string(),
        ]);
        let output = self.runner.run(&command).await?;
        if !output.is_success() {
            info!("registry secret not created: {}", output.stderr.trim());
        }
        Ok(())
    }

    pub async fn prepare_images(&self) -> Result<()> {
        self.prepare_image(&self.working_dir(), &self.name).await?;
        self.prepare_image(&self.working_dir().join("approuter"), &self.app_router_name)
            .await
    }

    async fn prepare_image(&self, working_dir: &Path, app_name: &str) -> Result<()> {
        let image = self.image(app_name);
        let build = if app_name == "spring-security-ams" {
            CommandLine::new("mvn").args([
                "-q".to_string(),
                "spring-boot:build-image".to_string(),
                format!("-Dspring-boot.build-image.imageName={}", image),
                "-DskipUnitTests=true".to_string(),
            ])
        } else {
            if !working_dir.join("Dockerfile").is_file() {
                return Err(E2eError::Precondition(format!(
                    "There exists no Dockerfile in {:?}",
                    working_dir
                )));
            }
            CommandLine::new("docker").args(["build", "-t", image.as_str(), "-f", "./Dockerfile", "."])
        };
        self.runner
            .run_operation(&format!("build image {}", image), &build.current_dir(working_dir))
            .await?;

        let login = CommandLine::new("docker")
            .args([
                "login",
                IMAGE_REPOSITORY,
                "--username",
                self.credentials.artifactory_user.as_str(),
                "--password",
                self.credentials.artifactory_token.as_str(),
            ])
            .current_dir(working_dir);
        self.runner.run_checked(&login).await?;

        let push = CommandLine::new("docker")
            .args(["push", image.as_str()])
            .current_dir(working_dir);
        self.runner
            .run_operation(&format!("push image {}", image), &push)
            .await?;
        Ok(())
    }

    /// Applies the rendered manifest, uploads the base DCL once the identity secret
    /// exists and returns the identity credentials of the deployment
    pub async fn deploy(&self, dcl_upload: RetryConfig) -> Result<IdentityCredentials> {
        self.apply_manifest().await?;
        self.upload_base_dcl(dcl_upload).await?;
        self.identity_credentials().await
    }

    async fn apply_manifest(&self) -> Result<()> {
        let source = self.working_dir().join("k8s").join("deployment.yml");
        let manifest = std::fs::read_to_string(&source)
            .map_err(|e| E2eError::Precondition(format!("There exists no {:?}: {}", source, e)))?;
        let images = Images {
            app: self.image(&self.name),
            approuter: self.image(&self.app_router_name),
        };
        let rendered = deployment::render(&manifest, &images)?;
        let target = self.rendered_manifest_path();
        std::fs::write(&target, rendered)?;

        let apply = CommandLine::new("kubectl").args([
            "apply".to_string(),
            "-f".to_string(),
            target.to_string_lossy().into_owned(),
            "-n".to_string(),
            self.namespace().to_string(),
        ]);
        self.runner.run_operation("kubectl apply", &apply).await?;
        Ok(())
    }

    /// Fails until the identity secret is available; retried with the DCL upload window
    async fn upload_base_dcl(&self, retry: RetryConfig) -> Result<()> {
        let command = CommandLine::new("kubectl")
            .args([
                "dcl",
                "upload",
                "identity",
                "src/main/resources",
                "--namespace",
                self.namespace(),
            ])
            .current_dir(self.working_dir());
        let command = &command;
        RetryPolicy::new(retry)
            .poll("dcl upload", || async move {
                Poll::pending_on_error(self.runner.run_checked(command).await)
            })
            .await?;
        Ok(())
    }

    pub async fn identity_credentials(&self) -> Result<IdentityCredentials> {
        let output = self
            .runner
            .run_checked(&CommandLine::new("kubectl").args([
                "get",
                "secret",
                "identity",
                "-o",
                "jsonpath={.data}",
                "-n",
                self.namespace(),
            ]))
            .await?;
        let data: BTreeMap<String, String> = serde_json::from_str(output.stdout.trim())
            .map_err(|e| E2eError::parse("identity secret", e))?;
        IdentityCredentials::from_secret_data(&data)
    }

    /// Removes the rendered manifest; deployed resources stay in the namespace
    pub fn delete(&self) -> Result<()> {
        info!("Skip cleaning up workspace...");
        match std::fs::remove_file(self.rendered_manifest_path()) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for K8sApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Name: {}, App-Router-Name: {}", self.name, self.app_router_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, ScriptedRunner};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    fn credentials() -> KymaCredentials {
        KymaCredentials {
            username: "bot".into(),
            user_uuid: "uuid".into(),
            password: "pw".into(),
            namespace: "ams-e2e".into(),
            artifactory_user: "artifactory".into(),
            artifactory_token: "token".into(),
        }
    }

    fn sample_tree() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let k8s = root.path().join("spring-security-ams").join("k8s");
        std::fs::create_dir_all(&k8s).unwrap();
        std::fs::write(
            k8s.join("deployment.yml"),
            "kind: Deployment\nspec:\n  template:\n    spec:\n      containers:\n        - image: <YOUR IMAGE REPOSITORY>\n",
        )
        .unwrap();
        root
    }

    #[tokio::test]
    async fn test_deploy_retries_dcl_upload_and_reads_secret() {
        let root = sample_tree();
        let secret = format!(
            r#"{{"clientid":"{}","url":"{}"}}"#,
            STANDARD.encode("cid"),
            STANDARD.encode("https://tenant.accounts.ondemand.com")
        );
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("kubectl dcl upload", CommandOutput::failure(1, "secret identity not found"))
                .on("kubectl dcl upload", CommandOutput::failure(1, "secret identity not found"))
                .on("kubectl dcl upload", CommandOutput::success("uploaded"))
                .on("kubectl get secret identity", CommandOutput::success(secret)),
        );
        let app = K8sApp::new(
            runner.clone(),
            "spring-security-ams",
            "ams-approuter",
            root.path(),
            credentials(),
        );

        let identity = app.deploy(RetryConfig::secs(7, 0)).await.unwrap();
        assert_eq!(identity.client_id, "cid");

        let calls = runner.rendered_calls();
        assert_eq!(calls.iter().filter(|c| c.starts_with("kubectl dcl upload")).count(), 3);
        assert!(calls.iter().any(|c| c.starts_with("kubectl apply -f") && c.ends_with("-n ams-e2e")));

        let rendered = std::fs::read_to_string(root.path().join(RENDERED_MANIFEST)).unwrap();
        assert!(rendered.contains(&app.image("spring-security-ams")));

        app.delete().unwrap();
        assert!(!root.path().join(RENDERED_MANIFEST).exists());
    }

    #[tokio::test]
    async fn test_docker_build_needs_dockerfile() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("nodejs-ams").join("approuter")).unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let app = K8sApp::new(runner.clone(), "nodejs-ams", "ams-approuter", root.path(), credentials());

        let err = app.prepare_images().await.unwrap_err();
        assert!(err.to_string().contains("Dockerfile"));
        assert!(runner.calls().is_empty());
    }
}
