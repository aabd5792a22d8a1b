//! Technical service account and its kubeconfig for unattended Kyma runs

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::info;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

use super::target::{cluster_server, strip_quotes};
use crate::error::{E2eError, Result};
use crate::process::{CommandLine, CommandRunner};

pub const SERVICE_ACCOUNT: &str = "technical-user-account";
pub const TEMPLATE_FILE: &str = "kubeconfig_template.yaml";
pub const OUTPUT_FILE: &str = "kubeconfig.yaml";

const BUILTIN_TEMPLATE: &str = r#"apiVersion: v1
kind: Config
clusters:
  - name: cluster
    cluster:
      server: ""
      certificate-authority-data: ""
users:
  - name: technical-user-account
    user:
      token: ""
contexts:
  - name: ""
    context:
      cluster: cluster
      user: technical-user-account
      namespace: ""
current-context: ""
"#;

/// Values filled into the kubeconfig template
#[derive(Clone)]
pub struct KubeconfigValues {
    pub server: String,
    pub certificate_authority: String,
    pub token: String,
    pub context: String,
    pub namespace: String,
}

/// Sets a scalar at a dotted path; numeric segments index sequences
fn set(doc: &mut Value, path: &str, value: &str) -> Result<()> {
    let mut node = doc;
    for segment in path.split('.') {
        let next = match segment.parse::<usize>() {
            Ok(index) => node.get_mut(index),
            Err(_) => node.get_mut(segment),
        };
        node = next.ok_or_else(|| E2eError::parse("kubeconfig template", format!("no '{}'", path)))?;
    }
    *node = Value::from(value);
    Ok(())
}

/// Fills `clusters[0]`, `users[0]`, `contexts[0]` and `current-context`
pub fn render_kubeconfig(template: &str, values: &KubeconfigValues) -> Result<String> {
    let mut doc: Value = serde_yaml::from_str(template)?;
    set(&mut doc, "clusters.0.cluster.server", &values.server)?;
    set(
        &mut doc,
        "clusters.0.cluster.certificate-authority-data",
        &values.certificate_authority,
    )?;
    set(&mut doc, "users.0.user.token", &values.token)?;
    set(&mut doc, "contexts.0.name", &values.context)?;
    set(&mut doc, "contexts.0.context.namespace", &values.namespace)?;
    set(&mut doc, "current-context", &values.context)?;
    Ok(serde_yaml::to_string(&doc)?)
}

async fn kubectl(runner: &dyn CommandRunner, args: &[&str]) -> Result<String> {
    let output = runner
        .run_checked(&CommandLine::new("kubectl").args(args.iter().copied()))
        .await?;
    Ok(strip_quotes(&output.stdout))
}

/// Creates the namespace and service account, then writes `kubeconfig.yaml` into `dir`.
/// The template is read from `dir` when present.
pub async fn create_service_account(runner: &dyn CommandRunner, namespace: &str, dir: &Path) -> Result<PathBuf> {
    let created = runner
        .run(&CommandLine::new("kubectl").args(["create", "namespace", namespace]))
        .await?;
    if !created.is_success() {
        info!("namespace {} not created: {}", namespace, created.stderr.trim());
    }

    let context = kubectl(runner, &["config", "current-context"]).await?;
    info!("Current Context: {}", context);

    let account_file = dir.join(format!("{}.yml", SERVICE_ACCOUNT));
    runner
        .run_operation(
            "create service account",
            &CommandLine::new("kubectl")
                .args(["apply", "-f"])
                .arg(account_file.to_string_lossy().into_owned())
                .args(["-n", namespace]),
        )
        .await?;

    let server = cluster_server(runner).await?;
    info!("API Server Url: {}", server);

    let secret = kubectl(
        runner,
        &["get", "serviceaccount", SERVICE_ACCOUNT, "-n", namespace, "-ojsonpath='{.secrets[0].name}'"],
    )
    .await?;
    if secret.is_empty() {
        return Err(E2eError::Precondition(format!(
            "service account {} has no token secret",
            SERVICE_ACCOUNT
        )));
    }
    info!("Secret Name: {}", secret);

    let encoded_token = kubectl(runner, &["get", "secret", &secret, "-n", namespace, "-ojsonpath='{.data.token}'"]).await?;
    let token = STANDARD
        .decode(encoded_token.as_bytes())
        .map_err(|e| E2eError::parse("service account token", e))
        .and_then(|bytes| String::from_utf8(bytes).map_err(|e| E2eError::parse("service account token", e)))?;
    let certificate_authority = kubectl(
        runner,
        &["get", "secret", &secret, "-n", namespace, "-ojsonpath='{.data.ca\\.crt}'"],
    )
    .await?;

    let template_path = dir.join(TEMPLATE_FILE);
    let template = if template_path.is_file() {
        std::fs::read_to_string(&template_path)?
    } else {
        BUILTIN_TEMPLATE.to_string()
    };
    let kubeconfig = render_kubeconfig(
        &template,
        &KubeconfigValues {
            server,
            certificate_authority,
            token,
            context,
            namespace: namespace.to_string(),
        },
    )?;

    let output = dir.join(OUTPUT_FILE);
    std::fs::write(&output, kubeconfig)?;
    info!("wrote {:?}", output);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, ScriptedRunner};

    fn values() -> KubeconfigValues {
        KubeconfigValues {
            server: "https://api.c-1.kyma.ondemand.com".into(),
            certificate_authority: "LS0tLS1CRUdJTg==".into(),
            token: "sa-token".into(),
            context: "shoot--kyma--c-1".into(),
            namespace: "ams-e2e".into(),
        }
    }

    #[test]
    fn test_render_builtin_template() {
        let rendered = render_kubeconfig(BUILTIN_TEMPLATE, &values()).unwrap();
        let doc: Value = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(doc["clusters"][0]["cluster"]["server"], Value::from("https://api.c-1.kyma.ondemand.com"));
        assert_eq!(doc["users"][0]["user"]["token"], Value::from("sa-token"));
        assert_eq!(doc["contexts"][0]["name"], Value::from("shoot--kyma--c-1"));
        assert_eq!(doc["contexts"][0]["context"]["namespace"], Value::from("ams-e2e"));
        assert_eq!(doc["current-context"], Value::from("shoot--kyma--c-1"));
    }

    #[test]
    fn test_template_without_users_is_rejected() {
        let err = render_kubeconfig("clusters: [{cluster: {}}]\n", &values()).unwrap_err();
        assert!(matches!(err, E2eError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_create_service_account_writes_kubeconfig() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .on("kubectl config current-context", CommandOutput::success("shoot--kyma--c-1\n"))
            .on("kubectl config view", CommandOutput::success("'https://api.c-1.kyma.ondemand.com'"))
            .on("kubectl get serviceaccount", CommandOutput::success("'technical-user-account-token-x'"))
            .on(
                "kubectl get secret technical-user-account-token-x -n ams-e2e -ojsonpath='{.data.token}'",
                CommandOutput::success("'c2EtdG9rZW4='"),
            )
            .on(
                "kubectl get secret technical-user-account-token-x -n ams-e2e -ojsonpath='{.data.ca\\.crt}'",
                CommandOutput::success("'LS0tLS1CRUdJTg=='"),
            );

        let path = create_service_account(&runner, "ams-e2e", dir.path()).await.unwrap();
        let doc: Value = serde_yaml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(doc["users"][0]["user"]["token"], Value::from("sa-token"));
        assert_eq!(
            doc["clusters"][0]["cluster"]["certificate-authority-data"],
            Value::from("LS0tLS1CRUdJTg==")
        );
        assert_eq!(runner.rendered_calls()[0], "kubectl create namespace ams-e2e");
    }
}
