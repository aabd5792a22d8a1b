//! Rendering of a sample's `k8s/deployment.yml` for the shared test namespace

use log::debug;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::{E2eError, Result};

pub const REGISTRY_SECRET: &str = "sap-repo-registry";
pub const IMAGE_PLACEHOLDER: &str = "<YOUR IMAGE REPOSITORY>";
pub const APPROUTER_IMAGE_PLACEHOLDER: &str = "<YOUR APPROUTER IMAGE REPOSITORY>";

/// Image references substituted into `Deployment` documents
#[derive(Debug, Clone)]
pub struct Images {
    pub app: String,
    pub approuter: String,
}

/// Renders every document of a multi-document manifest:
/// `Deployment`s pull from the registry secret and get the image placeholders replaced,
/// `Service`s target the app port directly instead of the approuter. Other documents
/// are copied unchanged.
pub fn render(manifest: &str, images: &Images) -> Result<String> {
    let mut out = String::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let mut doc = Value::deserialize(document)?;
        if doc.is_null() {
            continue;
        }
        out.push_str("---\n");
        let kind = doc.get("kind").and_then(Value::as_str).unwrap_or_default().to_string();
        let rendered = match kind.as_str() {
            "Deployment" => {
                add_pull_secret(&mut doc)?;
                serde_yaml::to_string(&doc)?
                    .replace(IMAGE_PLACEHOLDER, &images.app)
                    .replace(APPROUTER_IMAGE_PLACEHOLDER, &images.approuter)
            }
            "Service" => serde_yaml::to_string(&doc)?.replace("targetPort: 5000", "targetPort: 8080"),
            _ => serde_yaml::to_string(&doc)?,
        };
        debug!("{}", rendered);
        out.push_str(&rendered);
    }
    Ok(out)
}

fn add_pull_secret(doc: &mut Value) -> Result<()> {
    let pod_spec = doc
        .get_mut("spec")
        .and_then(|spec| spec.get_mut("template"))
        .and_then(|template| template.get_mut("spec"))
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| E2eError::parse("Deployment", "no spec.template.spec"))?;

    let mut secret = Mapping::new();
    secret.insert(Value::from("name"), Value::from(REGISTRY_SECRET));
    pod_spec.insert(
        Value::from("imagePullSecrets"),
        Value::Sequence(vec![Value::Mapping(secret)]),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: ams-sample-app
spec:
  template:
    spec:
      containers:
        - name: app
          image: <YOUR IMAGE REPOSITORY>
        - name: approuter
          image: <YOUR APPROUTER IMAGE REPOSITORY>
---
apiVersion: v1
kind: Service
metadata:
  name: ams-sample-app-svc
spec:
  ports:
    - port: 80
      targetPort: 5000
---
apiVersion: services.cloud.sap.com/v1
kind: ServiceBinding
metadata:
  name: identity
"#;

    fn images() -> Images {
        Images {
            app: "registry.example/spring-security-ams:e2e-test".into(),
            approuter: "registry.example/ams-approuter:e2e-test".into(),
        }
    }

    #[test]
    fn test_render_deployment_and_service() {
        let rendered = render(MANIFEST, &images()).unwrap();

        assert_eq!(rendered.matches("---\n").count(), 3);
        assert!(rendered.contains("image: registry.example/spring-security-ams:e2e-test"));
        assert!(rendered.contains("image: registry.example/ams-approuter:e2e-test"));
        assert!(rendered.contains("targetPort: 8080"));
        assert!(!rendered.contains("targetPort: 5000"));
        assert!(rendered.contains("kind: ServiceBinding"));

        let docs: Vec<Value> = serde_yaml::Deserializer::from_str(&rendered)
            .map(|d| Value::deserialize(d).unwrap())
            .collect();
        assert_eq!(
            docs[0]["spec"]["template"]["spec"]["imagePullSecrets"][0]["name"],
            Value::from(REGISTRY_SECRET)
        );
    }

    #[test]
    fn test_deployment_without_pod_spec_is_rejected() {
        let err = render("kind: Deployment\nspec: {}\n", &images()).unwrap_err();
        assert!(matches!(err, E2eError::Parse { .. }));
    }
}
