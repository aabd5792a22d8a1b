//! Kyma (Kubernetes) deployment of the sample apps

pub mod app;
pub mod deployment;
pub mod service_account;
pub mod target;

pub use app::{K8sApp, RENDERED_MANIFEST};
pub use service_account::create_service_account;
pub use target::{IMAGE_REPOSITORY, IMAGE_VERSION, KymaCredentials, KymaTarget};
