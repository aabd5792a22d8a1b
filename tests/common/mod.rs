//! Shared fixtures for the integration tests

#![allow(dead_code)]

use ams_e2e::api::{HttpClient, ResilienceConfig};
use ams_e2e::cf::{CfApi, CfClient, Target};
use ams_e2e::process::CommandRunner;
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::MockServer;

pub const SPACE_GUID: &str = "space-guid-1";

pub fn http() -> HttpClient {
    HttpClient::new(ResilienceConfig::immediate()).unwrap()
}

pub fn target(server: &MockServer) -> Target {
    Target {
        api_endpoint: server.uri(),
        user: "bot@example.com".into(),
        org: "ams-org".into(),
        space: "e2e".into(),
        space_guid: SPACE_GUID.into(),
        landscape_domain: "cfapps.eu12.hana.ondemand.com".into(),
        token: "bearer cf-token".into(),
    }
}

pub fn cf_client(server: &MockServer, runner: Arc<dyn CommandRunner>) -> CfClient {
    let target = target(server);
    let api = CfApi::for_target(http(), &target);
    CfClient::new(runner, api, target, "cf")
}

/// A single page of a CF v3 list endpoint
pub fn page(resources: Value) -> Value {
    json!({ "pagination": { "next": null }, "resources": resources })
}
