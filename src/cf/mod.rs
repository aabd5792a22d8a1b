//! Cloud Foundry: CLI session target, v3 API, teardown, provisioning and push

pub mod api;
pub mod client;
pub mod manifest;
pub mod target;

pub use api::{CfApi, LastOperation, Resource, ServiceInstance};
pub use client::{CfClient, ServiceInstanceRequest, TenantVars, fan_out};
pub use target::{LOGGED_OFF_MESSAGE, Target, is_logged_off};
