//! Deployment and end-to-end test driver for the AMS sample applications on Cloud Foundry
//! and Kyma.

pub mod api;
pub mod auth;
pub mod cf;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod k8s;
pub mod process;
pub mod suite;
pub mod ui;

pub use error::{E2eError, Result};
