//! HTTP side of the end-to-end driver
//!
//! A single [`HttpClient`] carries the plain, redirect-preserving and mutual-TLS request
//! variants. The identity ([`IasClient`]) and subscription ([`SmsClient`]) clients are thin
//! contract layers on top of it.

pub mod auth;
pub mod client;
pub mod ias;
pub mod mtls;
pub mod resilience;
pub mod sms;

pub use auth::{Grant, TokenResponse};
pub use client::{Auth, Body, HttpClient, HttpResponse};
pub use ias::{IasClient, IasUser, Policy, jwt_claim};
pub use mtls::{CertificateFiles, ClientCertificate};
pub use resilience::{Poll, ResilienceConfig, RetryConfig, RetryPolicy};
pub use sms::{CisCredentialMap, CisCredentials, DeleteOutcome, SmsClient, SubscribeOutcome};
