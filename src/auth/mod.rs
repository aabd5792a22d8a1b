pub mod credentials;

pub use credentials::{CredentialSource, IdentityCredentials, SubscriptionCredentials};
