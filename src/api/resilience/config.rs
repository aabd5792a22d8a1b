//! Polling windows per call site with builder pattern
//!
//! Each eventually-consistent operation gets its own attempt budget and delay, sized to the
//! convergence window that operation is known to need.

use super::retry::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResilienceConfig {
    /// Service instance last operation reaching `succeeded`
    pub service_provisioning: RetryConfig,
    /// CF v3 asynchronous job reaching `COMPLETE`
    pub cf_job: RetryConfig,
    /// Freshly granted policy visible to the policy decision point (403 -> 200)
    pub policy_propagation: RetryConfig,
    /// Policy not yet assigned (expect 403)
    pub policy_absent: RetryConfig,
    /// Expected-status GETs and verified responses such as a policy's `group_id`
    pub expected_response: RetryConfig,
    /// Subscription state reaching `SUBSCRIBED`
    pub subscription_state: RetryConfig,
    /// Subscription list becoming empty after deletion
    pub subscription_deletion: RetryConfig,
    /// Token requests over mutual TLS
    pub mtls_token: RetryConfig,
    /// Plain GETs on connection errors
    pub connection: RetryConfig,
    /// Kyma sample app answering `/health`
    pub health_check: RetryConfig,
    /// `kubectl dcl upload` while the identity secret is being created
    pub dcl_upload: RetryConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            service_provisioning: RetryConfig::secs(180, 1),
            cf_job: RetryConfig::secs(120, 2),
            policy_propagation: RetryConfig::secs(7, 30),
            policy_absent: RetryConfig::secs(10, 2),
            expected_response: RetryConfig::secs(10, 3),
            subscription_state: RetryConfig::secs(7, 10),
            subscription_deletion: RetryConfig::secs(30, 10),
            mtls_token: RetryConfig::secs(10, 12),
            connection: RetryConfig::secs(7, 10),
            health_check: RetryConfig::secs(7, 20),
            dcl_upload: RetryConfig::secs(7, 30),
        }
    }
}

impl ResilienceConfig {
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Default attempt budgets without any waiting (for tests)
    pub fn immediate() -> Self {
        let d = Self::default();
        Self {
            service_provisioning: d.service_provisioning.immediate(),
            cf_job: d.cf_job.immediate(),
            policy_propagation: d.policy_propagation.immediate(),
            policy_absent: d.policy_absent.immediate(),
            expected_response: d.expected_response.immediate(),
            subscription_state: d.subscription_state.immediate(),
            subscription_deletion: d.subscription_deletion.immediate(),
            mtls_token: d.mtls_token.immediate(),
            connection: d.connection.immediate(),
            health_check: d.health_check.immediate(),
            dcl_upload: d.dcl_upload.immediate(),
        }
    }

    /// Single attempt everywhere
    pub fn disabled() -> Self {
        let once = RetryConfig::secs(1, 0);
        Self {
            service_provisioning: once,
            cf_job: once,
            policy_propagation: once,
            policy_absent: once,
            expected_response: once,
            subscription_state: once,
            subscription_deletion: once,
            mtls_token: once,
            connection: once,
            health_check: once,
            dcl_upload: once,
        }
    }
}

#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    pub fn service_provisioning(mut self, retry: RetryConfig) -> Self {
        self.config.service_provisioning = retry;
        self
    }

    pub fn cf_job(mut self, retry: RetryConfig) -> Self {
        self.config.cf_job = retry;
        self
    }

    pub fn policy_propagation(mut self, retry: RetryConfig) -> Self {
        self.config.policy_propagation = retry;
        self
    }

    pub fn subscription_deletion(mut self, retry: RetryConfig) -> Self {
        self.config.subscription_deletion = retry;
        self
    }

    pub fn mtls_token(mut self, retry: RetryConfig) -> Self {
        self.config.mtls_token = retry;
        self
    }

    pub fn health_check(mut self, retry: RetryConfig) -> Self {
        self.config.health_check = retry;
        self
    }

    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
