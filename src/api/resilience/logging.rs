//! Timing and structured log lines for long-running operations
//!
//! Produces the "`<operation>` triggered" / "`<operation>` SUCCESS after N.NNs" lines the
//! operator follows while a deployment runs, plus a JSON record at debug level.

use log::{debug, error, info};
use serde_json::json;
use std::fmt::Display;
use std::time::{Duration, Instant};

/// Context for a single tracked operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: String,
    pub target: String,
    pub start_time: Instant,
}

impl OperationContext {
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn label(&self) -> String {
        if self.target.is_empty() {
            self.operation.clone()
        } else {
            format!("{} {}", self.operation, self.target)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationLogger;

impl OperationLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn start(&self, operation: &str, target: &str) -> OperationContext {
        let context = OperationContext {
            operation: operation.to_string(),
            target: target.to_string(),
            start_time: Instant::now(),
        };
        info!("{} triggered", context.label());
        context
    }

    pub fn succeed(&self, context: &OperationContext) {
        let elapsed = context.elapsed();
        info!("{} SUCCESS after {:.2}s", context.label(), elapsed.as_secs_f64());
        debug!(
            "{}",
            json!({
                "event": "operation_completed",
                "operation": context.operation,
                "target": context.target,
                "duration_ms": elapsed.as_millis() as u64,
                "success": true,
            })
        );
    }

    pub fn fail(&self, context: &OperationContext, error: &dyn Display) {
        error!(
            "{} FAIL after {:.2}s: {}",
            context.label(),
            context.elapsed().as_secs_f64(),
            error
        );
    }

    /// Runs `future` between [`OperationLogger::start`] and `succeed`/`fail`
    pub async fn track<F, T, E>(&self, operation: &str, target: &str, future: F) -> Result<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: Display,
    {
        let context = self.start(operation, target);
        let result = future.await;
        match &result {
            Ok(_) => self.succeed(&context),
            Err(e) => self.fail(&context, e),
        }
        result
    }
}
