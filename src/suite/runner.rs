use colored::Colorize;
use futures::future::LocalBoxFuture;
use log::{error, info};
use std::time::{Duration, Instant};

use crate::api::HttpResponse;

/// How a case ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Skipped(String),
}

pub type CaseResult = anyhow::Result<Outcome>;

/// A case borrows its suite fixture mutably for the duration of the run
pub type CaseFn<F> = for<'a> fn(&'a mut F) -> LocalBoxFuture<'a, CaseResult>;

pub struct TestCase<F> {
    pub name: &'static str,
    pub run: CaseFn<F>,
}

impl<F> TestCase<F> {
    pub const fn new(name: &'static str, run: CaseFn<F>) -> Self {
        Self { name, run }
    }
}

/// Named cases sharing one fixture, run in declaration order
pub struct Suite<F> {
    pub name: &'static str,
    pub cases: Vec<TestCase<F>>,
}

impl<F> Suite<F> {
    pub fn new(name: &'static str, cases: Vec<TestCase<F>>) -> Self {
        Self { name, cases }
    }

    pub fn case_names(&self) -> Vec<&'static str> {
        self.cases.iter().map(|case| case.name).collect()
    }

    /// A filter entry selects a case by `<case>` or `<suite>::<case>`, or the whole suite
    /// by `<suite>`. No filter selects everything.
    pub fn select(&self, filter: &[String]) -> Vec<&TestCase<F>> {
        self.cases
            .iter()
            .filter(|case| {
                filter.is_empty()
                    || filter.iter().any(|entry| {
                        entry == self.name
                            || entry == case.name
                            || *entry == format!("{}::{}", self.name, case.name)
                    })
            })
            .collect()
    }

    pub async fn run(&self, fixture: &mut F, filter: &[String], report: &mut Report) {
        for case in self.select(filter) {
            info!("------------------- Running '{}::{}' tests -------------------", self.name, case.name);
            let started = Instant::now();
            let result = (case.run)(&mut *fixture).await;
            report.record(self.name, case.name, result, started.elapsed());
        }
    }

    /// Reports every selected case as failed when the fixture could not be set up
    pub fn fail_setup(&self, filter: &[String], setup_error: &anyhow::Error, report: &mut Report) {
        error!("setup of suite {} failed: {:#}", self.name, setup_error);
        for case in self.select(filter) {
            report.record(
                self.name,
                case.name,
                Err(anyhow::anyhow!("suite setup failed: {:#}", setup_error)),
                Duration::ZERO,
            );
        }
    }
}

/// Collected results of one `test` invocation
#[derive(Debug, Default)]
pub struct Report {
    passed: usize,
    skipped: usize,
    failures: Vec<(String, String)>,
    elapsed: Duration,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, suite: &str, case: &str, result: CaseResult, elapsed: Duration) {
        let id = format!("{}::{}", suite, case);
        self.elapsed += elapsed;
        match result {
            Ok(Outcome::Passed) => {
                self.passed += 1;
                println!("{} ... {}", id, "ok".green());
            }
            Ok(Outcome::Skipped(reason)) => {
                self.skipped += 1;
                println!("{} ... {} '{}'", id, "skipped".yellow(), reason);
            }
            Err(e) => {
                println!("{} ... {}", id, "FAILED".red().bold());
                self.failures.push((id, format!("{:#}", e)));
            }
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.skipped + self.failures.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn print_summary(&self) {
        for (id, message) in &self.failures {
            println!("\n{}", "=".repeat(70));
            println!("FAIL: {}", id);
            println!("{}", "-".repeat(70));
            println!("{}", message);
        }
        println!("{}", "-".repeat(70));
        println!("Ran {} tests in {:.3}s\n", self.total(), self.elapsed.as_secs_f64());

        let skipped = if self.skipped > 0 {
            format!(" (skipped={})", self.skipped)
        } else {
            String::new()
        };
        if self.is_success() {
            println!("{}{}", "✓ OK".green().bold(), skipped);
        } else if self.skipped > 0 {
            println!(
                "{} (failures={}, skipped={})",
                "✗ FAILED".red().bold(),
                self.failures.len(),
                self.skipped
            );
        } else {
            println!("{} (failures={})", "✗ FAILED".red().bold(), self.failures.len());
        }
    }
}

/// Status assertion with the response body in the failure message
pub fn assert_status(response: &HttpResponse, expected: u16) -> anyhow::Result<()> {
    anyhow::ensure!(
        response.status == expected,
        "Expected HTTP status {} from {} {} but got {}: {}",
        expected,
        response.method,
        response.url,
        response.status,
        response.body
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[derive(Default)]
    struct Counter {
        runs: Vec<&'static str>,
    }

    fn first(counter: &mut Counter) -> LocalBoxFuture<'_, CaseResult> {
        async move {
            counter.runs.push("first");
            Ok(Outcome::Passed)
        }
        .boxed_local()
    }

    fn second(counter: &mut Counter) -> LocalBoxFuture<'_, CaseResult> {
        async move {
            counter.runs.push("second");
            anyhow::bail!("boom")
        }
        .boxed_local()
    }

    fn third(counter: &mut Counter) -> LocalBoxFuture<'_, CaseResult> {
        async move {
            counter.runs.push("third");
            Ok(Outcome::Skipped("not configured".into()))
        }
        .boxed_local()
    }

    fn suite() -> Suite<Counter> {
        Suite::new(
            "demo",
            vec![
                TestCase::new("first", first),
                TestCase::new("second", second),
                TestCase::new("third", third),
            ],
        )
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_cases() {
        let mut counter = Counter::default();
        let mut report = Report::new();
        suite().run(&mut counter, &[], &mut report).await;

        assert_eq!(counter.runs, vec!["first", "second", "third"]);
        assert_eq!(report.total(), 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_select_by_case_and_qualified_name() {
        let suite = suite();
        let names = |filter: &[&str]| {
            let filter: Vec<String> = filter.iter().map(|s| s.to_string()).collect();
            suite.select(&filter).iter().map(|c| c.name).collect::<Vec<_>>()
        };

        assert_eq!(names(&["third"]), vec!["third"]);
        assert_eq!(names(&["demo::first", "third"]), vec!["first", "third"]);
        assert_eq!(names(&["demo"]).len(), 3);
        assert!(names(&["other::first"]).is_empty());
    }

    #[test]
    fn test_setup_failure_fails_selected_cases() {
        let mut report = Report::new();
        suite().fail_setup(&["first".to_string()], &anyhow::anyhow!("no identity"), &mut report);
        assert_eq!(report.total(), 1);
        assert_eq!(report.failed(), 1);
    }
}
