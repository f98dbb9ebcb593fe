use core::fmt;
use std::sync::Mutex;

/// ANSI color codes for terminal output.
mod colors {
    pub const PASS: &str = "\x1b[32m"; // Green
    pub const FAIL: &str = "\x1b[91m"; // Bright red
    pub const SKIP: &str = "\x1b[33m"; // Yellow
    pub const RESET: &str = "\x1b[0m";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResult {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TestResult::Passed => write!(f, "passed"),
            TestResult::Failed => write!(f, "failed"),
            TestResult::Skipped => write!(f, "skipped"),
        }
    }
}

/// Tallies scenario file outcomes across a run. The enclosing runner may
/// execute scenarios in parallel, so appends go through a mutex.
#[derive(Debug, Default)]
pub struct TestSummary {
    inner: Mutex<Tallies>,
}

#[derive(Debug, Default)]
struct Tallies {
    passed: Vec<String>,
    failed: Vec<String>,
    skipped: Vec<String>,
}

impl TestSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, test_file_rel_path: &str, result: TestResult) {
        let mut tallies = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        let bucket = match result {
            TestResult::Passed => &mut tallies.passed,
            TestResult::Failed => &mut tallies.failed,
            TestResult::Skipped => &mut tallies.skipped,
        };
        bucket.push(test_file_rel_path.to_string());
    }

    /// Renders the summary like below.
    ///
    /// ```text
    /// 11 tests run: 9 passed, 2 failed, 0 skipped
    ///
    /// Failed tests:
    ///     - scenarios/scenario1.yaml
    ///     - scenarios/scenario2.yaml
    /// ```
    pub fn render(&self, no_color: bool) -> String {
        let tallies = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        let total = tallies.passed.len() + tallies.failed.len() + tallies.skipped.len();
        let total_text = format!("{total} tests run");
        let passed_text = paint(
            format!("{} passed", tallies.passed.len()),
            colors::PASS,
            no_color,
        );
        let failed_text = paint(
            format!("{} failed", tallies.failed.len()),
            colors::FAIL,
            no_color,
        );
        let skipped_text = paint(
            format!("{} skipped", tallies.skipped.len()),
            colors::SKIP,
            no_color,
        );
        let failed_files = paint(failed_files(&tallies.failed), colors::FAIL, no_color);
        format!("\n{total_text}: {passed_text}, {failed_text}, {skipped_text}\n\n{failed_files}")
    }
}

fn failed_files(failed: &[String]) -> String {
    if failed.is_empty() {
        return String::new();
    }
    let mut result = String::from("Failed tests:\n");
    for file in failed {
        result.push_str(&format!("\t- {file}\n"));
    }
    result.push('\n');
    result
}

fn paint(text: String, color: &str, no_color: bool) -> String {
    if no_color || text.is_empty() {
        text
    } else {
        format!("{color}{text}{}", colors::RESET)
    }
}
