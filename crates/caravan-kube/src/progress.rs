//! Real-time progress reporting for deployment operations
//!
//! Prints per-resource apply and readiness state to stderr while a
//! deployment runs: unit headers, one status line per resource
//! transition, hook execution, and a closing summary. Output is
//! suppressed entirely when stderr is not a terminal.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use console::{Term, style};

/// Progress reporter for deployment operations
pub struct ProgressReporter {
    /// Terminal for output
    term: Term,
    /// Whether stderr is attended; nothing prints when false
    enabled: bool,
    /// Tracked resource states
    resources: HashMap<String, TrackedResource>,
    /// Start time
    start_time: Instant,
}

/// State of a single tracked resource
#[derive(Debug, Clone)]
pub struct TrackedResource {
    pub kind: String,
    pub name: String,
    pub status: ResourceStatus,
    pub message: Option<String>,
}

/// Display status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Pending,
    Applying,
    Applied,
    WaitingForReady,
    Ready,
    Failed,
    Skipped,
}

impl ResourceStatus {
    fn symbol(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "○",
            ResourceStatus::Applying => "◐",
            ResourceStatus::Applied => "◑",
            ResourceStatus::WaitingForReady => "◕",
            ResourceStatus::Ready => "●",
            ResourceStatus::Failed => "✗",
            ResourceStatus::Skipped => "⊘",
        }
    }

    fn styled_symbol(&self) -> console::StyledObject<&'static str> {
        match self {
            ResourceStatus::Pending => style(self.symbol()).dim(),
            ResourceStatus::Applying => style(self.symbol()).cyan(),
            ResourceStatus::Applied => style(self.symbol()).blue(),
            ResourceStatus::WaitingForReady => style(self.symbol()).yellow(),
            ResourceStatus::Ready => style(self.symbol()).green(),
            ResourceStatus::Failed => style(self.symbol()).red(),
            ResourceStatus::Skipped => style(self.symbol()).dim(),
        }
    }
}

impl ProgressReporter {
    /// Create a new progress reporter writing to stderr
    pub fn new() -> Self {
        let term = Term::stderr();
        let enabled = term.is_term();
        Self {
            term,
            enabled,
            resources: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    fn line(&self, text: &str) {
        if self.enabled {
            let _ = self.term.write_line(text);
        }
    }

    /// Print an install-unit header
    pub fn set_unit(&mut self, index: usize, total: usize, name: &str) {
        self.line(&format!(
            "\n{} Unit {}/{}: {}",
            style("▶").cyan().bold(),
            index,
            total,
            name
        ));
    }

    /// Add a resource to track
    pub fn add_resource(&mut self, kind: &str, name: &str) {
        let key = format!("{}/{}", kind, name);
        self.resources.insert(
            key,
            TrackedResource {
                kind: kind.to_string(),
                name: name.to_string(),
                status: ResourceStatus::Pending,
                message: None,
            },
        );
    }

    /// Update resource status
    pub fn update_status(&mut self, key: &str, status: ResourceStatus) {
        if let Some(resource) = self.resources.get_mut(key) {
            resource.status = status;
            self.print_resource_update(key);
        }
    }

    /// Mark resource as failed
    pub fn fail(&mut self, key: &str, error: &str) {
        if let Some(resource) = self.resources.get_mut(key) {
            resource.status = ResourceStatus::Failed;
            resource.message = Some(error.to_string());
            self.print_resource_update(key);
        }
    }

    /// Print resource update
    fn print_resource_update(&self, key: &str) {
        if let Some(resource) = self.resources.get(key) {
            let message = resource
                .message
                .as_ref()
                .map(|m| format!(" - {}", style(m).dim()))
                .unwrap_or_default();

            self.line(&format!(
                "  {} {}/{}{}",
                resource.status.styled_symbol(),
                resource.kind,
                resource.name,
                message
            ));
        }
    }

    /// Print hook execution start
    pub fn hook_start(&self, event: &str, name: &str) {
        self.line(&format!("  {} Hook [{}] {}", style("⟳").cyan(), event, name));
    }

    /// Print hook execution result
    pub fn hook_result(&self, name: &str, success: bool, duration: Duration, error: Option<&str>) {
        let symbol = if success {
            style("✓").green()
        } else {
            style("✗").red()
        };

        let error_msg = error
            .map(|e| format!(" - {}", style(e).red()))
            .unwrap_or_default();

        self.line(&format!(
            "  {} Hook {} ({:.1}s){}",
            symbol,
            name,
            duration.as_secs_f64(),
            error_msg
        ));
    }

    /// Print overall progress summary
    pub fn print_summary(&self) {
        let total = self.resources.len();
        let ready = self
            .resources
            .values()
            .filter(|r| r.status == ResourceStatus::Ready)
            .count();
        let failed = self
            .resources
            .values()
            .filter(|r| r.status == ResourceStatus::Failed)
            .count();

        let elapsed = self.start_time.elapsed();

        self.line("");

        if failed > 0 {
            self.line(&format!(
                "{} {}/{} resources ready, {} failed ({:.1}s)",
                style("✗").red().bold(),
                ready,
                total,
                failed,
                elapsed.as_secs_f64()
            ));
        } else if ready == total {
            self.line(&format!(
                "{} All {} resources ready ({:.1}s)",
                style("✓").green().bold(),
                total,
                elapsed.as_secs_f64()
            ));
        } else {
            self.line(&format!(
                "{} {}/{} resources ready ({:.1}s)",
                style("○").yellow(),
                ready,
                total,
                elapsed.as_secs_f64()
            ));
        }
    }

    /// Print an info message
    pub fn info(&self, msg: &str) {
        self.line(&format!("  {} {}", style("ℹ").blue(), msg));
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        self.line(&format!("  {} {}", style("⚠").yellow(), msg));
    }

    /// Print success message
    pub fn success(&self, msg: &str) {
        self.line(&format!("  {} {}", style("✓").green(), msg));
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if all resources reached a good terminal state
    pub fn all_ready(&self) -> bool {
        self.resources
            .values()
            .all(|r| r.status == ResourceStatus::Ready || r.status == ResourceStatus::Skipped)
    }

    /// Check if any resource failed
    pub fn any_failed(&self) -> bool {
        self.resources
            .values()
            .any(|r| r.status == ResourceStatus::Failed)
    }

    /// Get failed resources
    pub fn failed_resources(&self) -> Vec<&TrackedResource> {
        self.resources
            .values()
            .filter(|r| r.status == ResourceStatus::Failed)
            .collect()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
