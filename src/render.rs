//! Terminal rendering for engine types.
//!
//! Extension traits adding colored output to gridcal-core types, kept out of
//! the core so the engine stays free of presentation concerns.

use gridcal_core::diagnostics::{Diagnostic, Severity};
use gridcal_core::diff::SyncOperation;
use gridcal_core::event::CanonicalEvent;
use gridcal_core::pipeline::{RunPhase, RunReport};
use owo_colors::OwoColorize;

/// Extension trait for terminal rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for SyncOperation {
    fn render(&self) -> String {
        match self {
            SyncOperation::Create { identity, event } => {
                format!("{} {}  {}", "+".green(), event, identity.dimmed())
            }
            SyncOperation::Update { identity, event } => {
                format!("{} {}  {}", "~".yellow(), event, identity.dimmed())
            }
            SyncOperation::Delete { identity } => {
                format!("{} {}", "-".red(), identity)
            }
        }
    }
}

impl Render for Diagnostic {
    fn render(&self) -> String {
        match self.severity {
            Severity::Warning => format!("{} {}", "warning:".yellow(), self),
            Severity::Error => format!("{} {}", "error:".red(), self),
        }
    }
}

impl Render for CanonicalEvent {
    fn render(&self) -> String {
        let mut line = self.to_string();
        if let Some(room) = &self.location {
            line.push_str(&format!(" [{room}]"));
        }
        if !self.exceptions.is_empty() {
            line.push_str(&format!(" ({} exceptions)", self.exceptions.len()).dimmed().to_string());
        }
        line
    }
}

impl Render for RunReport {
    fn render(&self) -> String {
        if self.skipped {
            return format!("{}: unchanged, skipped", self.source.bold());
        }

        let summary = format!(
            "{} created, {} updated, {} deleted",
            self.created, self.updated, self.deleted
        );
        let mut lines = vec![match self.phase {
            RunPhase::Committed => format!("{}: {} {}", self.source.bold(), "synced".green(), summary),
            RunPhase::Failed => format!(
                "{}: {} {} ({} rejected)",
                self.source.bold(),
                "partial".red(),
                summary,
                self.rejected.len()
            ),
        }];

        for (identity, reason) in &self.rejected {
            lines.push(format!("   {} {}: {}", "!".red(), identity, reason));
        }

        lines.join("\n")
    }
}
