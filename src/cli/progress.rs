//! Terminal rendering of a polled batch

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::core::progress::ProcessingProgress;
use crate::disbursement::PollObserver;
use crate::error::PayoutError;
use crate::model::{BatchStatusView, BatchSummary};

/// Draws poller updates as a percent bar
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(100))
    }

    /// Render into `bar`, e.g. a hidden bar in tests
    pub fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl PollObserver for ProgressObserver {
    fn on_progress(&self, progress: &ProcessingProgress) {
        self.bar.set_position(u64::from(progress.percent));
        self.bar.set_message(progress.message.clone());
    }

    fn on_error(&self, error: &PayoutError, consecutive: u32) {
        self.bar
            .set_message(format!("status unavailable ({} in a row): {}", consecutive, error));
    }

    fn on_terminal(&self, view: &BatchStatusView, summary: Option<&BatchSummary>) {
        let progress = ProcessingProgress::from_status(view);
        self.bar.set_position(u64::from(progress.percent));
        self.bar.finish_with_message(progress.message);

        if let Some(summary) = summary {
            for line in summary_lines(summary) {
                self.bar.println(line);
            }
        }
    }
}

/// Human readable report of a finished batch
pub fn summary_lines(summary: &BatchSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Batch {} {:?}: {} paid ({} {}), {} failed ({} {})",
        summary.batch_id,
        summary.status,
        summary.processed_count,
        format_minor(summary.total_amount),
        summary.currency,
        summary.failed_count,
        format_minor(summary.failed_amount),
        summary.currency,
    )];
    lines.extend(summary.failures.iter().map(|f| {
        format!(
            "  {} {} {}: {}",
            f.user_id,
            f.destination,
            format_minor(f.amount),
            f.error
        )
    }));
    lines
}

/// Minor units as a decimal amount, `412500` -> `4125.00`
fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchId, BatchStatus, CycleId, FailedItemView, UserId, WinnerId};

    fn view(status: BatchStatus, completed: usize) -> BatchStatusView {
        BatchStatusView {
            batch_id: BatchId::from("b1"),
            cycle_id: CycleId::from("c1"),
            status,
            total_chunks: 4,
            completed_chunks: completed,
            processed_items: completed * 2,
            failed_items: 0,
            total_items: 8,
            error: None,
        }
    }

    #[test]
    fn test_bar_follows_progress() {
        let observer = ProgressObserver::with_bar(ProgressBar::hidden());
        observer.on_progress(&ProcessingProgress::from_status(&view(BatchStatus::Processing, 2)));
        assert_eq!(observer.position(), 50);

        observer.on_terminal(&view(BatchStatus::Completed, 4), None);
        assert_eq!(observer.position(), 100);
    }

    #[test]
    fn test_summary_lines() {
        let summary = BatchSummary {
            batch_id: BatchId::from("b1"),
            cycle_id: CycleId::from("c1"),
            status: BatchStatus::Failed,
            currency: "USD".into(),
            processed_count: 1,
            failed_count: 1,
            total_amount: 412_500,
            failed_amount: 5,
            completed_at: None,
            failures: vec![FailedItemView {
                winner_id: WinnerId::from("w2"),
                user_id: UserId::from("u02"),
                destination: "u02@example.com".into(),
                amount: 5,
                error: "declined".into(),
            }],
        };
        let lines = summary_lines(&summary);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("4125.00 USD"));
        assert!(lines[1].contains("0.05"));
        assert!(lines[1].ends_with("declined"));
    }
}
