pub mod comments;
pub mod convert;
pub mod info;

pub use comments::{comments, CommentsArgs};
pub use convert::{convert, ConvertArgs};
pub use info::{info, InfoArgs};

use clap::ValueEnum;
use revisions::ViewMode;
use store::{EditorSettings, FidelityReport, SettingsManager};
use std::path::Path;

/// Which view of pending changes to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ViewArg {
    /// Changes applied, no markup
    Final,
    /// Changes kept as tracked changes where the format can
    Markup,
    /// As before any pending change
    Original,
}

impl From<ViewArg> for ViewMode {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::Final => ViewMode::Final,
            ViewArg::Markup => ViewMode::Markup,
            ViewArg::Original => ViewMode::Original,
        }
    }
}

/// Settings from an explicit file, or defaults
pub fn load_settings(path: Option<&Path>) -> EditorSettings {
    match path {
        Some(path) => {
            tracing::debug!("Loading settings from {}", path.display());
            SettingsManager::with_path(path).load_sync().clone()
        }
        None => EditorSettings::default(),
    }
}

/// Print what a codec could not carry, one line per warning kind
pub fn print_report(label: &str, report: &FidelityReport) {
    if report.is_empty() {
        return;
    }
    eprintln!("{label} ({} warning(s)):", report.len());
    for warning in report.warnings() {
        let count = if warning.count > 1 {
            format!(" (x{})", warning.count)
        } else {
            String::new()
        };
        eprintln!(
            "  warning [{}] {}: {}{}",
            warning.code,
            warning.category.name(),
            warning.message,
            count
        );
    }
}
