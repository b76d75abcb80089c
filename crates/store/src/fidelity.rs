//! Import/export fidelity tracking
//!
//! Every codec reports what it could not carry as a [`FidelityWarning`].
//! Warnings with the same code are folded together and counted, so a report
//! lists each kind of loss once.

use crate::Format;
use serde::{Deserialize, Serialize};

// =============================================================================
// Fidelity Warning Types
// =============================================================================

/// Severity of a fidelity warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WarningSeverity {
    /// No content lost, representation differs
    Info,
    /// Formatting may look slightly different
    Minor,
    /// Some content or markup was flattened
    Moderate,
    /// Content or annotations were dropped
    Major,
}

/// Category of feature that caused the warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureCategory {
    TextFormatting,
    ParagraphFormatting,
    Sections,
    HeadersFooters,
    Styles,
    Theme,
    Tables,
    Images,
    Bookmarks,
    Fields,
    TrackChanges,
    FormatChanges,
    Comments,
    Metadata,
    Other,
}

impl FeatureCategory {
    pub fn name(self) -> &'static str {
        match self {
            FeatureCategory::TextFormatting => "text formatting",
            FeatureCategory::ParagraphFormatting => "paragraph formatting",
            FeatureCategory::Sections => "sections",
            FeatureCategory::HeadersFooters => "headers and footers",
            FeatureCategory::Styles => "styles",
            FeatureCategory::Theme => "theme",
            FeatureCategory::Tables => "tables",
            FeatureCategory::Images => "images",
            FeatureCategory::Bookmarks => "bookmarks",
            FeatureCategory::Fields => "fields",
            FeatureCategory::TrackChanges => "tracked changes",
            FeatureCategory::FormatChanges => "tracked format changes",
            FeatureCategory::Comments => "comments",
            FeatureCategory::Metadata => "metadata",
            FeatureCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single fidelity warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidelityWarning {
    /// Stable warning code, e.g. `html.comments.dropped`
    pub code: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub category: FeatureCategory,
    /// Element or part the warning refers to
    pub element: Option<String>,
    /// Number of occurrences
    pub count: usize,
}

impl FidelityWarning {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        severity: WarningSeverity,
        category: FeatureCategory,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            category,
            element: None,
            count: 1,
        }
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }
}

impl std::fmt::Display for FidelityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.severity, self.message)?;
        if let Some(element) = &self.element {
            write!(f, " ({element})")?;
        }
        if self.count > 1 {
            write!(f, " x{}", self.count)?;
        }
        Ok(())
    }
}

// =============================================================================
// Fidelity Report
// =============================================================================

/// Which way a report was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Import,
    Export,
}

/// Warnings collected during one import or export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidelityReport {
    pub format: Format,
    pub direction: Direction,
    warnings: Vec<FidelityWarning>,
}

impl FidelityReport {
    pub fn new(format: Format, direction: Direction) -> Self {
        Self {
            format,
            direction,
            warnings: Vec::new(),
        }
    }

    pub fn import(format: Format) -> Self {
        Self::new(format, Direction::Import)
    }

    pub fn export(format: Format) -> Self {
        Self::new(format, Direction::Export)
    }

    /// Add a warning, folding it into an existing one with the same code
    pub fn add(&mut self, warning: FidelityWarning) {
        match self.warnings.iter_mut().find(|w| w.code == warning.code) {
            Some(existing) => existing.count += warning.count,
            None => self.warnings.push(warning),
        }
    }

    /// Shorthand for [`FidelityReport::add`]
    pub fn warn(
        &mut self,
        code: &str,
        category: FeatureCategory,
        severity: WarningSeverity,
        message: impl Into<String>,
    ) {
        self.add(FidelityWarning::new(code, message, severity, category));
    }

    /// Record an element the reader does not understand
    pub fn unsupported_element(&mut self, element: &str) {
        self.add(
            FidelityWarning::new(
                format!("unsupported.{element}"),
                format!("Unsupported element <{element}> ignored"),
                WarningSeverity::Minor,
                FeatureCategory::Other,
            )
            .with_element(element),
        );
    }

    pub fn warnings(&self) -> &[FidelityWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    pub fn has_category(&self, category: FeatureCategory) -> bool {
        self.warnings.iter().any(|w| w.category == category)
    }

    pub fn by_category(&self, category: FeatureCategory) -> Vec<&FidelityWarning> {
        self.warnings.iter().filter(|w| w.category == category).collect()
    }

    /// Categories that lost something, in first-seen order
    pub fn categories(&self) -> Vec<FeatureCategory> {
        let mut seen = Vec::new();
        for w in &self.warnings {
            if !seen.contains(&w.category) {
                seen.push(w.category);
            }
        }
        seen
    }

    pub fn worst_severity(&self) -> Option<WarningSeverity> {
        self.warnings.iter().map(|w| w.severity).max()
    }

    /// Overall fidelity score (0-100)
    pub fn score(&self) -> f32 {
        let mut score = 100.0;
        for warning in &self.warnings {
            let deduction = match warning.severity {
                WarningSeverity::Info => 0.1,
                WarningSeverity::Minor => 0.5,
                WarningSeverity::Moderate => 2.0,
                WarningSeverity::Major => 5.0,
            };
            score -= deduction * (warning.count.min(10) as f32);
        }
        score.clamp(0.0, 100.0)
    }

    pub fn merge(&mut self, other: FidelityReport) {
        for warning in other.warnings {
            self.add(warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_fold_by_code() {
        let mut report = FidelityReport::export(Format::Html);
        report.warn(
            "html.comments",
            FeatureCategory::Comments,
            WarningSeverity::Major,
            "Comments dropped",
        );
        report.warn(
            "html.comments",
            FeatureCategory::Comments,
            WarningSeverity::Major,
            "Comments dropped",
        );
        assert_eq!(report.len(), 1);
        assert_eq!(report.warnings()[0].count, 2);
        assert!(report.has_category(FeatureCategory::Comments));
    }

    #[test]
    fn test_score_and_severity() {
        let mut report = FidelityReport::import(Format::Rtf);
        assert_eq!(report.score(), 100.0);
        assert_eq!(report.worst_severity(), None);

        report.unsupported_element("shppict");
        report.warn("x", FeatureCategory::Images, WarningSeverity::Major, "lost");
        assert_eq!(report.worst_severity(), Some(WarningSeverity::Major));
        assert!((report.score() - 94.5).abs() < 0.01);
        assert_eq!(
            report.categories(),
            vec![FeatureCategory::Other, FeatureCategory::Images]
        );
    }

    #[test]
    fn test_merge() {
        let mut a = FidelityReport::export(Format::Odt);
        a.warn("t", FeatureCategory::Theme, WarningSeverity::Info, "resolved");
        let mut b = FidelityReport::export(Format::Odt);
        b.warn("t", FeatureCategory::Theme, WarningSeverity::Info, "resolved");
        b.warn("m", FeatureCategory::Metadata, WarningSeverity::Minor, "partial");
        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.warnings()[0].count, 2);
    }
}
