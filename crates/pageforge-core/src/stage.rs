use serde::{Deserialize, Serialize};

/// One step in the fixed generation sequence.
///
/// The order never changes and transitions only move forward; the single
/// exception is a resume, which re-enters the stage that was interrupted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "draft")]
    Draft,
    #[serde(rename = "improvement-checklist")]
    ImprovementChecklist,
    #[serde(rename = "apply-checklist")]
    ApplyChecklist,
    #[serde(rename = "syntax-lint-1")]
    SyntaxLint1,
    #[serde(rename = "platform-optimize")]
    PlatformOptimize,
    #[serde(rename = "syntax-lint-2")]
    SyntaxLint2,
    #[serde(rename = "final-inspection")]
    FinalInspection,
    #[serde(rename = "fix-inspection-issues")]
    FixInspectionIssues,
    #[serde(rename = "complete")]
    Complete,
}

/// The full stage sequence, in execution order.
pub const SEQUENCE: [Stage; 9] = [
    Stage::Draft,
    Stage::ImprovementChecklist,
    Stage::ApplyChecklist,
    Stage::SyntaxLint1,
    Stage::PlatformOptimize,
    Stage::SyntaxLint2,
    Stage::FinalInspection,
    Stage::FixInspectionIssues,
    Stage::Complete,
];

impl Stage {
    /// Position in the sequence, zero-based.
    pub fn index(self) -> usize {
        SEQUENCE
            .iter()
            .position(|s| *s == self)
            .unwrap_or(SEQUENCE.len() - 1)
    }

    /// The following stage, or `None` at the end of the sequence.
    pub fn next(self) -> Option<Stage> {
        SEQUENCE.get(self.index() + 1).copied()
    }

    /// Fraction of the sequence reached once this stage runs, in `0..=1`.
    pub fn progress(self) -> f64 {
        (self.index() + 1) as f64 / SEQUENCE.len() as f64
    }

    /// Stable machine-readable name (matches the serde representation).
    pub fn label(self) -> &'static str {
        match self {
            Stage::Draft => "draft",
            Stage::ImprovementChecklist => "improvement-checklist",
            Stage::ApplyChecklist => "apply-checklist",
            Stage::SyntaxLint1 => "syntax-lint-1",
            Stage::PlatformOptimize => "platform-optimize",
            Stage::SyntaxLint2 => "syntax-lint-2",
            Stage::FinalInspection => "final-inspection",
            Stage::FixInspectionIssues => "fix-inspection-issues",
            Stage::Complete => "complete",
        }
    }

    /// Label used in user-facing notifications.
    pub fn human_label(self) -> &'static str {
        match self {
            Stage::Draft => "Drafting",
            Stage::ImprovementChecklist => "Reviewing the draft",
            Stage::ApplyChecklist => "Applying improvements",
            Stage::SyntaxLint1 => "Checking syntax",
            Stage::PlatformOptimize => "Optimizing for mobile",
            Stage::SyntaxLint2 => "Re-checking syntax",
            Stage::FinalInspection => "Inspecting the result",
            Stage::FixInspectionIssues => "Fixing inspection issues",
            Stage::Complete => "Complete",
        }
    }

    /// Whether this stage runs the local structural check before deciding to
    /// call the network.
    pub fn is_lint(self) -> bool {
        matches!(self, Stage::SyntaxLint1 | Stage::SyntaxLint2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_strictly_forward() {
        let mut stage = Stage::Draft;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next.index() == stage.index() + 1);
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen.len(), SEQUENCE.len());
        assert_eq!(stage, Stage::Complete);
    }

    #[test]
    fn progress_is_monotonic_and_ends_at_one() {
        let mut last = 0.0;
        for stage in SEQUENCE {
            let p = stage.progress();
            assert!(p > last);
            last = p;
        }
        assert!((Stage::Complete.progress() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serde_labels_round_trip() {
        for stage in SEQUENCE {
            let json = serde_json::to_string(&stage).expect("serialize");
            assert_eq!(json, format!("\"{}\"", stage.label()));
            let back: Stage = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, stage);
        }
    }
}
