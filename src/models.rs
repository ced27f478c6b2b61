pub const ERROR_CATEGORY: &str = "Error";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReviewFlag {
    #[default]
    Accepted,
    Check,
}

impl ReviewFlag {
    /// Cell value written to the `Check` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewFlag::Accepted => "",
            ReviewFlag::Check => "Check",
        }
    }
}

/// What a reviewer sees for one input row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolutionRecord {
    pub mapped_category: String,
    pub review_flag: ReviewFlag,
}

impl ResolutionRecord {
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn error() -> Self {
        Self {
            mapped_category: ERROR_CATEGORY.to_string(),
            review_flag: ReviewFlag::Check,
        }
    }

    pub fn is_error(&self) -> bool {
        self.mapped_category == ERROR_CATEGORY
    }

    pub fn is_skipped(&self) -> bool {
        self.mapped_category.is_empty() && self.review_flag == ReviewFlag::Accepted
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchMethod {
    Exact,
    Trailing { depth: usize },
    Semantic { score: f32 },
    Unresolved,
    Skipped,
    Error { detail: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: ResolutionRecord,
    pub method: MatchMethod,
}

impl Resolution {
    pub fn new(category: impl Into<String>, flag: ReviewFlag, method: MatchMethod) -> Self {
        Self {
            record: ResolutionRecord {
                mapped_category: category.into(),
                review_flag: flag,
            },
            method,
        }
    }

    pub fn skipped() -> Self {
        Self {
            record: ResolutionRecord::skipped(),
            method: MatchMethod::Skipped,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            record: ResolutionRecord::error(),
            method: MatchMethod::Error {
                detail: detail.into(),
            },
        }
    }
}

/// `success` counts every auto-accepted row, empty labels included;
/// `skipped` is the part of it that never had a label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub needs_check: usize,
    pub errors: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ResolutionRecord>) -> Self {
        let mut summary = RunSummary::default();
        for record in records {
            summary.total += 1;
            if record.is_error() {
                summary.errors += 1;
            } else if record.review_flag == ReviewFlag::Check {
                summary.needs_check += 1;
            } else {
                summary.success += 1;
                if record.is_skipped() {
                    summary.skipped += 1;
                }
            }
        }
        summary
    }
}
