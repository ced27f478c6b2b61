use crate::taxonomy::RankedCandidate;
use chrono::Utc;
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
};
use uuid::Uuid;

/// Append-only trail of the candidates shown to the oracle, one block per
/// label.
pub struct AuditLog {
    out: Box<dyn Write + Send>,
    run_id: Uuid,
}

impl AuditLog {
    pub fn open(path: &Path, run_id: Uuid) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(file, run_id))
    }

    pub fn from_writer(out: impl Write + Send + 'static, run_id: Uuid) -> Self {
        Self {
            out: Box::new(out),
            run_id,
        }
    }

    pub fn disabled(run_id: Uuid) -> Self {
        Self::from_writer(io::sink(), run_id)
    }

    /// `row` is zero-based; the block shows it one-based like a spreadsheet.
    pub fn record(
        &mut self,
        row: usize,
        label: &str,
        candidates: &[RankedCandidate],
    ) -> io::Result<()> {
        let mut block = format!(
            "\n\n### Row {} - Internal Category: '{}'\n# run {} at {}\n",
            row + 1,
            label,
            self.run_id,
            Utc::now().to_rfc3339()
        );
        for candidate in candidates {
            block.push_str(&format!("- {}\n", candidate.category));
        }
        block.push_str(&"-".repeat(60));
        self.out.write_all(block.as_bytes())?;
        self.out.flush()
    }
}
