use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;

/// Members present versus the count the board's quorum percentage demands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumStatus {
    pub eligible_members: usize,
    pub present_members: usize,
    pub required: usize,
    pub quorum_percent: u32,
    pub met: bool,
}

impl QuorumStatus {
    pub fn evaluate(eligible_members: usize, present_members: usize, quorum_percent: u32) -> Self {
        let required = quorum_required(eligible_members, quorum_percent);
        Self {
            eligible_members,
            present_members,
            required,
            quorum_percent,
            met: eligible_members > 0 && present_members >= required,
        }
    }

    pub fn ensure_met(&self) -> Result<(), GovernanceError> {
        if self.met {
            Ok(())
        } else {
            Err(GovernanceError::QuorumNotMet {
                present: self.present_members,
                required: self.required,
            })
        }
    }
}

/// `ceil(eligible * percent / 100)`, at least one seat when anyone is eligible.
pub fn quorum_required(eligible_members: usize, quorum_percent: u32) -> usize {
    if eligible_members == 0 {
        return 0;
    }
    let scaled = eligible_members * quorum_percent as usize;
    let required = scaled.div_ceil(100);
    required.clamp(1, eligible_members)
}

pub fn is_term_current(term_start: NaiveDate, term_end: Option<NaiveDate>, on: NaiveDate) -> bool {
    term_start <= on && term_end.map_or(true, |end| on <= end)
}

pub fn validate_quorum_percent(quorum_percent: u32) -> Result<(), GovernanceError> {
    if (1..=100).contains(&quorum_percent) {
        Ok(())
    } else {
        Err(GovernanceError::ValidationError(format!(
            "Quorum percent must be within 1..=100, got {}",
            quorum_percent
        )))
    }
}

pub fn format_quorum_status(status: &QuorumStatus) -> String {
    let mark = if status.met { "✅" } else { "❌" };
    format!(
        "{} Quorum: {}/{} present, {} required ({}% of eligible)",
        mark, status.present_members, status.eligible_members, status.required, status.quorum_percent
    )
}
