//! Nonprofit Board Governance
//!
//! Boards and rosters, meetings and attendance, motions and votes, minutes,
//! and the hash-chained approval log.

pub mod approvals;
pub mod boards;
pub mod meetings;
pub mod minutes;
pub mod motions;
pub mod quorum;
pub mod types;

pub use approvals::{ApprovalLog, ApprovalSignature, ApprovalSubject, GovernanceApproval, NewApproval};
pub use boards::BoardRegistry;
pub use meetings::MeetingRegistry;
pub use minutes::{FinalizedMinutes, MinutesBook};
pub use motions::{MotionLedger, VoteResult};
pub use quorum::QuorumStatus;
pub use types::*;

use crate::config::AppConfig;
use crate::database::Database;
use crate::entities::EntityRegistry;

/// Every governance service over one pool.
#[derive(Clone)]
pub struct GovernanceServices {
    pub entities: EntityRegistry,
    pub boards: BoardRegistry,
    pub meetings: MeetingRegistry,
    pub motions: MotionLedger,
    pub minutes: MinutesBook,
    pub approvals: ApprovalLog,
}

impl GovernanceServices {
    pub fn new(database: &Database, config: &AppConfig) -> Self {
        let pool = database.pool().clone();
        let approvals = ApprovalLog::new(
            pool.clone(),
            config.governance.require_approval_signatures,
        );
        Self {
            entities: EntityRegistry::new(pool.clone()),
            boards: BoardRegistry::new(pool.clone()),
            meetings: MeetingRegistry::new(pool.clone()),
            motions: MotionLedger::new(pool.clone()),
            minutes: MinutesBook::new(pool, approvals.clone()),
            approvals,
        }
    }
}
