//! Approval and Signature Log
//!
//! Approvals are chained per entity: each record hashes its own fields
//! together with the previous record's hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::chain::{canonical_string, verify_links, ChainLink};
use crate::audit::{log_event, sha256_prefixed, ChainVerification, GENESIS_HASH};
use crate::crypto::SignatureManager;
use crate::database::parse_timestamp;
use crate::error::GovernanceError;

const APPROVAL_COLUMNS: &str = "id, approval_id, entity_id, subject_type, subject_id, actor_profile_id, \
     payload, payload_hash, previous_hash, record_hash, signature, public_key, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalSubject {
    Board,
    Meeting,
    Motion,
    Minutes,
}

impl ApprovalSubject {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalSubject::Board => "board",
            ApprovalSubject::Meeting => "meeting",
            ApprovalSubject::Motion => "motion",
            ApprovalSubject::Minutes => "minutes",
        }
    }
}

impl std::str::FromStr for ApprovalSubject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "board" => Ok(ApprovalSubject::Board),
            "meeting" => Ok(ApprovalSubject::Meeting),
            "motion" => Ok(ApprovalSubject::Motion),
            "minutes" => Ok(ApprovalSubject::Minutes),
            _ => Err(format!("Invalid approval subject: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceApproval {
    pub id: i64,
    pub approval_id: String,
    pub entity_id: i64,
    pub subject_type: ApprovalSubject,
    pub subject_id: i64,
    pub actor_profile_id: String,
    pub payload: serde_json::Value,
    pub payload_hash: String,
    pub previous_hash: String,
    pub record_hash: String,
    pub signature: Option<String>,
    pub public_key: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Canonical payload text exactly as stored; `payload_hash` covers these bytes.
    #[serde(skip)]
    pub payload_text: String,
}

impl ChainLink for GovernanceApproval {
    fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    fn record_hash(&self) -> &str {
        &self.record_hash
    }

    fn calculate_hash(&self) -> String {
        let canonical = canonical_string(&[
            ("approval_id", self.approval_id.clone()),
            ("entity_id", self.entity_id.to_string()),
            ("subject_type", self.subject_type.as_str().to_string()),
            ("subject_id", self.subject_id.to_string()),
            ("actor", self.actor_profile_id.clone()),
            ("payload_hash", self.payload_hash.clone()),
            ("previous_hash", self.previous_hash.clone()),
            ("signature", self.signature.clone().unwrap_or_default()),
            ("created_at", self.created_at.to_rfc3339()),
        ]);
        sha256_prefixed(canonical.as_bytes())
    }
}

/// Detached secp256k1 signature over the payload hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSignature {
    pub signature: String,
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub struct NewApproval {
    pub entity_id: i64,
    pub subject_type: ApprovalSubject,
    pub subject_id: i64,
    pub actor_profile_id: String,
    pub payload: serde_json::Value,
    pub signature: Option<ApprovalSignature>,
}

/// JSON with object keys sorted at every level.
pub fn canonical_json(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

pub fn hash_payload(payload: &serde_json::Value) -> String {
    sha256_prefixed(canonical_json(payload).as_bytes())
}

#[derive(Clone)]
pub struct ApprovalLog {
    pool: SqlitePool,
    require_signatures: bool,
}

impl ApprovalLog {
    pub fn new(pool: SqlitePool, require_signatures: bool) -> Self {
        Self {
            pool,
            require_signatures,
        }
    }

    /// Append an approval to the entity's chain
    pub async fn record_approval(
        &self,
        new_approval: NewApproval,
    ) -> Result<GovernanceApproval, GovernanceError> {
        let mut tx = self.pool.begin().await?;
        let approval = self.append(&mut tx, new_approval).await?;
        tx.commit().await?;
        Ok(approval)
    }

    /// Append inside the caller's transaction so the approval commits or
    /// rolls back with the change it approves.
    pub async fn append(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        new_approval: NewApproval,
    ) -> Result<GovernanceApproval, GovernanceError> {
        let payload_text = canonical_json(&new_approval.payload);
        let payload_hash = sha256_prefixed(payload_text.as_bytes());

        match &new_approval.signature {
            Some(sig) => {
                let verified = SignatureManager::new().verify_payload_signature(
                    &payload_hash,
                    &sig.signature,
                    &sig.public_key,
                )?;
                if !verified {
                    warn!(
                        "Rejected approval from {}: signature does not match payload",
                        new_approval.actor_profile_id
                    );
                    return Err(GovernanceError::SignatureError(
                        "Signature does not verify against the payload hash".to_string(),
                    ));
                }
            }
            None if self.require_signatures => {
                return Err(GovernanceError::SignatureError(
                    "Approvals must carry a signature".to_string(),
                ));
            }
            None => {}
        }

        let previous_hash: Option<String> = sqlx::query_scalar(
            "SELECT record_hash FROM governance_approvals WHERE entity_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(new_approval.entity_id)
        .fetch_optional(&mut **tx)
        .await?;

        let mut approval = GovernanceApproval {
            id: 0,
            approval_id: Uuid::new_v4().to_string(),
            entity_id: new_approval.entity_id,
            subject_type: new_approval.subject_type,
            subject_id: new_approval.subject_id,
            actor_profile_id: new_approval.actor_profile_id,
            payload: new_approval.payload,
            payload_hash,
            previous_hash: previous_hash.unwrap_or_else(|| GENESIS_HASH.to_string()),
            record_hash: String::new(),
            signature: new_approval.signature.as_ref().map(|s| s.signature.clone()),
            public_key: new_approval.signature.as_ref().map(|s| s.public_key.clone()),
            created_at: Utc::now(),
            payload_text,
        };
        approval.record_hash = approval.calculate_hash();

        let result = sqlx::query(
            r#"
            INSERT INTO governance_approvals
            (approval_id, entity_id, subject_type, subject_id, actor_profile_id, payload,
             payload_hash, previous_hash, record_hash, signature, public_key, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&approval.approval_id)
        .bind(approval.entity_id)
        .bind(approval.subject_type.as_str())
        .bind(approval.subject_id)
        .bind(&approval.actor_profile_id)
        .bind(&approval.payload_text)
        .bind(&approval.payload_hash)
        .bind(&approval.previous_hash)
        .bind(&approval.record_hash)
        .bind(approval.signature.as_deref())
        .bind(approval.public_key.as_deref())
        .bind(approval.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        approval.id = result.last_insert_rowid();

        log_event(
            &mut **tx,
            Some(approval.entity_id),
            "approval_recorded",
            Some(&approval.actor_profile_id),
            &serde_json::json!({
                "approval_id": approval.approval_id,
                "subject_type": approval.subject_type,
                "subject_id": approval.subject_id,
                "signed": approval.signature.is_some(),
            }),
        )
        .await?;

        info!(
            "Recorded {} approval {} for {} {}",
            if approval.signature.is_some() { "signed" } else { "unsigned" },
            approval.approval_id,
            approval.subject_type.as_str(),
            approval.subject_id
        );
        Ok(approval)
    }

    /// Oldest first, in chain order
    pub async fn list_approvals(&self, entity_id: i64) -> Result<Vec<GovernanceApproval>, GovernanceError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM governance_approvals WHERE entity_id = ? ORDER BY id",
            APPROVAL_COLUMNS
        ))
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(approval_from_row).collect()
    }

    pub async fn approvals_for_subject(
        &self,
        entity_id: i64,
        subject_type: ApprovalSubject,
        subject_id: i64,
    ) -> Result<Vec<GovernanceApproval>, GovernanceError> {
        Ok(self
            .list_approvals(entity_id)
            .await?
            .into_iter()
            .filter(|a| a.subject_type == subject_type && a.subject_id == subject_id)
            .collect())
    }

    /// Recompute hashes and links, then re-check attached signatures
    pub async fn verify_chain(&self, entity_id: i64) -> Result<ChainVerification, GovernanceError> {
        let approvals = self.list_approvals(entity_id).await?;
        let result = verify_links(&approvals);
        if !result.valid {
            warn!(
                "Approval chain for entity {} broken: {:?}",
                entity_id, result.error_message
            );
            return Ok(result);
        }

        let signatures = SignatureManager::new();
        for (i, approval) in approvals.iter().enumerate() {
            if sha256_prefixed(approval.payload_text.as_bytes()) != approval.payload_hash {
                return Ok(ChainVerification::broken(
                    approvals.len(),
                    i,
                    format!("Payload hash mismatch in entry {}", i),
                ));
            }
            if let (Some(signature), Some(public_key)) = (&approval.signature, &approval.public_key) {
                let verified = signatures
                    .verify_payload_signature(&approval.payload_hash, signature, public_key)
                    .unwrap_or(false);
                if !verified {
                    return Ok(ChainVerification::broken(
                        approvals.len(),
                        i,
                        format!("Signature does not verify in entry {}", i),
                    ));
                }
            }
        }

        debug!("Approval chain for entity {} verified: {} entries", entity_id, approvals.len());
        Ok(result)
    }
}

fn approval_from_row(row: &SqliteRow) -> Result<GovernanceApproval, GovernanceError> {
    let payload_text = row.get::<String, _>("payload");
    Ok(GovernanceApproval {
        id: row.get::<i64, _>("id"),
        approval_id: row.get::<String, _>("approval_id"),
        entity_id: row.get::<i64, _>("entity_id"),
        subject_type: row
            .get::<String, _>("subject_type")
            .parse()
            .map_err(GovernanceError::DatabaseError)?,
        subject_id: row.get::<i64, _>("subject_id"),
        actor_profile_id: row.get::<String, _>("actor_profile_id"),
        payload: serde_json::from_str(&payload_text)?,
        payload_hash: row.get::<String, _>("payload_hash"),
        previous_hash: row.get::<String, _>("previous_hash"),
        record_hash: row.get::<String, _>("record_hash"),
        signature: row.get::<Option<String>, _>("signature"),
        public_key: row.get::<Option<String>, _>("public_key"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        payload_text,
    })
}
