//! The Stage 4 hand-off record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The CRM record type a pending update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// A new lead record.
    Lead,
    /// An existing contact record.
    Contact,
}

/// A prospect projected into CRM-field shape, awaiting human approval.
///
/// Created once per qualified prospect accepted into the sink; owned by
/// the external approval system thereafter. The field map uses a
/// `BTreeMap` so serialized updates have stable key ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpdate {
    /// Target CRM record type.
    pub record_type: RecordType,
    /// The account this prospect belongs to.
    pub account_id: String,
    /// CRM field name to value.
    pub fields: BTreeMap<String, serde_json::Value>,
    /// The run that produced this update.
    pub run_id: String,
    /// Provenance trail (source, match evidence, ranking rationale).
    pub provenance: Vec<String>,
}
