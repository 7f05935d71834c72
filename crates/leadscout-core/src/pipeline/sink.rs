//! Stage 4: pending-update queueing.
//!
//! Projects each qualified prospect into a CRM-field-shaped record and
//! hands it to the external approval queue. This stage never writes to
//! the CRM of record; the human-approved write-back happens elsewhere.
//! Transport failures are retried once per prospect, and a prospect
//! that still fails does not block the others.

use std::collections::BTreeMap;

use crate::error::{ErrorKind, SinkError, StageError, StageName};
use crate::matching::MatchKind;
use crate::model::{AccountRef, PendingUpdate, PersonaTag, QualifiedProspect, RecordType};

/// The external approval queue Stage 4 hands records to.
#[async_trait::async_trait]
pub trait PendingUpdateSink: Send + Sync {
    /// Enqueue one pending update; returns the queue id.
    async fn enqueue(&self, update: &PendingUpdate) -> Result<String, SinkError>;
}

/// Execute Stage 4: project and enqueue each qualified prospect.
pub async fn execute(
    sink: &dyn PendingUpdateSink,
    account: &AccountRef,
    run_id: &str,
    prospects: &[QualifiedProspect],
) -> (Vec<String>, Option<StageError>) {
    let mut queued = Vec::new();
    let mut failures = 0u32;

    for prospect in prospects {
        let update = project(prospect, account, run_id);
        match enqueue_with_retry(sink, &update).await {
            Ok(id) => {
                tracing::debug!(url = %prospect.url, queued_id = %id, "pending update queued");
                queued.push(id);
            }
            Err(err) => {
                tracing::warn!(url = %prospect.url, error = %err, "pending update failed");
                failures += 1;
            }
        }
    }

    let error = if failures > 0 {
        Some(StageError::new(
            StageName::Sink,
            ErrorKind::Transport,
            format!("{failures} of {} pending updates failed to enqueue", prospects.len()),
        ))
    } else {
        None
    };

    tracing::info!(
        queued = queued.len(),
        failed = failures,
        "pending-update queueing complete",
    );
    (queued, error)
}

/// One retry on transport errors; rejections fail immediately.
async fn enqueue_with_retry(
    sink: &dyn PendingUpdateSink,
    update: &PendingUpdate,
) -> Result<String, SinkError> {
    match sink.enqueue(update).await {
        Ok(id) => Ok(id),
        Err(SinkError::Transport { .. }) => sink.enqueue(update).await,
        Err(err) => Err(err),
    }
}

/// Project a qualified prospect into the fixed CRM field map.
pub fn project(prospect: &QualifiedProspect, account: &AccountRef, run_id: &str) -> PendingUpdate {
    let p = &prospect.profile;
    let mut fields: BTreeMap<String, serde_json::Value> = BTreeMap::new();

    insert_opt(&mut fields, "first_name", p.first_name.as_deref());
    insert_opt(&mut fields, "last_name", p.last_name.as_deref());
    insert_opt(&mut fields, "title", p.job_title.as_deref());
    insert_opt(&mut fields, "company", p.employer.as_deref());
    insert_opt(&mut fields, "location", p.location.as_deref());
    fields.insert(
        "profile_url".to_string(),
        serde_json::Value::String(prospect.url.clone()),
    );
    fields.insert(
        "persona".to_string(),
        serde_json::to_value(prospect.persona).unwrap_or_default(),
    );
    fields.insert(
        "ranking_score".to_string(),
        serde_json::Value::from(prospect.score),
    );
    fields.insert(
        "ranking_rationale".to_string(),
        serde_json::Value::String(prospect.rationale.clone()),
    );
    fields.insert(
        "source_run_id".to_string(),
        serde_json::Value::String(run_id.to_string()),
    );

    let match_kind = match prospect.company_match.kind {
        MatchKind::Exact => "exact",
        MatchKind::Variant => "variant",
    };

    PendingUpdate {
        record_type: RecordType::Lead,
        account_id: account.account_id.clone(),
        fields,
        run_id: run_id.to_string(),
        provenance: vec![
            format!("source:{:?}", prospect.source).to_lowercase(),
            format!(
                "employer_match:{match_kind}:{}",
                prospect.company_match.matched_variant
            ),
        ],
    }
}

fn insert_opt(
    fields: &mut BTreeMap<String, serde_json::Value>,
    key: &str,
    value: Option<&str>,
) {
    if let Some(value) = value {
        fields.insert(key.to_string(), serde_json::Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::CompanyMatch;
    use crate::model::{CandidateSource, Profile};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn prospect(url: &str, score: u8) -> QualifiedProspect {
        QualifiedProspect {
            url: url.to_string(),
            source: CandidateSource::Dataset,
            profile: Profile {
                first_name: Some("Jane".to_string()),
                last_name: Some("Doe".to_string()),
                job_title: Some("CFO".to_string()),
                employer: Some("Benefis Health System".to_string()),
                location: Some("Great Falls, Montana".to_string()),
                ..Default::default()
            },
            score,
            rationale: "budget authority".to_string(),
            persona: PersonaTag::FinanceDecisionMaker,
            company_match: CompanyMatch {
                kind: MatchKind::Exact,
                matched_variant: "Benefis Health System".to_string(),
            },
        }
    }

    struct RecordingSink {
        updates: Mutex<Vec<PendingUpdate>>,
        fail_first: AtomicU32,
        reject: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                updates: Mutex::new(Vec::new()),
                fail_first: AtomicU32::new(0),
                reject: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl PendingUpdateSink for RecordingSink {
        async fn enqueue(&self, update: &PendingUpdate) -> Result<String, SinkError> {
            if self.reject {
                return Err(SinkError::Rejected {
                    message: "duplicate".to_string(),
                });
            }
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(SinkError::Transport {
                    message: "queue unavailable".to_string(),
                });
            }
            let mut updates = self.updates.lock().unwrap();
            updates.push(update.clone());
            Ok(format!("q-{}", updates.len()))
        }
    }

    #[test]
    fn projection_has_fixed_field_map() {
        let account = AccountRef::new("A1", "Benefis Hospitals Inc");
        let update = project(&prospect("https://linkedin.com/in/jane-doe", 85), &account, "run-1");

        assert_eq!(update.record_type, RecordType::Lead);
        assert_eq!(update.account_id, "A1");
        assert_eq!(update.run_id, "run-1");
        assert_eq!(update.fields["first_name"], "Jane");
        assert_eq!(update.fields["last_name"], "Doe");
        assert_eq!(update.fields["title"], "CFO");
        assert_eq!(update.fields["company"], "Benefis Health System");
        assert_eq!(update.fields["profile_url"], "https://linkedin.com/in/jane-doe");
        assert_eq!(update.fields["persona"], "finance_decision_maker");
        assert_eq!(update.fields["ranking_score"], 85);
        assert_eq!(update.fields["source_run_id"], "run-1");
        assert!(update
            .provenance
            .iter()
            .any(|p| p.starts_with("employer_match:exact:")));
    }

    #[test]
    fn projection_omits_absent_fields() {
        let account = AccountRef::new("A1", "Benefis Hospitals Inc");
        let mut sparse = prospect("https://linkedin.com/in/jane-doe", 85);
        sparse.profile.first_name = None;
        sparse.profile.location = None;
        let update = project(&sparse, &account, "run-1");
        assert!(!update.fields.contains_key("first_name"));
        assert!(!update.fields.contains_key("location"));
        assert!(update.fields.contains_key("last_name"));
    }

    #[tokio::test]
    async fn enqueues_one_update_per_prospect() {
        let sink = RecordingSink::new();
        let account = AccountRef::new("A1", "Benefis Hospitals Inc");
        let prospects = vec![
            prospect("https://linkedin.com/in/a", 85),
            prospect("https://linkedin.com/in/b", 72),
        ];

        let (queued, err) = execute(&sink, &account, "run-1", &prospects).await;
        assert!(err.is_none());
        assert_eq!(queued, vec!["q-1", "q-2"]);
        assert_eq!(sink.updates.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_is_retried_once() {
        let sink = RecordingSink::new();
        sink.fail_first.store(1, Ordering::SeqCst);
        let account = AccountRef::new("A1", "Benefis Hospitals Inc");
        let prospects = vec![prospect("https://linkedin.com/in/a", 85)];

        let (queued, err) = execute(&sink, &account, "run-1", &prospects).await;
        assert!(err.is_none());
        assert_eq!(queued.len(), 1);
    }

    #[tokio::test]
    async fn persistent_failure_records_stage_error_but_continues() {
        let sink = RecordingSink::new();
        // Two consecutive transport failures exhaust the retry for the
        // first prospect only.
        sink.fail_first.store(2, Ordering::SeqCst);
        let account = AccountRef::new("A1", "Benefis Hospitals Inc");
        let prospects = vec![
            prospect("https://linkedin.com/in/a", 85),
            prospect("https://linkedin.com/in/b", 72),
        ];

        let (queued, err) = execute(&sink, &account, "run-1", &prospects).await;
        assert_eq!(queued.len(), 1);
        let err = err.unwrap();
        assert_eq!(err.kind, ErrorKind::Transport);
        assert!(err.message.contains("1 of 2"));
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let mut sink = RecordingSink::new();
        sink.reject = true;
        let account = AccountRef::new("A1", "Benefis Hospitals Inc");
        let prospects = vec![prospect("https://linkedin.com/in/a", 85)];

        let (queued, err) = execute(&sink, &account, "run-1", &prospects).await;
        assert!(queued.is_empty());
        assert!(err.is_some());
    }

    #[tokio::test]
    async fn empty_prospects_is_a_clean_noop() {
        let sink = RecordingSink::new();
        let account = AccountRef::new("A1", "Benefis Hospitals Inc");
        let (queued, err) = execute(&sink, &account, "run-1", &[]).await;
        assert!(queued.is_empty());
        assert!(err.is_none());
    }
}
