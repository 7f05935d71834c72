//! Stage 3: qualification and ranking.
//!
//! One generative call per run, never parallelized, so the ranking
//! order stays well-defined. The model sees a bounded projection of
//! each enriched profile and must return a JSON object referencing
//! inputs by index. Responses that fail the schema, reference an index
//! out of range, or duplicate an index are rejected wholesale: a wrong
//! ranking is worse than no ranking.

use serde::Deserialize;

use crate::adapters::GenerativeText;
use crate::budget::CostLedger;
use crate::error::{AdapterError, ErrorKind, StageError, StageName};
use crate::matching::MatchKind;
use crate::model::{EnrichedCandidate, PersonaTag, QualifiedProspect};

use super::RunOptions;

/// Deterministic score bonus for an exact employer match.
const EXACT_MATCH_BONUS: i64 = 5;
/// Deterministic score bonus for a variant employer match.
const VARIANT_MATCH_BONUS: i64 = 3;

/// System prompt constraining the ranker's output shape.
const RANK_SYSTEM_PROMPT: &str = "You are a sales research analyst identifying high-value \
decision-maker prospects for energy efficiency and infrastructure projects in healthcare \
facilities. Score each prospect 0-100 against the rubric. Respond ONLY with a JSON object \
of the form {\"prospects\": [{\"index\": 0, \"score\": 90, \"persona_tag\": \
\"facilities_decision_maker\", \"rationale\": \"...\"}]}. The index field references the \
prospect list in the request; include each index at most once. Valid persona_tag values: \
facilities_decision_maker, finance_decision_maker, operations_decision_maker, \
energy_sustainability_lead, other.";

/// Execute Stage 3 over the Stage 2 survivors.
pub async fn execute(
    genai: &dyn GenerativeText,
    ledger: &CostLedger,
    company_name: &str,
    inputs: &[EnrichedCandidate],
    opts: &RunOptions,
) -> (Vec<QualifiedProspect>, Option<StageError>) {
    if inputs.is_empty() {
        return (Vec::new(), None);
    }

    if let Err(refused) = ledger.try_charge("rank_completion", opts.unit_costs.genai_call) {
        return (
            Vec::new(),
            Some(StageError::new(
                StageName::Rank,
                ErrorKind::BudgetExhausted,
                refused.to_string(),
            )),
        );
    }

    let user = build_rank_prompt(company_name, inputs, opts);
    let value = match genai.complete_json(RANK_SYSTEM_PROMPT, &user).await {
        Ok(value) => value,
        Err(err) => {
            return (
                Vec::new(),
                Some(StageError::from_adapter(StageName::Rank, &err)),
            );
        }
    };

    match score_response(value, inputs, opts) {
        Ok(qualified) => {
            tracing::info!(
                inputs = inputs.len(),
                qualified = qualified.len(),
                threshold = opts.min_score,
                "ranking complete",
            );
            (qualified, None)
        }
        Err(err) => (
            Vec::new(),
            Some(StageError::from_adapter(StageName::Rank, &err)),
        ),
    }
}

/// Build the user prompt: company context, the persona rubric, and a
/// bounded projection of each input profile.
fn build_rank_prompt(company_name: &str, inputs: &[EnrichedCandidate], opts: &RunOptions) -> String {
    let prospects: Vec<serde_json::Value> = inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let p = &input.profile;
            serde_json::json!({
                "index": index,
                "name": p.full_name,
                "title": p.job_title,
                "employer": p.employer,
                "location": p.location,
                "connections": p.connections,
                "summary": p.summary,
                "recent_experience": p.experience.iter().take(3).map(|e| {
                    serde_json::json!({
                        "title": e.title,
                        "company": e.company,
                        "start_date": e.start_date,
                        "end_date": e.end_date,
                    })
                }).collect::<Vec<_>>(),
                "employment_match": match input.company_match.kind {
                    MatchKind::Exact => "exact",
                    MatchKind::Variant => "variant",
                },
            })
        })
        .collect();

    format!(
        "Rank these prospects at {company_name} for energy infrastructure and efficiency \
         projects. All are validated as currently employed there.\n\n\
         Rubric, weighted:\n\
         - Decision authority for infrastructure and capital projects\n\
         - Relevance to facilities or energy capital expenditure\n\
         - Finance influence over budget approval\n\
         - Confidence that the current employment data is accurate\n\n\
         Target personas in priority order: facilities leadership, finance leadership, \
         operations leadership, energy or sustainability leads.\n\n\
         Score 0-100. Only prospects scoring at least {} matter; rank by score \
         descending.\n\n\
         Prospects:\n{}",
        opts.min_score,
        serde_json::to_string_pretty(&prospects).unwrap_or_default()
    )
}

/// Expected response shape.
#[derive(Debug, Deserialize)]
struct RankResponse {
    prospects: Vec<RankedItem>,
}

#[derive(Debug, Deserialize)]
struct RankedItem {
    index: usize,
    score: i64,
    #[serde(default)]
    persona_tag: String,
    #[serde(default)]
    rationale: String,
}

/// Validate the model response and fold it into qualified prospects.
fn score_response(
    value: serde_json::Value,
    inputs: &[EnrichedCandidate],
    opts: &RunOptions,
) -> Result<Vec<QualifiedProspect>, AdapterError> {
    let response: RankResponse = serde_json::from_value(value)
        .map_err(|e| AdapterError::Parse(format!("ranking response: {e}")))?;

    let mut seen = vec![false; inputs.len()];
    for item in &response.prospects {
        if item.index >= inputs.len() {
            return Err(AdapterError::Parse(format!(
                "ranking response: index {} out of range (inputs: {})",
                item.index,
                inputs.len()
            )));
        }
        if seen[item.index] {
            return Err(AdapterError::Parse(format!(
                "ranking response: duplicate index {}",
                item.index
            )));
        }
        seen[item.index] = true;
    }

    // Unranked inputs score zero and fall to the threshold.
    let mut scored: Vec<QualifiedProspect> = Vec::new();
    for (index, input) in inputs.iter().enumerate() {
        let ranked = response.prospects.iter().find(|p| p.index == index);
        let base = ranked.map_or(0, |p| p.score).clamp(0, 100);
        let bonus = match input.company_match.kind {
            MatchKind::Exact => EXACT_MATCH_BONUS,
            MatchKind::Variant => VARIANT_MATCH_BONUS,
        };
        let score = (base + bonus).clamp(0, 100) as u8;

        if score < opts.min_score {
            continue;
        }

        scored.push(QualifiedProspect {
            url: input.url.clone(),
            source: input.source,
            profile: input.profile.clone(),
            score,
            rationale: ranked.map(|p| p.rationale.clone()).unwrap_or_default(),
            persona: ranked
                .map(|p| PersonaTag::parse(&p.persona_tag))
                .unwrap_or(PersonaTag::Other),
            company_match: input.company_match.clone(),
        });
    }

    // Score descending; ties by connections, then input order (stable).
    scored.sort_by(|a, b| {
        b.score.cmp(&a.score).then_with(|| {
            b.profile
                .connections
                .unwrap_or(0)
                .cmp(&a.profile.connections.unwrap_or(0))
        })
    });
    scored.truncate(opts.max_prospects);

    Ok(scored)
}
