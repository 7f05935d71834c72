//! Stage 2: validation and enrichment.
//!
//! Dedupe first so the same URL is never scraped twice; scrape whatever
//! lacks a profile; then run the deterministic filters in order of
//! increasing cost-to-verify: company match, location, connections,
//! title keywords. Company match is the strongest precision filter and
//! runs on scraped and dataset profiles alike. Survivors keep Stage 1
//! order; every rejection is logged with a reason code and evidence.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::adapters::{ProfileScraper, ScrapeOutcomes};
use crate::budget::CostLedger;
use crate::error::{ErrorKind, StageError, StageName};
use crate::matching::{match_company, CompanyMatch};
use crate::model::{AccountRef, Candidate, EnrichedCandidate, Profile, RejectReason, Rejection};
use crate::names::CompanyNameSet;
use crate::titles;

use super::RunOptions;

/// Stage 2 output.
#[derive(Debug, Clone, Default)]
pub struct EnrichOutput {
    /// Surviving candidates with profiles, in Stage 1 order.
    pub profiles: Vec<EnrichedCandidate>,
    /// Per-candidate rejection log.
    pub rejections: Vec<Rejection>,
}

/// Execute Stage 2 over the Stage 1 candidates.
pub async fn execute(
    scraper: &Arc<dyn ProfileScraper>,
    ledger: &CostLedger,
    account: &AccountRef,
    names: &CompanyNameSet,
    candidates: &[Candidate],
    opts: &RunOptions,
) -> (EnrichOutput, Option<StageError>) {
    let candidates = dedupe(candidates);
    let mut error = None;
    let mut rejections = Vec::new();

    // Scrape everything that arrived without a profile, in one batch.
    let missing: Vec<String> = candidates
        .iter()
        .filter(|c| !c.has_profile())
        .map(|c| c.url.clone())
        .collect();

    let mut scraped = ScrapeOutcomes::new();
    if !missing.is_empty() {
        let cost = missing.len() as f64 * opts.unit_costs.scrape_url;
        match ledger.try_charge("scrape_profiles", cost) {
            Ok(()) => match scrape_missing(scraper, &missing, opts).await {
                Ok(outcomes) => scraped = outcomes,
                Err(err) => error = Some(err),
            },
            Err(refused) => {
                error = Some(StageError::new(
                    StageName::Enrich,
                    ErrorKind::BudgetExhausted,
                    refused.to_string(),
                ));
            }
        }
    }

    let mut profiles = Vec::new();
    for candidate in &candidates {
        let profile =
            match resolve_profile(candidate, &scraped, &mut rejections, error.is_some()) {
                Some(profile) => profile.with_current_role_derived(),
                None => continue,
            };

        match apply_filters(candidate, &profile, account, names, opts) {
            Ok(company_match) => profiles.push(EnrichedCandidate {
                url: candidate.url.clone(),
                source: candidate.source,
                profile,
                company_match,
            }),
            Err(rejection) => rejections.push(rejection),
        }
    }

    tracing::info!(
        input = candidates.len(),
        survived = profiles.len(),
        rejected = rejections.len(),
        "validation and enrichment complete",
    );

    (
        EnrichOutput {
            profiles,
            rejections,
        },
        error,
    )
}

/// Dedupe by canonical URL, preferring the pre-enriched record.
fn dedupe(candidates: &[Candidate]) -> Vec<Candidate> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        match seen.get(&candidate.url) {
            None => {
                seen.insert(candidate.url.clone(), out.len());
                out.push(candidate.clone());
            }
            Some(&idx) => {
                // Same person from both sources: keep the dataset record.
                if candidate.has_profile() && !out[idx].has_profile() {
                    out[idx] = candidate.clone();
                }
            }
        }
    }
    out
}

/// Run the scrape: one batched call when the adapter supports it,
/// otherwise per-URL calls bounded by `max_scrape_concurrency`.
async fn scrape_missing(
    scraper: &Arc<dyn ProfileScraper>,
    urls: &[String],
    opts: &RunOptions,
) -> Result<ScrapeOutcomes, StageError> {
    if scraper.supports_batch() {
        return scraper
            .scrape(urls)
            .await
            .map_err(|e| StageError::from_adapter(StageName::Enrich, &e));
    }

    let semaphore = Arc::new(Semaphore::new(opts.max_scrape_concurrency.max(1)));
    let mut tasks: JoinSet<(String, Result<ScrapeOutcomes, String>)> = JoinSet::new();
    for url in urls {
        let url = url.clone();
        let scraper = Arc::clone(scraper);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let result = scraper
                .scrape(std::slice::from_ref(&url))
                .await
                .map_err(|e| e.to_string());
            (url, result)
        });
    }

    let mut outcomes = ScrapeOutcomes::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(mut map))) => outcomes.append(&mut map),
            Ok((url, Err(message))) => {
                outcomes.insert(url, Err(message));
            }
            Err(join_err) => {
                tracing::warn!(error = %join_err, "scrape task aborted");
            }
        }
    }
    Ok(outcomes)
}

/// Produce the candidate's profile, recording a rejection when the
/// scrape failed or never ran.
fn resolve_profile(
    candidate: &Candidate,
    scraped: &ScrapeOutcomes,
    rejections: &mut Vec<Rejection>,
    scrape_errored: bool,
) -> Option<Profile> {
    if let Some(profile) = &candidate.profile {
        return Some(profile.clone());
    }
    match scraped.get(&candidate.url) {
        Some(Ok(profile)) => Some(profile.clone()),
        Some(Err(message)) => {
            rejections.push(Rejection {
                url: candidate.url.clone(),
                reason: RejectReason::ScrapeFailed,
                evidence: message.clone(),
            });
            None
        }
        None => {
            let evidence = if scrape_errored {
                "scrape unavailable".to_string()
            } else {
                "no scrape result for url".to_string()
            };
            rejections.push(Rejection {
                url: candidate.url.clone(),
                reason: RejectReason::ScrapeFailed,
                evidence,
            });
            None
        }
    }
}

/// The deterministic filter chain. Returns the company match evidence
/// for survivors, the rejection for everyone else.
fn apply_filters(
    candidate: &Candidate,
    profile: &Profile,
    account: &AccountRef,
    names: &CompanyNameSet,
    opts: &RunOptions,
) -> Result<CompanyMatch, Rejection> {
    let reject = |reason, evidence: String| Rejection {
        url: candidate.url.clone(),
        reason,
        evidence,
    };

    // Employment-company filter.
    let employer = profile.employer.as_deref().unwrap_or_default();
    let company_match = match_company(employer, names).ok_or_else(|| {
        reject(
            RejectReason::WrongCompany,
            if employer.is_empty() {
                "no current employer on profile".to_string()
            } else {
                format!("current employer '{employer}' not in company name set")
            },
        )
    })?;

    // Location filter (optional).
    if opts.use_location_filter && !location_matches(profile, account) {
        let location = profile
            .location
            .as_deref()
            .or(profile.city.as_deref())
            .unwrap_or("<none>");
        return Err(reject(
            RejectReason::WrongLocation,
            format!("location '{location}' does not include the account city or state"),
        ));
    }

    // Connections filter.
    let connections = profile.connections.unwrap_or(0);
    if connections < opts.min_connections {
        return Err(reject(
            RejectReason::LowNetwork,
            format!(
                "{connections} connections, floor is {}",
                opts.min_connections
            ),
        ));
    }

    // Title-keyword filter.
    let title = profile
        .job_title
        .as_deref()
        .or(profile.headline.as_deref())
        .unwrap_or_default();
    if title.is_empty() || !titles::matches_positive(title, &opts.positive_title_keywords) {
        return Err(reject(
            RejectReason::NonTargetRole,
            format!("title '{title}' matches no target keyword"),
        ));
    }
    if titles::matches_negative(title, &opts.negative_title_keywords) {
        return Err(reject(
            RejectReason::NonTargetRole,
            format!("title '{title}' hits an excluded keyword"),
        ));
    }

    Ok(company_match)
}

/// Whether the profile's location mentions the account's city or state.
fn location_matches(profile: &Profile, account: &AccountRef) -> bool {
    let city = account.city.as_deref().map(str::to_lowercase);
    let state = account.state.as_deref().map(str::to_lowercase);
    if city.is_none() && state.is_none() {
        return true;
    }

    let location = [profile.location.as_deref(), profile.city.as_deref()]
        .iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if location.is_empty() {
        return false;
    }

    city.map_or(false, |c| location.contains(&c)) || state.map_or(false, |s| location.contains(&s))
}
