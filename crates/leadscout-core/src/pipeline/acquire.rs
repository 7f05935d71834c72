//! Stage 1: candidate acquisition.
//!
//! Two interchangeable strategies plus a combined form. The dataset
//! path filters the pre-indexed profile dataset and yields candidates
//! that already carry profiles; the search path issues site-restricted
//! queries and yields bare URLs for Stage 2 to scrape. Output is
//! deduplicated by canonical URL (dataset wins) and deterministically
//! ordered: dataset candidates first, then URL lexicographic order.
//! Empty output is a valid non-error result.

use std::collections::HashSet;
use std::time::Duration;

use crate::adapters::{DatasetFilter, FilterExpr, SnapshotStatus, WebSearch};
use crate::budget::CostLedger;
use crate::error::{AdapterError, ErrorKind, StageError, StageName};
use crate::model::{AccountRef, Candidate};
use crate::names::CompanyNameSet;

use super::{DiscoveryMode, RunOptions};

/// Stage 1 output.
#[derive(Debug, Clone, Default)]
pub struct AcquireOutput {
    /// Deduplicated candidates, dataset first then URL order.
    pub candidates: Vec<Candidate>,
    /// Dataset snapshot id, when the dataset path ran.
    pub snapshot_id: Option<String>,
}

/// Execute Stage 1 in the configured mode.
pub async fn execute(
    dataset: &dyn DatasetFilter,
    search: &dyn WebSearch,
    ledger: &CostLedger,
    account: &AccountRef,
    names: &CompanyNameSet,
    opts: &RunOptions,
) -> (AcquireOutput, Option<StageError>) {
    let (candidates, snapshot_id, error) = match opts.mode {
        DiscoveryMode::Dataset => {
            let (candidates, snapshot, error) =
                acquire_dataset(dataset, ledger, account, names, opts).await;
            (candidates, snapshot, error)
        }
        DiscoveryMode::Search => {
            let (candidates, error) = acquire_search(search, ledger, names, opts).await;
            (candidates, None, error)
        }
        DiscoveryMode::Combined => {
            let (dataset_result, search_result) = tokio::join!(
                acquire_dataset(dataset, ledger, account, names, opts),
                acquire_search(search, ledger, names, opts),
            );
            let (mut candidates, snapshot, dataset_err) = dataset_result;
            let (search_candidates, search_err) = search_result;
            candidates.extend(search_candidates);
            // Keep the first error; the union of whatever both paths
            // produced still feeds Stage 2.
            (candidates, snapshot, dataset_err.or(search_err))
        }
    };

    let candidates = dedupe_and_order(candidates);
    tracing::info!(
        account = %account.name,
        mode = ?opts.mode,
        candidates = candidates.len(),
        "candidate acquisition complete",
    );

    (
        AcquireOutput {
            candidates,
            snapshot_id,
        },
        error,
    )
}

/// Build the dataset filter expression for an account.
///
/// AND of: company-name OR-set, title OR-set, negated title keywords,
/// a connections floor, and (optionally) a city clause.
pub fn build_filter(
    names: &CompanyNameSet,
    account: &AccountRef,
    opts: &RunOptions,
) -> FilterExpr {
    let company = FilterExpr::or(
        names
            .iter()
            .map(|v| FilterExpr::includes("current_company_name", v))
            .collect(),
    );
    let title = FilterExpr::or(
        opts.target_titles
            .iter()
            .take(20)
            .map(|t| FilterExpr::includes("position", t))
            .collect(),
    );

    let mut clauses = vec![company, title];
    for keyword in &opts.negative_title_keywords {
        clauses.push(FilterExpr::not_includes("position", keyword));
    }
    clauses.push(FilterExpr::at_least(
        "connections",
        u64::from(opts.min_connections),
    ));

    if opts.use_location_filter {
        if let Some(city) = &account.city {
            clauses.push(FilterExpr::includes("city", city));
        }
    }

    FilterExpr::and(clauses)
}

/// The dataset path: submit, poll, check the cap, download.
async fn acquire_dataset(
    dataset: &dyn DatasetFilter,
    ledger: &CostLedger,
    account: &AccountRef,
    names: &CompanyNameSet,
    opts: &RunOptions,
) -> (Vec<Candidate>, Option<String>, Option<StageError>) {
    let filter = build_filter(names, account, opts);

    let snapshot_id = match dataset.submit(&filter).await {
        Ok(id) => id,
        Err(err) => {
            return (
                Vec::new(),
                None,
                Some(StageError::from_adapter(StageName::Acquire, &err)),
            );
        }
    };

    let result_count = match wait_for_snapshot(dataset, &snapshot_id, opts).await {
        Ok(count) => count,
        Err(err) => {
            return (
                Vec::new(),
                Some(snapshot_id),
                Some(StageError::from_adapter(StageName::Acquire, &err)),
            );
        }
    };

    if result_count > opts.dataset_result_cap {
        let err = AdapterError::Overflow {
            count: result_count,
            cap: opts.dataset_result_cap,
        };
        tracing::warn!(
            snapshot_id = %snapshot_id,
            result_count,
            cap = opts.dataset_result_cap,
            "refusing dataset download",
        );
        return (
            Vec::new(),
            Some(snapshot_id),
            Some(StageError::from_adapter(StageName::Acquire, &err)),
        );
    }

    let download_cost = result_count as f64 * opts.unit_costs.dataset_record;
    if let Err(refused) = ledger.try_charge("dataset_download", download_cost) {
        return (
            Vec::new(),
            Some(snapshot_id),
            Some(StageError::new(
                StageName::Acquire,
                ErrorKind::BudgetExhausted,
                refused.to_string(),
            )),
        );
    }

    match dataset.download(&snapshot_id).await {
        Ok(profiles) => {
            let candidates = profiles
                .into_iter()
                .map(|p| Candidate::from_dataset(&p.url, p.profile))
                .collect();
            (candidates, Some(snapshot_id), None)
        }
        Err(err) => (
            Vec::new(),
            Some(snapshot_id),
            Some(StageError::from_adapter(StageName::Acquire, &err)),
        ),
    }
}

/// Poll a snapshot until it is ready, returning the advertised result
/// count. Bounded by `dataset_poll_timeout_secs`.
async fn wait_for_snapshot(
    dataset: &dyn DatasetFilter,
    snapshot_id: &str,
    opts: &RunOptions,
) -> Result<u64, AdapterError> {
    let interval = Duration::from_millis(opts.dataset_poll_interval_ms);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(opts.dataset_poll_timeout_secs);

    loop {
        match dataset.poll(snapshot_id).await? {
            SnapshotStatus::Ready { result_count } => {
                tracing::debug!(snapshot_id, result_count, "snapshot ready");
                return Ok(result_count);
            }
            SnapshotStatus::Failed { reason } => {
                return Err(AdapterError::Transport {
                    message: format!("snapshot failed: {reason}"),
                });
            }
            SnapshotStatus::Scheduled | SnapshotStatus::Building => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(AdapterError::Timeout {
                        seconds: opts.dataset_poll_timeout_secs,
                    });
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// The search path: one site-restricted query per (variant, title)
/// pair, bounded by the query budget.
async fn acquire_search(
    search: &dyn WebSearch,
    ledger: &CostLedger,
    names: &CompanyNameSet,
    opts: &RunOptions,
) -> (Vec<Candidate>, Option<StageError>) {
    let queries = build_queries(names, opts);
    let host_prefix = format!("{}/", opts.profile_host.trim_end_matches('/'));

    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();
    let mut error = None;

    for query in queries {
        if let Err(refused) = ledger.try_charge("search_query", opts.unit_costs.search_query) {
            error = Some(StageError::new(
                StageName::Acquire,
                ErrorKind::BudgetExhausted,
                refused.to_string(),
            ));
            break;
        }

        match search.query(&query, opts.search_top_k).await {
            Ok(hits) => {
                for hit in hits {
                    let candidate =
                        Candidate::from_search(&hit.url, &hit.title, &hit.snippet, hit.rank);
                    if !candidate.url.contains(&host_prefix) {
                        continue;
                    }
                    if seen.insert(candidate.url.clone()) {
                        candidates.push(candidate);
                    }
                }
            }
            Err(err) => {
                error = Some(StageError::from_adapter(StageName::Acquire, &err));
                break;
            }
        }
    }

    (candidates, error)
}

/// The (variant, title) query cartesian product, truncated to the budget.
fn build_queries(names: &CompanyNameSet, opts: &RunOptions) -> Vec<String> {
    let mut queries = Vec::new();
    'outer: for variant in names.iter() {
        for title in &opts.target_titles {
            if queries.len() >= opts.search_query_budget {
                break 'outer;
            }
            queries.push(format!(
                "\"{variant}\" {title} site:{}",
                opts.profile_host
            ));
        }
    }
    queries
}

/// Dedupe by canonical URL with dataset preference, then order by
/// (source priority, URL).
fn dedupe_and_order(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    // Duplicates become adjacent with the dataset record first, so the
    // first kept per URL is the pre-enriched one.
    candidates.sort_by(|a, b| {
        a.url
            .cmp(&b.url)
            .then_with(|| a.source.priority().cmp(&b.source.priority()))
    });
    candidates.dedup_by(|a, b| a.url == b.url);
    candidates.sort_by(|a, b| {
        a.source
            .priority()
            .cmp(&b.source.priority())
            .then_with(|| a.url.cmp(&b.url))
    });
    candidates
}
