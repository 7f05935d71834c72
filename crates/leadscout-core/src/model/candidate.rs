//! Candidates discovered in Stage 1.

use serde::{Deserialize, Serialize};

use super::profile::Profile;

/// Where a candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Pre-indexed professional-profile dataset (record arrives enriched).
    Dataset,
    /// Web search for profile URLs (record must be scraped in Stage 2).
    Search,
}

impl CandidateSource {
    /// Ordering priority for deterministic Stage 1 output (dataset first).
    pub fn priority(self) -> u8 {
        match self {
            CandidateSource::Dataset => 0,
            CandidateSource::Search => 1,
        }
    }
}

/// A possible prospect discovered in Stage 1.
///
/// The canonical profile URL is the primary key within a run: two
/// candidates with equal URLs are the same person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Canonical profile URL (lowercased, no query string).
    pub url: String,
    /// Provenance of the discovery.
    pub source: CandidateSource,
    /// Profile data pre-filled from provenance (dataset records only).
    #[serde(default)]
    pub profile: Option<Profile>,
    /// Search result title, when discovered via web search.
    #[serde(default)]
    pub search_title: Option<String>,
    /// Search result snippet, when discovered via web search.
    #[serde(default)]
    pub search_snippet: Option<String>,
    /// Rank within the originating search query.
    #[serde(default)]
    pub search_rank: Option<u32>,
}

impl Candidate {
    /// A candidate from a dataset record, which arrives with its profile.
    pub fn from_dataset(url: &str, profile: Profile) -> Self {
        Self {
            url: canonical_profile_url(url),
            source: CandidateSource::Dataset,
            profile: Some(profile),
            search_title: None,
            search_snippet: None,
            search_rank: None,
        }
    }

    /// A candidate from a web-search hit; the profile is scraped later.
    pub fn from_search(url: &str, title: &str, snippet: &str, rank: u32) -> Self {
        Self {
            url: canonical_profile_url(url),
            source: CandidateSource::Search,
            profile: None,
            search_title: Some(title.to_string()),
            search_snippet: Some(snippet.to_string()),
            search_rank: Some(rank),
        }
    }

    /// Whether this candidate already carries full profile data.
    pub fn has_profile(&self) -> bool {
        self.profile.is_some()
    }
}

/// Canonicalize a profile URL for use as a within-run primary key.
///
/// Lowercases, forces the https scheme, drops `www.`, strips the query
/// string and fragment, and removes any trailing slash.
pub fn canonical_profile_url(raw: &str) -> String {
    let mut url = raw.trim().to_lowercase();

    if let Some(idx) = url.find('#') {
        url.truncate(idx);
    }
    if let Some(idx) = url.find('?') {
        url.truncate(idx);
    }

    if let Some(rest) = url.strip_prefix("http://") {
        url = format!("https://{rest}");
    }
    url = url.replace("://www.", "://");

    while url.ends_with('/') {
        url.pop();
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_strips_query_and_fragment() {
        assert_eq!(
            canonical_profile_url("https://linkedin.com/in/jane-doe?trk=search#top"),
            "https://linkedin.com/in/jane-doe"
        );
    }

    #[test]
    fn canonical_url_lowercases_and_drops_www() {
        assert_eq!(
            canonical_profile_url("HTTPS://WWW.LinkedIn.com/in/Jane-Doe/"),
            "https://linkedin.com/in/jane-doe"
        );
    }

    #[test]
    fn canonical_url_upgrades_scheme() {
        assert_eq!(
            canonical_profile_url("http://linkedin.com/in/jsmith"),
            "https://linkedin.com/in/jsmith"
        );
    }

    #[test]
    fn dataset_candidate_has_profile() {
        let candidate = Candidate::from_dataset(
            "https://linkedin.com/in/jane-doe",
            Profile::default(),
        );
        assert!(candidate.has_profile());
        assert_eq!(candidate.source, CandidateSource::Dataset);
    }

    #[test]
    fn search_candidate_lacks_profile() {
        let candidate = Candidate::from_search(
            "https://linkedin.com/in/jane-doe?trk=x",
            "Jane Doe - CFO",
            "Chief Financial Officer at General Hospital",
            1,
        );
        assert!(!candidate.has_profile());
        assert_eq!(candidate.url, "https://linkedin.com/in/jane-doe");
        assert_eq!(candidate.search_rank, Some(1));
    }

    #[test]
    fn source_priority_orders_dataset_first() {
        assert!(CandidateSource::Dataset.priority() < CandidateSource::Search.priority());
    }
}
