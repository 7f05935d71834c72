//! Enriched and qualified prospect records (Stage 2 and Stage 3 output).

use serde::{Deserialize, Serialize};

use crate::matching::CompanyMatch;

use super::candidate::CandidateSource;
use super::profile::Profile;

/// A candidate that survived Stage 2 with an attached profile.
///
/// Preserves Stage 1 ordering; `company_match` carries the
/// employment-confidence evidence consumed by the Stage 3 bonus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCandidate {
    /// Canonical profile URL (within-run primary key).
    pub url: String,
    /// Provenance of the original candidate.
    pub source: CandidateSource,
    /// The enriched profile.
    pub profile: Profile,
    /// How the profile's employer matched the company name set.
    pub company_match: CompanyMatch,
}

/// Buyer persona assigned by the ranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaTag {
    /// Facilities / engineering / maintenance leadership.
    FacilitiesDecisionMaker,
    /// CFO or finance leadership with budget authority.
    FinanceDecisionMaker,
    /// COO or operations leadership.
    OperationsDecisionMaker,
    /// Energy or sustainability program lead.
    EnergySustainabilityLead,
    /// Relevant but outside the named personas.
    Other,
}

impl PersonaTag {
    /// Parse a ranker-supplied tag string leniently; unknown tags
    /// collapse to [`PersonaTag::Other`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "facilities_decision_maker" | "facilities" => PersonaTag::FacilitiesDecisionMaker,
            "finance_decision_maker" | "finance" => PersonaTag::FinanceDecisionMaker,
            "operations_decision_maker" | "operations" => PersonaTag::OperationsDecisionMaker,
            "energy_sustainability_lead" | "energy/sustainability_lead" | "energy" => {
                PersonaTag::EnergySustainabilityLead
            }
            _ => PersonaTag::Other,
        }
    }
}

/// A prospect that passed validation, enrichment, and ranking.
///
/// The ranking score is set iff the ranker ran successfully; prospects
/// never reach this type otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifiedProspect {
    /// Canonical profile URL.
    pub url: String,
    /// Provenance of the original candidate.
    pub source: CandidateSource,
    /// The enriched profile.
    pub profile: Profile,
    /// Ranking score, 0-100, after the employment-match bonus.
    pub score: u8,
    /// Short ranking rationale from the ranker.
    pub rationale: String,
    /// Assigned buyer persona.
    pub persona: PersonaTag,
    /// Employment-match evidence carried from Stage 2.
    pub company_match: CompanyMatch,
}
