//! Company-name normalization.
//!
//! Downstream filters match name variants against self-reported employer
//! strings, so a small over-approximation of the name set raises recall;
//! the Stage 2 validator restores precision. The normalizer prefers a
//! generative expansion and falls back to deterministic rules when the
//! generative call is unavailable or fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::GenerativeText;
use crate::matching::{expand_saint, strip_legal_suffixes};
use crate::model::AccountRef;

/// Errors from company name set construction.
#[derive(Debug, thiserror::Error)]
pub enum NamesError {
    /// The name set would be empty.
    #[error("company name set must contain at least one name")]
    Empty,
    /// An entry was empty or whitespace-only.
    #[error("company name set entries must be non-empty")]
    EmptyEntry,
}

/// An ordered set of plausible employer-name strings for one account,
/// most likely first.
///
/// Invariants: at least one entry, no empty strings, case-insensitively
/// de-duplicated with first occurrence winning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CompanyNameSet(Vec<String>);

impl CompanyNameSet {
    /// Validate and build a name set, de-duplicating case-insensitively
    /// while preserving order.
    pub fn new(names: Vec<String>) -> Result<Self, NamesError> {
        let mut seen: Vec<String> = Vec::new();
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(NamesError::EmptyEntry);
            }
            let key = trimmed.to_lowercase();
            if !seen.contains(&key) {
                seen.push(key);
                out.push(trimmed.to_string());
            }
        }
        if out.is_empty() {
            return Err(NamesError::Empty);
        }
        Ok(Self(out))
    }

    /// Iterate the variants, most likely first.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Number of variants.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false by construction.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the set contains the given name, case-insensitively.
    pub fn contains(&self, name: &str) -> bool {
        let key = name.trim().to_lowercase();
        self.0.iter().any(|n| n.to_lowercase() == key)
    }
}

impl TryFrom<Vec<String>> for CompanyNameSet {
    type Error = NamesError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        CompanyNameSet::new(names)
    }
}

impl From<CompanyNameSet> for Vec<String> {
    fn from(set: CompanyNameSet) -> Self {
        set.0
    }
}

/// System prompt for the generative name expansion.
const NORMALIZE_SYSTEM_PROMPT: &str = "You are an expert at normalizing organization names \
for professional-profile searches. Generate the name variations employees actually use \
when listing their employer. Respond only with the requested JSON object.";

/// Expected shape of the generative response.
#[derive(Debug, Deserialize)]
struct VariationsResponse {
    #[serde(default)]
    variations: Vec<String>,
}

/// Produces a [`CompanyNameSet`] for an account.
///
/// When a generative provider is configured the variations come from one
/// JSON-mode completion; on any failure (or when no provider is set) the
/// deterministic fallback rules apply. Either way the account's original
/// name is guaranteed to be present.
pub struct NameNormalizer {
    provider: Option<Arc<dyn GenerativeText>>,
}

impl NameNormalizer {
    /// A normalizer that uses the generative provider with fallback.
    pub fn new(provider: Arc<dyn GenerativeText>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A normalizer that only applies the deterministic rules.
    pub fn deterministic() -> Self {
        Self { provider: None }
    }

    /// Build the name set for an account.
    ///
    /// Generative errors degrade to the fallback rules; the only failure
    /// left is an account whose name is blank.
    pub async fn normalize(&self, account: &AccountRef) -> Result<CompanyNameSet, NamesError> {
        if let Some(provider) = &self.provider {
            match self.generate_variations(provider.as_ref(), account).await {
                Ok(set) => return Ok(set),
                Err(reason) => {
                    tracing::warn!(
                        account = %account.name,
                        reason = %reason,
                        "generative name normalization failed, using fallback rules",
                    );
                }
            }
        }

        let variants = fallback_variants(
            &account.name,
            account.parent_name.as_deref(),
            account.city.as_deref(),
        );
        CompanyNameSet::new(variants)
    }

    async fn generate_variations(
        &self,
        provider: &dyn GenerativeText,
        account: &AccountRef,
    ) -> Result<CompanyNameSet, String> {
        let user = build_normalize_prompt(account);
        let value = provider
            .complete_json(NORMALIZE_SYSTEM_PROMPT, &user)
            .await
            .map_err(|e| e.to_string())?;

        let parsed: VariationsResponse =
            serde_json::from_value(value).map_err(|e| format!("unexpected shape: {e}"))?;

        let mut variations: Vec<String> = parsed
            .variations
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if variations.is_empty() {
            return Err("no variations returned".to_string());
        }

        if !variations
            .iter()
            .any(|v| v.to_lowercase() == account.name.trim().to_lowercase())
        {
            variations.push(account.name.clone());
        }

        CompanyNameSet::new(variations).map_err(|e| e.to_string())
    }
}

/// Build the user prompt describing the account.
fn build_normalize_prompt(account: &AccountRef) -> String {
    let mut context = vec![format!("Company: {}", account.name)];
    if let Some(parent) = &account.parent_name {
        context.push(format!("Parent organization: {parent}"));
    }
    match (&account.city, &account.state) {
        (Some(city), Some(state)) => context.push(format!("Location: {city}, {state}")),
        (None, Some(state)) => context.push(format!("State: {state}")),
        (Some(city), None) => context.push(format!("City: {city}")),
        (None, None) => {}
    }
    if let Some(industry) = &account.industry {
        context.push(format!("Industry: {industry}"));
    }

    format!(
        "Generate employer-name variations for professional-profile filtering.\n\n\
         {}\n\n\
         Include official names with and without legal suffixes, the parent \
         organization's names, common abbreviations (\"St.\" vs \"Saint\"), \
         location-qualified forms, and shortened informal forms. Drop legal \
         suffixes such as Inc, LLC and Corp; keep domain suffixes such as \
         Hospital, Medical Center and Health System.\n\n\
         Return ONLY a JSON object of the form \
         {{\"variations\": [\"most likely\", \"second\", ...]}} with 5-10 \
         variations ordered by likelihood.",
        context.join("\n")
    )
}

/// Deterministic name variants: the original; the suffix-stripped form;
/// the saint-expanded form; the first two tokens of the stripped form;
/// parent-organization forms; a city-qualified form.
pub fn fallback_variants(name: &str, parent: Option<&str>, city: Option<&str>) -> Vec<String> {
    let mut variants = vec![name.trim().to_string()];

    let stripped = strip_legal_suffixes(name);
    if !stripped.is_empty() {
        variants.push(stripped.clone());
    }

    if let Some(expanded) = expand_saint(name) {
        variants.push(expanded);
    }

    let tokens: Vec<&str> = stripped.split_whitespace().collect();
    if tokens.len() > 2 {
        variants.push(tokens[..2].join(" "));
    }

    if let Some(parent) = parent {
        variants.push(parent.trim().to_string());
        let parent_stripped = strip_legal_suffixes(parent);
        if !parent_stripped.is_empty() {
            variants.push(parent_stripped);
        }
    }

    if let (Some(city), Some(first)) = (city, tokens.first()) {
        variants.push(format!("{first} {city}"));
    }

    variants.retain(|v| !v.trim().is_empty());
    variants
}
