//! Employer-name matching against a company name set.
//!
//! Self-reported employer strings are noisy: legal suffixes appear and
//! disappear, "St." and "Saint" alternate, and sub-brands add trailing
//! words. Matching normalizes both sides and requires a whole-token
//! contiguous phrase overlap, so "Benefis Health System" matches the
//! variant "Benefis Health" but "Benefis Mobile Services" does not.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::names::CompanyNameSet;

/// How strongly an employer string matched the company name set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Normalized equality with a name-set element.
    Exact,
    /// Whole-token phrase containment (either direction), possibly via
    /// a saint-expanded form.
    Variant,
}

/// The outcome of a successful employer match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyMatch {
    /// Match strength, consumed by the ranking bonus.
    pub kind: MatchKind,
    /// The name-set element that matched (evidence for the log).
    pub matched_variant: String,
}

fn suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(incorporated|inc|l\.?l\.?c|corporation|corp|company|co|limited|ltd|group)\b\.?",
        )
        .expect("suffix regex compiles")
    })
}

/// Strip trailing legal-entity suffixes anywhere in the string.
pub fn strip_legal_suffixes(name: &str) -> String {
    let stripped = suffix_regex().replace_all(name, " ");
    collapse_whitespace(&stripped)
}

fn saint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bst\.?\s+").expect("saint regex compiles"))
}

/// Expand the "St." / "St " abbreviation to "Saint", when present.
pub fn expand_saint(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    if lower.starts_with("st.")
        || lower.starts_with("st ")
        || lower.contains(" st. ")
        || lower.contains(" st ")
    {
        let expanded = collapse_whitespace(&saint_regex().replace_all(name, "Saint "));
        if expanded.to_lowercase() != lower {
            return Some(expanded);
        }
    }
    None
}

/// Normalize an employer string for matching: lowercase, punctuation
/// collapsed to spaces, legal suffixes stripped.
pub fn normalize_company(name: &str) -> String {
    let lower: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    strip_legal_suffixes(&collapse_whitespace(&lower))
}

/// Match an employer string against the company name set.
///
/// Tries normalized equality first (exact), then contiguous whole-token
/// phrase containment in either direction (variant), including
/// saint-expanded forms of both sides.
pub fn match_company(employer: &str, names: &CompanyNameSet) -> Option<CompanyMatch> {
    let employer_norm = normalize_company(employer);
    if employer_norm.is_empty() {
        return None;
    }
    let employer_forms = with_saint_forms(&employer_norm, employer);

    for variant in names.iter() {
        let variant_norm = normalize_company(variant);
        if variant_norm.is_empty() {
            continue;
        }
        let variant_forms = with_saint_forms(&variant_norm, variant);

        for emp in &employer_forms {
            for var in &variant_forms {
                if emp == var {
                    return Some(CompanyMatch {
                        kind: MatchKind::Exact,
                        matched_variant: variant.clone(),
                    });
                }
            }
        }

        for emp in &employer_forms {
            let emp_tokens: Vec<&str> = emp.split(' ').collect();
            for var in &variant_forms {
                let var_tokens: Vec<&str> = var.split(' ').collect();
                if contains_phrase(&emp_tokens, &var_tokens)
                    || contains_phrase(&var_tokens, &emp_tokens)
                {
                    return Some(CompanyMatch {
                        kind: MatchKind::Variant,
                        matched_variant: variant.clone(),
                    });
                }
            }
        }
    }

    None
}

/// The normalized form plus its saint-expanded form, when one exists.
fn with_saint_forms(normalized: &str, original: &str) -> Vec<String> {
    let mut forms = vec![normalized.to_string()];
    if let Some(expanded) = expand_saint(original) {
        let expanded_norm = normalize_company(&expanded);
        if !forms.contains(&expanded_norm) {
            forms.push(expanded_norm);
        }
    }
    forms
}

/// Whether `needle` appears in `haystack` as a contiguous token run.
fn contains_phrase(haystack: &[&str], needle: &[&str]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_set(names: &[&str]) -> CompanyNameSet {
        CompanyNameSet::new(names.iter().map(|s| (*s).to_string()).collect()).unwrap()
    }

    #[test]
    fn strips_legal_suffixes() {
        assert_eq!(
            strip_legal_suffixes("Benefis Hospitals Inc"),
            "Benefis Hospitals"
        );
        assert_eq!(strip_legal_suffixes("Acme Corp."), "Acme");
        assert_eq!(strip_legal_suffixes("Acme Holding Co Ltd"), "Acme Holding");
    }

    #[test]
    fn normalize_collapses_punctuation() {
        assert_eq!(
            normalize_company("Benefis  Hospitals, Inc."),
            "benefis hospitals"
        );
    }

    #[test]
    fn expand_saint_handles_abbreviation() {
        assert_eq!(
            expand_saint("St. Vincent Healthcare").as_deref(),
            Some("Saint Vincent Healthcare")
        );
        assert!(expand_saint("Mount Sinai").is_none());
    }

    #[test]
    fn exact_match_on_normalized_equality() {
        let names = name_set(&["Benefis Hospitals Inc", "Benefis Health System"]);
        let m = match_company("Benefis Health System", &names).unwrap();
        assert_eq!(m.kind, MatchKind::Exact);
        assert_eq!(m.matched_variant, "Benefis Health System");
    }

    #[test]
    fn exact_match_ignores_legal_suffix() {
        let names = name_set(&["Benefis Hospitals"]);
        let m = match_company("Benefis Hospitals, Inc.", &names).unwrap();
        assert_eq!(m.kind, MatchKind::Exact);
    }

    #[test]
    fn variant_match_on_phrase_containment() {
        let names = name_set(&["Benefis Health"]);
        let m = match_company("Benefis Health System", &names).unwrap();
        assert_eq!(m.kind, MatchKind::Variant);
    }

    #[test]
    fn sub_brand_with_divergent_tail_does_not_match() {
        let names = name_set(&["Benefis Hospitals", "Benefis Health System"]);
        assert!(match_company("Benefis Mobile Services", &names).is_none());
    }

    #[test]
    fn saint_expansion_bridges_abbreviations() {
        let names = name_set(&["Saint Vincent Healthcare"]);
        let m = match_company("St. Vincent Healthcare", &names).unwrap();
        assert_eq!(m.kind, MatchKind::Exact);
    }

    #[test]
    fn unrelated_company_does_not_match() {
        let names = name_set(&["Benefis Hospitals"]);
        assert!(match_company("Mercy General", &names).is_none());
    }

    #[test]
    fn empty_employer_does_not_match() {
        let names = name_set(&["Benefis Hospitals"]);
        assert!(match_company("", &names).is_none());
    }

    #[test]
    fn contains_phrase_requires_contiguity() {
        assert!(contains_phrase(&["a", "b", "c"], &["b", "c"]));
        assert!(!contains_phrase(&["a", "b", "c"], &["a", "c"]));
        assert!(!contains_phrase(&["a"], &["a", "b"]));
    }
}
