//! Job-title sets and keyword matching for the decision-maker rubric.
//!
//! Negative keywords are matched at token level: a multi-word keyword
//! must appear as a contiguous token run, and a single-word keyword must
//! match a whole token. A COO whose summary mentions "care" is therefore
//! never rejected by the "care" keyword, while "Care Coordinator" is.

/// The default decision-maker titles, ordered by seniority. The dataset
/// filter accepts at most 20 title clauses, and this list fills them.
pub fn default_target_titles() -> Vec<String> {
    [
        "Chief Financial Officer",
        "CFO",
        "VP Facilities",
        "VP Operations",
        "Director of Facilities",
        "Facilities Director",
        "Director of Engineering",
        "Engineering Director",
        "Director of Maintenance",
        "Maintenance Director",
        "Director of Operations",
        "Facilities Manager",
        "Maintenance Manager",
        "Engineering Manager",
        "Energy Manager",
        "Plant Manager",
        "Plant Operations",
        "Sustainability Manager",
        "Finance Manager",
        "Financial Manager",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Default negative title keywords: clinical and training roles.
pub fn default_negative_title_keywords() -> Vec<String> {
    [
        "intern",
        "student",
        "nurse",
        "nursing",
        "clinical",
        "care",
        "patient care",
        "medical assistant",
        "physician",
        "therapist",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Default weak positive title keywords: a title must contain at least
/// one of these tokens to count as a target role.
pub fn default_positive_title_keywords() -> Vec<String> {
    [
        "facilities",
        "facility",
        "engineering",
        "maintenance",
        "operations",
        "finance",
        "financial",
        "energy",
        "plant",
        "sustainability",
        "cfo",
        "coo",
        "chief",
        "president",
        "vp",
        "director",
        "manager",
        "administrator",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Whether a title hits any negative keyword, token-level.
pub fn matches_negative(title: &str, negatives: &[String]) -> bool {
    let tokens = tokenize(title);
    negatives.iter().any(|kw| contains_keyword(&tokens, kw))
}

/// Whether a title contains at least one positive keyword, token-level.
pub fn matches_positive(title: &str, positives: &[String]) -> bool {
    let tokens = tokenize(title);
    positives.iter().any(|kw| contains_keyword(&tokens, kw))
}

/// Lowercased alphanumeric tokens of a title.
fn tokenize(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether the keyword's token sequence appears contiguously in `tokens`.
fn contains_keyword(tokens: &[String], keyword: &str) -> bool {
    let kw_tokens: Vec<String> = keyword
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if kw_tokens.is_empty() || kw_tokens.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(kw_tokens.len())
        .any(|w| w == kw_tokens.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_titles_stay_within_filter_limit() {
        assert!(default_target_titles().len() <= 20);
    }

    #[test]
    fn negative_rejects_clinical_roles() {
        let negatives = default_negative_title_keywords();
        assert!(matches_negative("Registered Nurse", &negatives));
        assert!(matches_negative("Care Coordinator", &negatives));
        assert!(matches_negative("Patient Care Technician", &negatives));
        assert!(matches_negative("Summer Intern - Facilities", &negatives));
    }

    #[test]
    fn negative_is_token_level_not_substring() {
        let negatives = default_negative_title_keywords();
        // "COO" contains the letters of no keyword as a whole token.
        assert!(!matches_negative("COO", &negatives));
        // "Career Services Director" must not trip the "care" keyword.
        assert!(!matches_negative("Career Services Director", &negatives));
        // "Internal Audit Manager" must not trip the "intern" keyword.
        assert!(!matches_negative("Internal Audit Manager", &negatives));
    }

    #[test]
    fn multi_word_negative_requires_contiguous_tokens() {
        let negatives = vec!["medical assistant".to_string()];
        assert!(matches_negative("Senior Medical Assistant", &negatives));
        assert!(!matches_negative("Medical Office Assistant", &negatives));
    }

    #[test]
    fn positive_accepts_target_roles() {
        let positives = default_positive_title_keywords();
        assert!(matches_positive("Director of Facilities", &positives));
        assert!(matches_positive("CFO", &positives));
        assert!(matches_positive("VP, Plant Operations", &positives));
    }

    #[test]
    fn positive_rejects_unrelated_roles() {
        let positives = default_positive_title_keywords();
        assert!(!matches_positive("Software Developer", &positives));
        assert!(!matches_positive("", &positives));
    }
}
