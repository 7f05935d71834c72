//! Enriched professional-profile data.
//!
//! Every field is optional: both the dataset and the scraper return
//! partial records, and absence is never an error. Derived scores are
//! computed only from present fields.

use serde::{Deserialize, Serialize};

/// One position in a profile's work history, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    /// Job title held in this position.
    #[serde(default)]
    pub title: Option<String>,
    /// Employer name for this position.
    #[serde(default)]
    pub company: Option<String>,
    /// Location of this position.
    #[serde(default)]
    pub location: Option<String>,
    /// Start date, as reported (free-form, e.g. "Jan 2019").
    #[serde(default)]
    pub start_date: Option<String>,
    /// End date, as reported. `None` means the position is current.
    #[serde(default)]
    pub end_date: Option<String>,
}

/// One entry in a profile's education history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    /// Institution name.
    #[serde(default)]
    pub school: Option<String>,
    /// Degree obtained, as reported.
    #[serde(default)]
    pub degree: Option<String>,
    /// Field of study.
    #[serde(default)]
    pub field: Option<String>,
    /// End year, as reported.
    #[serde(default)]
    pub end_year: Option<String>,
}

/// Enriched profile data attached to a candidate after Stage 2.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Full display name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Profile headline.
    #[serde(default)]
    pub headline: Option<String>,
    /// Current job title.
    #[serde(default)]
    pub job_title: Option<String>,
    /// Current employer name, as self-reported.
    #[serde(default)]
    pub employer: Option<String>,
    /// Free-form location string.
    #[serde(default)]
    pub location: Option<String>,
    /// City component of the location, when the source separates it.
    #[serde(default)]
    pub city: Option<String>,
    /// Country component of the location.
    #[serde(default)]
    pub country: Option<String>,
    /// Connection count.
    #[serde(default)]
    pub connections: Option<u32>,
    /// Follower count.
    #[serde(default)]
    pub followers: Option<u32>,
    /// Free-form biography / about section.
    #[serde(default)]
    pub summary: Option<String>,
    /// Work history, most recent first.
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    /// Education history.
    #[serde(default)]
    pub education: Vec<EducationEntry>,
    /// Skill names.
    #[serde(default)]
    pub skills: Vec<String>,
}

/// Deterministic profile quality scores, each 0-100, computed from the
/// presence and magnitude of raw fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileScores {
    /// How complete the record is (field presence).
    pub completeness: u8,
    /// Seniority signal derived from the current title and network size.
    pub authority: u8,
    /// Audience signal derived from followers and connections.
    pub engagement: u8,
}

impl Profile {
    /// The most recent experience entry with no end date, if any.
    ///
    /// The current employer and title, when present, must be derivable
    /// from this entry.
    pub fn current_position(&self) -> Option<&ExperienceEntry> {
        self.experience
            .iter()
            .find(|e| e.end_date.is_none() && (e.title.is_some() || e.company.is_some()))
    }

    /// Fill `job_title` and `employer` from the current position when
    /// they are absent, keeping the derivation invariant intact.
    pub fn with_current_role_derived(mut self) -> Self {
        if let Some(entry) = self.current_position().cloned() {
            if self.job_title.is_none() {
                self.job_title = entry.title;
            }
            if self.employer.is_none() {
                self.employer = entry.company;
            }
        }
        self
    }

    /// Compute the derived quality scores for this profile.
    pub fn scores(&self) -> ProfileScores {
        ProfileScores {
            completeness: self.completeness_score(),
            authority: self.authority_score(),
            engagement: self.engagement_score(),
        }
    }

    /// Field-presence score: ten fields, ten points each.
    fn completeness_score(&self) -> u8 {
        let present = [
            self.full_name.is_some(),
            self.headline.is_some(),
            self.job_title.is_some(),
            self.employer.is_some(),
            self.location.is_some() || self.city.is_some(),
            self.summary.is_some(),
            self.connections.is_some(),
            !self.experience.is_empty(),
            !self.education.is_empty(),
            !self.skills.is_empty(),
        ]
        .iter()
        .filter(|p| **p)
        .count();
        (present * 10) as u8
    }

    /// Seniority score from title keywords plus a small network factor.
    fn authority_score(&self) -> u8 {
        let title = self
            .job_title
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        let base: u32 = if title.contains("chief") || title.contains("president") {
            80
        } else if title.contains("vp") || title.contains("vice president") {
            70
        } else if title.contains("director") {
            60
        } else if title.contains("manager") {
            45
        } else if title.is_empty() {
            0
        } else {
            25
        };

        let network = (self.connections.unwrap_or(0) / 100).min(20);
        (base + network).min(100) as u8
    }

    /// Audience score from follower and connection magnitudes.
    fn engagement_score(&self) -> u8 {
        let followers = self.followers.unwrap_or(0) / 50;
        let connections = self.connections.unwrap_or(0) / 25;
        (followers + connections).min(100) as u8
    }
}
