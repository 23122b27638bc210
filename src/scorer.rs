//! Compatibility scoring between a candidate and a job's requirement text.
//!
//! Deterministic and explainable: skill tokens come from the controlled
//! `Vocabulary`, experience and education minimums from fixed patterns, and
//! recommendations from the missing skills.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::models::{CandidateProfile, JobAnalysis, JobPosting, SkillList};
use crate::vocabulary::{self, EducationLevel, Vocabulary};

/// Recommendation used when the requirement text is empty.
pub const INSUFFICIENT_DATA: &str = "Insufficient job data: add a description or requirements, then re-run analysis";

/// Sub-score weights for `overall_score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub skill: f64,
    pub experience: f64,
    pub education: f64,
}

impl ScoringWeights {
    /// Checks the weights and rescales them to sum to 1.
    pub fn normalized(self) -> Result<Self> {
        let parts = [self.skill, self.experience, self.education];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Validation(format!(
                "weights must be finite and non-negative: {:?}",
                self
            )));
        }
        let sum: f64 = parts.iter().sum();
        if sum <= 0.0 {
            return Err(Error::validation("weights must not all be zero"));
        }
        Ok(Self {
            skill: self.skill / sum,
            experience: self.experience / sum,
            education: self.education / sum,
        })
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        WeightPreset::Balanced.weights()
    }
}

/// Named weight sets accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightPreset {
    Balanced,
    SkillsFirst,
    ExperienceHeavy,
}

impl WeightPreset {
    pub fn weights(self) -> ScoringWeights {
        let (skill, experience, education) = match self {
            WeightPreset::Balanced => (0.6, 0.25, 0.15),
            WeightPreset::SkillsFirst => (0.8, 0.1, 0.1),
            WeightPreset::ExperienceHeavy => (0.5, 0.3, 0.2),
        };
        ScoringWeights {
            skill,
            experience,
            education,
        }
    }
}

/// What the scorer knows about the candidate.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub skills: Vec<String>,
    pub experience_years: u32,
    pub education: Vec<String>,
}

impl Candidate {
    pub fn with_skills<I, S>(skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            skills: skills.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

impl From<&CandidateProfile> for Candidate {
    fn from(profile: &CandidateProfile) -> Self {
        Self {
            skills: profile.skills.as_slice().to_vec(),
            experience_years: profile.experience_years,
            education: profile.education.as_slice().to_vec(),
        }
    }
}

pub struct CompatibilityScorer {
    vocabulary: Vocabulary,
    weights: ScoringWeights,
    recommendation_limit: usize,
}

impl CompatibilityScorer {
    pub fn new(vocabulary: Vocabulary, weights: ScoringWeights, recommendation_limit: usize) -> Result<Self> {
        Ok(Self {
            vocabulary,
            weights: weights.normalized()?,
            recommendation_limit,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Skill-only scoring: no experience and no education on the candidate side.
    pub fn score_skills<S: AsRef<str>>(&self, candidate_skills: &[S], requirements: &str) -> JobAnalysis {
        let candidate = Candidate::with_skills(candidate_skills.iter().map(|s| s.as_ref().to_string()));
        self.score(&candidate, requirements)
    }

    pub fn score(&self, candidate: &Candidate, requirements: &str) -> JobAnalysis {
        if requirements.trim().is_empty() {
            return JobAnalysis {
                skill_match_score: 100.0,
                experience_match_score: 100.0,
                education_match_score: 100.0,
                overall_score: 100.0,
                matching_skills: SkillList::default(),
                missing_skills: SkillList::default(),
                recommendations: SkillList::from_valid(vec![INSUFFICIENT_DATA.to_string()]),
            };
        }

        let job_tokens = self.vocabulary.extract(requirements);
        let candidate_tokens: HashSet<String> = candidate
            .skills
            .iter()
            .map(|s| self.vocabulary.canonicalize(s))
            .filter(|s| !s.is_empty())
            .collect();

        let (matching, missing): (Vec<String>, Vec<String>) =
            job_tokens.iter().cloned().partition(|t| candidate_tokens.contains(t));

        let skill_match_score = if job_tokens.is_empty() {
            100.0
        } else {
            match_ratio(matching.len(), job_tokens.len())
        };

        let required_years = vocabulary::parse_min_experience(requirements);
        let experience_match_score = match required_years {
            Some(req) if req > 0 => match_ratio(candidate.experience_years.min(req) as usize, req as usize),
            _ => 100.0,
        };

        let required_level = vocabulary::parse_education_level(requirements);
        let candidate_level = vocabulary::highest_education(&candidate.education);
        let education_match_score = match required_level {
            Some(req) => {
                let have = candidate_level.map_or(0, EducationLevel::rank).min(req.rank());
                match_ratio(have as usize, req.rank() as usize)
            }
            None => 100.0,
        };

        let overall_score = round2(
            self.weights.skill * skill_match_score
                + self.weights.experience * experience_match_score
                + self.weights.education * education_match_score,
        )
        .clamp(0.0, 100.0);

        let recommendations = self.recommendations(
            job_tokens.is_empty(),
            &missing,
            required_years.map(|req| (req, candidate.experience_years)),
            required_level.map(|req| (req, candidate_level)),
        );

        JobAnalysis {
            skill_match_score,
            experience_match_score,
            education_match_score,
            overall_score,
            matching_skills: SkillList::from_valid(matching),
            missing_skills: SkillList::from_valid(missing),
            recommendations: SkillList::from_valid(recommendations),
        }
    }

    fn recommendations(
        &self,
        no_skill_tokens: bool,
        missing: &[String],
        experience: Option<(u32, u32)>,
        education: Option<(EducationLevel, Option<EducationLevel>)>,
    ) -> Vec<String> {
        let mut items = Vec::new();
        if no_skill_tokens {
            items.push("No recognized skill requirements in posting".to_string());
        }
        items.extend(missing.iter().map(|skill| format!("Acquire {}", skill)));

        if let Some((req, have)) = experience {
            if have < req {
                let gap = req - have;
                items.push(format!(
                    "Gain {} more year{} of experience (posting asks for {}+)",
                    gap,
                    if gap == 1 { "" } else { "s" },
                    req
                ));
            }
        }
        if let Some((req, have)) = education {
            if have.is_none_or(|h| h < req) {
                items.push(format!("Posting expects a {} degree or equivalent", req));
            }
        }

        if items.is_empty() {
            items.push("Strong match: consider applying".to_string());
        }
        items.truncate(self.recommendation_limit);
        items
    }
}

impl Default for CompatibilityScorer {
    fn default() -> Self {
        Self {
            vocabulary: Vocabulary::default(),
            weights: ScoringWeights::default(),
            recommendation_limit: 5,
        }
    }
}

/// `matched / max(1, total) * 100`, rounded to two decimals.
pub fn match_ratio(matched: usize, total: usize) -> f64 {
    round2(matched as f64 / total.max(1) as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Coarse relevance of `text` to a keyword set: the share of keywords found
/// as case-insensitive substrings.
pub fn keyword_relevance<S: AsRef<str>>(keywords: &[S], text: &str) -> f64 {
    let haystack = vocabulary::normalize(text);
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| vocabulary::normalize(k.as_ref()))
        .filter(|k| !k.is_empty())
        .collect();
    let matched = keywords.iter().filter(|k| haystack.contains(k.as_str())).count();
    match_ratio(matched, keywords.len())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketTrends {
    pub jobs_analyzed: usize,
    pub most_demanded_skills: Vec<(String, usize)>,
    pub top_hiring_companies: Vec<(String, usize)>,
}

/// Skill demand and hiring companies across `jobs`, ten of each at most.
pub fn market_trends(vocabulary: &Vocabulary, jobs: &[JobPosting]) -> MarketTrends {
    let mut skills: HashMap<String, usize> = HashMap::new();
    let mut companies: HashMap<String, usize> = HashMap::new();

    for job in jobs {
        for token in vocabulary.extract(&job.requirement_text()) {
            *skills.entry(token).or_default() += 1;
        }
        let company = job.company.trim();
        if !company.is_empty() {
            *companies.entry(company.to_string()).or_default() += 1;
        }
    }

    MarketTrends {
        jobs_analyzed: jobs.len(),
        most_demanded_skills: top_counts(skills, 10),
        top_hiring_companies: top_counts(companies, 10),
    }
}

fn top_counts(counts: HashMap<String, usize>, limit: usize) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}
