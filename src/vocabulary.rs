//! Controlled vocabulary of skill terms and the requirement parsers built on it.
//!
//! Skill extraction is deliberately not free-form: only known terms (and their
//! aliases) become skill tokens, so the same text always yields the same
//! tokens in the same order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Longest term accepted as an extra vocabulary entry.
pub const MAX_TERM_LEN: usize = 60;

const DEFAULT_TERMS: &[&str] = &[
    // languages
    "python", "javascript", "typescript", "java", "c++", "c#", "go", "rust", "php", "ruby",
    "swift", "kotlin", "scala", "matlab", "sql", "html", "css", "bash",
    // frameworks
    "react", "angular", "vue", "node.js", "express", "django", "flask", "fastapi", "spring",
    "laravel", "ruby on rails", "tensorflow", "pytorch", "scikit-learn", "pandas", "numpy",
    "matplotlib", "jupyter", "bootstrap", "tailwind", "sass", "react native", "flutter",
    // data stores
    "postgresql", "mysql", "mongodb", "redis", "sqlite", "oracle", "cassandra", "dynamodb",
    "elasticsearch",
    // cloud and ops
    "aws", "azure", "gcp", "docker", "kubernetes", "terraform", "ansible", "jenkins", "linux",
    "git", "ci/cd", "devops",
    // data and ml
    "machine learning", "deep learning", "data analysis", "statistics", "spark", "hadoop",
    "kafka", "airflow", "tableau", "power bi", "excel",
    // web and architecture
    "rest api", "graphql", "microservices", "api design", "oauth", "websocket",
    // mobile
    "ios", "android",
    // process
    "agile", "scrum", "kanban", "unit testing",
];

const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("golang", "go"),
    ("js", "javascript"),
    ("ts", "typescript"),
    ("nodejs", "node.js"),
    ("node", "node.js"),
    ("reactjs", "react"),
    ("react.js", "react"),
    ("vue.js", "vue"),
    ("vuejs", "vue"),
    ("postgres", "postgresql"),
    ("mongo", "mongodb"),
    ("k8s", "kubernetes"),
    ("amazon web services", "aws"),
    ("google cloud", "gcp"),
    ("sklearn", "scikit-learn"),
    ("ml", "machine learning"),
    ("apache spark", "spark"),
    ("restful api", "rest api"),
    ("rest apis", "rest api"),
    ("continuous integration", "ci/cd"),
    ("rails", "ruby on rails"),
    ("shell scripting", "bash"),
    ("powerbi", "power bi"),
];

struct Term {
    canonical: String,
    pattern: Regex,
}

/// Known skill terms with their aliases.
pub struct Vocabulary {
    terms: Vec<Term>,
    aliases: HashMap<String, String>,
}

impl Vocabulary {
    /// The built-in vocabulary plus `extra` terms.
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Result<Self> {
        let mut canonical: Vec<String> = DEFAULT_TERMS.iter().map(|t| t.to_string()).collect();
        for term in extra {
            let term = normalize(term.as_ref());
            if term.is_empty() || term.chars().count() > MAX_TERM_LEN {
                return Err(Error::Validation(format!(
                    "vocabulary term must be 1-{} characters: '{}'",
                    MAX_TERM_LEN,
                    term
                )));
            }
            if !canonical.contains(&term) {
                canonical.push(term);
            }
        }

        let aliases: HashMap<String, String> = DEFAULT_ALIASES
            .iter()
            .map(|(alias, canon)| (alias.to_string(), canon.to_string()))
            .collect();

        let mut terms = Vec::with_capacity(canonical.len() + aliases.len());
        for term in &canonical {
            terms.push(Term {
                canonical: term.clone(),
                pattern: term_pattern(term)?,
            });
        }
        for (alias, canon) in DEFAULT_ALIASES {
            terms.push(Term {
                canonical: canon.to_string(),
                pattern: term_pattern(alias)?,
            });
        }

        Ok(Self { terms, aliases })
    }

    /// Canonical token for a free-text skill. Unknown skills keep their
    /// normalized spelling.
    pub fn canonicalize(&self, skill: &str) -> String {
        let normalized = normalize(skill);
        if let Some(canon) = self.aliases.get(&normalized) {
            return canon.clone();
        }
        if let Some(singular) = normalized.strip_suffix('s') {
            if singular.chars().count() >= 3 && self.is_term(singular) {
                return singular.to_string();
            }
        }
        normalized
    }

    fn is_term(&self, token: &str) -> bool {
        self.terms.iter().any(|t| t.canonical == token)
    }

    /// Skill tokens mentioned in `text`, ordered by first occurrence.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let haystack = normalize(text);
        let mut found: Vec<(usize, &str)> = Vec::new();

        for term in &self.terms {
            let Some(caps) = term.pattern.captures(&haystack) else {
                continue;
            };
            let Some(m) = caps.get(1) else {
                continue;
            };
            let existing = found.iter().position(|(_, canon)| *canon == term.canonical);
            match existing {
                Some(i) => found[i].0 = found[i].0.min(m.start()),
                None => found.push((m.start(), &term.canonical)),
            }
        }

        // Longer terms win when they start at the same offset ("react native" over "react").
        found.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())));
        found.into_iter().map(|(_, canon)| canon.to_string()).collect()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        // Built-in terms are escaped literals; building them cannot fail.
        Self::with_extra::<&str>(&[]).unwrap_or_else(|e| unreachable!("built-in vocabulary: {e}"))
    }
}

/// Lowercase with runs of whitespace collapsed to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Matches `term` when not embedded in a longer word. Terms of three or more
/// letters ending in a letter also match with a trailing `s`.
fn term_pattern(term: &str) -> Result<Regex> {
    let plural = term.chars().count() >= 3 && term.ends_with(|c: char| c.is_ascii_alphabetic());
    let suffix = if plural { "s?" } else { "" };
    let pattern = format!(r"(?:^|[^a-z0-9+#])({}){}(?:[^a-z0-9+#]|$)", regex::escape(term), suffix);
    Regex::new(&pattern).map_err(|e| Error::Validation(format!("bad vocabulary term '{}': {}", term, e)))
}

/// Education levels in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EducationLevel {
    HighSchool = 1,
    Bachelors = 2,
    Masters = 3,
    Doctorate = 4,
}

impl EducationLevel {
    pub fn rank(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for EducationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EducationLevel::HighSchool => "high school",
            EducationLevel::Bachelors => "bachelor's",
            EducationLevel::Masters => "master's",
            EducationLevel::Doctorate => "doctoral",
        })
    }
}

fn education_patterns() -> &'static [(EducationLevel, Regex)] {
    static PATTERNS: OnceLock<Vec<(EducationLevel, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (EducationLevel::Doctorate, r"\b(phd|ph\.d|doctorate|doctoral)\b"),
            (EducationLevel::Masters, r"\b(master'?s?(?: degree| in| of)|masters|msc|m\.sc|mba|meng)\b"),
            (EducationLevel::Bachelors, r"\b(bachelor'?s?|bsc|b\.sc|beng|undergraduate|degree)\b"),
            (EducationLevel::HighSchool, r"\b(high school|secondary school|ged)\b"),
        ]
        .into_iter()
        .filter_map(|(level, re)| Regex::new(re).ok().map(|re| (level, re)))
        .collect()
    })
}

/// Job titles that contain a degree word without naming a degree.
const TITLE_PREFIXES: &[&str] = &["scrum ", "web "];

/// Highest education level mentioned in `text`.
pub fn parse_education_level(text: &str) -> Option<EducationLevel> {
    let haystack = normalize(text);
    education_patterns()
        .iter()
        .find(|(_, re)| {
            re.find_iter(&haystack).any(|m| {
                let before = &haystack[..m.start()];
                !TITLE_PREFIXES.iter().any(|prefix| before.ends_with(prefix))
            })
        })
        .map(|(level, _)| *level)
}

/// Highest level across a candidate's education entries.
pub fn highest_education<S: AsRef<str>>(entries: &[S]) -> Option<EducationLevel> {
    entries.iter().filter_map(|e| parse_education_level(e.as_ref())).max()
}

fn experience_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"(?P<floor>at least|minimum(?: of)?)?\s*\b(?P<years>\d{1,2})\s*",
            r"(?P<qualifier>\+|(?:-|–|to)\s*\d{1,2}\s*\+?)?\s*(?:years?|yrs?)\b(?P<plus>\+)?",
        ))
        .unwrap_or_else(|e| unreachable!("experience pattern: {e}"))
    })
}

/// Words on either side of a year count that make it a requirement.
const EXPERIENCE_CONTEXT_WORDS: usize = 4;

fn mentions_experience<'a>(mut words: impl Iterator<Item = &'a str>) -> bool {
    words.any(|w| w.starts_with("experience") || w == "exp")
}

/// Minimum years of experience stated in `text` ("3+ years", "2-4 years",
/// "at least 5 years", "5 years of experience"). A bare year count with no
/// qualifier and no mention of experience nearby is not a requirement. The
/// first requirement wins; ranges use their lower bound.
pub fn parse_min_experience(text: &str) -> Option<u32> {
    let haystack = normalize(text);
    experience_pattern().captures_iter(&haystack).find_map(|caps| {
        let whole = caps.get(0)?;
        let qualified = caps.name("floor").is_some() || caps.name("qualifier").is_some() || caps.name("plus").is_some();
        // Context stops at the sentence boundary.
        let after = haystack[whole.end()..].split(['.', ';']).next().unwrap_or("");
        let before = haystack[..whole.start()].rsplit(['.', ';']).next().unwrap_or("");
        let stated = qualified
            || mentions_experience(after.split_whitespace().take(EXPERIENCE_CONTEXT_WORDS))
            || mentions_experience(before.split_whitespace().rev().take(EXPERIENCE_CONTEXT_WORDS));
        if !stated {
            return None;
        }
        caps.name("years")?.as_str().parse().ok()
    })
}
