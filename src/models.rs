use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Closed enumerations stored as lowercase TEXT. Parsing accepts the
/// canonical name plus the listed aliases, ignoring case, `_` and spaces.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal {
        $($variant:ident => $canon:literal $(| $alias:literal)*),+ $(,)?
    }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $canon),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
                match normalized.as_str() {
                    $($canon $(| $alias)* => Ok($name::$variant),)+
                    _ => Err(Error::Validation(format!(
                        "unknown {} '{}' (expected one of: {})",
                        $label,
                        s,
                        $name::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.as_str().to_string()
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: Error| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(
    /// Lifecycle state of a tracked application. Transitions live in `tracker`.
    ApplicationStatus, "status" {
        Found => "found",
        Applied => "applied",
        Interview => "interview" | "interviewing",
        Rejected => "rejected",
        Hired => "hired",
        Withdrawn => "withdrawn",
    }
);

text_enum!(JobType, "job type" {
    FullTime => "full-time" | "fulltime",
    PartTime => "part-time" | "parttime",
    Contract => "contract" | "temporary",
    Internship => "internship" | "intern" | "co-op" | "coop",
});

text_enum!(ResumeFileType, "resume file type" {
    Pdf => "pdf",
    Docx => "docx" | "doc",
    PlainText => "plain-text" | "txt" | "text" | "md" | "markdown",
});

impl ResumeFileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.parse().ok()
    }
}

/// Longest item accepted in a `SkillList`.
pub const MAX_TAG_LEN: usize = 100;

/// Ordered sequence of short free-text tags (skills, education lines,
/// matching/missing skills, recommendations).
///
/// Stored as a JSON array in a TEXT column and validated at the storage
/// boundary in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SkillList(Vec<String>);

impl SkillList {
    pub fn new<I, S>(items: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = items.into_iter().map(|s| s.into().trim().to_string()).collect();
        for item in &items {
            validate_tag(item)?;
        }
        Ok(Self(items))
    }

    /// For items produced by the scorer from already-validated vocabulary.
    pub(crate) fn from_valid(items: Vec<String>) -> Self {
        debug_assert!(items.iter().all(|i| validate_tag(i).is_ok()), "{:?}", items);
        Self(items)
    }

    /// Parses a comma-separated list, dropping empty entries.
    pub fn from_csv(input: &str) -> Result<Self, Error> {
        Self::new(input.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn validate_tag(item: &str) -> Result<(), Error> {
    if item.is_empty() {
        return Err(Error::validation("list items must not be empty"));
    }
    if item.chars().count() > MAX_TAG_LEN {
        return Err(Error::Validation(format!(
            "list item longer than {} characters: '{}...'",
            MAX_TAG_LEN,
            item.chars().take(20).collect::<String>()
        )));
    }
    if item.chars().any(|c| c.is_control()) {
        return Err(Error::Validation(format!("list item contains control characters: {:?}", item)));
    }
    Ok(())
}

impl TryFrom<Vec<String>> for SkillList {
    type Error = Error;

    fn try_from(items: Vec<String>) -> Result<Self, Self::Error> {
        SkillList::new(items)
    }
}

impl From<SkillList> for Vec<String> {
    fn from(list: SkillList) -> Vec<String> {
        list.0
    }
}

impl<'a> IntoIterator for &'a SkillList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for SkillList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

impl ToSql for SkillList {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let encoded =
            serde_json::to_string(&self.0).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(encoded))
    }
}

impl FromSql for SkillList {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let items: Vec<String> = serde_json::from_str(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))?;
        SkillList::new(items).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A scraped posting as handed to `insert_job`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewJobPosting {
    pub title: String,
    pub company: String,
    pub url: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub salary_range: Option<String>,
    #[serde(default)]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub posted_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: i64,
    pub title: String,
    pub company: String,
    pub url: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub salary_range: Option<String>,
    pub job_type: Option<JobType>,
    pub source: Option<String>,
    pub posted_date: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl JobPosting {
    /// Requirements followed by description, the text the scorer reads.
    pub fn requirement_text(&self) -> String {
        [self.requirements.as_deref(), self.description.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub job_id: i64,
    pub compatibility_score: Option<f64>,
    pub status: ApplicationStatus,
    pub date_found: DateTime<Utc>,
    pub date_applied: Option<DateTime<Utc>>,
}

/// One persisted status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: i64,
    pub application_id: i64,
    pub from_status: Option<ApplicationStatus>,
    pub to_status: ApplicationStatus,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub skills: SkillList,
    pub experience_years: u32,
    pub education: SkillList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub skills: SkillList,
    pub experience_years: u32,
    pub education: SkillList,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CandidateProfile> for NewProfile {
    fn from(profile: &CandidateProfile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            linkedin_url: profile.linkedin_url.clone(),
            github_url: profile.github_url.clone(),
            skills: profile.skills.clone(),
            experience_years: profile.experience_years,
            education: profile.education.clone(),
        }
    }
}

/// Result of one compatibility scoring run. Scores are in [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAnalysis {
    pub skill_match_score: f64,
    pub experience_match_score: f64,
    pub education_match_score: f64,
    pub overall_score: f64,
    pub matching_skills: SkillList,
    pub missing_skills: SkillList,
    pub recommendations: SkillList,
}

/// A stored `JobAnalysis`. Rows are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub application_id: i64,
    pub analysis: JobAnalysis,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResume {
    pub content: String,
    pub cover_letter: Option<String>,
    pub file_type: ResumeFileType,
    pub source_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resume {
    pub id: i64,
    pub application_id: Option<i64>,
    pub is_base: bool,
    pub content: String,
    pub cover_letter: Option<String>,
    pub file_type: ResumeFileType,
    pub source_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("Applied".parse::<ApplicationStatus>().unwrap(), ApplicationStatus::Applied);
        assert_eq!(" interviewing ".parse::<ApplicationStatus>().unwrap(), ApplicationStatus::Interview);
    }

    #[test]
    fn test_unknown_status_is_validation_error() {
        let err = "ghosted".parse::<ApplicationStatus>().unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("ghosted"));
    }

    #[test]
    fn test_job_type_aliases() {
        assert_eq!("fulltime".parse::<JobType>().unwrap(), JobType::FullTime);
        assert_eq!("Full Time".parse::<JobType>().unwrap(), JobType::FullTime);
        assert_eq!("part_time".parse::<JobType>().unwrap(), JobType::PartTime);
        assert_eq!("Co-op".parse::<JobType>().unwrap(), JobType::Internship);
        assert!("freelance".parse::<JobType>().is_err());
    }

    #[test]
    fn test_resume_file_type_from_extension() {
        assert_eq!(ResumeFileType::from_extension("PDF"), Some(ResumeFileType::Pdf));
        assert_eq!(ResumeFileType::from_extension("txt"), Some(ResumeFileType::PlainText));
        assert_eq!(ResumeFileType::from_extension("odt"), None);
    }

    #[test]
    fn test_skill_list_rejects_bad_items() {
        assert!(SkillList::new(["rust", "  "]).is_err());
        assert!(SkillList::new(["multi\nline"]).is_err());
        assert!(SkillList::new(["x".repeat(MAX_TAG_LEN + 1)]).is_err());
    }

    #[test]
    fn test_skill_list_json_keeps_order_and_punctuation() {
        let list = SkillList::new(["Python", "C++", "a, b", "\"quoted\""]).unwrap();
        let json = serde_json::to_string(&list).unwrap();
        let back: SkillList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
        assert_eq!(back.as_slice()[2], "a, b");
    }

    #[test]
    fn test_skill_list_from_csv() {
        let list = SkillList::from_csv("python, sql,, docker ").unwrap();
        assert_eq!(list.as_slice(), ["python", "sql", "docker"]);
    }

    #[test]
    fn test_requirement_text_joins_non_empty_fields() {
        let job = JobPosting {
            id: 1,
            title: "Dev".into(),
            company: "Acme".into(),
            url: "https://acme.test/1".into(),
            location: None,
            description: Some("Build things".into()),
            requirements: Some("  ".into()),
            salary_range: None,
            job_type: None,
            source: None,
            posted_date: None,
            discovered_at: Utc::now(),
        };
        assert_eq!(job.requirement_text(), "Build things");
    }
}
