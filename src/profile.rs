//! Candidate details read out of resume text.

use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

use crate::error::Result;
use crate::models::{NewProfile, SkillList};
use crate::vocabulary::Vocabulary;

/// Contact details and skills found in a resume. Fields are None when the
/// text does not mention them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumeDetails {
    pub skills: Vec<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
}

struct ContactPatterns {
    email: Regex,
    phone: Regex,
    linkedin: Regex,
    github: Regex,
}

fn contact_patterns() -> &'static ContactPatterns {
    static PATTERNS: OnceLock<ContactPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let build = |pattern: &str| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|e| unreachable!("contact pattern {pattern}: {e}"))
        };
        ContactPatterns {
            email: build(r"\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b"),
            phone: build(r"(?:\+\d{1,3}[-.\s]?)?(?:\(\d{3}\)|\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b"),
            linkedin: build(r"linkedin\.com/in/[\w-]+"),
            github: build(r"github\.com/[\w-]+"),
        }
    })
}

/// Skills (vocabulary terms only) and the first email, phone number,
/// LinkedIn profile and GitHub profile in `text`.
pub fn from_resume_text(vocabulary: &Vocabulary, text: &str) -> ResumeDetails {
    let patterns = contact_patterns();

    // A phone number glued to other digits is part of something else.
    let phone = patterns
        .phone
        .find_iter(text)
        .find(|m| !text[..m.start()].ends_with(|c: char| c.is_ascii_digit()))
        .map(|m| m.as_str().trim().to_string());

    ResumeDetails {
        skills: vocabulary.extract(text),
        email: patterns.email.find(text).map(|m| m.as_str().to_string()),
        phone,
        linkedin_url: patterns.linkedin.find(text).map(|m| format!("https://{}", m.as_str())),
        github_url: patterns.github.find(text).map(|m| format!("https://{}", m.as_str())),
    }
}

impl ResumeDetails {
    /// Fills `profile` from the resume. Contact fields found in the resume
    /// replace the stored ones; resume skills not already listed are
    /// appended after the existing skills.
    pub fn apply_to(&self, vocabulary: &Vocabulary, profile: &mut NewProfile) -> Result<()> {
        let mut skills: Vec<String> = profile.skills.iter().cloned().collect();
        for skill in &self.skills {
            let known = skills.iter().any(|s| vocabulary.canonicalize(s) == *skill);
            if !known {
                skills.push(skill.clone());
            }
        }
        profile.skills = SkillList::new(skills)?;

        if let Some(email) = &self.email {
            profile.email = Some(email.clone());
        }
        if let Some(phone) = &self.phone {
            profile.phone = Some(phone.clone());
        }
        if let Some(url) = &self.linkedin_url {
            profile.linkedin_url = Some(url.clone());
        }
        if let Some(url) = &self.github_url {
            profile.github_url = Some(url.clone());
        }
        Ok(())
    }
}
