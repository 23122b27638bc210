//! Deterministic resume and cover-letter drafts for one application.
//!
//! The draft is a pure text transform of the base resume: a header naming
//! the role, skills lines reordered so the job's matching skills lead, and
//! matching skills emphasized in the body. Polishing by a `TextGenerator`
//! happens afterwards, in the pipeline.

use chrono::{DateTime, Utc};
use regex::RegexBuilder;

use crate::models::{JobAnalysis, JobPosting};
use crate::vocabulary::Vocabulary;

const COVER_LETTER_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct TailoredDraft {
    pub content: String,
    pub cover_letter: String,
}

pub fn draft(
    vocabulary: &Vocabulary,
    base_content: &str,
    job: &JobPosting,
    analysis: &JobAnalysis,
    candidate_name: Option<&str>,
    now: DateTime<Utc>,
) -> TailoredDraft {
    let matching = analysis.matching_skills.as_slice();
    TailoredDraft {
        content: draft_resume(vocabulary, base_content, job, analysis, now),
        cover_letter: cover_letter(job, matching, candidate_name),
    }
}

pub fn draft_resume(
    vocabulary: &Vocabulary,
    base_content: &str,
    job: &JobPosting,
    analysis: &JobAnalysis,
    now: DateTime<Utc>,
) -> String {
    let matching = analysis.matching_skills.as_slice();
    let mut tailored = String::new();

    tailored.push_str(&format!("# Resume - Tailored for: {}\n\n", job.title));
    tailored.push_str(&format!("**Position**: {} at {}\n", job.title, job.company));
    if !matching.is_empty() {
        tailored.push_str(&format!("**Key skills for this role**: {}\n", matching.join(", ")));
    }
    if let Some(location) = job.location.as_deref().filter(|l| !l.trim().is_empty()) {
        tailored.push_str(&format!("**Location**: {}\n", location));
    }
    tailored.push_str("\n---\n\n");

    for line in base_content.trim_end().lines() {
        let line = if is_skills_line(line) {
            reorder_skills_line(vocabulary, line, matching)
        } else {
            line.to_string()
        };
        if line.trim_start().starts_with('#') {
            tailored.push_str(&line);
        } else {
            tailored.push_str(&emphasize(&line, matching));
        }
        tailored.push('\n');
    }

    tailored.push_str("\n---\n");
    tailored.push_str(&format!("*Generated: {}*\n", now.format("%Y-%m-%d %H:%M:%S UTC")));
    tailored
}

/// A line such as `Skills: Rust, SQL` or `- Technical skills: ...`.
fn is_skills_line(line: &str) -> bool {
    line.split_once(':')
        .map(|(label, items)| label.to_lowercase().contains("skill") && items.contains(','))
        .unwrap_or(false)
}

/// Moves items that match the job to the front, in the job's order, keeping
/// the rest in their original order.
fn reorder_skills_line(vocabulary: &Vocabulary, line: &str, matching: &[String]) -> String {
    let Some((label, items)) = line.split_once(':') else {
        return line.to_string();
    };
    let items: Vec<&str> = items.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();

    let rank = |item: &str| {
        let canon = vocabulary.canonicalize(item);
        matching.iter().position(|m| *m == canon)
    };
    let mut leading: Vec<(usize, &str)> = items.iter().filter_map(|i| rank(*i).map(|r| (r, *i))).collect();
    leading.sort_by_key(|(r, _)| *r);
    let rest = items.iter().filter(|i| rank(**i).is_none()).copied();

    let ordered: Vec<&str> = leading.into_iter().map(|(_, i)| i).chain(rest).collect();
    format!("{}: {}", label, ordered.join(", "))
}

/// Wraps whole-word, case-insensitive occurrences of each skill in `**`.
/// Already emphasized text is left alone.
fn emphasize(line: &str, skills: &[String]) -> String {
    let mut out = line.to_string();
    for skill in skills {
        let Ok(pattern) = RegexBuilder::new(&regex::escape(skill)).case_insensitive(true).build() else {
            continue;
        };
        let mut result = String::with_capacity(out.len());
        let mut last = 0;
        for m in pattern.find_iter(&out) {
            let before = out[..m.start()].chars().next_back();
            let after = out[m.end()..].chars().next();
            if is_boundary(before) && is_boundary(after) && !in_link(&out, m.start(), m.end()) {
                result.push_str(&out[last..m.start()]);
                result.push_str("**");
                result.push_str(m.as_str());
                result.push_str("**");
                last = m.end();
            }
        }
        result.push_str(&out[last..]);
        out = result;
    }
    out
}

/// True when the whitespace-delimited word around `start..end` is a URL.
fn in_link(line: &str, start: usize, end: usize) -> bool {
    let head = line[..start].rsplit(char::is_whitespace).next().unwrap_or("");
    let tail = line[end..].split(char::is_whitespace).next().unwrap_or("");
    let word = format!("{}{}{}", head, &line[start..end], tail);
    word.contains("://") || word.contains(".com/") || word.starts_with("www.")
}

fn is_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => !(c.is_alphanumeric() || matches!(c, '+' | '#' | '*' | '-' | '_')),
    }
}

/// Fixed-template cover letter, wrapped to 80 columns.
pub fn cover_letter(job: &JobPosting, matching: &[String], candidate_name: Option<&str>) -> String {
    let background = if matching.is_empty() {
        "my professional background".to_string()
    } else {
        format!("my background in {}", join_top(matching, 3))
    };
    let experience = if matching.is_empty() {
        format!("My experience aligns with the requirements of the {} role.", job.title)
    } else {
        format!("My experience with {} aligns with your requirements.", join_top(matching, 5))
    };
    let name = candidate_name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or("[Your Name]");

    let paragraphs = [
        format!(
            "I am writing to express my strong interest in the {} position at {}. With {}, \
             I am confident that I would be a valuable addition to your team.",
            job.title, job.company, background
        ),
        format!(
            "{} I am particularly excited about the opportunity to contribute to {}'s mission \
             and grow within your team.",
            experience, job.company
        ),
        "I have attached my resume for your review and would welcome the opportunity to discuss \
         how my skills can benefit your team."
            .to_string(),
        "Thank you for your consideration.".to_string(),
    ];

    let mut letter = String::from("Dear Hiring Manager,\n\n");
    for paragraph in &paragraphs {
        letter.push_str(&textwrap::fill(paragraph, COVER_LETTER_WIDTH));
        letter.push_str("\n\n");
    }
    letter.push_str("Best regards,\n");
    letter.push_str(name);
    letter
}

fn join_top(items: &[String], n: usize) -> String {
    items.iter().take(n).map(String::as_str).collect::<Vec<_>>().join(", ")
}
