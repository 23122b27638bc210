use anyhow::Context;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::NewJobPosting;
use crate::scorer;

/// What a source is asked for.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub keywords: Vec<String>,
    pub location: Option<String>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    /// Whitespace-separated keywords, as typed on the command line.
    pub fn new(keywords: &str, location: Option<&str>) -> Self {
        Self {
            keywords: keywords.split_whitespace().map(str::to_string).collect(),
            location: location.map(str::trim).filter(|l| !l.is_empty()).map(str::to_string),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when `posting` passes the keyword and location filters.
    pub fn accepts(&self, posting: &NewJobPosting) -> bool {
        if let Some(location) = &self.location {
            let matches = posting
                .location
                .as_deref()
                .is_some_and(|l| l.to_lowercase().contains(&location.to_lowercase()));
            if !matches {
                return false;
            }
        }
        if self.keywords.is_empty() {
            return true;
        }
        let text = format!(
            "{} {} {}",
            posting.title,
            posting.description.as_deref().unwrap_or_default(),
            posting.requirements.as_deref().unwrap_or_default()
        );
        scorer::keyword_relevance(&self.keywords, &text) > 0.0
    }
}

/// A producer of scraped postings. Scraping itself happens elsewhere;
/// sources hand over already-materialized records.
pub trait JobSource {
    fn name(&self) -> &str;
    fn fetch(&self, query: &SearchQuery) -> anyhow::Result<Vec<NewJobPosting>>;
}

/// Reads scraper output: a JSON array of postings.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    name: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "json".to_string());
        Self { path, name }
    }
}

impl JobSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, query: &SearchQuery) -> anyhow::Result<Vec<NewJobPosting>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let postings: Vec<NewJobPosting> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON array of job postings", self.path.display()))?;

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(postings
            .into_iter()
            .filter(|p| query.accepts(p))
            .take(limit)
            .map(|mut p| {
                if p.source.is_none() {
                    p.source = Some(self.name.clone());
                }
                p
            })
            .collect())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub fetched: usize,
    pub jobs_added: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// Fetches from `source` and inserts every posting. Duplicates and
/// malformed postings are counted and skipped; store failures abort.
pub fn ingest(db: &Database, source: &dyn JobSource, query: &SearchQuery) -> Result<IngestStats> {
    let postings = source.fetch(query).map_err(Error::External)?;
    let mut stats = IngestStats {
        fetched: postings.len(),
        ..Default::default()
    };

    for posting in &postings {
        match db.insert_job(posting) {
            Ok(_) => stats.jobs_added += 1,
            Err(Error::Duplicate { .. }) => stats.duplicates += 1,
            Err(Error::Validation(msg)) => {
                warn!(source = source.name(), title = %posting.title, "skipping posting: {}", msg);
                stats.errors += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        source = source.name(),
        fetched = stats.fetched,
        added = stats.jobs_added,
        duplicates = stats.duplicates,
        errors = stats.errors,
        "ingest finished"
    );
    Ok(stats)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// In-memory source for pipeline tests.
    pub(crate) struct MemorySource(pub Vec<NewJobPosting>);

    impl JobSource for MemorySource {
        fn name(&self) -> &str {
            "memory"
        }

        fn fetch(&self, query: &SearchQuery) -> anyhow::Result<Vec<NewJobPosting>> {
            Ok(self.0.iter().filter(|p| query.accepts(p)).cloned().collect())
        }
    }

    pub(crate) fn posting(title: &str, company: &str, location: &str) -> NewJobPosting {
        NewJobPosting {
            title: title.to_string(),
            company: company.to_string(),
            url: format!("https://{}.test/{}", company.to_lowercase(), title.len()),
            location: Some(location.to_string()),
            ..Default::default()
        }
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    #[test]
    fn test_query_filters_keywords_and_location() {
        let query = SearchQuery::new("rust intern", Some("toronto"));
        assert!(query.accepts(&posting("Rust Developer", "Acme", "Toronto, ON")));
        assert!(!query.accepts(&posting("Rust Developer", "Acme", "Vancouver, BC")));
        assert!(!query.accepts(&posting("Accountant", "Acme", "Toronto, ON")));
        assert!(SearchQuery::default().accepts(&posting("Anything", "Acme", "Anywhere")));
    }

    #[test]
    fn test_json_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"title": "Backend Intern", "company": "Shopify", "url": "https://shopify.test/1",
                  "location": "Ottawa, ON", "job_type": "internship"}},
                {{"title": "Designer", "company": "Figma", "url": "https://figma.test/2"}}
            ]"#
        )
        .unwrap();

        let source = JsonFileSource::new(file.path());
        let all = source.fetch(&SearchQuery::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].job_type, Some(crate::models::JobType::Internship));
        assert_eq!(all[0].source.as_deref(), Some(source.name()));

        let interns = source.fetch(&SearchQuery::new("intern", None)).unwrap();
        assert_eq!(interns.len(), 1);
        assert_eq!(source.fetch(&SearchQuery::default().with_limit(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_json_file_source_rejects_bad_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"title": "not an array"}}"#).unwrap();
        assert!(JsonFileSource::new(file.path()).fetch(&SearchQuery::default()).is_err());
        assert!(JsonFileSource::new("/nonexistent/jobs.json").fetch(&SearchQuery::default()).is_err());
    }

    #[test]
    fn test_ingest_counts_duplicates_and_errors() {
        let db = test_db();
        let source = MemorySource(vec![
            posting("Rust Developer", "Acme", "Remote"),
            posting("Rust Developer", "Acme", "Remote"),
            posting("", "Acme", "Remote"),
            posting("Go Developer", "Beta", "Remote"),
        ]);

        let stats = ingest(&db, &source, &SearchQuery::default()).unwrap();
        assert_eq!(
            stats,
            IngestStats {
                fetched: 4,
                jobs_added: 2,
                duplicates: 1,
                errors: 1,
            }
        );

        let again = ingest(&db, &source, &SearchQuery::new("go", None)).unwrap();
        assert_eq!(again.jobs_added, 0);
        assert_eq!(again.duplicates, 1);
    }
}
