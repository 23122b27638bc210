use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{
    AnalysisRecord, Application, ApplicationStatus, CandidateProfile, JobAnalysis, JobPosting, NewJobPosting,
    NewProfile, NewResume, Resume, StatusEvent,
};
use crate::scorer;
use crate::tracker;

/// Default window in which an identical (title, company, url) posting is a duplicate.
pub const DEFAULT_DEDUP_WINDOW_HOURS: i64 = 720;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    company TEXT NOT NULL,
    url TEXT NOT NULL,
    location TEXT,
    description TEXT,
    requirements TEXT,
    salary_range TEXT,
    job_type TEXT CHECK (job_type IS NULL OR job_type IN ('full-time', 'part-time', 'contract', 'internship')),
    source TEXT,
    posted_date TEXT,
    discovered_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    email TEXT,
    phone TEXT,
    linkedin_url TEXT,
    github_url TEXT,
    skills TEXT NOT NULL DEFAULT '[]',
    experience_years INTEGER NOT NULL DEFAULT 0 CHECK (experience_years >= 0),
    education TEXT NOT NULL DEFAULT '[]',
    is_active INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS applications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    compatibility_score REAL CHECK (compatibility_score IS NULL OR compatibility_score BETWEEN 0 AND 100),
    status TEXT NOT NULL DEFAULT 'found'
        CHECK (status IN ('found', 'applied', 'interview', 'rejected', 'hired', 'withdrawn')),
    date_found TEXT NOT NULL,
    date_applied TEXT
);

CREATE TABLE IF NOT EXISTS application_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id INTEGER NOT NULL REFERENCES applications(id),
    from_status TEXT,
    to_status TEXT NOT NULL,
    changed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS job_analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id INTEGER NOT NULL REFERENCES applications(id),
    skill_match_score REAL NOT NULL,
    experience_match_score REAL NOT NULL,
    education_match_score REAL NOT NULL,
    overall_score REAL NOT NULL CHECK (overall_score BETWEEN 0 AND 100),
    matching_skills TEXT NOT NULL,
    missing_skills TEXT NOT NULL,
    recommendations TEXT NOT NULL,
    analyzed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS resumes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id INTEGER REFERENCES applications(id),
    is_base INTEGER NOT NULL,
    content TEXT NOT NULL,
    cover_letter TEXT,
    file_type TEXT NOT NULL CHECK (file_type IN ('pdf', 'docx', 'plain-text')),
    source_name TEXT,
    created_at TEXT NOT NULL,
    CHECK ((is_base = 1 AND application_id IS NULL) OR (is_base = 0 AND application_id IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_jobs_identity ON jobs(title, company, url);
CREATE INDEX IF NOT EXISTS idx_applications_job ON applications(job_id);
CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);
CREATE INDEX IF NOT EXISTS idx_events_application ON application_events(application_id);
CREATE INDEX IF NOT EXISTS idx_analyses_application ON job_analyses(application_id);
CREATE INDEX IF NOT EXISTS idx_resumes_application ON resumes(application_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_profiles_single_active ON profiles(is_active) WHERE is_active = 1;

CREATE TRIGGER IF NOT EXISTS applications_no_delete BEFORE DELETE ON applications
BEGIN SELECT RAISE(ABORT, 'applications are never deleted'); END;
CREATE TRIGGER IF NOT EXISTS events_append_only BEFORE UPDATE ON application_events
BEGIN SELECT RAISE(ABORT, 'application_events is append-only'); END;
CREATE TRIGGER IF NOT EXISTS events_no_delete BEFORE DELETE ON application_events
BEGIN SELECT RAISE(ABORT, 'application_events is append-only'); END;
CREATE TRIGGER IF NOT EXISTS analyses_append_only BEFORE UPDATE ON job_analyses
BEGIN SELECT RAISE(ABORT, 'job_analyses is append-only'); END;
CREATE TRIGGER IF NOT EXISTS analyses_no_delete BEFORE DELETE ON job_analyses
BEGIN SELECT RAISE(ABORT, 'job_analyses is append-only'); END;
CREATE TRIGGER IF NOT EXISTS resumes_append_only BEFORE UPDATE ON resumes
BEGIN SELECT RAISE(ABORT, 'resumes are immutable'); END;
CREATE TRIGGER IF NOT EXISTS resumes_no_delete BEFORE DELETE ON resumes
BEGIN SELECT RAISE(ABORT, 'resumes are immutable'); END;
"#;

const JOB_COLUMNS: &str = "id, title, company, url, location, description, requirements, salary_range,
     job_type, source, posted_date, discovered_at";
const APPLICATION_COLUMNS: &str = "id, job_id, compatibility_score, status, date_found, date_applied";
const PROFILE_COLUMNS: &str = "id, name, email, phone, linkedin_url, github_url, skills, experience_years,
     education, is_active, created_at, updated_at";
const ANALYSIS_COLUMNS: &str = "id, application_id, skill_match_score, experience_match_score,
     education_match_score, overall_score, matching_skills, missing_skills, recommendations, analyzed_at";
const RESUME_COLUMNS: &str = "id, application_id, is_base, content, cover_letter, file_type, source_name, created_at";

/// SQLite-backed job store.
///
/// One handle per thread: open another handle on the same file for
/// concurrent work. Writes that change state run in `BEGIN IMMEDIATE`
/// transactions; reads take no locks beyond SQLite's snapshot.
pub struct Database {
    conn: Connection,
    dedup_window: Duration,
}

impl Database {
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::External(anyhow::anyhow!("cannot create {}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn,
            dedup_window: Duration::hours(DEFAULT_DEDUP_WINDOW_HOURS),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Ok(Self {
            conn,
            dedup_window: Duration::hours(DEFAULT_DEDUP_WINDOW_HOURS),
        })
    }

    /// A zero window disables duplicate detection.
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn default_path() -> PathBuf {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobmatch") {
            proj_dirs.data_dir().join("jobmatch.db")
        } else {
            PathBuf::from("jobmatch.db")
        }
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "connection configured");
        Ok(())
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        info!("schema initialized");
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(Error::validation("database not initialized, run 'jobmatch init' first"));
        }
        Ok(())
    }

    fn immediate(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?)
    }

    // --- Job operations ---

    pub fn insert_job(&self, posting: &NewJobPosting) -> Result<i64> {
        self.insert_job_at(posting, Utc::now())
    }

    /// Inserts `posting` as discovered at `now`, rejecting an identical
    /// (title, company, url) seen within the dedup window before `now`.
    pub fn insert_job_at(&self, posting: &NewJobPosting, now: DateTime<Utc>) -> Result<i64> {
        let title = required_field("title", &posting.title)?;
        let company = required_field("company", &posting.company)?;
        let url = required_field("url", &posting.url)?;

        let tx = self.immediate()?;

        if self.dedup_window > Duration::zero() {
            let seen: Vec<(i64, DateTime<Utc>)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, discovered_at FROM jobs
                     WHERE LOWER(title) = LOWER(?1) AND LOWER(company) = LOWER(?2) AND url = ?3",
                )?;
                let rows = stmt.query_map(params![title, company, url], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            if let Some((existing_id, _)) = seen
                .iter()
                .filter(|(_, at)| *at <= now && now - *at < self.dedup_window)
                .max_by_key(|(_, at)| *at)
            {
                warn!(existing_id, title, company, "duplicate job rejected");
                return Err(Error::Duplicate {
                    title: title.to_string(),
                    company: company.to_string(),
                    url: url.to_string(),
                    existing_id: *existing_id,
                });
            }
        }

        tx.execute(
            "INSERT INTO jobs (title, company, url, location, description, requirements, salary_range,
                               job_type, source, posted_date, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                title,
                company,
                url,
                posting.location,
                posting.description,
                posting.requirements,
                posting.salary_range,
                posting.job_type,
                posting.source,
                posting.posted_date,
                now,
            ],
        )?;
        let job_id = tx.last_insert_rowid();
        tx.commit()?;

        info!(job_id, title, company, "job inserted");
        Ok(job_id)
    }

    pub fn get_job(&self, id: i64) -> Result<JobPosting> {
        self.conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [id],
                Self::row_to_job,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("job", id))
    }

    pub fn list_jobs(&self, limit: Option<usize>) -> Result<Vec<JobPosting>> {
        let limit = limit.map_or(-1, |l| l as i64);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY discovered_at DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit], Self::row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Back-fills enrichment fields from a later detail fetch. Other fields
    /// are immutable once scraped.
    pub fn enrich_job(&self, id: i64, description: Option<&str>, requirements: Option<&str>) -> Result<()> {
        if description.is_none() && requirements.is_none() {
            return Err(Error::validation("nothing to enrich: give a description or requirements"));
        }
        let changed = self.conn.execute(
            "UPDATE jobs SET description = COALESCE(?1, description), requirements = COALESCE(?2, requirements)
             WHERE id = ?3",
            params![description, requirements, id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("job", id));
        }
        info!(job_id = id, "job enriched");
        Ok(())
    }

    /// Case-insensitive keyword search over title, description and
    /// requirements, most relevant first. No match is an empty result.
    pub fn find_jobs<S: AsRef<str>>(&self, keywords: &[S], location: Option<&str>) -> Result<Vec<(JobPosting, f64)>> {
        let location = location.map(str::trim).filter(|l| !l.is_empty());
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE ?1 IS NULL OR instr(LOWER(COALESCE(location, '')), LOWER(?1)) > 0"
        ))?;
        let jobs = stmt
            .query_map([location], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let searching = keywords.iter().any(|k| !k.as_ref().trim().is_empty());
        let mut scored: Vec<(JobPosting, f64)> = jobs
            .into_iter()
            .map(|job| {
                let text = format!(
                    "{} {} {}",
                    job.title,
                    job.description.as_deref().unwrap_or_default(),
                    job.requirements.as_deref().unwrap_or_default()
                );
                let relevance = scorer::keyword_relevance(keywords, &text);
                (job, relevance)
            })
            .filter(|(_, relevance)| !searching || *relevance > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| b.0.discovered_at.cmp(&a.0.discovered_at))
                .then_with(|| b.0.id.cmp(&a.0.id))
        });
        debug!(results = scored.len(), "find_jobs");
        Ok(scored)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobPosting> {
        Ok(JobPosting {
            id: row.get(0)?,
            title: row.get(1)?,
            company: row.get(2)?,
            url: row.get(3)?,
            location: row.get(4)?,
            description: row.get(5)?,
            requirements: row.get(6)?,
            salary_range: row.get(7)?,
            job_type: row.get(8)?,
            source: row.get(9)?,
            posted_date: row.get(10)?,
            discovered_at: row.get(11)?,
        })
    }

    // --- Application operations ---

    /// Starts tracking `job_id`. Applications always begin in `found`.
    pub fn record_application(&self, job_id: i64, score: Option<f64>, status: ApplicationStatus) -> Result<i64> {
        if status != ApplicationStatus::Found {
            return Err(Error::Validation(format!(
                "applications start in '{}', not '{}'",
                ApplicationStatus::Found,
                status
            )));
        }
        if let Some(score) = score {
            validate_score("compatibility score", score)?;
        }

        let tx = self.immediate()?;
        let exists: Option<i64> = tx
            .query_row("SELECT id FROM jobs WHERE id = ?1", [job_id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(Error::not_found("job", job_id));
        }

        let now = Utc::now();
        tx.execute(
            "INSERT INTO applications (job_id, compatibility_score, status, date_found) VALUES (?1, ?2, ?3, ?4)",
            params![job_id, score, status, now],
        )?;
        let application_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO application_events (application_id, from_status, to_status, changed_at)
             VALUES (?1, NULL, ?2, ?3)",
            params![application_id, status, now],
        )?;
        tx.commit()?;

        info!(application_id, job_id, "application recorded");
        Ok(application_id)
    }

    pub fn get_application(&self, id: i64) -> Result<Application> {
        self.conn
            .query_row(
                &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"),
                [id],
                Self::row_to_application,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("application", id))
    }

    pub fn list_applications(&self, status: Option<ApplicationStatus>) -> Result<Vec<Application>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY date_found DESC, id DESC"
        ))?;
        let rows = stmt.query_map([status], Self::row_to_application)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Moves the application from whatever status it is in now.
    pub fn update_status(&self, application_id: i64, new_status: ApplicationStatus) -> Result<()> {
        self.transition(application_id, None, new_status)
    }

    /// Compare-and-swap form: fails with `Conflict` unless the application
    /// is still in `expected`.
    pub fn update_status_from(
        &self,
        application_id: i64,
        expected: ApplicationStatus,
        new_status: ApplicationStatus,
    ) -> Result<()> {
        self.transition(application_id, Some(expected), new_status)
    }

    fn transition(
        &self,
        application_id: i64,
        expected: Option<ApplicationStatus>,
        new_status: ApplicationStatus,
    ) -> Result<()> {
        let tx = self.immediate()?;
        let current = Self::current_status(&tx, application_id)?;

        if let Some(expected) = expected {
            if current != expected {
                warn!(application_id, %expected, actual = %current, "status update lost the race");
                return Err(Error::Conflict {
                    application_id,
                    expected,
                    actual: current,
                });
            }
        }
        if let Err(e) = tracker::check_transition(application_id, current, new_status) {
            warn!(application_id, from = %current, to = %new_status, "transition rejected");
            return Err(e);
        }

        let now = Utc::now();
        let date_applied = (new_status == ApplicationStatus::Applied).then_some(now);
        let changed = tx.execute(
            "UPDATE applications SET status = ?1, date_applied = COALESCE(?2, date_applied)
             WHERE id = ?3 AND status = ?4",
            params![new_status, date_applied, application_id, current],
        )?;
        if changed == 0 {
            let actual = Self::current_status(&tx, application_id)?;
            return Err(Error::Conflict {
                application_id,
                expected: current,
                actual,
            });
        }
        tx.execute(
            "INSERT INTO application_events (application_id, from_status, to_status, changed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![application_id, current, new_status, now],
        )?;
        tx.commit()?;

        info!(application_id, from = %current, to = %new_status, "status updated");
        Ok(())
    }

    fn current_status(conn: &Connection, application_id: i64) -> Result<ApplicationStatus> {
        conn.query_row(
            "SELECT status FROM applications WHERE id = ?1",
            [application_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::not_found("application", application_id))
    }

    pub fn update_score(&self, application_id: i64, score: f64) -> Result<()> {
        validate_score("compatibility score", score)?;
        let changed = self.conn.execute(
            "UPDATE applications SET compatibility_score = ?1 WHERE id = ?2",
            params![score, application_id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("application", application_id));
        }
        Ok(())
    }

    pub fn status_history(&self, application_id: i64) -> Result<Vec<StatusEvent>> {
        self.get_application(application_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, application_id, from_status, to_status, changed_at
             FROM application_events WHERE application_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([application_id], |row| {
            Ok(StatusEvent {
                id: row.get(0)?,
                application_id: row.get(1)?,
                from_status: row.get(2)?,
                to_status: row.get(3)?,
                changed_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Number of applications in each status, every status listed.
    pub fn status_counts(&self) -> Result<Vec<(ApplicationStatus, i64)>> {
        let mut stmt = self.conn.prepare("SELECT status, COUNT(*) FROM applications GROUP BY status")?;
        let found: Vec<(ApplicationStatus, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(ApplicationStatus::ALL
            .iter()
            .map(|status| {
                let count = found.iter().find(|(s, _)| s == status).map_or(0, |(_, c)| *c);
                (*status, count)
            })
            .collect())
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        Ok(Application {
            id: row.get(0)?,
            job_id: row.get(1)?,
            compatibility_score: row.get(2)?,
            status: row.get(3)?,
            date_found: row.get(4)?,
            date_applied: row.get(5)?,
        })
    }

    // --- Analysis operations ---

    /// Appends an analysis run and sets the application's score to its
    /// overall score. Earlier runs are kept.
    pub fn save_analysis(&self, application_id: i64, analysis: &JobAnalysis) -> Result<i64> {
        validate_score("skill match score", analysis.skill_match_score)?;
        validate_score("experience match score", analysis.experience_match_score)?;
        validate_score("education match score", analysis.education_match_score)?;
        validate_score("overall score", analysis.overall_score)?;

        let tx = self.immediate()?;
        let changed = tx.execute(
            "UPDATE applications SET compatibility_score = ?1 WHERE id = ?2",
            params![analysis.overall_score, application_id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("application", application_id));
        }
        tx.execute(
            "INSERT INTO job_analyses (application_id, skill_match_score, experience_match_score,
                                       education_match_score, overall_score, matching_skills,
                                       missing_skills, recommendations, analyzed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                application_id,
                analysis.skill_match_score,
                analysis.experience_match_score,
                analysis.education_match_score,
                analysis.overall_score,
                analysis.matching_skills,
                analysis.missing_skills,
                analysis.recommendations,
                Utc::now(),
            ],
        )?;
        let analysis_id = tx.last_insert_rowid();
        tx.commit()?;

        info!(analysis_id, application_id, overall = analysis.overall_score, "analysis saved");
        Ok(analysis_id)
    }

    pub fn list_analyses(&self, application_id: i64) -> Result<Vec<AnalysisRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM job_analyses WHERE application_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([application_id], Self::row_to_analysis)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn latest_analysis(&self, application_id: i64) -> Result<Option<AnalysisRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {ANALYSIS_COLUMNS} FROM job_analyses WHERE application_id = ?1 ORDER BY id DESC LIMIT 1"
                ),
                [application_id],
                Self::row_to_analysis,
            )
            .optional()?)
    }

    fn row_to_analysis(row: &rusqlite::Row) -> rusqlite::Result<AnalysisRecord> {
        Ok(AnalysisRecord {
            id: row.get(0)?,
            application_id: row.get(1)?,
            analysis: JobAnalysis {
                skill_match_score: row.get(2)?,
                experience_match_score: row.get(3)?,
                education_match_score: row.get(4)?,
                overall_score: row.get(5)?,
                matching_skills: row.get(6)?,
                missing_skills: row.get(7)?,
                recommendations: row.get(8)?,
            },
            analyzed_at: row.get(9)?,
        })
    }

    // --- Resume operations ---

    /// Stores a base resume (`application_id` = None) or a tailored variant.
    /// Resumes are never updated; re-tailoring adds a row.
    pub fn save_resume(&self, application_id: Option<i64>, resume: &NewResume) -> Result<i64> {
        if resume.content.trim().is_empty() {
            return Err(Error::validation("resume content must not be empty"));
        }
        if let Some(app_id) = application_id {
            self.get_application(app_id)?;
        }

        self.conn.execute(
            "INSERT INTO resumes (application_id, is_base, content, cover_letter, file_type, source_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                application_id,
                application_id.is_none(),
                resume.content,
                resume.cover_letter,
                resume.file_type,
                resume.source_name,
                Utc::now(),
            ],
        )?;
        let resume_id = self.conn.last_insert_rowid();
        info!(resume_id, ?application_id, "resume saved");
        Ok(resume_id)
    }

    pub fn get_resume(&self, id: i64) -> Result<Resume> {
        self.conn
            .query_row(
                &format!("SELECT {RESUME_COLUMNS} FROM resumes WHERE id = ?1"),
                [id],
                Self::row_to_resume,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("resume", id))
    }

    pub fn base_resumes(&self) -> Result<Vec<Resume>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESUME_COLUMNS} FROM resumes WHERE is_base = 1 ORDER BY id DESC"
        ))?;
        let rows = stmt.query_map([], Self::row_to_resume)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn resumes_for_application(&self, application_id: i64) -> Result<Vec<Resume>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESUME_COLUMNS} FROM resumes WHERE application_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([application_id], Self::row_to_resume)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn row_to_resume(row: &rusqlite::Row) -> rusqlite::Result<Resume> {
        Ok(Resume {
            id: row.get(0)?,
            application_id: row.get(1)?,
            is_base: row.get(2)?,
            content: row.get(3)?,
            cover_letter: row.get(4)?,
            file_type: row.get(5)?,
            source_name: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // --- Profile operations ---

    /// Creates a profile and makes it the single active one.
    pub fn create_profile(&self, profile: &NewProfile) -> Result<i64> {
        let tx = self.immediate()?;
        let now = Utc::now();
        tx.execute("UPDATE profiles SET is_active = 0 WHERE is_active = 1", [])?;
        tx.execute(
            "INSERT INTO profiles (name, email, phone, linkedin_url, github_url, skills, experience_years,
                                   education, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
            params![
                profile.name,
                profile.email,
                profile.phone,
                profile.linkedin_url,
                profile.github_url,
                profile.skills,
                profile.experience_years,
                profile.education,
                now,
            ],
        )?;
        let profile_id = tx.last_insert_rowid();
        tx.commit()?;
        info!(profile_id, "profile created");
        Ok(profile_id)
    }

    pub fn update_profile(&self, id: i64, profile: &NewProfile) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE profiles SET name = ?1, email = ?2, phone = ?3, linkedin_url = ?4, github_url = ?5,
                                 skills = ?6, experience_years = ?7, education = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                profile.name,
                profile.email,
                profile.phone,
                profile.linkedin_url,
                profile.github_url,
                profile.skills,
                profile.experience_years,
                profile.education,
                Utc::now(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found("profile", id));
        }
        info!(profile_id = id, "profile updated");
        Ok(())
    }

    pub fn get_profile(&self, id: i64) -> Result<CandidateProfile> {
        self.conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                [id],
                Self::row_to_profile,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("profile", id))
    }

    pub fn active_profile(&self) -> Result<Option<CandidateProfile>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE is_active = 1"),
                [],
                Self::row_to_profile,
            )
            .optional()?)
    }

    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<CandidateProfile> {
        Ok(CandidateProfile {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            linkedin_url: row.get(4)?,
            github_url: row.get(5)?,
            skills: row.get(6)?,
            experience_years: row.get(7)?,
            education: row.get(8)?,
            is_active: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

fn required_field<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("job {} must not be empty", name)));
    }
    Ok(trimmed)
}

fn validate_score(name: &str, score: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&score) {
        return Err(Error::Validation(format!("{} must be within 0-100, got {}", name, score)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResumeFileType, SkillList};
    use std::sync::{Arc, Barrier};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn posting(title: &str, company: &str, url: &str) -> NewJobPosting {
        NewJobPosting {
            title: title.to_string(),
            company: company.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    fn analysis(overall: f64) -> JobAnalysis {
        JobAnalysis {
            skill_match_score: overall,
            experience_match_score: 100.0,
            education_match_score: 100.0,
            overall_score: overall,
            matching_skills: SkillList::new(["python"]).unwrap(),
            missing_skills: SkillList::new(["docker"]).unwrap(),
            recommendations: SkillList::new(["Acquire docker"]).unwrap(),
        }
    }

    fn tracked(db: &Database) -> i64 {
        let job_id = db.insert_job(&posting("Dev", "Acme", "https://acme.test/1")).unwrap();
        db.record_application(job_id, None, ApplicationStatus::Found).unwrap()
    }

    #[test]
    fn test_ensure_initialized() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.ensure_initialized().is_err());
        db.init().unwrap();
        assert!(db.ensure_initialized().is_ok());
        // init is idempotent
        db.init().unwrap();
    }

    #[test]
    fn test_insert_and_get_job() {
        let db = test_db();
        let mut new = posting("  Backend Developer ", "Shopify", "https://shopify.test/1");
        new.job_type = Some(crate::models::JobType::Internship);
        new.location = Some("Ottawa, ON".into());
        let id = db.insert_job(&new).unwrap();

        let job = db.get_job(id).unwrap();
        assert_eq!(job.title, "Backend Developer");
        assert_eq!(job.job_type, Some(crate::models::JobType::Internship));
        assert_eq!(job.location.as_deref(), Some("Ottawa, ON"));
    }

    #[test]
    fn test_insert_job_requires_identity_fields() {
        let db = test_db();
        let err = db.insert_job(&posting("Dev", " ", "https://x.test")).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_duplicate_within_window() {
        let db = test_db();
        let t0 = Utc::now();
        let first = db.insert_job_at(&posting("Dev", "Acme", "https://acme.test/1"), t0).unwrap();

        let err = db
            .insert_job_at(&posting("dev", "ACME", "https://acme.test/1"), t0 + Duration::days(1))
            .unwrap_err();
        match err {
            Error::Duplicate { existing_id, .. } => assert_eq!(existing_id, first),
            other => panic!("expected Duplicate, got {other:?}"),
        }

        // changed url is a different posting
        assert!(db.insert_job_at(&posting("Dev", "Acme", "https://acme.test/2"), t0).is_ok());
    }

    #[test]
    fn test_duplicate_allowed_after_window() {
        let db = test_db();
        let t0 = Utc::now();
        db.insert_job_at(&posting("Dev", "Acme", "https://acme.test/1"), t0).unwrap();
        let later = t0 + Duration::hours(DEFAULT_DEDUP_WINDOW_HOURS + 1);
        assert!(db.insert_job_at(&posting("Dev", "Acme", "https://acme.test/1"), later).is_ok());
    }

    #[test]
    fn test_zero_window_disables_dedup() {
        let db = test_db().with_dedup_window(Duration::zero());
        db.insert_job(&posting("Dev", "Acme", "https://acme.test/1")).unwrap();
        assert!(db.insert_job(&posting("Dev", "Acme", "https://acme.test/1")).is_ok());
    }

    #[test]
    fn test_get_missing_job_is_not_found() {
        let db = test_db();
        assert!(matches!(db.get_job(99), Err(Error::NotFound { entity: "job", id: 99 })));
    }

    #[test]
    fn test_enrich_job_back_fills() {
        let db = test_db();
        let mut new = posting("Dev", "Acme", "https://acme.test/1");
        new.description = Some("Original".into());
        let id = db.insert_job(&new).unwrap();

        db.enrich_job(id, None, Some("Python, 3+ years")).unwrap();
        let job = db.get_job(id).unwrap();
        assert_eq!(job.description.as_deref(), Some("Original"));
        assert_eq!(job.requirements.as_deref(), Some("Python, 3+ years"));

        assert!(db.enrich_job(id, None, None).is_err());
        assert!(matches!(db.enrich_job(42, Some("x"), None), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_find_jobs_orders_by_relevance() {
        let db = test_db();
        let mut a = posting("Rust Engineer", "A", "https://a.test");
        a.description = Some("Remote friendly".into());
        a.location = Some("Toronto, ON".into());
        let mut b = posting("Python Developer", "B", "https://b.test");
        b.requirements = Some("Some rust exposure".into());
        b.location = Some("Remote".into());
        let c = posting("Designer", "C", "https://c.test");
        let a_id = db.insert_job(&a).unwrap();
        let b_id = db.insert_job(&b).unwrap();
        db.insert_job(&c).unwrap();

        let results = db.find_jobs(&["RUST", "remote"], None).unwrap();
        let ids: Vec<i64> = results.iter().map(|(j, _)| j.id).collect();
        assert_eq!(ids, vec![a_id, b_id]);
        assert_eq!(results[0].1, 100.0);
        assert_eq!(results[1].1, 50.0);

        let toronto = db.find_jobs(&["rust"], Some("toronto")).unwrap();
        assert_eq!(toronto.len(), 1);
        assert_eq!(toronto[0].0.id, a_id);

        assert!(db.find_jobs(&["cobol"], None).unwrap().is_empty());
        let none: [&str; 0] = [];
        assert_eq!(db.find_jobs(&none, None).unwrap().len(), 3);
    }

    #[test]
    fn test_record_application_unknown_job() {
        let db = test_db();
        let err = db.record_application(7, None, ApplicationStatus::Found).unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "job", id: 7 }));
    }

    #[test]
    fn test_record_application_validates_input() {
        let db = test_db();
        let job_id = db.insert_job(&posting("Dev", "Acme", "https://acme.test/1")).unwrap();
        assert_eq!(
            db.record_application(job_id, Some(101.0), ApplicationStatus::Found).unwrap_err().kind(),
            "validation"
        );
        assert_eq!(
            db.record_application(job_id, None, ApplicationStatus::Hired).unwrap_err().kind(),
            "validation"
        );
        let id = db.record_application(job_id, Some(55.5), ApplicationStatus::Found).unwrap();
        let app = db.get_application(id).unwrap();
        assert_eq!(app.status, ApplicationStatus::Found);
        assert_eq!(app.compatibility_score, Some(55.5));
        assert!(app.date_applied.is_none());
    }

    #[test]
    fn test_status_path_to_hired() {
        let db = test_db();
        let id = tracked(&db);

        let err = db.update_status(id, ApplicationStatus::Interview).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(db.get_application(id).unwrap().status, ApplicationStatus::Found);

        db.update_status(id, ApplicationStatus::Applied).unwrap();
        assert!(db.get_application(id).unwrap().date_applied.is_some());
        db.update_status(id, ApplicationStatus::Interview).unwrap();
        db.update_status(id, ApplicationStatus::Hired).unwrap();

        for next in ApplicationStatus::ALL {
            assert!(db.update_status(id, *next).is_err());
        }

        let history = db.status_history(id).unwrap();
        let steps: Vec<_> = history.iter().map(|e| (e.from_status, e.to_status)).collect();
        assert_eq!(
            steps,
            vec![
                (None, ApplicationStatus::Found),
                (Some(ApplicationStatus::Found), ApplicationStatus::Applied),
                (Some(ApplicationStatus::Applied), ApplicationStatus::Interview),
                (Some(ApplicationStatus::Interview), ApplicationStatus::Hired),
            ]
        );
    }

    #[test]
    fn test_update_status_unknown_application() {
        let db = test_db();
        let err = db.update_status(5, ApplicationStatus::Applied).unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "application", id: 5 }));
    }

    #[test]
    fn test_stale_expected_status_conflicts() {
        let db = test_db();
        let id = tracked(&db);

        db.update_status_from(id, ApplicationStatus::Found, ApplicationStatus::Applied).unwrap();
        let err = db
            .update_status_from(id, ApplicationStatus::Found, ApplicationStatus::Rejected)
            .unwrap_err();
        match err {
            Error::Conflict { expected, actual, .. } => {
                assert_eq!(expected, ApplicationStatus::Found);
                assert_eq!(actual, ApplicationStatus::Applied);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert_eq!(db.get_application(id).unwrap().status, ApplicationStatus::Applied);
    }

    #[test]
    fn test_concurrent_updates_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let id = {
            let db = Database::open_at(&path).unwrap();
            db.init().unwrap();
            tracked(&db)
        };

        let workers = 4;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let db = Database::open_at(&path).unwrap();
                    barrier.wait();
                    db.update_status_from(id, ApplicationStatus::Found, ApplicationStatus::Applied)
                })
            })
            .collect();

        let results: Vec<Result<()>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::Conflict { .. })));

        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.status_history(id).unwrap().len(), 2);
    }

    #[test]
    fn test_update_score() {
        let db = test_db();
        let id = tracked(&db);
        db.update_score(id, 72.5).unwrap();
        assert_eq!(db.get_application(id).unwrap().compatibility_score, Some(72.5));
        assert_eq!(db.update_score(id, f64::NAN).unwrap_err().kind(), "validation");
        assert_eq!(db.update_score(id, -1.0).unwrap_err().kind(), "validation");
        assert!(matches!(db.update_score(404, 10.0), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_status_counts() {
        let db = test_db();
        let a = tracked(&db);
        let job_id = db.insert_job(&posting("Ops", "Beta", "https://beta.test")).unwrap();
        db.record_application(job_id, None, ApplicationStatus::Found).unwrap();
        db.update_status(a, ApplicationStatus::Withdrawn).unwrap();

        let counts = db.status_counts().unwrap();
        assert_eq!(counts.len(), ApplicationStatus::ALL.len());
        assert!(counts.contains(&(ApplicationStatus::Found, 1)));
        assert!(counts.contains(&(ApplicationStatus::Withdrawn, 1)));
        assert!(counts.contains(&(ApplicationStatus::Hired, 0)));
    }

    #[test]
    fn test_analysis_history_is_appended() {
        let db = test_db();
        let id = tracked(&db);

        db.save_analysis(id, &analysis(40.0)).unwrap();
        db.save_analysis(id, &analysis(70.0)).unwrap();

        let runs = db.list_analyses(id).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].analysis.overall_score, 40.0);
        assert_eq!(runs[1].analysis.missing_skills.as_slice(), ["docker"]);
        assert_eq!(db.latest_analysis(id).unwrap().unwrap().analysis.overall_score, 70.0);
        assert_eq!(db.get_application(id).unwrap().compatibility_score, Some(70.0));
    }

    #[test]
    fn test_save_analysis_rejects_bad_input() {
        let db = test_db();
        let id = tracked(&db);
        assert_eq!(db.save_analysis(id, &analysis(120.0)).unwrap_err().kind(), "validation");
        assert!(matches!(db.save_analysis(999, &analysis(50.0)), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_history_rows_cannot_be_rewritten() {
        let db = test_db();
        let id = tracked(&db);
        db.save_analysis(id, &analysis(40.0)).unwrap();
        assert!(db.conn.execute("UPDATE job_analyses SET overall_score = 1", []).is_err());
        assert!(db.conn.execute("DELETE FROM applications", []).is_err());
    }

    #[test]
    fn test_resumes_base_and_tailored() {
        let db = test_db();
        let id = tracked(&db);
        let new = |content: &str| NewResume {
            content: content.to_string(),
            cover_letter: None,
            file_type: ResumeFileType::PlainText,
            source_name: Some("cv.txt".into()),
        };

        let base = db.save_resume(None, &new("Base resume")).unwrap();
        let first = db.save_resume(Some(id), &new("Tailored v1")).unwrap();
        let second = db.save_resume(Some(id), &new("Tailored v2")).unwrap();

        assert!(db.get_resume(base).unwrap().is_base);
        assert_eq!(db.base_resumes().unwrap().len(), 1);
        let variants: Vec<i64> = db.resumes_for_application(id).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(variants, vec![first, second]);

        assert!(matches!(db.save_resume(Some(77), &new("x")), Err(Error::NotFound { .. })));
        assert_eq!(db.save_resume(None, &new("  ")).unwrap_err().kind(), "validation");
    }

    #[test]
    fn test_single_active_profile() {
        let db = test_db();
        assert!(db.active_profile().unwrap().is_none());

        let mut profile = NewProfile {
            name: Some("Sam".into()),
            skills: SkillList::new(["Python", "SQL"]).unwrap(),
            experience_years: 2,
            education: SkillList::new(["BSc Computer Science"]).unwrap(),
            ..Default::default()
        };
        let first = db.create_profile(&profile).unwrap();
        profile.name = Some("Sam Second".into());
        let second = db.create_profile(&profile).unwrap();

        let active = db.active_profile().unwrap().unwrap();
        assert_eq!(active.id, second);
        assert!(!db.get_profile(first).unwrap().is_active);
        assert_eq!(active.skills.as_slice(), ["Python", "SQL"]);

        profile.experience_years = 3;
        db.update_profile(second, &profile).unwrap();
        assert_eq!(db.get_profile(second).unwrap().experience_years, 3);
        assert!(matches!(db.update_profile(99, &profile), Err(Error::NotFound { .. })));
    }
}
