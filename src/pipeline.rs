use chrono::Utc;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::generator::{self, TextGenerator};
use crate::models::{AnalysisRecord, JobAnalysis, NewProfile, NewResume, Resume, ResumeFileType};
use crate::profile;
use crate::scorer::{self, Candidate, CompatibilityScorer, MarketTrends};
use crate::sources::{self, IngestStats, JobSource, SearchQuery};
use crate::tailor;

const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Store, scorer and collaborators wired together: scrape results in,
/// tracked and scored applications and tailored resumes out.
pub struct Pipeline<'a> {
    db: &'a Database,
    scorer: CompatibilityScorer,
    max_tokens: u32,
}

impl<'a> Pipeline<'a> {
    pub fn new(db: &'a Database, scorer: CompatibilityScorer) -> Self {
        Self {
            db,
            scorer,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn ingest(&self, source: &dyn JobSource, query: &SearchQuery) -> Result<IngestStats> {
        sources::ingest(self.db, source, query)
    }

    /// Surfaces a stored job to the candidate as a `found` application.
    pub fn track(&self, job_id: i64) -> Result<i64> {
        self.db.record_application(job_id, None, crate::models::ApplicationStatus::Found)
    }

    /// Scores the application's job against the active profile and appends
    /// the result to its analysis history.
    pub fn analyze(&self, application_id: i64) -> Result<AnalysisRecord> {
        let application = self.db.get_application(application_id)?;
        let job = self.db.get_job(application.job_id)?;
        let profile = self
            .db
            .active_profile()?
            .ok_or_else(|| Error::validation("no active candidate profile, run 'jobmatch profile set' first"))?;

        let analysis = self.scorer.score(&Candidate::from(&profile), &job.requirement_text());
        let analysis_id = self.db.save_analysis(application_id, &analysis)?;

        info!(
            application_id,
            analysis_id,
            overall = analysis.overall_score,
            "application analyzed"
        );
        self.db
            .latest_analysis(application_id)?
            .ok_or_else(|| Error::not_found("analysis", analysis_id))
    }

    /// Drafts a tailored resume from `base_resume_id` and stores it as a new
    /// variant of the application. With a generator, the draft is polished
    /// first and the returned text is stored instead.
    pub fn tailor(
        &self,
        application_id: i64,
        base_resume_id: i64,
        generator: Option<&dyn TextGenerator>,
    ) -> Result<Resume> {
        let application = self.db.get_application(application_id)?;
        let job = self.db.get_job(application.job_id)?;
        let base = self.db.get_resume(base_resume_id)?;
        if !base.is_base {
            return Err(Error::Validation(format!(
                "resume #{} is a tailored variant, pick a base resume",
                base_resume_id
            )));
        }

        let profile = self.db.active_profile()?;
        let analysis = match self.db.latest_analysis(application_id)? {
            Some(record) => record.analysis,
            None => self.score_base(&base, profile.as_ref(), &job.requirement_text()),
        };

        let name = profile.as_ref().and_then(|p| p.name.as_deref());
        let draft = tailor::draft(
            self.scorer.vocabulary(),
            &base.content,
            &job,
            &analysis,
            name,
            Utc::now(),
        );

        let content = match generator {
            Some(generator) => {
                debug!(model = generator.model_name(), "enhancing tailored draft");
                let prompt = generator::enhancement_prompt(&draft.content, &job);
                generator.complete(&prompt, self.max_tokens).map_err(Error::External)?
            }
            None => draft.content,
        };

        let resume_id = self.db.save_resume(
            Some(application_id),
            &NewResume {
                content,
                cover_letter: Some(draft.cover_letter),
                file_type: ResumeFileType::PlainText,
                source_name: base.source_name.clone(),
            },
        )?;
        info!(resume_id, application_id, base_resume_id, "tailored resume stored");
        self.db.get_resume(resume_id)
    }

    /// Without a profile, the base resume's own skill mentions stand in for
    /// the candidate's skills.
    fn score_base(
        &self,
        base: &Resume,
        profile: Option<&crate::models::CandidateProfile>,
        requirements: &str,
    ) -> JobAnalysis {
        let candidate = match profile {
            Some(profile) => Candidate::from(profile),
            None => Candidate::with_skills(self.scorer.vocabulary().extract(&base.content)),
        };
        self.scorer.score(&candidate, requirements)
    }

    /// Fills the active profile from a base resume's skills and contact
    /// details, creating the profile when there is none. Returns the profile id.
    pub fn update_profile_from_resume(&self, resume_id: i64) -> Result<i64> {
        let resume = self.db.get_resume(resume_id)?;
        if !resume.is_base {
            return Err(Error::Validation(format!(
                "resume #{} is a tailored variant, pick a base resume",
                resume_id
            )));
        }

        let vocabulary = self.scorer.vocabulary();
        let details = profile::from_resume_text(vocabulary, &resume.content);
        debug!(resume_id, skills = details.skills.len(), "read profile details from resume");

        let active = self.db.active_profile()?;
        let mut updated = active.as_ref().map(NewProfile::from).unwrap_or_default();
        details.apply_to(vocabulary, &mut updated)?;

        match active {
            Some(existing) => {
                self.db.update_profile(existing.id, &updated)?;
                Ok(existing.id)
            }
            None => self.db.create_profile(&updated),
        }
    }

    /// Skill demand and top hiring companies across every stored job.
    pub fn trends(&self) -> Result<MarketTrends> {
        let jobs = self.db.list_jobs(None)?;
        Ok(scorer::market_trends(self.scorer.vocabulary(), &jobs))
    }
}
