use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use jobmatch::config::Config;
use jobmatch::generator::GroqGenerator;
use jobmatch::models::{ApplicationStatus, JobType, NewJobPosting, NewProfile, NewResume, ResumeFileType, SkillList};
use jobmatch::sources::{JsonFileSource, SearchQuery};
use jobmatch::{logging, Pipeline};

#[derive(Parser)]
#[command(name = "jobmatch")]
#[command(about = "Job matching and tracking - score postings, track applications, tailor resumes")]
struct Cli {
    /// Config file (default: <config dir>/jobmatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Add a job posting by hand
    Add {
        title: String,
        company: String,
        url: String,

        #[arg(short, long)]
        location: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        requirements: Option<String>,

        #[arg(long)]
        salary: Option<String>,

        /// full-time, part-time, contract or internship
        #[arg(short = 't', long)]
        job_type: Option<JobType>,
    },

    /// Import scraped postings from a JSON file
    Import {
        file: PathBuf,

        /// Only import postings matching these keywords
        #[arg(short, long, default_value = "")]
        keywords: String,

        #[arg(short, long)]
        location: Option<String>,

        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Search stored jobs by keyword
    Search {
        keywords: Vec<String>,

        /// Location substring
        #[arg(short, long)]
        location: Option<String>,

        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show job details
    Show {
        /// Job ID
        id: i64,
    },

    /// Back-fill a job's description or requirements
    Enrich {
        /// Job ID
        id: i64,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        requirements: Option<String>,
    },

    /// Start tracking a job as an application
    Track {
        /// Job ID
        job_id: i64,
    },

    /// List applications
    Apps {
        /// Filter by status (found, applied, interview, rejected, hired, withdrawn)
        #[arg(short, long)]
        status: Option<ApplicationStatus>,
    },

    /// Move an application to a new status
    Status {
        application_id: i64,
        status: ApplicationStatus,

        /// Fail unless the application is currently in this status
        #[arg(long)]
        expect: Option<ApplicationStatus>,
    },

    /// Show an application's status history
    History { application_id: i64 },

    /// Score an application against the active profile
    Analyze { application_id: i64 },

    /// List past analyses of an application
    Analyses { application_id: i64 },

    /// Most demanded skills and top hiring companies
    Trends,

    /// Application counts by status
    Stats,

    /// Manage the candidate profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Manage resumes
    Resume {
        #[command(subcommand)]
        command: ResumeCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create or update the active profile
    Set {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        linkedin: Option<String>,

        #[arg(long)]
        github: Option<String>,

        /// Comma-separated skills
        #[arg(short, long)]
        skills: Option<String>,

        /// Years of professional experience
        #[arg(short, long)]
        experience: Option<u32>,

        /// Education entry (repeatable)
        #[arg(long = "education")]
        education: Vec<String>,

        /// Create a new profile instead of updating the active one
        #[arg(long)]
        new: bool,
    },

    /// Show the active profile
    Show,
}

#[derive(Subcommand)]
enum ResumeCommands {
    /// Add a base resume from a text file
    Add {
        /// Path to resume text
        file: PathBuf,

        /// Original document type when the text was extracted (pdf, docx, plain-text)
        #[arg(short = 't', long)]
        file_type: Option<ResumeFileType>,

        /// Fill the active profile with skills and contact details from this resume
        #[arg(long)]
        update_profile: bool,
    },

    /// List base resumes
    List,

    /// Show a resume
    Show {
        /// Resume ID
        id: i64,
    },

    /// Generate a tailored resume variant for an application
    Tailor {
        application_id: i64,

        /// Base resume ID
        #[arg(short, long)]
        resume: i64,

        /// Polish the draft with the configured text generator
        #[arg(long)]
        enhance: bool,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List resume variants for an application
    Variants { application_id: i64 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let db = config
        .open_database()
        .with_context(|| format!("Failed to open database at {}", config.database_path().display()))?;

    if !matches!(cli.command, Commands::Init) {
        db.ensure_initialized()?;
    }

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", config.database_path().display());
        }

        Commands::Add {
            title,
            company,
            url,
            location,
            description,
            requirements,
            salary,
            job_type,
        } => {
            let job_id = db.insert_job(&NewJobPosting {
                title,
                company,
                url,
                location,
                description,
                requirements,
                salary_range: salary,
                job_type,
                source: Some("manual".to_string()),
                posted_date: None,
            })?;
            println!("Added job #{}", job_id);
        }

        Commands::Import {
            file,
            keywords,
            location,
            limit,
        } => {
            let pipeline = Pipeline::new(&db, config.scorer()?);
            let mut query = SearchQuery::new(&keywords, location.as_deref());
            if let Some(limit) = limit {
                query = query.with_limit(limit);
            }
            let stats = pipeline.ingest(&JsonFileSource::new(file), &query)?;
            println!(
                "Fetched {} posting(s): {} added, {} duplicate(s), {} invalid",
                stats.fetched, stats.jobs_added, stats.duplicates, stats.errors
            );
        }

        Commands::Search {
            keywords,
            location,
            limit,
        } => {
            let results = db.find_jobs(&keywords, location.as_deref())?;
            if results.is_empty() {
                println!("No jobs found.");
            } else {
                println!("{:<6} {:>9} {:<30} {:<20} {:<20}", "ID", "RELEVANCE", "TITLE", "COMPANY", "LOCATION");
                println!("{}", "-".repeat(89));
                for (job, relevance) in results.into_iter().take(limit) {
                    println!(
                        "{:<6} {:>9.1} {:<30} {:<20} {:<20}",
                        job.id,
                        relevance,
                        truncate(&job.title, 28),
                        truncate(&job.company, 18),
                        truncate(job.location.as_deref().unwrap_or("-"), 18)
                    );
                }
            }
        }

        Commands::Show { id } => {
            let job = db.get_job(id)?;
            println!("Job #{}", job.id);
            println!("Title: {}", job.title);
            println!("Company: {}", job.company);
            println!("URL: {}", job.url);
            if let Some(location) = &job.location {
                println!("Location: {}", location);
            }
            if let Some(job_type) = job.job_type {
                println!("Type: {}", job_type);
            }
            if let Some(salary) = &job.salary_range {
                println!("Salary: {}", salary);
            }
            if let Some(source) = &job.source {
                println!("Source: {}", source);
            }
            if let Some(posted) = &job.posted_date {
                println!("Posted: {}", posted);
            }
            println!("Discovered: {}", job.discovered_at.format("%Y-%m-%d %H:%M"));
            if let Some(requirements) = &job.requirements {
                println!("\n--- Requirements ---\n{}", requirements);
            }
            if let Some(description) = &job.description {
                println!("\n--- Description ---\n{}", description);
            }
        }

        Commands::Enrich {
            id,
            description,
            requirements,
        } => {
            db.enrich_job(id, description.as_deref(), requirements.as_deref())?;
            println!("Updated job #{}", id);
        }

        Commands::Track { job_id } => {
            let pipeline = Pipeline::new(&db, config.scorer()?);
            let application_id = pipeline.track(job_id)?;
            println!("Tracking job #{} as application #{}", job_id, application_id);
        }

        Commands::Apps { status } => {
            let applications = db.list_applications(status)?;
            if applications.is_empty() {
                println!("No applications found.");
            } else {
                println!("{:<6} {:<11} {:>6} {:<30} {:<20}", "ID", "STATUS", "SCORE", "TITLE", "COMPANY");
                println!("{}", "-".repeat(77));
                for app in applications {
                    let job = db.get_job(app.job_id)?;
                    println!(
                        "{:<6} {:<11} {:>6} {:<30} {:<20}",
                        app.id,
                        app.status,
                        format_score(app.compatibility_score),
                        truncate(&job.title, 28),
                        truncate(&job.company, 18)
                    );
                }
            }
        }

        Commands::Status {
            application_id,
            status,
            expect,
        } => {
            match expect {
                Some(expected) => db.update_status_from(application_id, expected, status)?,
                None => db.update_status(application_id, status)?,
            }
            println!("Application #{} is now {}", application_id, status);
        }

        Commands::History { application_id } => {
            let events = db.status_history(application_id)?;
            println!("{:<20} {:<11} {:<11}", "WHEN", "FROM", "TO");
            println!("{}", "-".repeat(44));
            for event in events {
                println!(
                    "{:<20} {:<11} {:<11}",
                    event.changed_at.format("%Y-%m-%d %H:%M:%S"),
                    event.from_status.map_or("-".to_string(), |s| s.to_string()),
                    event.to_status
                );
            }
        }

        Commands::Analyze { application_id } => {
            let pipeline = Pipeline::new(&db, config.scorer()?);
            let record = pipeline.analyze(application_id)?;
            let analysis = &record.analysis;
            println!("Analysis #{} for application #{}", record.id, application_id);
            println!("Overall:    {:>6.2}", analysis.overall_score);
            println!("Skills:     {:>6.2}", analysis.skill_match_score);
            println!("Experience: {:>6.2}", analysis.experience_match_score);
            println!("Education:  {:>6.2}", analysis.education_match_score);
            println!("\nMatching: {}", or_dash(&analysis.matching_skills.to_string()));
            println!("Missing:  {}", or_dash(&analysis.missing_skills.to_string()));
            println!("\nRecommendations:");
            for item in &analysis.recommendations {
                println!("  - {}", item);
            }
        }

        Commands::Analyses { application_id } => {
            let records = db.list_analyses(application_id)?;
            if records.is_empty() {
                println!("No analyses for application #{}.", application_id);
            } else {
                println!("{:<6} {:<17} {:>7} {:>7} {:>7} {:>7}", "ID", "WHEN", "OVERALL", "SKILL", "EXP", "EDU");
                println!("{}", "-".repeat(57));
                for record in records {
                    let a = &record.analysis;
                    println!(
                        "{:<6} {:<17} {:>7.2} {:>7.2} {:>7.2} {:>7.2}",
                        record.id,
                        record.analyzed_at.format("%Y-%m-%d %H:%M"),
                        a.overall_score,
                        a.skill_match_score,
                        a.experience_match_score,
                        a.education_match_score
                    );
                }
            }
        }

        Commands::Trends => {
            let pipeline = Pipeline::new(&db, config.scorer()?);
            let trends = pipeline.trends()?;
            println!("Jobs analyzed: {}", trends.jobs_analyzed);
            println!("\nMost demanded skills:");
            for (skill, count) in &trends.most_demanded_skills {
                println!("  {:<24} {:>4}", skill, count);
            }
            println!("\nTop hiring companies:");
            for (company, count) in &trends.top_hiring_companies {
                println!("  {:<24} {:>4}", truncate(company, 24), count);
            }
        }

        Commands::Stats => {
            let counts = db.status_counts()?;
            let total: i64 = counts.iter().map(|(_, c)| c).sum();
            println!("{:<11} {:>6}", "STATUS", "COUNT");
            println!("{}", "-".repeat(18));
            for (status, count) in counts {
                println!("{:<11} {:>6}", status, count);
            }
            println!("{}", "-".repeat(18));
            println!("{:<11} {:>6}", "total", total);
        }

        Commands::Profile { command } => match command {
            ProfileCommands::Set {
                name,
                email,
                phone,
                linkedin,
                github,
                skills,
                experience,
                education,
                new,
            } => {
                let active = if new { None } else { db.active_profile()? };
                let mut profile = active.as_ref().map(NewProfile::from).unwrap_or_default();

                profile.name = name.or(profile.name);
                profile.email = email.or(profile.email);
                profile.phone = phone.or(profile.phone);
                profile.linkedin_url = linkedin.or(profile.linkedin_url);
                profile.github_url = github.or(profile.github_url);
                if let Some(skills) = skills {
                    profile.skills = SkillList::from_csv(&skills)?;
                }
                if let Some(years) = experience {
                    profile.experience_years = years;
                }
                if !education.is_empty() {
                    profile.education = SkillList::new(education)?;
                }

                match active {
                    Some(existing) => {
                        db.update_profile(existing.id, &profile)?;
                        println!("Updated profile #{}", existing.id);
                    }
                    None => {
                        let id = db.create_profile(&profile)?;
                        println!("Created profile #{} (active)", id);
                    }
                }
            }

            ProfileCommands::Show => match db.active_profile()? {
                Some(profile) => {
                    println!("Profile #{}", profile.id);
                    if let Some(name) = &profile.name {
                        println!("Name: {}", name);
                    }
                    if let Some(email) = &profile.email {
                        println!("Email: {}", email);
                    }
                    if let Some(phone) = &profile.phone {
                        println!("Phone: {}", phone);
                    }
                    if let Some(url) = &profile.linkedin_url {
                        println!("LinkedIn: {}", url);
                    }
                    if let Some(url) = &profile.github_url {
                        println!("GitHub: {}", url);
                    }
                    println!("Experience: {} year(s)", profile.experience_years);
                    println!("Skills: {}", or_dash(&profile.skills.to_string()));
                    println!("Education:");
                    for entry in &profile.education {
                        println!("  - {}", entry);
                    }
                    println!("Updated: {}", profile.updated_at.format("%Y-%m-%d %H:%M"));
                }
                None => println!("No active profile. Create one with 'jobmatch profile set'."),
            },
        },

        Commands::Resume { command } => match command {
            ResumeCommands::Add {
                file,
                file_type,
                update_profile,
            } => {
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read resume file: {}", file.display()))?;
                let file_type = file_type
                    .or_else(|| {
                        file.extension()
                            .and_then(|e| e.to_str())
                            .and_then(ResumeFileType::from_extension)
                    })
                    .unwrap_or(ResumeFileType::PlainText);
                let source_name = file.file_name().map(|n| n.to_string_lossy().into_owned());

                let resume_id = db.save_resume(
                    None,
                    &NewResume {
                        content,
                        cover_letter: None,
                        file_type,
                        source_name,
                    },
                )?;
                println!("Added base resume #{} ({})", resume_id, file_type);

                if update_profile {
                    let pipeline = Pipeline::new(&db, config.scorer()?);
                    let profile_id = pipeline.update_profile_from_resume(resume_id)?;
                    println!("Updated profile #{} from resume", profile_id);
                }
            }

            ResumeCommands::List => {
                let resumes = db.base_resumes()?;
                if resumes.is_empty() {
                    println!("No base resumes found.");
                } else {
                    println!("{:<6} {:<24} {:<11} {:<20}", "ID", "SOURCE", "TYPE", "CREATED");
                    println!("{}", "-".repeat(64));
                    for resume in resumes {
                        println!(
                            "{:<6} {:<24} {:<11} {:<20}",
                            resume.id,
                            truncate(resume.source_name.as_deref().unwrap_or("-"), 22),
                            resume.file_type,
                            resume.created_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
            }

            ResumeCommands::Show { id } => {
                let resume = db.get_resume(id)?;
                match resume.application_id {
                    Some(app_id) => println!("Resume #{} (tailored for application #{})", resume.id, app_id),
                    None => println!("Resume #{} (base)", resume.id),
                }
                if let Some(source) = &resume.source_name {
                    println!("Source: {}", source);
                }
                println!("Type: {}", resume.file_type);
                println!("Created: {}", resume.created_at.format("%Y-%m-%d %H:%M"));
                println!("\n--- Content ---\n{}", resume.content);
                if let Some(letter) = &resume.cover_letter {
                    println!("\n--- Cover Letter ---\n{}", letter);
                }
            }

            ResumeCommands::Tailor {
                application_id,
                resume,
                enhance,
                output,
            } => {
                let pipeline = Pipeline::new(&db, config.scorer()?).with_max_tokens(config.generator.max_tokens);
                let generator = if enhance {
                    Some(GroqGenerator::from_env(&config.generator.model, &config.generator.api_key_env)?)
                } else {
                    None
                };
                let tailored = pipeline.tailor(
                    application_id,
                    resume,
                    generator.as_ref().map(|g| g as &dyn jobmatch::generator::TextGenerator),
                )?;

                if let Some(out_path) = output {
                    std::fs::write(&out_path, &tailored.content)
                        .with_context(|| format!("Failed to write to {}", out_path.display()))?;
                    println!("Tailored resume #{} saved to: {}", tailored.id, out_path.display());
                } else {
                    println!("Tailored resume for application #{} (resume #{})", application_id, tailored.id);
                    println!("\n--- Tailored Resume ---\n{}", tailored.content);
                }
                if let Some(letter) = &tailored.cover_letter {
                    println!("\n--- Cover Letter ---\n{}", letter);
                }
            }

            ResumeCommands::Variants { application_id } => {
                db.get_application(application_id)?;
                let variants = db.resumes_for_application(application_id)?;
                if variants.is_empty() {
                    println!("No resume variants found for application #{}.", application_id);
                } else {
                    println!("{:<6} {:<24} {:<20}", "ID", "SOURCE", "CREATED");
                    println!("{}", "-".repeat(52));
                    for variant in variants {
                        println!(
                            "{:<6} {:<24} {:<20}",
                            variant.id,
                            truncate(variant.source_name.as_deref().unwrap_or("-"), 22),
                            variant.created_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
            }
        },
    }

    Ok(())
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{:.1}", s))
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
