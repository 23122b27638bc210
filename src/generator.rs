use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

use crate::models::JobPosting;

/// Text completion collaborator used to polish tailored drafts.
pub trait TextGenerator {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
    fn model_name(&self) -> &str;
}

// --- Groq (OpenAI-compatible) ---

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug)]
pub struct GroqGenerator {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl GroqGenerator {
    /// Reads the API key from the environment variable `api_key_env`.
    pub fn from_env(model_id: &str, api_key_env: &str) -> Result<Self> {
        let api_key = env::var(api_key_env).with_context(|| {
            format!("{api_key_env} environment variable not set. Set it with: export {api_key_env}=your-key-here")
        })?;
        Ok(Self::with_api_key(model_id, api_key))
    }

    pub fn with_api_key(model_id: &str, api_key: String) -> Self {
        Self {
            api_key,
            model_id: model_id.to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn request(&self, prompt: &str, max_tokens: u32) -> ChatRequest {
        ChatRequest {
            model: self.model_id.clone(),
            max_tokens,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }
}

impl TextGenerator for GroqGenerator {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let response = self
            .client
            .post(GROQ_API_URL)
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt, max_tokens))
            .send()
            .context("Failed to send request to Groq API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!("Groq API request failed with status {}: {}", status, error_text));
        }

        let api_response: ChatResponse = response.json().context("Failed to parse Groq API response")?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("No completion in Groq API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

/// Prompt asking the generator to polish a deterministic draft without
/// inventing experience.
pub fn enhancement_prompt(draft: &str, job: &JobPosting) -> String {
    format!(
        "You are editing a resume that has already been tailored for the role of {title} at {company}.\n\
         Improve wording and flow. Keep every fact, date and skill as written; do not add experience \
         the candidate does not list. Keep the markdown structure and the **bold** skill emphasis.\n\
         Return only the revised resume.\n\n\
         Job requirements:\n{requirements}\n\n\
         Draft resume:\n{draft}",
        title = job.title,
        company = job.company,
        requirements = job.requirement_text(),
        draft = draft,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_missing_api_key_names_variable() {
        let err = GroqGenerator::from_env("llama-3.1-8b-instant", "JOBMATCH_TEST_UNSET_KEY_7F2C").unwrap_err();
        assert!(err.to_string().contains("JOBMATCH_TEST_UNSET_KEY_7F2C"));
    }

    #[test]
    fn test_request_body_is_openai_compatible() {
        let generator = GroqGenerator::with_api_key("llama-3.1-8b-instant", "k".into());
        assert_eq!(generator.model_name(), "llama-3.1-8b-instant");
        let body = serde_json::to_value(generator.request("hello", 256)).unwrap();
        assert_eq!(body["model"], "llama-3.1-8b-instant");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Polished"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Polished");
    }

    #[test]
    fn test_enhancement_prompt_carries_job_and_draft() {
        let job = JobPosting {
            id: 1,
            title: "Data Engineer".into(),
            company: "Acme".into(),
            url: "https://acme.test".into(),
            location: None,
            description: None,
            requirements: Some("Python and SQL".into()),
            salary_range: None,
            job_type: None,
            source: None,
            posted_date: None,
            discovered_at: Utc::now(),
        };
        let prompt = enhancement_prompt("# Resume", &job);
        assert!(prompt.contains("Data Engineer at Acme"));
        assert!(prompt.contains("Python and SQL"));
        assert!(prompt.ends_with("# Resume"));
    }
}
