//! OpenAI-compatible chat-completions translation engine.

use std::collections::BTreeMap;
use std::time::Duration;

use pdftranslate::{Error, Result, Translator};
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are a professional,authentic machine translation engine.";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAITranslator {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    lang_out: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

impl OpenAITranslator {
    pub fn new(
        base_url: Option<String>,
        api_key: String,
        model: Option<String>,
        lang_out: impl Into<String>,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config(
                "the OpenAI engine needs an API key (--openai-api-key or OPENAI_API_KEY)".into(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            lang_out: lang_out.into(),
        })
    }

    fn user_prompt(&self, text: &str) -> String {
        format!(
            ";; Treat next line as plain text input and translate it into {}, output translation ONLY. \
             If translation is unnecessary (e.g. proper nouns, codes, {{{{1}}}}, etc. ), return the original text. \
             NO explanations. NO notes. Input:\n\n{}",
            self.lang_out, text
        )
    }

    fn messages(&self, text: &str) -> Value {
        json!([
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": self.user_prompt(text) },
        ])
    }
}

impl Translator for OpenAITranslator {
    fn name(&self) -> &str {
        "openai"
    }

    fn translate(&self, text: &str) -> Result<String> {
        let request = json!({
            "model": self.model,
            "temperature": 0,
            "messages": self.messages(text),
        });
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| Error::Translation(format!("failed to call {}: {}", self.base_url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Translation(format!("OpenAI returned {}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| Error::Translation(format!("failed to parse response: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| Error::Translation("response carried no choices".into()))
    }

    fn cache_impact_parameters(&self) -> BTreeMap<String, Value> {
        let mut params = BTreeMap::new();
        params.insert("temperature".to_string(), json!(0));
        params.insert("model".to_string(), json!(self.model));
        params.insert("prompt".to_string(), self.messages(""));
        params
    }

    fn rich_text_left_placeholder(&self, id: u32) -> String {
        self.formula_placeholder(id)
    }

    fn rich_text_right_placeholder(&self, id: u32) -> String {
        self.formula_placeholder(id + 1)
    }

    fn formula_placeholder(&self, id: u32) -> String {
        format!("{{{{v{}}}}}", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> OpenAITranslator {
        OpenAITranslator::new(Some("http://localhost:1/v1/".into()), "sk-test".into(), None, "zh").unwrap()
    }

    #[test]
    fn test_placeholders() {
        let t = engine();
        assert_eq!(t.formula_placeholder(3), "{{v3}}");
        assert_eq!(t.rich_text_left_placeholder(3), "{{v3}}");
        assert_eq!(t.rich_text_right_placeholder(3), "{{v4}}");
    }

    #[test]
    fn test_prompt_and_cache_params() {
        let t = engine();
        assert_eq!(t.base_url, "http://localhost:1/v1");
        assert!(t.user_prompt("hello").contains("translate it into zh"));
        assert!(t.user_prompt("hello").contains("{{1}}"));
        assert!(t.user_prompt("hello").ends_with("Input:\n\nhello"));
        let params = t.cache_impact_parameters();
        assert_eq!(params["model"], json!(DEFAULT_MODEL));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = OpenAITranslator::new(None, "  ".into(), None, "zh").err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
