//! Generated fertilizer advisory.
//!
//! Builds a fixed prompt from a record and its stress level and sends it to an
//! OpenAI-compatible chat completion endpoint (the Hugging Face router by
//! default). Failures are typed internally and only turned into the
//! `"AI Error: ..."` text by [`render_advice`], so one record's advisory
//! failure never stops a batch.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AdvisorySettings;
use crate::error::AdvisoryError;
use crate::features::FeatureRow;
use crate::model::StressLabel;

pub const CROP_NAME: &str = "Paddy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Body of a `/chat/completions` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// External text-completion collaborator. Blocking.
pub trait TextCompletion: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, AdvisoryError>;
}

pub type AdvisoryOutcome = Result<String, AdvisoryError>;

/// Prompt for one record. Values are printed as given; absent inputs are 0.
pub fn build_prompt(row: &FeatureRow, stress: &StressLabel) -> String {
    format!(
        "
You are an agriculture expert.

Crop: {CROP_NAME}
Stress Level: {stress}

Field data:
- Urea at 40 days: {urea} kg
- DAP at 20 days: {dap} kg
- Potash at 50 days: {potash} kg
- Rainfall (30 days): {rain} mm

Provide:
1. Fertilizer name
2. Quantity (kg per hectare)
3. Best time to apply
4. Short explanation

Use simple farmer-friendly English.
",
        urea = row.urea_40days,
        dap = row.dap_20days,
        potash = row.potash_50days,
        rain = row.rainfall_30d_mm,
    )
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Hugging Face router client (OpenAI-compatible chat completions).
pub struct HfRouterClient {
    http: Client,
    base_url: String,
    token: String,
}

impl HfRouterClient {
    /// Must not be called from inside an async context (blocking client).
    pub fn new(token: String, settings: &AdvisorySettings) -> Result<Self, AdvisoryError> {
        let http = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

impl TextCompletion for HfRouterClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, AdvisoryError> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body: String = resp.text().unwrap_or_default().chars().take(300).collect();
            return Err(AdvisoryError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletion = resp
            .json()
            .map_err(|e| AdvisoryError::MalformedResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AdvisoryError::MalformedResponse("no message content".into()))
    }
}

fn transport(e: reqwest::Error) -> AdvisoryError {
    if e.is_timeout() {
        return AdvisoryError::Transport("timeout".into());
    }
    AdvisoryError::Transport(e.to_string())
}

/// Builds advisory requests and runs them against the configured collaborator.
#[derive(Clone)]
pub struct FertilizerAdvisor {
    client: Option<Arc<dyn TextCompletion>>,
    settings: AdvisorySettings,
}

impl FertilizerAdvisor {
    pub fn new(client: Option<Arc<dyn TextCompletion>>, settings: AdvisorySettings) -> Self {
        Self { client, settings }
    }

    /// No credential: every advisory reports `MissingCredential`.
    pub fn unconfigured() -> Self {
        Self::new(None, AdvisorySettings::default())
    }

    /// Router client when a token is present, otherwise unconfigured.
    pub fn from_token(token: Option<String>, settings: AdvisorySettings) -> Result<Self, AdvisoryError> {
        let client = match token {
            Some(token) => Some(Arc::new(HfRouterClient::new(token, &settings)?) as Arc<dyn TextCompletion>),
            None => None,
        };
        Ok(Self::new(client, settings))
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn request(&self, row: &FeatureRow, stress: &StressLabel) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: build_prompt(row, stress),
            }],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }

    pub fn advise(&self, row: &FeatureRow, stress: &StressLabel) -> AdvisoryOutcome {
        let client = self.client.as_ref().ok_or(AdvisoryError::MissingCredential)?;
        client.complete(&self.request(row, stress))
    }
}

/// Display text for an advisory outcome.
pub fn render_advice(outcome: &AdvisoryOutcome) -> String {
    match outcome {
        Ok(text) => text.clone(),
        Err(e) => format!("AI Error: {e}"),
    }
}

/// Advisory text for one record; failures come back as `"AI Error: ..."`.
pub fn ai_fertilizer_advice(advisor: &FertilizerAdvisor, row: &FeatureRow, stress: &StressLabel) -> String {
    let outcome = advisor.advise(row, stress);
    match &outcome {
        // reported once at startup
        Err(AdvisoryError::MissingCredential) => {}
        Err(e) => tracing::warn!("advisory unavailable: {}", e),
        Ok(_) => {}
    }
    render_advice(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Records requests and answers with a fixed outcome.
    struct Recorder {
        seen: Mutex<Vec<CompletionRequest>>,
        reply: AdvisoryOutcome,
    }

    impl TextCompletion for Recorder {
        fn complete(&self, request: &CompletionRequest) -> Result<String, AdvisoryError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    fn row() -> FeatureRow {
        FeatureRow {
            urea_40days: 60.0,
            dap_20days: 120.0,
            potash_50days: 50.0,
            rainfall_30d_mm: 100.0,
            ..FeatureRow::default()
        }
    }

    #[test]
    fn test_missing_token_sentinel() {
        let advisor = FertilizerAdvisor::unconfigured();
        assert_eq!(
            ai_fertilizer_advice(&advisor, &row(), &StressLabel::from("High")),
            "AI Error: HF_TOKEN not found"
        );
    }

    #[test]
    fn test_remote_error_is_wrapped() {
        let recorder = Arc::new(Recorder {
            seen: Default::default(),
            reply: Err(AdvisoryError::Transport("timeout".into())),
        });
        let advisor = FertilizerAdvisor::new(Some(recorder), AdvisorySettings::default());
        assert_eq!(
            ai_fertilizer_advice(&advisor, &row(), &StressLabel::High),
            "AI Error: timeout"
        );
    }

    #[test]
    fn test_success_passes_text_through() {
        let recorder = Arc::new(Recorder {
            seen: Default::default(),
            reply: Ok("Apply 25 kg urea per hectare.".into()),
        });
        let advisor = FertilizerAdvisor::new(Some(recorder.clone()), AdvisorySettings::default());
        let text = ai_fertilizer_advice(&advisor, &row(), &StressLabel::Medium);
        assert_eq!(text, "Apply 25 kg urea per hectare.");

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "moonshotai/Kimi-K2-Instruct-0905");
        assert_eq!(seen[0].temperature, 0.3);
        assert_eq!(seen[0].max_tokens, 400);
        assert_eq!(seen[0].messages[0].role, "user");
    }

    #[test]
    fn test_prompt_embeds_values() {
        let prompt = build_prompt(&row(), &StressLabel::High);
        assert!(prompt.contains("Crop: Paddy"));
        assert!(prompt.contains("Stress Level: High"));
        assert!(prompt.contains("- Urea at 40 days: 60 kg"));
        assert!(prompt.contains("- DAP at 20 days: 120 kg"));
        assert!(prompt.contains("- Potash at 50 days: 50 kg"));
        assert!(prompt.contains("- Rainfall (30 days): 100 mm"));
        assert!(prompt.contains("2. Quantity (kg per hectare)"));
        assert!(prompt.contains("Use simple farmer-friendly English."));
    }

    #[test]
    fn test_status_error_rendering() {
        let outcome: AdvisoryOutcome = Err(AdvisoryError::Status {
            code: 429,
            body: "rate limited".into(),
        });
        assert_eq!(render_advice(&outcome), "AI Error: HTTP 429: rate limited");
    }

    /// One-shot HTTP server on an ephemeral port. Answers the first request
    /// after `delay` with `status` and a JSON `body`, then hands back the raw
    /// request it received.
    fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            // headers, then as much body as content-length announces
            loop {
                let n = stream.read(&mut chunk).unwrap_or(0);
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let want = text[..end]
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + want {
                        break;
                    }
                }
            }
            thread::sleep(delay);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
            String::from_utf8_lossy(&buf).into_owned()
        });
        (base_url, handle)
    }

    fn router_client(base_url: String) -> HfRouterClient {
        let settings = AdvisorySettings {
            base_url,
            timeout_secs: 1,
            ..AdvisorySettings::default()
        };
        HfRouterClient::new("hf_test".into(), &settings).unwrap()
    }

    fn advisor_request() -> CompletionRequest {
        FertilizerAdvisor::unconfigured().request(&row(), &StressLabel::High)
    }

    #[test]
    fn test_router_success_returns_first_choice() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"Apply 30 kg urea."}}]}"#,
            Duration::ZERO,
        );
        let text = router_client(base_url).complete(&advisor_request()).unwrap();
        assert_eq!(text, "Apply 30 kg urea.");

        let seen = server.join().unwrap();
        assert!(seen.starts_with("POST /v1/chat/completions "));
        assert!(seen.to_lowercase().contains("authorization: bearer hf_test"));
        assert!(seen.contains("\"max_tokens\":400"));
        assert!(seen.contains("Stress Level: High"));
    }

    #[test]
    fn test_router_rate_limit_is_status_error() {
        let (base_url, server) = serve_once(
            "429 Too Many Requests",
            r#"{"error":"rate limited"}"#,
            Duration::ZERO,
        );
        let outcome = router_client(base_url).complete(&advisor_request());
        assert_eq!(
            outcome,
            Err(AdvisoryError::Status {
                code: 429,
                body: r#"{"error":"rate limited"}"#.into(),
            })
        );
        assert_eq!(render_advice(&outcome), r#"AI Error: HTTP 429: {"error":"rate limited"}"#);
        server.join().unwrap();
    }

    #[test]
    fn test_router_empty_choices_is_malformed() {
        let (base_url, server) = serve_once("200 OK", r#"{"choices":[]}"#, Duration::ZERO);
        let outcome = router_client(base_url).complete(&advisor_request());
        assert!(matches!(outcome, Err(AdvisoryError::MalformedResponse(_))));
        server.join().unwrap();
    }

    #[test]
    fn test_router_null_content_is_malformed() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#,
            Duration::ZERO,
        );
        let outcome = router_client(base_url).complete(&advisor_request());
        assert_eq!(
            outcome,
            Err(AdvisoryError::MalformedResponse("no message content".into()))
        );
        server.join().unwrap();
    }

    #[test]
    fn test_router_non_json_body_is_malformed() {
        let (base_url, server) = serve_once("200 OK", "<html>gateway</html>", Duration::ZERO);
        let outcome = router_client(base_url).complete(&advisor_request());
        assert!(matches!(outcome, Err(AdvisoryError::MalformedResponse(_))));
        server.join().unwrap();
    }

    #[test]
    fn test_router_slow_reply_renders_timeout() {
        let (base_url, server) = serve_once("200 OK", r#"{"choices":[]}"#, Duration::from_secs(3));
        let client: Arc<dyn TextCompletion> = Arc::new(router_client(base_url));
        let advisor = FertilizerAdvisor::new(Some(client), AdvisorySettings::default());
        assert_eq!(
            ai_fertilizer_advice(&advisor, &row(), &StressLabel::High),
            "AI Error: timeout"
        );
        server.join().unwrap();
    }
}
