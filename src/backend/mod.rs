//! Backend exchange: one multipart POST per turn.
//!
//! The backend transcribes the utterance, runs the chat model, and returns
//! the reply text plus, usually, synthesized reply audio. One request is
//! outstanding at a time; the controller guarantees it.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info};

/// One completed exchange.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub user_transcript: String,
    pub translated_transcript: String,
    pub assistant_reply: String,
    /// Synthesized reply as WAV bytes. Absence means the backend produced
    /// no audio for this turn, not that the turn failed.
    pub reply_audio: Option<Vec<u8>>,
}

/// Wire shape of a successful response. Extra fields the backend may send
/// (per-step timings and the like) are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnResponse {
    #[serde(default)]
    user_transcript: String,
    #[serde(default)]
    translated_transcript: String,
    #[serde(default)]
    assistant_reply: String,
    #[serde(default)]
    audio_base64: Option<String>,
}

/// Wire shape of a failure body; both fields are best-effort.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Exchange failure: a transport error or a non-2xx response.
#[derive(Debug, Clone)]
pub struct BackendError {
    /// HTTP status, when a response was received at all.
    pub status: Option<u16>,
    pub message: String,
    pub details: Option<String>,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "backend error {}: {}", status, self.message)?,
            None => write!(f, "backend request failed: {}", self.message)?,
        }
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for BackendError {}

impl BackendError {
    /// Build from a non-2xx response body. An unparseable body degrades to
    /// a generic message rather than failing the error path itself.
    fn from_response(status: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        Self {
            status: Some(status),
            message: parsed.error.unwrap_or_else(|| "unknown error".to_string()),
            details: parsed.details,
        }
    }

    fn transport(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        Self {
            status: None,
            message,
            details: None,
        }
    }
}

/// Parse a 2xx body into a [`TurnResult`], decoding the reply audio.
fn parse_turn_response(status: u16, body: &str) -> Result<TurnResult, BackendError> {
    let wire: TurnResponse = serde_json::from_str(body).map_err(|e| BackendError {
        status: Some(status),
        message: format!("malformed response body: {}", e),
        details: None,
    })?;

    let reply_audio = match wire.audio_base64 {
        Some(b64) if !b64.is_empty() => {
            let bytes = BASE64.decode(b64.as_bytes()).map_err(|e| BackendError {
                status: Some(status),
                message: format!("invalid reply audio encoding: {}", e),
                details: None,
            })?;
            Some(bytes)
        }
        _ => None,
    };

    Ok(TurnResult {
        user_transcript: wire.user_transcript,
        translated_transcript: wire.translated_transcript,
        assistant_reply: wire.assistant_reply,
        reply_audio,
    })
}

/// HTTP client for the turn endpoint. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    url: String,
}

impl BackendClient {
    /// `timeout` bounds the whole exchange; a hung backend surfaces as a
    /// transport-level [`BackendError`] instead of stalling the session.
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Send one utterance as `recording.wav`; returns the structured turn.
    pub async fn send(&self, wav: Vec<u8>) -> Result<TurnResult, BackendError> {
        debug!(bytes = wav.len(), url = %self.url, "Uploading utterance");

        let part = multipart::Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| BackendError {
                status: None,
                message: format!("could not build upload form: {}", e),
                details: None,
            })?;
        let form = multipart::Form::new().part("audio", part);

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::transport(&e))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(BackendError::from_response(status.as_u16(), &body));
        }

        let result = parse_turn_response(status.as_u16(), &body)?;
        info!(
            transcript = %result.user_transcript,
            has_audio = result.reply_audio.is_some(),
            "Turn completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    #[test]
    fn success_body_with_audio_decodes() {
        let audio = BASE64.encode(b"RIFF fake wav");
        let body = format!(
            r#"{{"userTranscript":"hello","translatedTranscript":"hello","assistantReply":"hi there","audioBase64":"{}"}}"#,
            audio
        );
        let turn = parse_turn_response(200, &body).unwrap();
        assert_eq!(turn.user_transcript, "hello");
        assert_eq!(turn.assistant_reply, "hi there");
        assert_eq!(turn.reply_audio.as_deref(), Some(&b"RIFF fake wav"[..]));
    }

    #[test]
    fn absent_audio_is_a_variant_not_an_error() {
        let body = r#"{"userTranscript":"u","translatedTranscript":"t","assistantReply":"r"}"#;
        let turn = parse_turn_response(200, body).unwrap();
        assert!(turn.reply_audio.is_none());

        let body = r#"{"userTranscript":"u","translatedTranscript":"t","assistantReply":"r","audioBase64":null}"#;
        let turn = parse_turn_response(200, body).unwrap();
        assert!(turn.reply_audio.is_none());
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let body = r#"{"userTranscript":"u","translatedTranscript":"t","assistantReply":"r","timings":{"asr":0.8},"totalTime":3.2}"#;
        assert!(parse_turn_response(200, body).is_ok());
    }

    #[test]
    fn malformed_success_body_is_a_backend_error() {
        let err = parse_turn_response(200, "not json").unwrap_err();
        assert_eq!(err.status, Some(200));
        assert!(err.message.contains("malformed"));
    }

    #[test]
    fn invalid_audio_encoding_is_a_backend_error() {
        let body = r#"{"userTranscript":"u","translatedTranscript":"t","assistantReply":"r","audioBase64":"%%%"}"#;
        let err = parse_turn_response(200, body).unwrap_err();
        assert!(err.message.contains("reply audio"));
    }

    #[test]
    fn error_body_fields_surface_in_display() {
        let err = BackendError::from_response(500, r#"{"error":"oops","details":"asr down"}"#);
        assert_eq!(err.status, Some(500));
        assert_eq!(err.message, "oops");
        let shown = err.to_string();
        assert!(shown.contains("oops"));
        assert!(shown.contains("asr down"));
    }

    #[test]
    fn partial_and_unparseable_error_bodies_degrade_gracefully() {
        let err = BackendError::from_response(502, r#"{"details":"gateway"}"#);
        assert_eq!(err.message, "unknown error");
        assert_eq!(err.details.as_deref(), Some("gateway"));

        let err = BackendError::from_response(500, "<html>Internal Server Error</html>");
        assert_eq!(err.message, "unknown error");
        assert!(err.details.is_none());

        let err = BackendError::from_response(400, "{}");
        assert_eq!(err.message, "unknown error");
    }
}
