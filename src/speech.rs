//! Narration requests against the hosted speech service.
//!
//! One HTTP call per narration: the request carries the page text wrapped in
//! a prosody instruction plus the voice identity, and asks for an audio-only
//! response. The playback rate is deliberately not sent; audio always comes
//! back at a neutral pace and is time-stretched locally (see `playback`).
//! Failures are classified once, here, and never retried.

use crate::error::NarrationError;
use serde::Deserialize;
use serde_json::json;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

/// Voice used when the configuration does not name one.
pub const DEFAULT_VOICE: &str = "Kore";

/// Upper bound applied by callers before submitting text.
pub const MAX_NARRATION_CHARS: usize = 1500;

const SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
const SERVICE_HOST: &str = "generativelanguage.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// The one seam the playback controller talks through. Implementations
/// return the base64 audio payload for a text span, or a classified failure.
pub trait SpeechSource {
    fn fetch_narration(&self, text: &str, voice: &str) -> Result<String, NarrationError>;
}

/// Reachability check performed before a request is issued, so a machine
/// with no network path fails fast as `Offline` instead of timing out.
pub trait ConnectivityProbe {
    fn is_online(&self) -> bool;
}

/// Probe that attempts a short TCP connect to the speech service host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceProbe;

impl ConnectivityProbe for ServiceProbe {
    fn is_online(&self) -> bool {
        let Ok(mut addrs) = (SERVICE_HOST, 443u16).to_socket_addrs() else {
            return false;
        };
        addrs.any(|addr| TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok())
    }
}

/// Blocking client for the hosted TTS endpoint.
pub struct SpeechClient<P = ServiceProbe> {
    api_key: Option<String>,
    // Builder failure is kept and reported per request instead of panicking
    // at construction; a session without narration still opens.
    http: Result<reqwest::blocking::Client, String>,
    probe: P,
}

impl SpeechClient<ServiceProbe> {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_probe(api_key, ServiceProbe)
    }
}

impl<P: ConnectivityProbe> SpeechClient<P> {
    pub fn with_probe(api_key: Option<String>, probe: P) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| err.to_string());
        Self {
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            http,
            probe,
        }
    }

    fn endpoint(key: &str) -> String {
        format!(
            "https://{SERVICE_HOST}/v1beta/models/{SPEECH_MODEL}:generateContent?key={key}"
        )
    }
}

impl<P: ConnectivityProbe> SpeechSource for SpeechClient<P> {
    fn fetch_narration(&self, text: &str, voice: &str) -> Result<String, NarrationError> {
        // Reachability is checked before anything else: a machine with no
        // network path reports Offline even when credentials are also
        // absent, so the user is not sent off to configure a key first.
        if !self.probe.is_online() {
            return Err(NarrationError::Offline);
        }
        let key = self.api_key.as_deref().ok_or(NarrationError::KeyMissing)?;
        let http = self
            .http
            .as_ref()
            .map_err(|err| NarrationError::Unknown(format!("HTTP client unavailable: {err}")))?;

        debug!(voice, chars = text.chars().count(), "Requesting narration");
        let body = narration_request(text, voice);
        let response = http
            .post(Self::endpoint(key))
            .json(&body)
            .send()
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "Speech service rejected request");
            return Err(NarrationError::from_http_status(status.as_u16(), &detail));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|err| NarrationError::Unknown(format!("unreadable response: {err}")))?;
        parsed
            .into_audio_payload()
            .ok_or(NarrationError::EmptyResponse)
    }
}

/// Build the request body: prosody instruction + text, voice identity, and
/// an audio-only response modality. The rate never appears here.
fn narration_request(text: &str, voice: &str) -> serde_json::Value {
    json!({
        "contents": [{
            "parts": [{ "text": prosody_prompt(text) }]
        }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice }
                }
            }
        }
    })
}

fn prosody_prompt(text: &str) -> String {
    format!("Read the following text aloud in a clear, natural, steady voice: {text}")
}

fn classify_transport(err: reqwest::Error) -> NarrationError {
    if err.is_connect() || err.is_timeout() {
        NarrationError::Network(err.to_string())
    } else {
        NarrationError::Unknown(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: Option<String>,
}

impl GenerateContentResponse {
    fn into_audio_payload(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .find_map(|part| part.inline_data?.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOnline;
    impl ConnectivityProbe for AlwaysOnline {
        fn is_online(&self) -> bool {
            true
        }
    }

    struct NeverOnline;
    impl ConnectivityProbe for NeverOnline {
        fn is_online(&self) -> bool {
            false
        }
    }

    #[test]
    fn missing_key_is_classified_without_issuing_a_request() {
        let client = SpeechClient::with_probe(None, AlwaysOnline);
        assert_eq!(
            client.fetch_narration("hello", DEFAULT_VOICE),
            Err(NarrationError::KeyMissing)
        );
        // Blank credentials count as missing too.
        let client = SpeechClient::with_probe(Some("   ".into()), AlwaysOnline);
        assert_eq!(
            client.fetch_narration("hello", DEFAULT_VOICE),
            Err(NarrationError::KeyMissing)
        );
    }

    #[test]
    fn offline_probe_short_circuits_the_request() {
        let client = SpeechClient::with_probe(Some("key".into()), NeverOnline);
        assert_eq!(
            client.fetch_narration("hello", DEFAULT_VOICE),
            Err(NarrationError::Offline)
        );
    }

    #[test]
    fn offline_outranks_missing_credentials() {
        // No network path and no key: the machine being unreachable is the
        // answer, not a (persistent) credential prompt.
        let client = SpeechClient::with_probe(None, NeverOnline);
        assert_eq!(
            client.fetch_narration("hello", DEFAULT_VOICE),
            Err(NarrationError::Offline)
        );
    }

    #[test]
    fn client_construction_failure_is_reported_per_request() {
        let client = SpeechClient {
            api_key: Some("key".into()),
            http: Err("no TLS backend".into()),
            probe: AlwaysOnline,
        };
        assert!(matches!(
            client.fetch_narration("hello", DEFAULT_VOICE),
            Err(NarrationError::Unknown(_))
        ));
    }

    #[test]
    fn request_body_carries_voice_and_audio_modality_but_no_rate() {
        let body = narration_request("Hello world", "Kore");
        let rendered = body.to_string();
        assert!(rendered.contains("Hello world"));
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Kore"
        );
        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
        assert!(!rendered.contains("rate"));
        assert!(!rendered.contains("speed"));
    }

    #[test]
    fn audio_payload_is_extracted_from_the_first_candidate() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "ignored" },
                        { "inlineData": { "mimeType": "audio/pcm", "data": "QUJD" } }
                    ]
                }
            }]
        });
        let parsed: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.into_audio_payload().as_deref(), Some("QUJD"));
    }

    #[test]
    fn responses_without_audio_yield_none() {
        let raw = serde_json::json!({ "candidates": [{ "content": { "parts": [] } }] });
        let parsed: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.into_audio_payload(), None);

        let parsed: GenerateContentResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(parsed.into_audio_payload(), None);
    }
}
