use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

pub const DEFAULT_LANGUAGE: &str = "ko-KR";
pub const DEFAULT_HISTORY_WINDOW: usize = 10;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";
pub const DEFAULT_OPENAI_TTS_MODEL: &str = "tts-1";
pub const DEFAULT_OPENAI_TTS_VOICE: &str = "nova";
pub const HISTORY_CACHE_KEY: &str = "cat_talk_history";
pub const APP_DIR_NAME: &str = "talking-cat";

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_ELEVENLABS_API_KEY: &str = "ELEVENLABS_API_KEY";
pub const ENV_ELEVENLABS_VOICE_ID: &str = "ELEVENLABS_VOICE_ID";
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_ANIMAL_CLASSIFIER_URL: &str = "ANIMAL_CLASSIFIER_URL";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeys {
    pub openai: Option<ApiKey>,
    pub elevenlabs: Option<ApiKey>,
}

/// How many of the most recent turns are sent as chat context.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryWindow(usize);

impl HistoryWindow {
    pub fn new(turns: usize) -> Result<Self, ConfigError> {
        if turns == 0 {
            return Err(ConfigError::ZeroHistoryWindow);
        }
        Ok(Self(turns))
    }

    pub fn turns(&self) -> usize {
        self.0
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self(DEFAULT_HISTORY_WINDOW)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameInterval {
    pub millis: u64,
}

impl FrameInterval {
    pub fn new(millis: u64) -> Result<Self, ConfigError> {
        if millis == 0 {
            return Err(ConfigError::ZeroFrameInterval);
        }
        Ok(Self { millis })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }
}

impl Default for FrameInterval {
    fn default() -> Self {
        Self {
            millis: DEFAULT_FRAME_INTERVAL_MS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: Url,
    pub anon_key: ApiKey,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PiperConfig {
    pub binary: PathBuf,
    pub model: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub api_keys: ApiKeys,
    pub elevenlabs_voice_id: Option<String>,
    pub supabase: Option<SupabaseConfig>,
    pub piper: Option<PiperConfig>,
    pub classifier_url: Option<Url>,
    pub history_window: HistoryWindow,
    pub frame_interval: FrameInterval,
    pub data_dir: PathBuf,
    pub language: String,
}

impl AppConfig {
    pub fn history_cache_path(&self) -> PathBuf {
        history_cache_path(&self.data_dir)
    }
}

pub fn history_cache_path(data_dir: &Path) -> PathBuf {
    data_dir.join(format!("{HISTORY_CACHE_KEY}.json"))
}

/// Platform data directory for the history cache, falling back to the
/// working directory when the platform reports none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("history window must be > 0 turns")]
    ZeroHistoryWindow,
    #[error("frame interval must be > 0 ms")]
    ZeroFrameInterval,
    #[error("invalid url {0:?}: {1}")]
    InvalidUrl(String, url::ParseError),
    #[error("{0} is set but {1} is missing")]
    Incomplete(&'static str, &'static str),
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match resolve_optional_string(cli_value, env_key, env) {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => Ok(None),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
    .filter(|v| !v.trim().is_empty())
}

pub fn resolve_url(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<Url>, ConfigError> {
    match resolve_optional_string(cli_value, env_key, env) {
        Some(raw) => Url::parse(&raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidUrl(raw, e)),
        None => Ok(None),
    }
}

/// Supabase needs both the project url and the anon key; one without the
/// other is a configuration mistake rather than "persistence disabled".
pub fn resolve_supabase(
    cli_url: Option<String>,
    cli_key: Option<String>,
    env: &impl Env,
) -> Result<Option<SupabaseConfig>, ConfigError> {
    let url = resolve_url(cli_url, ENV_SUPABASE_URL, env)?;
    let key = resolve_api_key(cli_key, ENV_SUPABASE_ANON_KEY, env)?;
    match (url, key) {
        (Some(url), Some(anon_key)) => Ok(Some(SupabaseConfig { url, anon_key })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::Incomplete(
            ENV_SUPABASE_URL,
            ENV_SUPABASE_ANON_KEY,
        )),
        (None, Some(_)) => Err(ConfigError::Incomplete(
            ENV_SUPABASE_ANON_KEY,
            ENV_SUPABASE_URL,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_OPENAI_API_KEY, "env-key");
        let key = resolve_api_key(Some("cli-key".to_owned()), ENV_OPENAI_API_KEY, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "cli-key");
    }

    #[test]
    fn api_key_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_OPENAI_API_KEY, "env-key");
        let key = resolve_api_key(None, ENV_OPENAI_API_KEY, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "env-key");
    }

    #[test]
    fn blank_env_value_counts_as_unset() {
        let env = MapEnv::default().with_var(ENV_ELEVENLABS_API_KEY, "   ");
        let key = resolve_api_key(None, ENV_ELEVENLABS_API_KEY, &env).expect("no error");
        assert!(key.is_none());
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret").expect("valid");
        assert_eq!(format!("{key:?}"), "ApiKey(**redacted**)");
    }

    #[test]
    fn history_window_rejects_zero() {
        assert_eq!(HistoryWindow::new(0), Err(ConfigError::ZeroHistoryWindow));
        assert_eq!(HistoryWindow::default().turns(), DEFAULT_HISTORY_WINDOW);
    }

    #[test]
    fn supabase_requires_both_halves() {
        let env = MapEnv::default().with_var(ENV_SUPABASE_URL, "https://demo.supabase.co");
        assert_eq!(
            resolve_supabase(None, None, &env),
            Err(ConfigError::Incomplete(ENV_SUPABASE_URL, ENV_SUPABASE_ANON_KEY))
        );

        let env = env.with_var(ENV_SUPABASE_ANON_KEY, "anon");
        let cfg = resolve_supabase(None, None, &env)
            .expect("valid")
            .expect("present");
        assert_eq!(cfg.url.host_str(), Some("demo.supabase.co"));
    }

    #[test]
    fn supabase_config_urls_serialize_as_strings() {
        let cfg = SupabaseConfig {
            url: Url::parse("https://demo.supabase.co").expect("valid"),
            anon_key: ApiKey::new("anon").expect("valid"),
        };
        let json = serde_json::to_value(&cfg).expect("serializable");
        assert_eq!(json["url"], "https://demo.supabase.co/");

        let back: SupabaseConfig = serde_json::from_value(json).expect("deserializable");
        assert_eq!(back, cfg);
    }

    #[test]
    fn invalid_url_is_reported() {
        let env = MapEnv::default();
        let err = resolve_url(Some("not a url".to_owned()), ENV_ANIMAL_CLASSIFIER_URL, &env)
            .expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidUrl(raw, _) if raw == "not a url"));
    }

    #[test]
    fn history_cache_path_uses_cache_key() {
        let path = history_cache_path(Path::new("/tmp/cat"));
        assert_eq!(path, PathBuf::from("/tmp/cat/cat_talk_history.json"));
    }
}
