#![deny(warnings)]

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use talking_cat_core::capture::{SpeechCapture, StdinRecognizer};
use talking_cat_core::chat::{Conversation, OpenAiChatClient};
use talking_cat_core::config::{
    default_data_dir, resolve_api_key, resolve_optional_string, resolve_supabase, resolve_url,
    ApiKeys, AppConfig, Env, FrameInterval, HistoryWindow, PiperConfig, StdEnv,
    DEFAULT_FRAME_INTERVAL_MS, DEFAULT_HISTORY_WINDOW, DEFAULT_LANGUAGE,
    ENV_ANIMAL_CLASSIFIER_URL, ENV_ELEVENLABS_API_KEY, ENV_ELEVENLABS_VOICE_ID,
    ENV_OPENAI_API_KEY,
};
use talking_cat_core::emotion::SmoothingPolicy;
use talking_cat_core::face::{DetectionHandle, DetectionLoop, FaceState, RecordedFaceTracker};
use talking_cat_core::history::{HistoryStore, LocalCache, RemoteStore, SupabaseStore};
use talking_cat_core::physiognomy::{AnimalClassifier, HttpImageClassifier};
use talking_cat_core::playback::{MutePlayback, PlaybackSink};
use talking_cat_core::session::CatSession;
use talking_cat_core::tts::{
    ElevenLabsTtsClient, OpenAiTtsClient, PiperTtsClient, SpeechChain, VoiceId,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const FACE_WAIT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "talking-cat")]
#[command(about = "A talking cat that reads your face and answers out loud")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true)]
    openai_api_key: Option<String>,

    #[arg(long, global = true)]
    elevenlabs_api_key: Option<String>,

    #[arg(long, global = true)]
    elevenlabs_voice_id: Option<String>,

    #[arg(long, global = true)]
    supabase_url: Option<String>,

    #[arg(long, global = true)]
    supabase_anon_key: Option<String>,

    /// Where the local history cache lives.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Turns of history sent with each message.
    #[arg(long, global = true, default_value_t = DEFAULT_HISTORY_WINDOW)]
    history_window: usize,

    #[arg(long, global = true, default_value_t = DEFAULT_FRAME_INTERVAL_MS)]
    frame_interval_ms: u64,

    /// Majority vote over this many frames; 0 or 1 shows the raw label.
    #[arg(long, global = true, default_value_t = 0)]
    smooth_window: usize,

    /// JSON-lines face tracker recording to replay as the camera.
    #[arg(long, global = true)]
    face_recording: Option<PathBuf>,

    /// Discard audio instead of playing it.
    #[arg(long, global = true)]
    mute: bool,

    #[arg(long, global = true)]
    output_device: Option<String>,

    #[arg(long, global = true, default_value = "piper")]
    piper_binary: PathBuf,

    /// Piper voice model; enables the offline voice.
    #[arg(long, global = true)]
    piper_model: Option<PathBuf>,

    #[arg(long, global = true)]
    classifier_url: Option<String>,

    #[arg(long, global = true, default_value = DEFAULT_LANGUAGE)]
    language: String,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Talk with the cat, one line of stdin per utterance.
    Talk,
    /// Have the cat read the face in view.
    ReadFace {
        /// Photo for the animal look-alike classifier.
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Print or clear the saved conversation.
    History {
        #[arg(long)]
        clear: bool,
    },
}

/// Runtime switches that are not part of the persisted configuration.
struct RunOptions {
    smoothing: SmoothingPolicy,
    face_recording: Option<PathBuf>,
    mute: bool,
    output_device: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let options = RunOptions {
        smoothing: SmoothingPolicy::from_window(args.smooth_window),
        face_recording: args.face_recording.clone(),
        mute: args.mute,
        output_device: args.output_device.clone(),
    };
    let env = StdEnv;
    let command = args.command.clone();
    let cfg = build_config(args, &env)?;

    tracing::info!(
        language = %cfg.language,
        history_window = cfg.history_window.turns(),
        data_dir = %cfg.data_dir.display(),
        "config loaded"
    );

    match command {
        Command::Talk => talk(cfg, options).await,
        Command::ReadFace { image } => read_face(cfg, options, image).await,
        Command::History { clear } => history(cfg, clear).await,
    }
}

async fn talk(cfg: AppConfig, options: RunOptions) -> anyhow::Result<()> {
    let (detection, face) = start_face_tracking(&cfg, &options);
    let mut session = build_session(&cfg, &options, face).await?;
    let mut capture =
        SpeechCapture::new(StdinRecognizer::new()).with_language(cfg.language.clone());

    println!("🐱 {}", session.face_state().status);
    let handled = session
        .run(&mut capture, |exchange| {
            println!("{} {}", exchange.emotion.emoji(), exchange.user);
            println!("🐱 {}", exchange.reply);
        })
        .await
        .context("conversation loop failed")?;
    tracing::info!(handled, "conversation finished");

    session.shutdown().await;
    if let Some(detection) = detection {
        detection.stop().await;
    }
    Ok(())
}

async fn read_face(
    cfg: AppConfig,
    options: RunOptions,
    image: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (detection, mut face) = start_face_tracking(&cfg, &options);
    let Some(detection) = detection else {
        anyhow::bail!("read-face needs --face-recording to see a face");
    };

    let seen = matches!(
        tokio::time::timeout(FACE_WAIT, face.wait_for(FaceState::is_face_detected)).await,
        Ok(Ok(_))
    );
    if !seen {
        detection.stop().await;
        anyhow::bail!("no face showed up within {}s", FACE_WAIT.as_secs());
    }

    let image = match image {
        Some(path) => Some(Bytes::from(
            tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read image {}", path.display()))?,
        )),
        None => None,
    };
    let classifier = match &cfg.classifier_url {
        Some(url) => Some(HttpImageClassifier::new(url.clone())?),
        None => None,
    };

    let mut session = build_session(&cfg, &options, face).await?;
    let reading = session
        .read_face(
            classifier.as_ref().map(|c| c as &dyn AnimalClassifier),
            image,
        )
        .await
        .context("face reading failed")?;
    println!("{}", reading.features);
    println!("🐱 {}", reading.reply);

    session.shutdown().await;
    detection.stop().await;
    Ok(())
}

async fn history(cfg: AppConfig, clear: bool) -> anyhow::Result<()> {
    let mut store = HistoryStore::open(
        cfg.history_window,
        Some(LocalCache::in_data_dir(&cfg.data_dir)),
        None,
    )
    .await;
    if clear {
        store.clear().await.context("failed to clear history")?;
        println!("history cleared");
        return Ok(());
    }
    for turn in store.turns() {
        match turn.emotion {
            Some(emotion) => println!("[{}] ({emotion}) {}", turn.role.as_str(), turn.content),
            None => println!("[{}] {}", turn.role.as_str(), turn.content),
        }
    }
    Ok(())
}

fn start_face_tracking(
    cfg: &AppConfig,
    options: &RunOptions,
) -> (Option<DetectionHandle>, watch::Receiver<FaceState>) {
    match &options.face_recording {
        Some(path) => {
            let detection = DetectionLoop::new(cfg.frame_interval.duration(), options.smoothing);
            let (handle, face) = detection.spawn(RecordedFaceTracker::load(path.clone()));
            (Some(handle), face)
        }
        None => {
            tracing::info!("no face source configured; emotion stays neutral");
            let (_, face) = watch::channel(FaceState::inactive());
            (None, face)
        }
    }
}

async fn build_session(
    cfg: &AppConfig,
    options: &RunOptions,
    face: watch::Receiver<FaceState>,
) -> anyhow::Result<CatSession<OpenAiChatClient>> {
    let chat = match cfg.api_keys.openai.clone() {
        Some(key) => Some(OpenAiChatClient::new(key)?),
        None => None,
    };

    let remote: Option<Arc<dyn RemoteStore>> = match cfg.supabase.clone() {
        Some(supabase) => Some(Arc::new(SupabaseStore::new(supabase)?)),
        None => None,
    };
    let history = HistoryStore::open(
        cfg.history_window,
        Some(LocalCache::in_data_dir(&cfg.data_dir)),
        remote,
    )
    .await;

    Ok(CatSession::new(
        Conversation::new(chat),
        build_speech(cfg, options)?,
        history,
        face,
    ))
}

fn build_speech(cfg: &AppConfig, options: &RunOptions) -> anyhow::Result<SpeechChain> {
    let mut speech = SpeechChain::new(build_playback(options)?);

    match (&cfg.api_keys.elevenlabs, &cfg.elevenlabs_voice_id) {
        (Some(key), Some(voice)) => {
            speech = speech.with_provider(Arc::new(ElevenLabsTtsClient::new(
                key.clone(),
                VoiceId(voice.clone()),
            )?));
        }
        (Some(_), None) => {
            tracing::warn!("ElevenLabs key set without a voice id; skipping ElevenLabs");
        }
        _ => {}
    }
    if let Some(key) = &cfg.api_keys.openai {
        speech = speech.with_provider(Arc::new(OpenAiTtsClient::new(key.clone())?));
    }
    if let Some(piper) = &cfg.piper {
        speech = speech.with_local(Arc::new(PiperTtsClient::new(piper.clone())));
    }

    tracing::info!(providers = ?speech.provider_names(), local = cfg.piper.is_some(), "speech chain ready");
    Ok(speech)
}

fn build_playback(options: &RunOptions) -> anyhow::Result<Arc<dyn PlaybackSink>> {
    if options.mute {
        return Ok(Arc::new(MutePlayback::new()));
    }
    speaker(options)
}

#[cfg(feature = "rodio")]
fn speaker(options: &RunOptions) -> anyhow::Result<Arc<dyn PlaybackSink>> {
    let mut speaker = talking_cat_core::playback::SpeakerPlayback::new();
    if let Some(device) = &options.output_device {
        speaker = speaker.with_output_device_name(device.clone());
    }
    Ok(Arc::new(speaker))
}

#[cfg(not(feature = "rodio"))]
fn speaker(options: &RunOptions) -> anyhow::Result<Arc<dyn PlaybackSink>> {
    if options.output_device.is_some() {
        tracing::warn!("built without audio output; --output-device ignored");
    }
    tracing::warn!("built without audio output; replies are muted");
    Ok(Arc::new(MutePlayback::new()))
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let openai = resolve_api_key(args.openai_api_key, ENV_OPENAI_API_KEY, env)?;
    let elevenlabs = resolve_api_key(args.elevenlabs_api_key, ENV_ELEVENLABS_API_KEY, env)?;
    let elevenlabs_voice_id =
        resolve_optional_string(args.elevenlabs_voice_id, ENV_ELEVENLABS_VOICE_ID, env);
    let supabase = resolve_supabase(args.supabase_url, args.supabase_anon_key, env)?;
    let classifier_url = resolve_url(args.classifier_url, ENV_ANIMAL_CLASSIFIER_URL, env)?;

    let piper = args.piper_model.map(|model| PiperConfig {
        binary: args.piper_binary,
        model,
    });

    Ok(AppConfig {
        api_keys: ApiKeys { openai, elevenlabs },
        elevenlabs_voice_id,
        supabase,
        piper,
        classifier_url,
        history_window: HistoryWindow::new(args.history_window)?,
        frame_interval: FrameInterval::new(args.frame_interval_ms)?,
        data_dir: args.data_dir.unwrap_or_else(default_data_dir),
        language: args.language,
    })
}
