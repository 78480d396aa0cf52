use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use parley::config::AgentConfig;
use parley::core::conversation::ConversationDriver;
use parley::core::playback::{CpalOutputSink, CrossfadeConfig, CrossfadePlayer, VolumeControl};
use parley::core::reply::HttpReplyService;
use parley::core::stt::HttpTranscriber;
use parley::core::tts::{CachedSynthesizer, HttpSynthesizer, SpeechSynthesizer};
use parley::core::turn::SessionState;
use parley::core::vad::{VadConfig, VadSegmenter};
use parley::core::MicrophoneSource;
use parley::timeline::{Role, TranscriptTimeline};
use parley::transport::{EventDispatcher, RealtimeEventFeed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = AgentConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;

    // Shared transcript timeline; render final entries to stdout.
    let timeline = Arc::new(TranscriptTimeline::new());
    timeline.subscribe(Arc::new(|update| {
        if update.is_final && !update.text.is_empty() {
            let speaker = match update.role {
                Role::User => "you",
                Role::Assistant => "agent",
            };
            println!("[{speaker}] {}", update.text);
        }
    }));

    // Playback path
    let sink = Arc::new(CpalOutputSink::new());
    let player = Arc::new(CrossfadePlayer::new(sink, CrossfadeConfig::default()));

    // Collaborator services
    let transcriber = Arc::new(HttpTranscriber::new(config.stt.clone()));
    let replier = Arc::new(HttpReplyService::new(config.reply.clone()));
    let synthesizer = Arc::new(CachedSynthesizer::new(
        Arc::new(HttpSynthesizer::new(config.tts.clone())) as Arc<dyn SpeechSynthesizer>,
    ));

    let driver = ConversationDriver::new(
        VadSegmenter::new(VadConfig::default()),
        transcriber,
        replier,
        synthesizer,
        Arc::clone(&player),
        Arc::clone(&timeline),
        config.conversation.clone(),
    );

    let cancel = CancellationToken::new();

    // Optional event-driven path alongside the local loop.
    if let Some(url) = config.realtime_url.clone() {
        let session = Arc::new(SessionState::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&timeline),
            session,
            Arc::clone(&player) as Arc<dyn VolumeControl>,
            Duration::from_millis(config.guard_auto_release_ms),
        ));
        let feed = RealtimeEventFeed::new(dispatcher);
        let feed_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = feed.run(&url, &feed_cancel).await {
                tracing::error!(error = %e, "Realtime event feed ended");
            }
        });
    }

    // Ctrl-C toggles conversational mode off, unwinding every phase.
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_on_signal.cancel();
    });

    let mut microphone = MicrophoneSource::open()?;
    println!("Listening. Press Ctrl-C to stop.");

    driver.run(&mut microphone, &cancel).await?;

    println!("Conversation ended.");
    Ok(())
}
