use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ziyue::audio::{FileReplayBackend, PacedSink, Playback};
use ziyue::speech::StreamingEvent;
use ziyue::{
    create_router, AppState, CaptureBackendFactory, ChatRequest, Config, ConnectionEndpoint,
    NatsConnector, NatsRecognizer, SessionTransport, SpeechCaptureEngine,
};

#[derive(Parser)]
#[command(name = "ziyue", about = "Voice chat client core")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/ziyue")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the local HTTP control API
    Serve,
    /// Send one chat message and print the reply
    Send {
        text: String,
        /// Print the reply as it streams in
        #[arg(long)]
        stream: bool,
        /// Server address (defaults to server.address)
        #[arg(long)]
        address: Option<String>,
    },
    /// Transcribe an audio file through the recognizer
    Transcribe {
        file: PathBuf,
        /// Print partial transcripts while recognizing
        #[arg(long)]
        streaming: bool,
    },
    /// Play a voice asset
    Play { file: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Send {
            text,
            stream,
            address,
        } => send(cfg, text, stream, address).await,
        Command::Transcribe { file, streaming } => transcribe(cfg, file, streaming).await,
        Command::Play { file } => play(file).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let backend = CaptureBackendFactory::create(
        cfg.speech.audio_source()?,
        cfg.speech.backend_config(),
    )?;
    let recognizer = NatsRecognizer::connect(&cfg.speech.nats_url, cfg.speech.subjects()).await?;
    let engine = SpeechCaptureEngine::new(
        backend,
        Arc::new(recognizer),
        Arc::new(PacedSink),
        cfg.speech.capture_config(),
    );

    let state = AppState::new(
        Arc::new(SessionTransport::new()),
        Arc::new(engine),
        Arc::new(NatsConnector::new(cfg.server.subjects())),
    );
    // The configured server is the fallback for POST /connection until another address is used
    state.endpoint(&cfg.server.address).await?;

    let bind = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("HTTP API listening on {}", bind);

    axum::serve(listener, create_router(state))
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn send(cfg: Config, text: String, stream: bool, address: Option<String>) -> Result<()> {
    let address = address.unwrap_or(cfg.server.address.clone());
    let connector = Arc::new(NatsConnector::new(cfg.server.subjects()));
    let endpoint = Arc::new(ConnectionEndpoint::new(address, connector)?);
    let transport = SessionTransport::new();

    transport.connect(endpoint).await?;

    let request = ChatRequest::text(text);
    let result = if stream {
        let result = transport
            .send_streaming(request, |partial| {
                print!("{}", partial);
                let _ = std::io::stdout().flush();
            })
            .await;
        println!();
        result
    } else {
        transport.send(request).await
    };

    transport.disconnect().await;

    let response = result?;
    if !stream {
        println!("{}", response.content);
    }
    Ok(())
}

async fn transcribe(cfg: Config, file: PathBuf, streaming: bool) -> Result<()> {
    let backend = FileReplayBackend::new(file, cfg.speech.backend_config());
    let recognizer = NatsRecognizer::connect(&cfg.speech.nats_url, cfg.speech.subjects()).await?;
    let engine = SpeechCaptureEngine::new(
        Box::new(backend),
        Arc::new(recognizer),
        Arc::new(PacedSink),
        cfg.speech.capture_config(),
    );

    if !engine.request_permission().await.is_granted() {
        anyhow::bail!("Capture permission denied");
    }

    if streaming {
        let mut events = engine.start_streaming().await?;
        while let Some(event) = events.recv().await {
            match event {
                StreamingEvent::Partial(text) => {
                    print!("\r{}", text);
                    let _ = std::io::stdout().flush();
                }
                StreamingEvent::Final(text) => println!("\n{}", text),
                StreamingEvent::Failed(e) => return Err(e.into()),
            }
        }
    } else {
        let recording = engine.start_single_shot().await?.result().await?;
        println!("{}", recording.text);
        info!("Voice asset: {}", recording.audio_asset);
    }

    Ok(())
}

async fn play(file: String) -> Result<()> {
    let playback = Playback::new(Arc::new(PacedSink));
    let outcome = playback.play(&file).await?.finished().await?;
    info!("Playback {:?}", outcome);
    Ok(())
}
