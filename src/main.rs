use clap::Parser;
use colored::*;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use voxlink::chat::ChatClient;
use voxlink::cli::{Args, Command, SessionAction};
use voxlink::config::ClientConfig;
use voxlink::duplex::DuplexTransport;
use voxlink::error::Result;
use voxlink::rag::RagClient;
use voxlink::session::SessionStore;
use voxlink::tts::{self, TtsUpdate};
use voxlink::voice::{VoiceController, VoiceUpdate};
use voxlink::{TurnHandle, TurnUpdate};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("{} {}", "error:".bright_red().bold(), err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::from_env(),
    };
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if args.mock {
        config.mock_transport = true;
    }

    let store = SessionStore::open(&args.state)?;
    let session_id = store.client_session_id()?;
    let http = reqwest::Client::new();

    match args.command {
        Command::Ask { prompt, oneshot } => {
            let conversation = store
                .active()
                .map(|s| s.messages.clone())
                .unwrap_or_default();
            let store = Arc::new(Mutex::new(store));
            let client = ChatClient::new(http, config, session_id, store);
            if oneshot {
                let answer = client.chat_once(&[voxlink::ChatMessage::user(prompt)]).await?;
                println!("{}", answer.answer);
                if answer.fallback_used {
                    eprintln!("{}", "(fallback model used)".dimmed());
                }
            } else {
                let turn = client.send(conversation, prompt);
                drain_turn(turn).await;
            }
        }

        Command::Regenerate => {
            let conversation = store
                .active()
                .map(|s| s.messages.clone())
                .unwrap_or_default();
            if conversation.is_empty() {
                println!("{}", "active session has no turns to regenerate".yellow());
                return Ok(());
            }
            let store = Arc::new(Mutex::new(store));
            let client = ChatClient::new(http, config, session_id, store);
            let turn = client.regenerate(conversation);
            drain_turn(turn).await;
        }

        Command::Voice { seconds, device } => {
            let transport = if config.mock_transport {
                DuplexTransport::Mock
            } else {
                DuplexTransport::Live
            };
            let source = make_capture_source(device);
            let mut controller = VoiceController::new(config, transport, source);
            let mut updates = controller.start().await?;

            println!(
                "{}",
                format!("listening for {}s — speak now", seconds).bright_cyan()
            );
            let deadline = tokio::time::sleep(Duration::from_secs(seconds));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(VoiceUpdate::Partial(text)) => {
                            print!("\r{} {}", "partial:".dimmed(), text);
                            let _ = io::stdout().flush();
                        }
                        Some(VoiceUpdate::Final(text)) => {
                            println!("\r{} {}", "final:".bright_green(), text);
                        }
                        None => break,
                    },
                    _ = &mut deadline => break,
                }
            }
            controller.stop();
            let draft = controller.take_draft();
            if !draft.is_empty() {
                println!("{} {}", "draft:".bright_white().bold(), draft);
            }
        }

        Command::Speak { text } => {
            let mut handle = tts::speak(&http, &config, &session_id, &text);
            let mut chunks = 0usize;
            while let Some(update) = handle.next_update().await {
                match update {
                    TtsUpdate::Chunk(_) => {
                        chunks += 1;
                        print!("\r{} {}", "audio chunks:".dimmed(), chunks);
                        let _ = io::stdout().flush();
                    }
                    TtsUpdate::Done => {
                        println!("\r{} ({} chunks)", "synthesis complete".bright_green(), chunks);
                        break;
                    }
                    TtsUpdate::Failed(cause) => {
                        println!("\r{} {}", "synthesis failed:".bright_red(), cause);
                        break;
                    }
                }
            }
        }

        Command::Ingest { file } => {
            let client = RagClient::new(http, config, session_id);
            let receipt = client.ingest(&file).await?;
            println!(
                "{} doc_id={} chunks={}",
                "ingested".bright_green(),
                receipt.doc_id,
                receipt.chunks_ingested
            );
        }

        Command::Retrieve { query, top_k } => {
            let client = RagClient::new(http, config, session_id);
            let response = client.retrieve(&query, top_k).await?;
            if response.results.is_empty() {
                println!("{}", "no results".yellow());
            }
            for (i, hit) in response.results.iter().enumerate() {
                println!(
                    "{} {} {}",
                    format!("[{}]", i + 1).bright_cyan(),
                    format!("({:.3})", hit.score).dimmed(),
                    hit.text
                );
                if let Some(url) = &hit.source_url {
                    println!("    {}", url.dimmed());
                }
            }
        }

        Command::Health => {
            let client = RagClient::new(http, config.clone(), session_id);
            match client.health().await {
                Ok(()) => println!("{} {}", "ok".bright_green().bold(), config.base_url),
                Err(err) => {
                    println!("{} {}", "unreachable".bright_red().bold(), err);
                    std::process::exit(1);
                }
            }
        }

        Command::Sessions { action } => {
            let mut store = store;
            match action {
                SessionAction::List => {
                    let collection = store.collection();
                    for session in &collection.sessions {
                        let marker = if collection.current_id == Some(session.id) {
                            "*".bright_green().to_string()
                        } else {
                            " ".to_string()
                        };
                        println!(
                            "{} {}  {}  ({} messages)",
                            marker,
                            session.id.to_string().dimmed(),
                            session.title,
                            session.messages.len()
                        );
                    }
                }
                SessionAction::New => {
                    store.create()?;
                    println!(
                        "{} {}",
                        "created".bright_green(),
                        store.active().map(|s| s.id.to_string()).unwrap_or_default()
                    );
                }
                SessionAction::Select { id } => {
                    store.select(id)?;
                    match store.active() {
                        Some(active) if active.id == id => {
                            println!("{} {}", "selected".bright_green(), id)
                        }
                        _ => println!("{} {}", "no such session".yellow(), id),
                    }
                }
                SessionAction::Delete { id } => {
                    store.delete(id)?;
                    println!("{} {}", "deleted".bright_green(), id);
                }
            }
        }
    }

    Ok(())
}

/// Print a streaming turn: tokens as they arrive, then the outcome.
async fn drain_turn(mut turn: TurnHandle) {
    while let Some(update) = turn.next_update().await {
        match update {
            TurnUpdate::Token(text) => {
                print!("{}", text);
                let _ = io::stdout().flush();
            }
            TurnUpdate::Completed { .. } => {
                println!();
                break;
            }
            TurnUpdate::Failed(cause) => {
                println!("\n{} {}", "turn failed:".bright_red(), cause);
                break;
            }
        }
    }
}

#[cfg(feature = "capture")]
fn make_capture_source(device: Option<String>) -> Box<dyn voxlink::CaptureSource> {
    Box::new(voxlink::capture::CpalCaptureSource::new(device))
}

#[cfg(not(feature = "capture"))]
fn make_capture_source(_device: Option<String>) -> Box<dyn voxlink::CaptureSource> {
    // Without the capture feature there is no microphone; the mock
    // transport still produces transcripts.
    Box::new(voxlink::voice::NullSource)
}
