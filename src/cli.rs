use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "voxlink")]
#[command(version)]
#[command(about = "Talk to a voxlink orchestrator: streaming chat, voice transcription, document retrieval")]
pub struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Orchestrator base URL (overrides config file and environment)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Use the deterministic mock duplex transport (no backend needed)
    #[arg(long)]
    pub mock: bool,

    /// Path of the local state database
    #[arg(long, default_value = "voxlink.db")]
    pub state: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Send one query and stream the assistant's answer
    Ask {
        prompt: String,

        /// Use the non-streaming endpoint instead
        #[arg(long)]
        oneshot: bool,
    },

    /// Re-run the last turn of the active session
    Regenerate,

    /// Capture voice and print live transcripts
    Voice {
        /// Seconds to capture before stopping
        #[arg(long, default_value = "10")]
        seconds: u64,

        /// Input device name (default: system default)
        #[arg(long)]
        device: Option<String>,
    },

    /// Stream text-to-speech synthesis for a piece of text
    Speak { text: String },

    /// Upload a document for ingestion
    Ingest { file: PathBuf },

    /// Retrieve the chunks most relevant to a query
    Retrieve {
        query: String,

        #[arg(long, default_value = "3")]
        top_k: u32,
    },

    /// Probe orchestrator liveness
    Health,

    /// Manage persisted chat sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// List sessions, newest first
    List,
    /// Create a fresh session and make it active
    New,
    /// Switch the active session
    Select { id: Uuid },
    /// Delete a session
    Delete { id: Uuid },
}
