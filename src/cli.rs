use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "post-guard",
    version,
    about = "Safety pipeline around a text-generating bot"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Risk-score inbound text (argument or stdin).
    Assess {
        #[arg(allow_hyphen_values = true)]
        text: Option<String>,
    },
    /// Validate a generation (argument or stdin).
    Validate {
        #[arg(allow_hyphen_values = true)]
        text: Option<String>,
        #[arg(long, help = "Override the publish limit in characters")]
        max_chars: Option<usize>,
    },
    /// Check and reserve a reply for a subject.
    Budget {
        subject: String,
        label: Option<String>,
    },
    /// Screen inbound text through the gate and reserve a reply.
    Admit {
        subject: String,
        label: Option<String>,
        #[arg(long, default_value = "mention")]
        platform: String,
        #[arg(long)]
        item_id: Option<String>,
        #[arg(long, allow_hyphen_values = true, help = "Inbound text (default: stdin)")]
        text: Option<String>,
    },
    /// Generate a post through the guard.
    Generate {
        prompt: String,
        #[arg(long, default_value = "You write short social media posts.")]
        system: String,
        #[arg(long, default_value = "posts")]
        source: String,
        #[arg(long)]
        max_tokens: Option<u32>,
    },
    /// Summarize the persisted ledger and history.
    Stats {
        #[arg(long, default_value = "posts")]
        source: String,
    },
}
