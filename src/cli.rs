use clap::{Parser, Subcommand};

/// llman (Rust)
#[derive(Debug, Parser)]
#[command(name = "llman")]
#[command(version)]
#[command(about = "Transform text with a completion backend", long_about = None)]
pub struct Args {
    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Print only the first fenced code block of the result
    #[arg(long = "code")]
    pub code: bool,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the first fenced code block found on stdin
    Extract,

    /// List transformation suggestions for a piece of text
    Suggest {
        /// Text to transform (read from stdin when omitted)
        #[arg(long = "text")]
        text: Option<String>,

        /// Steer the suggestions toward this query
        #[arg(long = "query", default_value = "")]
        query: String,
    },

    /// Pick and apply a transformation interactively
    #[cfg(feature = "tui")]
    Pick {
        /// Text to transform (read from stdin when omitted)
        #[arg(long = "text")]
        text: Option<String>,
    },
}
