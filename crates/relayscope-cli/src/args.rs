use std::fmt;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
#[value(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plain => write!(f, "plain"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
#[value(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// The intercepting LLM proxy, dashboard API, and `/mcp` tool surface.
#[derive(Debug, Parser)]
#[command(name = "relayscope", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Overrides the workspace data directory for this invocation.
    #[arg(long, global = true)]
    pub workspace: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = LogLevel::default())]
    pub log_level: LogLevel,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::default())]
    pub format: OutputFormat,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the proxy + dashboard API + `/mcp` server.
    Serve {
        /// Overrides `bind_addr` from the config file.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print aggregate counts across all agents.
    Stats,
    /// Inspect reconstructed sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Inspect an agent's behavioral and security analysis.
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Run one monitor + analysis tick synchronously and report what happened.
    Doctor,
}

#[derive(Debug, Subcommand)]
pub enum SessionsAction {
    /// List recent sessions, optionally scoped to one agent.
    List {
        #[arg(long)]
        system_prompt_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one session's counters, tool usage, and event timeline.
    Show { session_id: String },
}

#[derive(Debug, Subcommand)]
pub enum AgentAction {
    /// List every known agent.
    List,
    /// Show one agent's profile, frozen percentiles, and finding summary.
    Show { system_prompt_id: String },
}
