mod args;
mod hook;
mod logging;
mod output;
mod pricing_source;
mod server;

use std::cmp::Reverse;

use args::{AgentAction, Cli, Command, OutputFormat, SessionsAction};
use clap::Parser;
use relayscope_runtime::Config;
use relayscope_sdk::Client;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(workspace) = cli.workspace {
        config.workspace_path = Some(workspace);
    }

    match cli.command {
        Command::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            server::serve(config)
        }
        Command::Stats => run_stats(config, cli.format),
        Command::Sessions { action } => run_sessions(config, cli.format, action),
        Command::Agent { action } => run_agent(config, cli.format, action),
        Command::Doctor => run_doctor(config, cli.format),
    }
}

fn run_stats(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let client = Client::connect(config)?;
    let agents = client.agents().list()?;

    let total_sessions: u64 = agents.iter().map(|a| a.completed_session_count).sum();
    let total_unanalyzed: u64 = agents.iter().map(|a| a.unanalyzed_session_count()).sum();

    if format == OutputFormat::Json {
        return output::print_json(&serde_json::json!({
            "agents": agents.len(),
            "completed_sessions": total_sessions,
            "unanalyzed_sessions": total_unanalyzed,
        }));
    }

    println!("agents:              {}", agents.len());
    println!("completed sessions:  {total_sessions}");
    println!("unanalyzed sessions: {total_unanalyzed}");
    Ok(())
}

fn run_sessions(config: Config, format: OutputFormat, action: SessionsAction) -> anyhow::Result<()> {
    let client = Client::connect(config)?;
    match action {
        SessionsAction::List { system_prompt_id, limit } => {
            let sessions = client.sessions().list_recent(system_prompt_id.as_deref(), limit)?;
            output::print_session_list(&sessions, format)
        }
        SessionsAction::Show { session_id } => {
            let session = client.sessions().get(&session_id)?;
            output::print_session_detail(&session, format)
        }
    }
}

fn run_agent(config: Config, format: OutputFormat, action: AgentAction) -> anyhow::Result<()> {
    let client = Client::connect(config)?;
    match action {
        AgentAction::List => {
            let mut agents = client.agents().list()?;
            agents.sort_by_key(|a| Reverse(a.completed_session_count));
            output::print_agent_list(&agents, format)
        }
        AgentAction::Show { system_prompt_id } => {
            let agent = client.agents().get(&system_prompt_id)?;
            output::print_agent_summary(&agent, format)
        }
    }
}

/// Runs one monitor + analysis tick synchronously and reports what
/// happened, without spinning up the server or its background threads.
/// Useful for CI smoke checks and for poking at a workspace interactively.
fn run_doctor(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let client = Client::connect(config)?;
    let before: std::collections::HashMap<_, _> = client
        .agents()
        .list()?
        .into_iter()
        .map(|a| (a.system_prompt_id.clone(), a.last_analyzed_session_count))
        .collect();

    client.tick()?;
    let recovered = client.analysis().recover()?;

    let after = client.agents().list()?;
    let mut advanced = Vec::new();
    for agent in &after {
        let prior = before.get(&agent.system_prompt_id).copied().unwrap_or(0);
        if agent.last_analyzed_session_count > prior {
            advanced.push(agent.system_prompt_id.clone());
        }
    }

    if format == OutputFormat::Json {
        return output::print_json(&serde_json::json!({
            "agents_checked": after.len(),
            "analyses_recovered": recovered,
            "agents_advanced": advanced,
        }));
    }

    println!("agents checked:     {}", after.len());
    println!("analyses recovered: {recovered}");
    if advanced.is_empty() {
        println!("no agent advanced its analysis watermark this tick");
    } else {
        println!("advanced: {}", advanced.join(", "));
    }
    Ok(())
}
