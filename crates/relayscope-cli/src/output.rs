use std::io::IsTerminal;

use owo_colors::OwoColorize;
use relayscope_types::{Agent, Finding, Session};
use serde::Serialize;

use crate::args::OutputFormat;

fn colors_enabled() -> bool {
    std::io::stdout().is_terminal()
}

/// Prints `value` as pretty JSON, used for every `--format json` path.
pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_agent_summary(agent: &Agent, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(agent);
    }
    let name = agent.display_name.as_deref().unwrap_or(&agent.system_prompt_id);
    if colors_enabled() {
        println!("{}", name.bold());
    } else {
        println!("{name}");
    }
    println!("  system_prompt_id:   {}", agent.system_prompt_id);
    println!("  completed sessions: {}", agent.completed_session_count);
    println!("  unanalyzed:         {}", agent.unanalyzed_session_count());
    println!("  tools seen:         {}", agent.tools_ever_seen.len());
    println!("  frozen percentiles: {}", agent.frozen_percentiles.is_some());
    Ok(())
}

pub fn print_agent_list(agents: &[Agent], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(agents);
    }
    println!("{:<34} {:>10} {:>11}", "SYSTEM_PROMPT_ID", "COMPLETED", "UNANALYZED");
    for agent in agents {
        println!(
            "{:<34} {:>10} {:>11}",
            agent.system_prompt_id,
            agent.completed_session_count,
            agent.unanalyzed_session_count(),
        );
    }
    Ok(())
}

pub fn print_session_list(sessions: &[Session], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(sessions);
    }
    println!("{:<34} {:<9} {:>8} {:>8}", "SESSION_ID", "STATUS", "EVENTS", "TOOLS");
    for session in sessions {
        let status = session_status_label(session);
        println!(
            "{:<34} {:<9} {:>8} {:>8}",
            session.session_id,
            colorize_status(status),
            session.counters.events,
            session.counters.tool_uses,
        );
    }
    Ok(())
}

pub fn print_session_detail(session: &Session, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(session);
    }
    println!("session {}", session.session_id);
    println!("  status:        {}", session_status_label(session));
    println!("  created_at:    {}", session.created_at);
    println!("  last_activity: {}", session.last_activity);
    println!("  events:        {}", session.counters.events);
    println!("  tool_uses:     {}", session.counters.tool_uses);
    println!("  tokens in/out: {}/{}", session.counters.tokens_input, session.counters.tokens_output);
    println!("\ntimeline:");
    for event in &session.events {
        println!("  [{}] {:?}", event.timestamp.format("%H:%M:%S"), event.name);
    }
    Ok(())
}

pub fn print_findings(findings: &[Finding], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(findings);
    }
    for finding in findings {
        let marker = match finding.severity {
            relayscope_types::Severity::Critical | relayscope_types::Severity::High => {
                if colors_enabled() { "!!".red().to_string() } else { "!!".to_string() }
            }
            _ => "--".to_string(),
        };
        println!("{} [{:?}] {} ({})", marker, finding.severity, finding.title, finding.finding_id);
    }
    Ok(())
}

fn session_status_label(session: &Session) -> &'static str {
    if session.is_completed {
        "COMPLETED"
    } else if session.is_active {
        "ACTIVE"
    } else {
        "INACTIVE"
    }
}

fn colorize_status(status: &str) -> String {
    if !colors_enabled() {
        return status.to_string();
    }
    match status {
        "ACTIVE" => status.green().to_string(),
        "COMPLETED" => status.blue().to_string(),
        _ => status.yellow().to_string(),
    }
}
