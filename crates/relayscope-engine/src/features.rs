use chrono::{DateTime, Utc};
use relayscope_types::{Event, EventName, Session, SessionFeatures, TokenStats};

/// Derives a [`SessionFeatures`] fingerprint from a session's recorded event
/// history. Called once, when a session transitions to completed; the
/// result is frozen on [`Session::complete`] and never recomputed unless the
/// session is later reactivated.
pub fn extract(session: &Session) -> SessionFeatures {
    let mut features = SessionFeatures::default();
    let mut input_samples = Vec::new();
    let mut output_samples = Vec::new();
    let mut timestamps: Vec<DateTime<Utc>> = Vec::with_capacity(session.events.len());

    for event in &session.events {
        timestamps.push(event.timestamp);

        match event.name {
            EventName::LlmCallStart => {
                features.request_count += 1;
                if let Some(model) = str_attr(event, "model") {
                    features.models.insert(model.to_string());
                }
            }
            EventName::LlmCallFinish | EventName::LlmCallError => {
                if let Some(ms) = u64_attr(event, "duration_ms") {
                    features.total_duration_ms += ms;
                }
                if let Some(tokens) = u64_attr(event, "tokens_input") {
                    input_samples.push(tokens);
                }
                if let Some(tokens) = u64_attr(event, "tokens_output") {
                    output_samples.push(tokens);
                }
                if let Some(tokens) = u64_attr(event, "tokens_total") {
                    features.total_tokens += tokens;
                }
            }
            EventName::ToolExecution => {
                features.total_tool_calls += 1;
                if let Some(name) = str_attr(event, "tool_name") {
                    features.tools_used.insert(name.to_string());
                    if features.tool_sequences.last().map(String::as_str) != Some(name) {
                        features.tool_sequences.push(name.to_string());
                    }
                }
                if let Some(ms) = u64_attr(event, "duration_ms") {
                    features.tool_timings_ms.push(ms);
                }
            }
            EventName::SessionStart | EventName::ToolResult => {}
        }
    }

    features.event_count = session.counters.events;
    features.avg_inter_event_interval_ms = avg_interval_ms(&timestamps);
    features.input_tokens = token_stats(&input_samples);
    features.output_tokens = token_stats(&output_samples);
    if features.total_tokens == 0 {
        features.total_tokens = session.counters.tokens_input + session.counters.tokens_output;
    }

    features
}

fn str_attr<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
    event.attributes.get(key).and_then(|v| v.as_str())
}

fn u64_attr(event: &Event, key: &str) -> Option<u64> {
    event.attributes.get(key).and_then(|v| v.as_u64())
}

fn token_stats(samples: &[u64]) -> TokenStats {
    if samples.is_empty() {
        return TokenStats::default();
    }
    let n = samples.len() as f64;
    let sum: u64 = samples.iter().sum();
    let mean = sum as f64 / n;
    let variance = samples
        .iter()
        .map(|&v| {
            let delta = v as f64 - mean;
            delta * delta
        })
        .sum::<f64>()
        / n;
    let max = *samples.iter().max().unwrap_or(&0);
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    TokenStats {
        mean,
        stdev: variance.sqrt(),
        max,
        p95: percentile(&sorted, 0.95),
    }
}

fn percentile(sorted: &[u64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)] as f64
}

fn avg_interval_ms(timestamps: &[DateTime<Utc>]) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }
    let total_ms: i64 = timestamps
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds())
        .sum();
    total_ms as f64 / (timestamps.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use relayscope_types::{Level};
    use serde_json::json;

    fn session_with_events(events: Vec<Event>) -> Session {
        let now = Utc::now();
        let mut session = Session::new("s1", now, 10_000);
        for event in events {
            session.record_event(event);
        }
        session
    }

    #[test]
    fn counts_tool_calls_and_collapses_consecutive_repeats() {
        let now = Utc::now();
        let mut e1 = Event::new(EventName::ToolExecution, "s1", 0, now).with_level(Level::Info);
        e1 = e1.with_attribute("tool_name", json!("Read"));
        let mut e2 = Event::new(EventName::ToolExecution, "s1", 1, now + Duration::milliseconds(10));
        e2 = e2.with_attribute("tool_name", json!("Read"));
        let mut e3 = Event::new(EventName::ToolExecution, "s1", 2, now + Duration::milliseconds(20));
        e3 = e3.with_attribute("tool_name", json!("Bash"));

        let session = session_with_events(vec![e1, e2, e3]);
        let features = extract(&session);

        assert_eq!(features.total_tool_calls, 3);
        assert_eq!(features.tools_used.len(), 2);
        assert_eq!(features.tool_sequences, vec!["Read".to_string(), "Bash".to_string()]);
    }

    #[test]
    fn computes_token_stats_from_finish_events() {
        let now = Utc::now();
        let mut finish1 = Event::new(EventName::LlmCallFinish, "s1", 0, now);
        finish1 = finish1
            .with_attribute("tokens_input", json!(100))
            .with_attribute("tokens_output", json!(50))
            .with_attribute("tokens_total", json!(150))
            .with_attribute("duration_ms", json!(200));
        let mut finish2 = Event::new(EventName::LlmCallFinish, "s1", 1, now + Duration::milliseconds(500));
        finish2 = finish2
            .with_attribute("tokens_input", json!(200))
            .with_attribute("tokens_output", json!(100))
            .with_attribute("tokens_total", json!(300))
            .with_attribute("duration_ms", json!(400));

        let session = session_with_events(vec![finish1, finish2]);
        let features = extract(&session);

        assert_eq!(features.total_tokens, 450);
        assert_eq!(features.total_duration_ms, 600);
        assert_eq!(features.input_tokens.max, 200);
        assert!((features.input_tokens.mean - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_session_yields_default_features() {
        let session = Session::new("s1", Utc::now(), 10_000);
        let features = extract(&session);
        assert_eq!(features.event_count, 0);
        assert_eq!(features.total_tokens, 0);
        assert_eq!(features.avg_inter_event_interval_ms, 0.0);
    }
}
