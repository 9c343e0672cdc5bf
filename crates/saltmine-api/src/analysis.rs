//! The pain point analysis pipeline behind `POST /api/pain-points/analyze`.
//!
//! keyword extraction → search on Reddit and X → prompt → streamed chat →
//! JSON extraction and validation. Progress is reported as a stream of
//! [`AnalysisEvent`]s that always ends with `Done`.

use std::fmt::Write;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use saltmine_providers::adp::{ChatEvent, ChatRequest, describe_error_code};
use saltmine_providers::serper::search_both;
use saltmine_types::events::{AnalysisEvent, AnalysisStage, CompleteEvent, StatusEvent};
use saltmine_types::models::{AnalysisResult, CombinedSearch, SearchPost};

use crate::state::AppState;

pub const POSTS_PER_PLATFORM: u32 = 20;
pub const INSIGHT_COUNT: usize = 6;

const VISITOR_ID: &str = "pain-point-analyzer";
const NO_RESULT_MESSAGE: &str = "The analysis did not produce a valid result. Please try again.";

/// Runs the whole pipeline for an already-authorized request.
pub fn run(state: AppState, query: String) -> impl Stream<Item = AnalysisEvent> + Send + 'static {
    stream! {
        yield AnalysisEvent::status(AnalysisStage::Extracting, "Extracting keywords...", 5);
        let extraction = state.keywords.extract(&query).await;
        let keyword = extraction.extracted;

        yield AnalysisEvent::Status(StatusEvent {
            status: AnalysisStage::Searching,
            message: "Searching Reddit and X...".into(),
            progress: 10,
            posts_found: None,
            keyword: Some(keyword.clone()),
        });
        let search = search_both(state.search.as_ref(), &keyword, POSTS_PER_PLATFORM).await;

        yield AnalysisEvent::Status(StatusEvent {
            status: AnalysisStage::Analyzing,
            message: "Analyzing with AI...".into(),
            progress: 40,
            posts_found: Some(search.total),
            keyword: None,
        });

        let prompt = build_prompt(&query, &keyword, &search);
        let mut replies = state.chat.stream_chat(ChatRequest::new(VISITOR_ID, prompt));

        let mut chunks: u32 = 0;
        let mut completed = false;
        let mut failure = None;

        while let Some(event) = replies.next().await {
            match event {
                ChatEvent::Reply { payload, .. } => {
                    chunks += 1;
                    yield AnalysisEvent::status(AnalysisStage::Analyzing, "AI analyzing...", chunk_progress(chunks));

                    if !payload.is_final || completed {
                        continue;
                    }
                    // Reply content is cumulative, so the final reply is the whole answer
                    match find_valid_analysis(&payload.content) {
                        Ok((json, parsed)) => {
                            info!(insights = parsed.insights.len(), chunks, "Analysis complete");
                            completed = true;
                            yield AnalysisEvent::Complete(Box::new(CompleteEvent {
                                status: AnalysisStage::Completed,
                                message: "Analysis complete!".into(),
                                progress: 100,
                                result: json,
                                search_data: search.clone(),
                            }));
                        }
                        Err(reason) => {
                            warn!(len = payload.content.len(), "Final reply rejected: {}", reason);
                        }
                    }
                }
                ChatEvent::Error { error, .. } => {
                    warn!(code = error.code, "Chat provider failed: {}", error.message);
                    let message = describe_error_code(error.code)
                        .map(str::to_string)
                        .unwrap_or(error.message);
                    failure = Some(message);
                    break;
                }
                ChatEvent::TokenStat { payload, .. } => {
                    debug!(tokens = payload.token_count, elapsed = payload.elapsed, "Chat token usage");
                }
                ChatEvent::Reference { .. } => {}
            }
        }

        if let Some(message) = failure {
            yield AnalysisEvent::error(message);
        } else if !completed {
            warn!(chunks, "Chat stream ended without a valid analysis");
            yield AnalysisEvent::error(NO_RESULT_MESSAGE);
        }
        yield AnalysisEvent::Done;
    }
}

/// 40 at the start of analysis, two points per chunk, never past 90.
fn chunk_progress(chunks: u32) -> u8 {
    40 + chunks.saturating_mul(2).min(50) as u8
}

// -- Prompt --

pub fn build_prompt(query: &str, keyword: &str, search: &CombinedSearch) -> String {
    let mut prompt = String::new();
    let topic = keyword.trim();

    let _ = writeln!(
        prompt,
        "You are a product analyst specializing in identifying user pain points.\n"
    );
    let _ = write!(
        prompt,
        "I searched Reddit and X (Twitter) for \"{}\" and found the following discussions.",
        topic
    );
    if query.trim() != topic {
        let _ = write!(prompt, " The user's original question was: \"{}\".", query.trim());
    }
    let _ = writeln!(
        prompt,
        " Please analyze these posts and provide:\n\n\
         1. **Executive Summary**: A concise summary (2-3 sentences) of the main frustrations users express about \"{topic}\". Include the overall sentiment.\n\n\
         2. **Frustration Score**: Rate the overall frustration level from 0-100 (0 = satisfied, 100 = extremely frustrated).\n\n\
         3. **Top {n} Pain Points**: Identify exactly {n} pain points, most critical first, each with:\n   \
         - **Title**: Short, punchy description\n   \
         - **Severity**: High/Medium/Low\n   \
         - **Category**: Performance/UX/Feature Gap/Pricing/Support/Other\n   \
         - **Description**: What users are complaining about (1-2 sentences)\n   \
         - **Opportunity**: Actionable product improvement suggestion\n   \
         - **Quote**: An actual quote from the posts (if available)\n",
        topic = topic,
        n = INSIGHT_COUNT,
    );

    write_posts(&mut prompt, "Reddit posts", &search.reddit_posts);
    write_posts(&mut prompt, "X posts", &search.x_posts);

    let _ = write!(
        prompt,
        "\nCRITICAL: Do NOT repeat this instruction or the posts in your response. \
         Return ONLY valid JSON in this exact format, with exactly {n} items in \"insights\":\n\
         ```json\n\
         {{\n  \
           \"summary\": \"string\",\n  \
           \"frustrationScore\": number,\n  \
           \"insights\": [\n    \
             {{\n      \
               \"title\": \"string\",\n      \
               \"severity\": \"High/Medium/Low Severity\",\n      \
               \"category\": \"string\",\n      \
               \"description\": \"string\",\n      \
               \"opportunity\": \"string\",\n      \
               \"quote\": \"string or null\"\n    \
             }}\n  \
           ]\n\
         }}\n\
         ```\n\n\
         Important: Your response must start with ```json and end with ```. No other text before or after.\n",
        n = INSIGHT_COUNT,
    );
    prompt
}

fn write_posts(prompt: &mut String, heading: &str, posts: &[SearchPost]) {
    let _ = writeln!(prompt, "\n## {}\n", heading);
    if posts.is_empty() {
        let _ = writeln!(prompt, "(no posts found)");
        return;
    }
    for (i, post) in posts.iter().enumerate() {
        let _ = writeln!(prompt, "### Post {}", i + 1);
        let _ = writeln!(prompt, "**Title**: {}", post.title);
        if let Some(sub) = &post.subreddit {
            let _ = writeln!(prompt, "**Subreddit**: r/{}", sub);
        }
        let _ = writeln!(prompt, "**Date**: {}", post.date.as_deref().unwrap_or("N/A"));
        let _ = writeln!(prompt, "**Content Preview**: {}", post.snippet);
        let _ = writeln!(prompt, "**Link**: {}", post.link);
        let _ = writeln!(prompt, "---");
    }
}

// -- Reply parsing --

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Bodies of every closed ```json fence, in order.
fn fenced_blocks(reply: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = reply;
    while let Some(start) = rest.find(FENCE_OPEN) {
        let body = &rest[start + FENCE_OPEN.len()..];
        let Some(end) = body.find(FENCE_CLOSE) else {
            break;
        };
        blocks.push(body[..end].trim());
        rest = &body[end + FENCE_CLOSE.len()..];
    }
    blocks
}

/// Text between the first `{` and the last `}`.
fn braced(reply: &str) -> Option<&str> {
    let first = reply.find('{')?;
    let last = reply.rfind('}')?;
    (first < last).then(|| &reply[first..=last])
}

/// The JSON candidate in a reply: the first ```json block, else the
/// outermost braces.
pub fn extract_json(reply: &str) -> Option<&str> {
    fenced_blocks(reply).into_iter().next().or_else(|| braced(reply))
}

/// Checks a candidate against the result schema.
pub fn validate_analysis(json: &str) -> Result<AnalysisResult, String> {
    let value: Value = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {}", e))?;

    match value.get("summary").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() && s != "string" => {}
        _ => return Err("summary missing or still the template placeholder".into()),
    }
    match value.get("frustrationScore").and_then(Value::as_f64) {
        Some(score) if (0.0..=100.0).contains(&score) => {}
        _ => return Err("frustrationScore missing or outside 0-100".into()),
    }
    match value.get("insights").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => {}
        _ => return Err("insights missing or empty".into()),
    }

    serde_json::from_value(value).map_err(|e| format!("schema mismatch: {}", e))
}

/// First candidate in the reply that validates. An echoed prompt puts the
/// template block first, so every fenced block is tried before the braces.
pub fn find_valid_analysis(reply: &str) -> Result<(String, AnalysisResult), String> {
    let mut last_err = "no JSON found in reply".to_string();
    let candidates = fenced_blocks(reply).into_iter().chain(braced(reply));
    for candidate in candidates {
        match validate_analysis(candidate) {
            Ok(parsed) => return Ok((candidate.to_string(), parsed)),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use saltmine_types::models::Platform;

    const VALID: &str = r#"{"summary":"Users find it slow.","frustrationScore":72,"insights":[{"title":"Slow sync","severity":"High Severity","category":"Performance","description":"Sync lags.","opportunity":"Faster sync","quote":null}]}"#;

    #[test]
    fn extracts_fenced_block_first() {
        let reply = format!("Sure! ```json\n{}\n``` hope that helps {{}}", VALID);
        assert_eq!(extract_json(&reply), Some(VALID));
    }

    #[test]
    fn falls_back_to_braces() {
        let reply = format!("Here you go: {} (end)", VALID);
        assert_eq!(extract_json(&reply), Some(VALID));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn validation_rules() {
        assert!(validate_analysis(VALID).is_ok());
        assert!(validate_analysis(r#"{"summary":"string","frustrationScore":50,"insights":[{}]}"#).is_err());
        assert!(validate_analysis(r#"{"summary":"ok","frustrationScore":"high","insights":[{}]}"#).is_err());
        assert!(validate_analysis(r#"{"summary":"ok","frustrationScore":101,"insights":[{}]}"#).is_err());
        assert!(validate_analysis(r#"{"summary":"ok","frustrationScore":50,"insights":[]}"#).is_err());
        // A calm topic can legitimately score zero
        assert!(validate_analysis(r#"{"summary":"ok","frustrationScore":0,"insights":[{}]}"#).is_ok());
        assert!(validate_analysis("not json").is_err());
    }

    #[test]
    fn echoed_template_is_skipped() {
        let template = r#"{"summary": "string", "frustrationScore": 0, "insights": []}"#;
        let reply = format!("```json\n{}\n```\n\n```json\n{}\n```", template, VALID);
        let (json, parsed) = find_valid_analysis(&reply).unwrap();
        assert_eq!(json, VALID);
        assert_eq!(parsed.frustration_score, 72.0);
        assert_eq!(parsed.insights[0].title, "Slow sync");
    }

    #[test]
    fn progress_is_capped() {
        assert_eq!(chunk_progress(1), 42);
        assert_eq!(chunk_progress(25), 90);
        assert_eq!(chunk_progress(1000), 90);
    }

    #[test]
    fn prompt_embeds_posts_and_schema() {
        let post = SearchPost {
            title: "Notion is slow".into(),
            link: "https://reddit.com/r/Notion/1".into(),
            snippet: "takes forever".into(),
            date: None,
            subreddit: Some("Notion".into()),
            platform: Platform::Reddit,
            position: 1,
            domain: "reddit.com".into(),
        };
        let search = CombinedSearch::new(vec![post], vec![], 0.2);
        let prompt = build_prompt("Why is Notion so slow?", "Notion", &search);

        assert!(prompt.contains("for \"Notion\""));
        assert!(prompt.contains("original question was: \"Why is Notion so slow?\""));
        assert!(prompt.contains("**Subreddit**: r/Notion"));
        assert!(prompt.contains("## X posts\n\n(no posts found)"));
        assert!(prompt.contains("exactly 6 pain points"));
        assert!(prompt.contains("\"frustrationScore\": number"));
        // Deterministic for the same input
        assert_eq!(prompt, build_prompt("Why is Notion so slow?", "Notion", &search));
    }
}
