//! Plain-text terminal output

use std::io::{self, Write};

use crate::app::QueryOutcome;
use crate::chat::ChatResponse;
use crate::keys::StatusSummary;
use crate::search::{PAGE_SIZE, SearchResult, start_index};

/// Print results, the AI answer and any notices
pub fn write_outcome<W: Write>(out: &mut W, outcome: &QueryOutcome) -> io::Result<()> {
    if let Some(answer) = &outcome.answer {
        let cached = if outcome.answer_cached { ", cached" } else { "" };
        writeln!(
            out,
            "AI answer ({:.0}% confidence{}):",
            answer.confidence * 100.0,
            cached
        )?;
        writeln!(out, "  {}", answer.answer)?;
        if !answer.sources.is_empty() {
            writeln!(out, "  Sources: {}", answer.sources.join(", "))?;
        }
        writeln!(out)?;
    }

    let first = start_index(outcome.page);
    for (offset, result) in outcome.results.iter().enumerate() {
        write_result(out, first + offset, result)?;
    }

    if outcome.has_more {
        writeln!(
            out,
            "More results: --page {} (results {}-{})",
            outcome.page + 1,
            first + PAGE_SIZE,
            first + 2 * PAGE_SIZE - 1
        )?;
    }

    for notice in &outcome.notices {
        writeln!(out, "! {}", notice.message())?;
    }

    Ok(())
}

fn write_result<W: Write>(out: &mut W, number: usize, result: &SearchResult) -> io::Result<()> {
    // Image results carry no title; the host stands in for it
    let title = result
        .title
        .as_deref()
        .or(result.source.as_deref())
        .unwrap_or("(untitled)");
    writeln!(out, "{:2}. {}", number, truncate(title, 100))?;
    match &result.source {
        Some(source) => writeln!(out, "    {} - {}", source, truncate(&result.link, 80))?,
        None => writeln!(out, "    {}", truncate(&result.link, 80))?,
    }
    if let Some(snippet) = &result.snippet {
        writeln!(out, "    {}", truncate(snippet, 100))?;
    }
    if result.image != result.link {
        writeln!(out, "    image: {}", truncate(&result.image, 80))?;
    }
    if result.thumbnail != result.image && result.thumbnail != result.link {
        writeln!(out, "    thumbnail: {}", truncate(&result.thumbnail, 80))?;
    }
    writeln!(out)
}

/// Print one chat reply with its citations and follow-up questions
pub fn write_chat_reply<W: Write>(out: &mut W, response: &ChatResponse) -> io::Result<()> {
    writeln!(out, "{}", response.answer)?;

    if !response.sources.is_empty() {
        writeln!(out)?;
        writeln!(out, "Sources:")?;
        for source in &response.sources {
            writeln!(
                out,
                "  [{}] {} - {}",
                source.citation_number,
                truncate(&source.title, 80),
                source.domain
            )?;
            writeln!(out, "      {}", truncate(&source.url, 80))?;
        }
    }

    if !response.related_questions.is_empty() {
        writeln!(out)?;
        writeln!(out, "Related (type the number to ask):")?;
        for (i, question) in response.related_questions.iter().enumerate() {
            writeln!(out, "  {}. {}", i + 1, question)?;
        }
    }

    writeln!(out)
}

/// Print query suggestions, one per line
pub fn write_suggestions<W: Write>(out: &mut W, suggestions: &[String]) -> io::Result<()> {
    if suggestions.is_empty() {
        return writeln!(out, "No suggestions");
    }
    for suggestion in suggestions {
        writeln!(out, "{}", suggestion)?;
    }
    Ok(())
}

/// Print the API key pool status
pub fn write_summary<W: Write>(out: &mut W, keys: usize, summary: &StatusSummary) -> io::Result<()> {
    writeln!(
        out,
        "API keys: {} total, {} available, {} near limit, {} blocked",
        keys, summary.available, summary.near_limit, summary.blocked
    )
}

/// Truncate string to max length
fn truncate(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();

    if char_count <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
