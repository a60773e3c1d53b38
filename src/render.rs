//! Human-facing formatting of search hits for the CLI and the web feed.

use std::io::Write;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::semantic::SearchHit;

/// CLI text is cut to this many characters.
pub const CLI_TEXT_LIMIT: usize = 300;
const TRUNCATION_SUFFIX: &str = "...";

/// `950`, `1.2K`, `3.4M`.
pub fn compact_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

/// `1234567` as `1,234,567`.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Cut to `max_chars` characters (not bytes) and mark the cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

/// Export timestamps as `dd.mm.yyyy HH:MM`; anything unparsable is shown as is.
pub fn display_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return dt.format("%d.%m.%Y %H:%M").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%d.%m.%Y").to_string();
    }
    raw.to_string()
}

/// Avatar initials from the first two words of a profile name.
pub fn initials(profile: &str) -> String {
    let initials: String = profile
        .split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect();
    if initials.is_empty() {
        "?".to_string()
    } else {
        initials
    }
}

/// `87% match`, or `64% hybrid` for boosted hits.
pub fn score_label(hit: &SearchHit) -> String {
    match hit.hybrid_score {
        Some(hybrid) => format!("{:.0}% hybrid", hybrid * 100.0),
        None => format!("{:.0}% match", hit.similarity * 100.0),
    }
}

/// `url` if it is an http(s) link, otherwise empty. Feed cards only link
/// what survives this.
pub fn link_url(url: &str) -> String {
    match url::Url::parse(url.trim()) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => url.trim().to_string(),
        _ => String::new(),
    }
}

/// A hit flattened for JSON consumers.
#[derive(Debug, Clone, Serialize)]
pub struct HitView {
    pub rank: usize,
    pub id: String,
    pub profile: String,
    pub initials: String,
    pub date: String,
    pub text: String,
    pub interactions: u64,
    pub interactions_display: String,
    pub post_url: String,
    pub similarity: f32,
    pub hybrid_score: Option<f32>,
    pub score_label: String,
}

impl HitView {
    pub fn new(rank: usize, hit: &SearchHit) -> Self {
        Self {
            rank,
            id: hit.post.id.clone(),
            profile: hit.post.profile.clone(),
            initials: initials(&hit.post.profile),
            date: display_date(&hit.post.date),
            text: hit.post.text.clone(),
            interactions: hit.post.interactions,
            interactions_display: compact_count(hit.post.interactions),
            post_url: link_url(&hit.post.post_url),
            similarity: hit.similarity,
            hybrid_score: hit.hybrid_score,
            score_label: score_label(hit),
        }
    }

    pub fn from_hits(hits: &[SearchHit]) -> Vec<Self> {
        hits.iter()
            .enumerate()
            .map(|(i, hit)| Self::new(i + 1, hit))
            .collect()
    }
}

/// Plain-text result listing.
pub fn write_text(out: &mut impl Write, query: &str, hits: &[SearchHit]) -> std::io::Result<()> {
    let rule = "=".repeat(60);
    writeln!(out)?;
    writeln!(out, "{rule}")?;
    writeln!(out, "Query: {query}")?;
    writeln!(out, "Results: {}", hits.len())?;
    writeln!(out, "{rule}")?;
    writeln!(out)?;

    for (i, hit) in hits.iter().enumerate() {
        let mut score = format!("sim={:.3}", hit.similarity);
        if let Some(hybrid) = hit.hybrid_score {
            score.push_str(&format!("  hybrid={:.3}", hybrid));
        }

        writeln!(out, "--- #{} [{}] ---", i + 1, score)?;
        writeln!(
            out,
            "  {}  |  {}  |  {} interactions",
            hit.post.profile,
            hit.post.date,
            thousands(hit.post.interactions)
        )?;
        writeln!(out, "  {}", hit.post.post_url)?;
        writeln!(out, "  {}", truncate_text(&hit.post.text, CLI_TEXT_LIMIT))?;
        writeln!(out)?;
    }

    Ok(())
}

/// JSON result listing.
pub fn write_json(out: &mut impl Write, hits: &[SearchHit]) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, &HitView::from_hits(hits))?;
    writeln!(out)?;
    Ok(())
}
