//! Page rendering for article records and the daily digest.

use chrono::NaiveDate;

use super::blocks::{Block, Properties, PropertyValue, RichText, bold, linked, text};
use crate::pipeline::types::{Article, ProcessedNewsletter, total_articles};

/// Max blocks accepted by one create or append call.
pub const MAX_BLOCKS_PER_CALL: usize = 100;

const MUST_READ_GLYPH: &str = "💥 ";

/// Link to a persisted record, built from its id.
pub fn record_url(record_id: &str) -> String {
    format!("https://notion.so/{}", record_id.replace('-', ""))
}

// ── Article record ──────────────────────────────────────────────────

pub fn article_properties(article: &Article, fallback_url: &str, today: NaiveDate) -> Properties {
    let url = article.url.as_deref().unwrap_or(fallback_url);
    Properties::from([
        ("Article Title".to_string(), PropertyValue::title(&article.title)),
        (
            "Newsletter Name".to_string(),
            PropertyValue::rich_text(&article.source_name),
        ),
        (
            "Newsletter Subject Line".to_string(),
            PropertyValue::rich_text(&article.source_subject),
        ),
        ("Article Link".to_string(), PropertyValue::Url(url.to_string())),
        ("Summary".to_string(), PropertyValue::rich_text(&article.summary)),
        ("Category".to_string(), PropertyValue::select(&article.category)),
        ("Must-Read".to_string(), PropertyValue::Checkbox(article.must_read)),
        ("Date Processed".to_string(), PropertyValue::date(today)),
        ("Rank".to_string(), PropertyValue::Number(u64::from(article.rank))),
    ])
}

/// "Key Takeaways" heading followed by one bullet per takeaway.
pub fn article_children(article: &Article) -> Vec<Block> {
    std::iter::once(Block::heading_3("Key Takeaways"))
        .chain(article.takeaways.iter().map(|t| Block::bullet(t)))
        .collect()
}

// ── Daily digest ────────────────────────────────────────────────────

pub fn summary_title(day: NaiveDate) -> String {
    format!("Newsletter Digest - {}", day.format("%B %d, %Y"))
}

pub fn summary_properties(newsletters: &[ProcessedNewsletter], day: NaiveDate) -> Properties {
    Properties::from([
        ("Title".to_string(), PropertyValue::title(&summary_title(day))),
        ("Date".to_string(), PropertyValue::date(day)),
        (
            "Number of Newsletters".to_string(),
            PropertyValue::Number(newsletters.len() as u64),
        ),
        (
            "Number of Articles".to_string(),
            PropertyValue::Number(total_articles(newsletters) as u64),
        ),
    ])
}

/// Full digest body, one section per newsletter, divider after each.
pub fn summary_blocks(newsletters: &[ProcessedNewsletter], fallback_url: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    for newsletter in newsletters {
        blocks.push(Block::heading_2(&format!(
            "{} - {}",
            newsletter.name, newsletter.subject
        )));
        for article in &newsletter.articles {
            blocks.extend(article_section(article, fallback_url));
        }
        blocks.push(Block::divider());
    }
    blocks
}

fn article_section(article: &Article, fallback_url: &str) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(article.takeaways.len() + 4);
    blocks.push(Block::paragraph(title_line(article, fallback_url)));
    blocks.push(Block::paragraph(text(&article.summary)));
    blocks.push(Block::paragraph(bold("Key Takeaways:")));
    blocks.extend(article.takeaways.iter().map(|t| Block::bullet(t)));
    blocks.push(Block::spacer());
    blocks
}

fn title_line(article: &Article, fallback_url: &str) -> Vec<RichText> {
    let url = article.url.as_deref().unwrap_or(fallback_url);
    let mut line = Vec::new();
    if article.must_read {
        line.extend(text(MUST_READ_GLYPH));
    }
    line.extend(linked(&article.title, url));
    line.extend(text(" "));
    if let Some(ref id) = article.record_id {
        line.extend(linked("[View in DB]", &record_url(id)));
    }
    line
}

/// Split into consecutive groups of at most `limit` whole blocks.
pub fn chunk_blocks(blocks: Vec<Block>, limit: usize) -> Vec<Vec<Block>> {
    blocks.chunks(limit.max(1)).map(<[Block]>::to_vec).collect()
}
