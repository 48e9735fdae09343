//! Typed request shapes for the knowledge-base API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Max UTF-16 code units in one rich-text segment.
pub const RICH_TEXT_MAX_UNITS: usize = 2000;

// ── Rich text ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichText {
    Text {
        text: TextContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotations: Option<Annotations>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
}

impl RichText {
    fn segment(content: String, link: Option<&str>, bold: bool) -> Self {
        RichText::Text {
            text: TextContent {
                content,
                link: link.map(|url| Link {
                    url: url.to_string(),
                }),
            },
            annotations: bold.then(|| Annotations { bold: true }),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            RichText::Text { text, .. } => &text.content,
        }
    }

    pub fn link_url(&self) -> Option<&str> {
        match self {
            RichText::Text { text, .. } => text.link.as_ref().map(|l| l.url.as_str()),
        }
    }

    pub fn is_bold(&self) -> bool {
        match self {
            RichText::Text { annotations, .. } => annotations.as_ref().is_some_and(|a| a.bold),
        }
    }
}

/// Plain text, split into service-sized segments.
pub fn text(content: &str) -> Vec<RichText> {
    split_utf16(content, RICH_TEXT_MAX_UNITS)
        .into_iter()
        .map(|s| RichText::segment(s, None, false))
        .collect()
}

/// Linked text; every segment carries the link.
pub fn linked(content: &str, url: &str) -> Vec<RichText> {
    split_utf16(content, RICH_TEXT_MAX_UNITS)
        .into_iter()
        .map(|s| RichText::segment(s, Some(url), false))
        .collect()
}

pub fn bold(content: &str) -> Vec<RichText> {
    split_utf16(content, RICH_TEXT_MAX_UNITS)
        .into_iter()
        .map(|s| RichText::segment(s, None, true))
        .collect()
}

/// Split on char boundaries into pieces of at most `max` UTF-16 code units,
/// the unit the service counts in. Empty input yields no pieces.
pub fn split_utf16(content: &str, max: usize) -> Vec<String> {
    let max = max.max(2);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut units = 0;
    for c in content.chars() {
        let width = c.len_utf16();
        if units + width > max {
            pieces.push(std::mem::take(&mut current));
            units = 0;
        }
        current.push(c);
        units += width;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

// ── Blocks ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub rich_text: Vec<RichText>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Empty {}

/// One content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph { paragraph: TextBlock },
    #[serde(rename = "heading_2")]
    Heading2 { heading_2: TextBlock },
    #[serde(rename = "heading_3")]
    Heading3 { heading_3: TextBlock },
    BulletedListItem { bulleted_list_item: TextBlock },
    Divider { divider: Empty },
}

impl Block {
    pub fn paragraph(rich_text: Vec<RichText>) -> Self {
        Block::Paragraph {
            paragraph: TextBlock { rich_text },
        }
    }

    pub fn heading_2(content: &str) -> Self {
        Block::Heading2 {
            heading_2: TextBlock {
                rich_text: text(content),
            },
        }
    }

    pub fn heading_3(content: &str) -> Self {
        Block::Heading3 {
            heading_3: TextBlock {
                rich_text: text(content),
            },
        }
    }

    pub fn bullet(content: &str) -> Self {
        Block::BulletedListItem {
            bulleted_list_item: TextBlock {
                rich_text: text(content),
            },
        }
    }

    pub fn divider() -> Self {
        Block::Divider { divider: Empty {} }
    }

    /// Empty paragraph used as vertical space.
    pub fn spacer() -> Self {
        Block::paragraph(Vec::new())
    }

    pub fn rich_text(&self) -> &[RichText] {
        match self {
            Block::Paragraph { paragraph: b }
            | Block::Heading2 { heading_2: b }
            | Block::Heading3 { heading_3: b }
            | Block::BulletedListItem {
                bulleted_list_item: b,
            } => &b.rich_text,
            Block::Divider { .. } => &[],
        }
    }

    /// Concatenated text of the block.
    pub fn plain_text(&self) -> String {
        self.rich_text().iter().map(RichText::content).collect()
    }
}

// ── Page properties ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateValue {
    pub start: String,
}

/// One database property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Title(Vec<RichText>),
    RichText(Vec<RichText>),
    Url(String),
    Select(SelectOption),
    Checkbox(bool),
    Date(DateValue),
    Number(u64),
}

impl PropertyValue {
    pub fn title(content: &str) -> Self {
        PropertyValue::Title(text(content))
    }

    pub fn rich_text(content: &str) -> Self {
        PropertyValue::RichText(text(content))
    }

    pub fn select(name: &str) -> Self {
        PropertyValue::Select(SelectOption {
            name: name.to_string(),
        })
    }

    pub fn date(day: chrono::NaiveDate) -> Self {
        PropertyValue::Date(DateValue {
            start: day.format("%Y-%m-%d").to_string(),
        })
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;
