//! Text extraction and cleanup for fetched documents.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use esg_core::{EsgError, EsgResult};

/// Cleaned output cap, in characters.
pub const MAX_TEXT_CHARS: usize = 200_000;

static CHROME_BLOCKS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<(script|style|nav|header|footer|aside|noscript)\b[^>]*>.*?</(script|style|nav|header|footer|aside|noscript)>",
    )
    .unwrap()
});

static BLOCK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("p, h1, h2, h3, h4, h5, h6, li, blockquote, td").unwrap()
});

static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// Normalizes whitespace, strips control characters and caps the length.
/// Paragraph breaks (blank lines) survive; runs of blank lines collapse.
pub fn postprocess(text: &str) -> String {
    let no_controls: String = text
        .replace('\u{c}', "\n\n")
        .chars()
        .map(|c| {
            if c.is_control() && c != '\n' && c != '\t' {
                ' '
            } else {
                c
            }
        })
        .collect();

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = Vec::new();
    for line in no_controls.lines() {
        let squashed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if squashed.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(squashed);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    esg_core::truncate_chars(paragraphs.join("\n\n").trim(), MAX_TEXT_CHARS)
}

/// Inline text path: same cleanup as fetched documents.
pub fn clean_inline_text(text: &str) -> EsgResult<String> {
    let cleaned = postprocess(text);
    if cleaned.is_empty() {
        return Err(EsgError::Validation {
            field: "text".to_string(),
            message: "text is empty after cleaning".to_string(),
        });
    }
    Ok(cleaned)
}

/// Main-content extraction: page chrome is dropped, block-level elements
/// become paragraphs.
pub fn extract_html(html: &str) -> EsgResult<String> {
    let stripped = CHROME_BLOCKS_RE.replace_all(html, " ");
    let document = Html::parse_document(&stripped);

    let mut blocks: Vec<String> = Vec::new();
    for element in document.select(&BLOCK_SELECTOR) {
        let text = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() {
            blocks.push(text);
        }
    }

    let raw = if blocks.is_empty() {
        document
            .select(&BODY_SELECTOR)
            .next()
            .map(|body| body.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
    } else {
        blocks.join("\n\n")
    };

    let cleaned = postprocess(&raw);
    if cleaned.is_empty() {
        return Err(EsgError::Parse {
            message: "html document empty after cleaning".to_string(),
        });
    }
    Ok(cleaned)
}

/// PDF text extraction; page texts are joined with paragraph breaks.
pub fn extract_pdf(bytes: &[u8]) -> EsgResult<String> {
    let raw = pdf_extract::extract_text_from_mem(bytes).map_err(|e| EsgError::Parse {
        message: format!("pdf unreadable: {}", e),
    })?;
    let cleaned = postprocess(&raw);
    if cleaned.is_empty() {
        return Err(EsgError::Parse {
            message: "pdf contains no extractable text".to_string(),
        });
    }
    Ok(cleaned)
}
