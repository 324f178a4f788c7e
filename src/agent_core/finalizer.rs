//! Output finalizer — turns the backend's final text into one self-contained
//! HTML document.
//!
//! If the text already contains a document (`<!DOCTYPE` … `</html>`), that
//! span is returned untouched. Otherwise the text is treated as light markup
//! and wrapped in a fixed style template. The conversion is a small closed
//! set of substitutions, not a general markup parser. All text is escaped
//! before conversion, so the wrapped document never carries script content.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// ─── Template ────────────────────────────────────────────────────────────────

const DOCTYPE_MARKER: &str = "<!DOCTYPE";
const HTML_CLOSE: &str = "</html>";

const STYLE: &str = "\
  body { font-family: system-ui, -apple-system, sans-serif; max-width: 820px; margin: 0 auto; padding: 32px 24px; line-height: 1.65; color: #333; background: #fff; }
  h1 { color: #1a1a2e; border-bottom: 2px solid #e8e8e8; padding-bottom: 12px; }
  h2, h3 { color: #1a1a2e; margin-top: 1.5em; }
  a { color: #0066cc; }
  pre { background: #f4f4f4; padding: 16px; border-radius: 8px; overflow-x: auto; font-size: 0.9em; }
  code { background: #f0f0f0; padding: 2px 6px; border-radius: 4px; font-size: 0.9em; }
  blockquote { border-left: 4px solid #ddd; margin: 0; padding-left: 16px; color: #666; }
  ul, ol { padding-left: 1.5em; }";

// Placeholder delimiters. Stripped from input before use.
const BLOCK_MARK: char = '\u{0}';
const INLINE_MARK: char = '\u{1}';

static FENCED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[\w+-]*[ \t]*\n?(.*?)```").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("valid regex"));
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,3})\s+(.+)$").expect("valid regex"));
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*]\s+(.+)$").expect("valid regex"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("valid regex"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").expect("valid regex"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("valid regex"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+?)\*").expect("valid regex"));
static PLACEHOLDER_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\x00(\d+)\x00$").expect("valid regex"));
static PLACEHOLDER_INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x01(\d+)\x01").expect("valid regex"));

// ─── Public API ──────────────────────────────────────────────────────────────

/// Return the embedded HTML document in `raw_text`, or wrap the text in one.
///
/// Applying this to its own output returns the output unchanged.
pub fn extract_or_wrap(raw_text: &str, original_query: &str) -> String {
    if let Some(document) = extract_document(raw_text) {
        return document.to_string();
    }
    wrap_document(&markup_to_html(raw_text), &escape_html(original_query))
}

/// The span from the first `<!DOCTYPE` through the last `</html>`, if any.
fn extract_document(text: &str) -> Option<&str> {
    let start = text.find(DOCTYPE_MARKER)?;
    let end = text.rfind(HTML_CLOSE)?;
    (end > start).then(|| &text[start..end + HTML_CLOSE.len()])
}

fn wrap_document(body: &str, title: &str) -> String {
    format!(
        "<!DOCTYPE html>
<html lang=\"en\">
<head>
<meta charset=\"utf-8\">
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">
<title>{title}</title>
<style>
{STYLE}
</style>
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>"
    )
}

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

// ─── Markup Conversion ───────────────────────────────────────────────────────

/// Convert the supported markup subset to HTML.
fn markup_to_html(text: &str) -> String {
    let text: String = text
        .replace("\r\n", "\n")
        .chars()
        .filter(|c| *c != BLOCK_MARK && *c != INLINE_MARK)
        .collect();

    // Pull fenced code out first so nothing inside it is converted
    let mut code_blocks: Vec<String> = Vec::new();
    let text = FENCED_CODE.replace_all(&text, |caps: &Captures| {
        code_blocks.push(format!(
            "<pre><code>{}</code></pre>",
            escape_html(caps[1].trim_end_matches('\n'))
        ));
        format!("\n\n{BLOCK_MARK}{}{BLOCK_MARK}\n\n", code_blocks.len() - 1)
    });

    let escaped = escape_html(&text);
    let mut html = Vec::new();
    for block in BLANK_LINES.split(&escaped) {
        let block = block.trim_matches('\n');
        if block.trim().is_empty() {
            continue;
        }
        if let Some(caps) = PLACEHOLDER_BLOCK.captures(block.trim()) {
            let index: usize = caps[1].parse().unwrap_or(usize::MAX);
            if let Some(code) = code_blocks.get(index) {
                html.push(code.clone());
            }
            continue;
        }
        html.push(convert_block(block));
    }
    html.join("\n")
}

/// Convert one blank-line-delimited block of escaped text.
fn convert_block(block: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut list: Vec<String> = Vec::new();

    fn flush_paragraph(out: &mut Vec<String>, paragraph: &mut Vec<String>) {
        if !paragraph.is_empty() {
            out.push(format!("<p>{}</p>", paragraph.join("\n")));
            paragraph.clear();
        }
    }
    fn flush_list(out: &mut Vec<String>, list: &mut Vec<String>) {
        if !list.is_empty() {
            let items: String = list.iter().map(|i| format!("<li>{i}</li>")).collect();
            out.push(format!("<ul>{items}</ul>"));
            list.clear();
        }
    }

    for line in block.lines() {
        let trimmed = line.trim();
        if let Some(caps) = HEADING.captures(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            flush_list(&mut out, &mut list);
            let level = caps[1].len();
            out.push(format!("<h{level}>{}</h{level}>", convert_inline(caps[2].trim())));
        } else if let Some(caps) = LIST_ITEM.captures(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            list.push(convert_inline(&caps[1]));
        } else {
            flush_list(&mut out, &mut list);
            paragraph.push(convert_inline(trimmed));
        }
    }
    flush_paragraph(&mut out, &mut paragraph);
    flush_list(&mut out, &mut list);
    out.join("\n")
}

/// Inline code, links, bold and italic on one line of escaped text.
fn convert_inline(line: &str) -> String {
    let mut spans: Vec<String> = Vec::new();
    let line = INLINE_CODE.replace_all(line, |caps: &Captures| {
        spans.push(format!("<code>{}</code>", &caps[1]));
        format!("{INLINE_MARK}{}{INLINE_MARK}", spans.len() - 1)
    });

    let line = LINK.replace_all(&line, |caps: &Captures| {
        let (label, href) = (&caps[1], &caps[2]);
        if is_safe_href(href) {
            format!("<a href=\"{href}\">{label}</a>")
        } else {
            label.to_string()
        }
    });
    let line = BOLD.replace_all(&line, "<strong>$1</strong>");
    let line = ITALIC.replace_all(&line, "<em>$1</em>");

    PLACEHOLDER_INLINE
        .replace_all(&line, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| spans.get(i).cloned())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Only web, mail and same-document targets become anchors.
fn is_safe_href(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    ["http://", "https://", "mailto:", "#", "/"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
