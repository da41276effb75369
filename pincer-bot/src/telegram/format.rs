//! Markdown to Telegram HTML conversion.
//!
//! Model output arrives as ordinary Markdown. Telegram's HTML mode renders
//! it more reliably than its Markdown modes (fewer escaping rules, nesting
//! works), so replies are converted before sending. A reply Telegram still
//! refuses to parse is resent as plain text by the caller.

use regex::Regex;
use std::sync::LazyLock;

static H1_OR_H2: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,2} (.+)$").unwrap());
static H3_PLUS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{3,6} (.+)$").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\s*)[-*] (.*)$").unwrap());
static QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^> (.+)$").unwrap());
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[a-zA-Z0-9_+-]*\n?([\s\S]*?)```").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
static BOLD_DOUBLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
// Single-asterisk bold runs after the double-asterisk pass to avoid
// swallowing half of a ** pair.
static BOLD_SINGLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\n]+?)\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_([^_\n]+?)_").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+?)`").unwrap());

/// Convert Markdown to Telegram-compatible HTML.
///
/// | Input          | Output                   |
/// |----------------|--------------------------|
/// | `# Title`      | `<b>Title</b>`           |
/// | `### Section`  | `<i>Section</i>`         |
/// | `- Item`       | `• Item`                 |
/// | `> Quote`      | `┃ Quote`                |
/// | ` ```code``` ` | `<pre>code</pre>`        |
/// | `**bold**`     | `<b>bold</b>`            |
/// | `_italic_`     | `<i>italic</i>`          |
/// | `` `code` ``   | `<code>code</code>`      |
/// | `[text](url)`  | `<a href="url">text</a>` |
pub fn to_telegram_html(input: &str) -> String {
    let with_blocks = convert_fenced_blocks(input);

    // Lines inside <pre> blocks must stay untouched
    let mut in_pre = false;
    let converted: Vec<String> = with_blocks
        .lines()
        .map(|line| {
            let opens = line.contains("<pre>");
            let closes = line.contains("</pre>");
            if opens || closes || in_pre {
                if opens && !closes {
                    in_pre = true;
                } else if closes {
                    in_pre = false;
                }
                line.to_string()
            } else {
                convert_inline(&convert_line(line))
            }
        })
        .collect();

    converted.join("\n")
}

/// Fenced code blocks become `<pre>` with their content escaped.
fn convert_fenced_blocks(input: &str) -> String {
    FENCED_BLOCK
        .replace_all(input, |caps: &regex::Captures| {
            let code = caps.get(1).map_or("", |m| m.as_str());
            format!("<pre>{}</pre>", escape_html(code.trim()))
        })
        .to_string()
}

fn convert_line(line: &str) -> String {
    if let Some(caps) = H1_OR_H2.captures(line) {
        let title = caps.get(1).map_or("", |m| m.as_str());
        return format!("<b>{}</b>", escape_html(title));
    }

    if let Some(caps) = H3_PLUS.captures(line) {
        let title = caps.get(1).map_or("", |m| m.as_str());
        return format!("<i>{}</i>", escape_html(title));
    }

    if let Some(caps) = QUOTE.captures(line) {
        let text = caps.get(1).map_or("", |m| m.as_str());
        return format!("┃ <i>{}</i>", escape_html(text));
    }

    if let Some(caps) = BULLET.captures(line) {
        let indent = caps.get(1).map_or("", |m| m.as_str());
        let item = caps.get(2).map_or("", |m| m.as_str());
        return format!("{indent}• {item}");
    }

    line.to_string()
}

fn convert_inline(text: &str) -> String {
    let mut result = LINK
        .replace_all(text, |caps: &regex::Captures| {
            let label = caps.get(1).map_or("", |m| m.as_str());
            let url = caps.get(2).map_or("", |m| m.as_str());
            format!("<a href=\"{url}\">{label}</a>")
        })
        .to_string();

    result = BOLD_DOUBLE.replace_all(&result, "<b>$1</b>").to_string();
    result = BOLD_SINGLE.replace_all(&result, "<b>$1</b>").to_string();
    result = ITALIC.replace_all(&result, "<i>$1</i>").to_string();
    result = INLINE_CODE
        .replace_all(&result, |caps: &regex::Captures| {
            let code = caps.get(1).map_or("", |m| m.as_str());
            format!("<code>{}</code>", escape_html(code))
        })
        .to_string();

    result
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_become_bold_or_italic() {
        assert_eq!(to_telegram_html("# Title"), "<b>Title</b>");
        assert_eq!(to_telegram_html("## Subtitle"), "<b>Subtitle</b>");
        assert_eq!(to_telegram_html("### Section"), "<i>Section</i>");
    }

    #[test]
    fn bullets_keep_their_indent() {
        assert_eq!(to_telegram_html("- Item"), "• Item");
        assert_eq!(to_telegram_html("* Item"), "• Item");
        assert_eq!(to_telegram_html("- Top\n  - Nested"), "• Top\n  • Nested");
    }

    #[test]
    fn quotes_get_a_bar() {
        assert_eq!(to_telegram_html("> Quote"), "┃ <i>Quote</i>");
    }

    #[test]
    fn numbered_lists_pass_through() {
        assert_eq!(to_telegram_html("1. First"), "1. First");
    }

    #[test]
    fn fenced_block_becomes_pre() {
        assert_eq!(
            to_telegram_html("```rust\nfn main() {}\n```"),
            "<pre>fn main() {}</pre>"
        );
    }

    #[test]
    fn fenced_block_content_is_not_reformatted() {
        let input = "```\n- not a bullet\n**not bold**\n```";
        assert_eq!(
            to_telegram_html(input),
            "<pre>- not a bullet\n**not bold**</pre>"
        );
    }

    #[test]
    fn code_is_escaped() {
        assert_eq!(
            to_telegram_html("`<b>&</b>`"),
            "<code>&lt;b&gt;&amp;&lt;/b&gt;</code>"
        );
        assert_eq!(
            to_telegram_html("```\na < b && c > d\n```"),
            "<pre>a &lt; b &amp;&amp; c &gt; d</pre>"
        );
    }

    #[test]
    fn inline_formatting_converts() {
        assert_eq!(to_telegram_html("**bold**"), "<b>bold</b>");
        assert_eq!(to_telegram_html("*bold*"), "<b>bold</b>");
        assert_eq!(to_telegram_html("_italic_"), "<i>italic</i>");
        assert_eq!(to_telegram_html("see `ls -la`"), "see <code>ls -la</code>");
    }

    #[test]
    fn links_become_anchors() {
        assert_eq!(
            to_telegram_html("[docs](https://example.com)"),
            "<a href=\"https://example.com\">docs</a>"
        );
    }

    #[test]
    fn headings_escape_html() {
        assert_eq!(to_telegram_html("# A < B & C"), "<b>A &lt; B &amp; C</b>");
    }

    #[test]
    fn mixed_reply_converts_line_by_line() {
        let input = "## Summary\n- Point 1\n- Point 2\n\nPlain text.";
        let expected = "<b>Summary</b>\n• Point 1\n• Point 2\n\nPlain text.";
        assert_eq!(to_telegram_html(input), expected);
    }

    #[test]
    fn plain_text_is_left_alone() {
        // Unformatted text is sent as-is; if it happens to break HTML
        // parsing, the sender falls back to plain text.
        assert_eq!(to_telegram_html("2 < 3"), "2 < 3");
    }
}
