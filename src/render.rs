//! Presentation helpers
//!
//! Passage text comes from arbitrary indexed documents, so it is always
//! escaped before it is placed into markup.

use std::fmt::Write;

use crate::retrieval::Citation;

/// Escape `& < > " '` for safe insertion into HTML.
///
/// Not idempotent: escaping already-escaped text escapes the `&` again.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
    }
}

/// `<li>` per passage, in ranking order
pub fn render_sources_html(passages: &[Citation], snippet_chars: usize) -> String {
    let mut html = String::from("<ol class=\"sources\">");
    for passage in passages {
        let _ = write!(
            html,
            "<li><div class=\"meta\"><strong>{}</strong> pp. {} \
             <span class=\"score\">score {:.3}</span></div>\
             <div class=\"snippet\">{}</div></li>",
            escape_html(&passage.book),
            passage.pages,
            passage.score,
            escape_html(&truncate_chars(&passage.text, snippet_chars)),
        );
    }
    html.push_str("</ol>");
    html
}

/// Answer text as shown to the user
pub fn render_answer_text(answer: &str) -> String {
    answer.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PageRange;

    fn citation(book: &str, text: &str) -> Citation {
        Citation {
            position: 0,
            score: 0.87654,
            book: book.to_string(),
            source: format!("{book}.pdf#pp.4-5"),
            pages: PageRange::new(4, 5),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x & 'y'")</script>"#),
            "&lt;script&gt;alert(&quot;x &amp; &#39;y&#39;&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_escape_twice_double_escapes() {
        let once = escape_html("a < b & c");
        let twice = escape_html(&once);
        assert_eq!(once, "a &lt; b &amp; c");
        assert_eq!(twice, "a &amp;lt; b &amp;amp; c");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exactly", 7), "exactly");
        assert_eq!(truncate_chars("hello world", 6), "hello…");
        // multi-byte characters are never split
        assert_eq!(truncate_chars("héééllo", 3), "héé…");
    }

    #[test]
    fn test_render_sources_escapes_and_truncates() {
        let html = render_sources_html(
            &[citation("Tom & Jerry", "<b>bold</b> claims go on and on")],
            12,
        );
        assert!(html.starts_with("<ol class=\"sources\"><li>"));
        assert!(html.contains("<strong>Tom &amp; Jerry</strong> pp. 4-5"));
        assert!(html.contains("score 0.877"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;…"));
        assert!(!html.contains("<b>"));
        assert!(html.ends_with("</li></ol>"));
    }

    #[test]
    fn test_render_sources_keeps_order() {
        let html = render_sources_html(&[citation("First", "a"), citation("Second", "b")], 100);
        assert!(html.find("First").unwrap() < html.find("Second").unwrap());
    }

    #[test]
    fn test_render_answer_text() {
        assert_eq!(render_answer_text("  The answer.\n"), "The answer.");
    }
}
