use pulldown_cmark::{html, Event, Options, Parser};

/// Render markdown to HTML. Raw HTML in the source is escaped, never passed through.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() + markdown.len() / 2);
    html::push_html(&mut out, events);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_headers_emphasis_and_rules() {
        let out = markdown_to_html("# Title\n\n**bold** and *em*\n\n---\n\n- one\n- two\n");
        assert!(out.contains("<h1>Title</h1>"));
        assert!(out.contains("<strong>bold</strong>"));
        assert!(out.contains("<em>em</em>"));
        assert!(out.contains("<hr />"));
        assert!(out.contains("<li>one</li>"));
    }

    #[test]
    fn trailing_double_space_is_a_line_break() {
        let out = markdown_to_html("**File:** a  \n**Type:** b");
        assert!(out.contains("<br />"));
    }

    #[test]
    fn raw_html_is_escaped() {
        let out = markdown_to_html("before <script>alert(1)</script> after\n\n<div onclick=\"x\">block</div>\n");
        assert!(!out.contains("<script>"));
        assert!(out.contains("&lt;script&gt;"));
        assert!(!out.contains("<div"));
    }

    #[test]
    fn fenced_code_is_preformatted() {
        let out = markdown_to_html("```dockerfile\nUSER root\n```\n");
        assert!(out.contains("<pre><code class=\"language-dockerfile\">USER root\n</code></pre>"));
    }
}
