use std::sync::OnceLock;

use regex::Regex;

/// Post body ready for display: escaped markup with links and line
/// breaks, plus the image urls that were pulled out of the text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessedContent {
    pub html: String,
    pub images: Vec<String>,
}

fn image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(https?://[^\s]+\.(?:jpg|jpeg|gif|png|webp))").expect("image regex")
    })
}

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(https?://[^\s]+)").expect("link regex"))
}

/// Escape the five reserved markup characters. Runs before any other
/// transformation so nothing produced later is escaped twice.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

pub fn process_content(content: &str) -> ProcessedContent {
    let escaped = escape_html(content);

    let images: Vec<String> = image_regex()
        .find_iter(&escaped)
        .map(|m| m.as_str().to_owned())
        .collect();
    let without_images = image_regex().replace_all(&escaped, "");

    let linked = link_regex().replace_all(
        &without_images,
        r#"<a href="${1}" target="_blank" rel="noopener noreferrer">${1}</a>"#,
    );

    ProcessedContent {
        html: linked.replace('\n', "<br>"),
        images,
    }
}
