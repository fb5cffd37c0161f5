use scraper::node::Node;
use scraper::{Html, Selector};

/// Tag types that never carry readable page content.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "form", "button",
    "meta", "link", "svg", "img", "video", "audio",
];

/// Class/id markers for boilerplate containers. Substring match, lowercase;
/// kept generic (structural UI words only, no site-specific heuristics).
const DENY_MARKERS: &[&str] = &[
    "nav",
    "footer",
    "header",
    "sidebar",
    "menu",
    "ad",
    "advertisement",
    "cookie",
    "popup",
    "modal",
    "comment",
];

#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub title: String,
    pub text: String,
}

fn is_boilerplate(el: &scraper::node::Element) -> bool {
    if SKIP_TAGS.contains(&el.name()) {
        return true;
    }
    for attr in ["class", "id"] {
        if let Some(v) = el.attr(attr) {
            let v = v.to_ascii_lowercase();
            if DENY_MARKERS.iter().any(|m| v.contains(m)) {
                return true;
            }
        }
    }
    false
}

fn collect_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(t) => {
                out.push_str(t);
                out.push(' ');
            }
            Node::Element(el) => {
                if !is_boilerplate(el) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reduce raw HTML to a document title and readable plain text.
///
/// Non-content tags and deny-listed containers are dropped, remaining text is
/// collected in document order, and whitespace runs collapse to single
/// spaces. A page with no visible text is a valid empty result, not an error.
pub fn extract(html: &str) -> Extracted {
    let doc = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            doc.select(&sel)
                .next()
                .map(|t| norm_ws(&t.text().collect::<String>()))
        })
        .unwrap_or_default();

    let mut raw = String::new();
    collect_text(doc.tree.root(), &mut raw);

    Extracted {
        title,
        text: norm_ws(&raw),
    }
}

/// Cut `s` to at most `max_chars` chars. Returns the (possibly shortened)
/// text, its char count, and whether anything was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> (String, usize, bool) {
    let mut out = String::new();
    let mut n = 0usize;
    for ch in s.chars() {
        if n >= max_chars {
            return (out, n, true);
        }
        out.push(ch);
        n += 1;
    }
    (out, n, false)
}
