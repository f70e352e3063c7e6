//! HTML reduction for the extractor: good enough for listings and articles,
//! not a readability implementation.
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;

/// Subtrees that never carry visible text.
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "svg", "template"];

/// Elements that start a new line.
const BLOCK_TAGS: &[&str] = &[
    "title", "p", "div", "br", "li", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "section",
    "article", "header", "footer", "table", "ul", "ol", "dl", "dt", "dd", "blockquote", "pre",
];

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("static selector"));
static CHALLENGE_NODES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "#challenge-form, #challenge-running, #cf-challenge-running, .cf-browser-verification, \
         #cf-chl-widget, #px-captcha, form[action*='__cf_chl']",
    )
    .expect("static selector")
});

/// Interstitial titles served by Cloudflare and similar walls.
const CHALLENGE_TITLES: &[&str] = &[
    "just a moment",
    "attention required! | cloudflare",
    "please wait while we verify",
    "access denied",
];

/// Inline script state only challenge pages set up.
const CHALLENGE_SCRIPTS: &[&str] = &["_cf_chl_opt", "window._cf_chl", "cf_chl_rc_"];

/// Page `<title>`, trimmed with whitespace collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    title_of(&Html::parse_document(html))
}

/// Visible text of `html`: scripts and styles dropped, block elements
/// turned into line breaks, whitespace collapsed. Entities are decoded by the
/// parser.
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut buf = String::with_capacity(html.len() / 2);
    collect_text(doc.root_element(), &mut buf);

    buf.lines()
        .map(collapse_inline)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Heuristic detection of anti-bot interstitials served with a 200. Pages
/// that merely load Cloudflare's background `challenge-platform` script are
/// not challenges.
pub fn is_challenge_page(html: &str) -> bool {
    let doc = Html::parse_document(html);
    if let Some(title) = title_of(&doc) {
        let title = title.to_lowercase();
        if CHALLENGE_TITLES.iter().any(|t| title.starts_with(t)) {
            return true;
        }
    }
    if doc.select(&CHALLENGE_NODES).next().is_some() {
        return true;
    }
    let lower = html.to_lowercase();
    CHALLENGE_SCRIPTS.iter().any(|m| lower.contains(m))
}

fn title_of(doc: &Html) -> Option<String> {
    let el = doc.select(&TITLE).next()?;
    let title = collapse_inline(&el.text().collect::<String>());
    (!title.is_empty()).then_some(title)
}

fn collect_text(el: ElementRef<'_>, buf: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => buf.push_str(text),
            Node::Element(e) => {
                let tag = e.name();
                if SKIP_TAGS.contains(&tag) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&tag);
                if block {
                    buf.push('\n');
                }
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, buf);
                }
                if block {
                    buf.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn collapse_inline(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
