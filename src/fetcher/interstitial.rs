//! Content-based detection of access-denial pages served with HTTP 200.
//!
//! Anti-scraping layers often answer with a normal status and a CAPTCHA,
//! consent wall or "unusual traffic" notice instead of the page. These are
//! terminal for the page, so they are reported as BLOCKED rather than being
//! retried as missing content.
//!
//! Detection looks at the parsed page, not the raw markup: phrases must be
//! in visible text (scripts and styles do not count), challenge containers
//! are matched by id or class, and consent walls by where their form posts.
//! Embeddable CAPTCHA widgets (reCAPTCHA, hCaptcha) also show up on normal
//! pages with sign-up forms, so they only count on thin pages.

use crate::extractor::visible_lines;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

/// Containers that only exist on challenge pages, with their label.
const CHALLENGE_ELEMENTS: &[(&str, &str)] = &[
    ("#px-captcha", "captcha"),
    ("#cf-challenge-running, .cf-challenge, #challenge-form", "challenge"),
    (
        r#"form[action*="consent.yahoo.com"], form[action*="consent.google.com"]"#,
        "consent wall",
    ),
];

/// Widgets that are a denial only when the page has little else on it.
const CAPTCHA_WIDGETS: &str =
    r#".g-recaptcha, .h-captcha, iframe[src*="recaptcha"], iframe[src*="hcaptcha"]"#;

/// Visible text below this many characters makes a page "thin".
const THIN_PAGE_CHARS: usize = 1_500;

/// Phrases matched against visible text.
const TEXT_MARKERS: &[(&str, &str)] = &[
    ("unusual traffic from your computer network", "unusual traffic"),
    ("are you a robot", "robot check"),
    ("please verify you are a human", "robot check"),
];

/// Page titles used by common denial pages.
const TITLE_MARKERS: &[&str] = &[
    "access denied",
    "attention required",
    "just a moment",
    "are you a robot",
    "robot check",
    "before you continue",
];

static CHALLENGE: Lazy<Vec<(Selector, &'static str)>> = Lazy::new(|| {
    CHALLENGE_ELEMENTS
        .iter()
        .map(|(css, label)| (Selector::parse(css).expect("challenge selector"), *label))
        .collect()
});
static WIDGETS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(CAPTCHA_WIDGETS).expect("captcha widget selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("title selector"));

/// Returns the matched marker label when `html` looks like a denial page.
pub fn detect(html: &str) -> Option<&'static str> {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().to_lowercase())
        .unwrap_or_default();
    if let Some(marker) = TITLE_MARKERS.iter().find(|m| title.contains(**m)) {
        return Some(*marker);
    }

    if let Some((_, label)) = CHALLENGE.iter().find(|(sel, _)| doc.select(sel).next().is_some()) {
        return Some(*label);
    }

    let text = visible_lines(&doc).join("\n").to_lowercase();
    if let Some((_, label)) = TEXT_MARKERS.iter().find(|(needle, _)| text.contains(needle)) {
        return Some(*label);
    }

    if text.chars().count() < THIN_PAGE_CHARS && doc.select(&WIDGETS).next().is_some() {
        return Some("captcha");
    }
    None
}
