//! Field extraction from loaded documents.
//!
//! A field is located by an ordered fallback chain of selector strings, each
//! parsed into a [`SelectorStrategy`]:
//!
//! | Form | Example | Yields |
//! |------|---------|--------|
//! | CSS | `.YMlKec.fxKbKc` | text of the matching node |
//! | CSS + attribute | `a.headline@href` | attribute value of the matching node |
//! | Text pattern | `text:(?i)price\s*([\d,.]+)` | regex match over visible page text |
//!
//! The chain order is a policy: the first strategy that finds a non-blank
//! value wins even if a later one would also match. Everything here is a pure
//! function of its inputs.

use crate::error::{ExtractionError, PipelineError};
use crate::fetcher::Document;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

const TEXT_PREFIX: &str = "text:";

/// How many ancestors above a headline are searched for its timestamp.
const TIME_SEARCH_DEPTH: usize = 3;

static ATTR_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*[^\s])@([A-Za-z_][A-Za-z0-9_:.-]*)$").expect("attr regex"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));
static TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("time selector"));

/// One step of a fallback chain.
#[derive(Debug, Clone)]
pub enum SelectorStrategy {
    Css {
        selector: Selector,
        attr: Option<String>,
    },
    TextPattern(Regex),
}

impl SelectorStrategy {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        if let Some(pattern) = raw.strip_prefix(TEXT_PREFIX) {
            let re = Regex::new(pattern)
                .map_err(|e| PipelineError::InvalidInput(format!("bad text pattern {pattern:?}: {e}")))?;
            return Ok(SelectorStrategy::TextPattern(re));
        }

        let (css, attr) = match ATTR_SUFFIX.captures(raw) {
            Some(caps) => (caps[1].to_string(), Some(caps[2].to_string())),
            _ => (raw.to_string(), None),
        };
        let selector = Selector::parse(&css)
            .map_err(|e| PipelineError::InvalidInput(format!("bad css selector {css:?}: {e}")))?;
        Ok(SelectorStrategy::Css { selector, attr })
    }
}

/// A list match: node text plus whatever link and timestamp sit next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub text: String,
    pub link: Option<String>,
    pub datetime: Option<String>,
}

/// Parse a selector chain up front.
///
/// # Arguments
///
/// * `selectors` - Raw selector strings in precedence order
///
/// # Returns
///
/// The parsed strategies in the same order, or `InvalidInput` naming the
/// first entry that does not parse. A malformed chain is caller input, so it
/// is rejected before any page is loaded.
pub fn parse_chain(selectors: &[String]) -> Result<Vec<SelectorStrategy>, PipelineError> {
    if selectors.is_empty() {
        return Err(PipelineError::InvalidInput("empty selector chain".to_string()));
    }
    selectors.iter().map(|raw| SelectorStrategy::parse(raw)).collect()
}

/// Return the value of the first strategy in `chain` that matches a
/// non-blank node. Fails `NotFound` only once every strategy is exhausted.
pub fn extract(document: &Document, chain: &[SelectorStrategy]) -> Result<String, ExtractionError> {
    extract_where(document, chain, |_| true)
}

/// Like [`extract`], but a candidate value is only taken when `accept` holds.
///
/// Rejected candidates fall through to the next node of the same strategy,
/// then to the next strategy, so a chain can mix layouts where only some
/// nodes carry the wanted form (e.g. a percentage rather than an absolute change).
pub fn extract_where<F>(
    document: &Document,
    chain: &[SelectorStrategy],
    accept: F,
) -> Result<String, ExtractionError>
where
    F: Fn(&str) -> bool,
{
    let html = Html::parse_document(&document.html);

    for (i, strategy) in chain.iter().enumerate() {
        let found = match strategy {
            SelectorStrategy::Css { selector, attr } => html
                .select(selector)
                .filter_map(|el| node_value(el, attr.as_deref()))
                .find(|v| accept(v.as_str())),
            SelectorStrategy::TextPattern(re) => {
                let text = visible_lines(&html).join("\n");
                re.captures_iter(&text)
                    .filter_map(|caps| {
                        let m = caps.get(1).or_else(|| caps.get(0))?;
                        non_blank(m.as_str())
                    })
                    .find(|v| accept(v.as_str()))
            }
        };
        if let Some(value) = found {
            debug!(url = %document.url, selector_index = i, %value, "Selector matched");
            return Ok(value);
        }
    }

    Err(ExtractionError::NotFound { tried: chain.len() })
}

/// Return up to `limit` non-blank matches of the first selector that matches
/// anything at all.
pub fn extract_all(document: &Document, chain: &[SelectorStrategy], limit: usize) -> Vec<RawItem> {
    let html = Html::parse_document(&document.html);
    let base = Url::parse(&document.url).ok();

    for strategy in chain {
        let items: Vec<RawItem> = match strategy {
            SelectorStrategy::Css { selector, attr } => html
                .select(selector)
                .filter_map(|el| {
                    let text = node_value(el, attr.as_deref())?;
                    Some(RawItem {
                        text,
                        link: nearest_link(el).and_then(|href| resolve(base.as_ref(), &href)),
                        datetime: nearest_time(el),
                    })
                })
                .take(limit)
                .collect(),
            SelectorStrategy::TextPattern(re) => {
                let text = visible_lines(&html).join("\n");
                re.captures_iter(&text)
                    .filter_map(|caps| {
                        let m = caps.get(1).or_else(|| caps.get(0))?;
                        non_blank(m.as_str())
                    })
                    .take(limit)
                    .map(|text| RawItem {
                        text,
                        link: None,
                        datetime: None,
                    })
                    .collect()
            }
        };
        if !items.is_empty() {
            return items;
        }
    }
    Vec::new()
}

/// Visible text lines of the document body, in document order.
pub fn body_lines(document: &Document) -> Vec<String> {
    visible_lines(&Html::parse_document(&document.html))
}

/// True when `css` parses and matches at least one node in `html`.
pub fn has_selector(html: &str, css: &str) -> bool {
    match Selector::parse(css) {
        Ok(selector) => Html::parse_document(html).select(&selector).next().is_some(),
        Err(_) => false,
    }
}

fn non_blank(s: &str) -> Option<String> {
    let collapsed = s.split_whitespace().join(" ");
    if collapsed.is_empty() { None } else { Some(collapsed) }
}

fn node_value(el: ElementRef<'_>, attr: Option<&str>) -> Option<String> {
    match attr {
        Some(name) => el.value().attr(name).and_then(non_blank),
        None => non_blank(&el.text().collect::<Vec<_>>().join(" ")),
    }
}

pub(crate) fn visible_lines(html: &Html) -> Vec<String> {
    html.root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|a| {
                a.value().as_element().is_some_and(|e| {
                    matches!(e.name(), "script" | "style" | "noscript" | "template" | "head")
                })
            });
            if hidden {
                return None;
            }
            non_blank(text)
        })
        .collect()
}

/// The element's own href, else the closest enclosing link, else the first link inside it.
fn nearest_link(el: ElementRef<'_>) -> Option<String> {
    if let Some(href) = el.value().attr("href") {
        return Some(href.to_string());
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "a" && a.value().attr("href").is_some())
        .or_else(|| el.select(&ANCHOR).next())
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// The first `<time datetime>` inside the element or one of its close
/// ancestors. The search stops at the enclosing list item or article.
fn nearest_time(el: ElementRef<'_>) -> Option<String> {
    let mut scope = Some(el);
    for _ in 0..=TIME_SEARCH_DEPTH {
        let node = scope?;
        if let Some(time) = node.select(&TIME).next() {
            return time.value().attr("datetime").map(str::to_string);
        }
        if matches!(node.value().name(), "li" | "article") {
            return None;
        }
        scope = node.parent().and_then(ElementRef::wrap);
    }
    None
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Document {
        Document::new("https://news.example.com/search?q=fed", html, Some(200))
    }

    fn chain(selectors: &[&str]) -> Vec<SelectorStrategy> {
        let raw: Vec<String> = selectors.iter().map(|s| s.to_string()).collect();
        parse_chain(&raw).unwrap()
    }

    #[test]
    fn test_first_matching_selector_wins() {
        let d = doc(r#"<div class="primary">101.50</div><div class="legacy">99.00</div>"#);
        let got = extract(&d, &chain(&[".primary", ".legacy"])).unwrap();
        assert_eq!(got, "101.50");
        let got = extract(&d, &chain(&[".legacy", ".primary"])).unwrap();
        assert_eq!(got, "99.00");
    }

    #[test]
    fn test_blank_nodes_fall_through() {
        let d = doc(r#"<span class="price">   </span><span class="alt">42.10</span>"#);
        let got = extract(&d, &chain(&[".price", ".missing", ".alt"])).unwrap();
        assert_eq!(got, "42.10");
    }

    #[test]
    fn test_later_node_of_same_selector_is_used_when_first_blank() {
        let d = doc(r#"<p class="q"></p><p class="q"> 7.00 </p>"#);
        assert_eq!(extract(&d, &chain(&[".q"])).unwrap(), "7.00");
    }

    #[test]
    fn test_not_found_after_all_selectors() {
        let d = doc("<p>nothing here</p>");
        let err = extract(&d, &chain(&[".a", ".b"])).unwrap_err();
        assert_eq!(err, ExtractionError::NotFound { tried: 2 });
    }

    #[test]
    fn test_text_pattern_fallback() {
        let d = doc(r#"<body><script>var price = 1;</script><div>Last price 188.20 USD</div></body>"#);
        let got = extract(&d, &chain(&[".missing", r"text:(?i)last price\s+([\d.,]+)"])).unwrap();
        assert_eq!(got, "188.20");
    }

    #[test]
    fn test_text_pattern_ignores_script_content() {
        let d = doc(r#"<body><script>Last price 1.00</script><p>none</p></body>"#);
        assert!(extract(&d, &chain(&[r"text:Last price ([\d.]+)"])).is_err());
    }

    #[test]
    fn test_attribute_selector() {
        let d = doc(r#"<a class="story" href="/2025/fed">Fed</a>"#);
        assert_eq!(extract(&d, &chain(&["a.story@href"])).unwrap(), "/2025/fed");
    }

    #[test]
    fn test_attribute_selector_keeps_css_attribute_brackets() {
        let d = doc(r#"<fin-streamer data-field="regularMarketPrice" value="189.84">189.84</fin-streamer>"#);
        let got = extract(&d, &chain(&[r#"[data-field="regularMarketPrice"]"#])).unwrap();
        assert_eq!(got, "189.84");
    }

    #[test]
    fn test_unparseable_selector_rejects_the_chain() {
        let raw = vec!["<<<".to_string(), ".ok".to_string()];
        assert!(matches!(parse_chain(&raw), Err(PipelineError::InvalidInput(_))));
        let raw = vec![".ok".to_string(), "text:(unclosed".to_string()];
        assert!(matches!(parse_chain(&raw), Err(PipelineError::InvalidInput(_))));
        assert!(matches!(parse_chain(&[]), Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_extract_where_falls_through_rejected_values() {
        let d = doc(
            r#"<span class="chg">+1.20</span><span class="chg">(+0.63%)</span><div class="pct">0.90%</div>"#,
        );
        let has_percent = |v: &str| v.contains('%');
        let got = extract_where(&d, &chain(&[".chg", ".pct"]), has_percent).unwrap();
        assert_eq!(got, "(+0.63%)");
        let got = extract_where(&d, &chain(&[".missing", ".chg:first-child", ".pct"]), has_percent).unwrap();
        assert_eq!(got, "0.90%");
        assert!(extract_where(&d, &chain(&[".chg"]), |v| v.is_empty()).is_err());
    }

    #[test]
    fn test_escaped_class_selector() {
        let d = doc(r#"<fin-streamer class="Fw(b) Fz(36px)">212.44</fin-streamer>"#);
        assert_eq!(extract(&d, &chain(&[r".Fw\(b\).Fz\(36px\)"])).unwrap(), "212.44");
    }

    #[test]
    fn test_extract_all_resolves_links_and_times() {
        let d = doc(
            r#"<ul>
                <li><a href="/a"><h3>Fed raises rates</h3></a><time datetime="2025-05-06T14:00:00Z">2h</time></li>
                <li><h3><a href="https://other.example.org/b">Stocks rally</a></h3></li>
                <li><h3> </h3></li>
            </ul>"#,
        );
        let items = extract_all(&d, &chain(&[".nope", "li h3"]), 10);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "Fed raises rates");
        assert_eq!(items[0].link.as_deref(), Some("https://news.example.com/a"));
        assert_eq!(items[0].datetime.as_deref(), Some("2025-05-06T14:00:00Z"));
        assert_eq!(items[1].link.as_deref(), Some("https://other.example.org/b"));
        assert_eq!(items[1].datetime, None);
    }

    #[test]
    fn test_time_search_stops_at_the_item() {
        let d = doc(
            r#"<article><div><a href="/x"><h2>Oil steadies</h2></a></div><footer><time datetime="2025-05-07T09:30:00Z">1h</time></footer></article>
               <article><h2>Gold slips</h2></article>
               <time datetime="2020-01-01T00:00:00Z">old</time>"#,
        );
        let items = extract_all(&d, &chain(&["article h2"]), 10);
        assert_eq!(items[0].datetime.as_deref(), Some("2025-05-07T09:30:00Z"));
        assert_eq!(items[1].datetime, None);
    }

    #[test]
    fn test_extract_all_respects_limit() {
        let d = doc("<h2>a</h2><h2>b</h2><h2>c</h2>");
        assert_eq!(extract_all(&d, &chain(&["h2"]), 2).len(), 2);
    }

    #[test]
    fn test_body_lines_skip_hidden_text() {
        let d = doc("<html><head><title>T</title></head><body><style>.x{}</style><p>Line one</p><div>Line   two</div></body></html>");
        assert_eq!(body_lines(&d), vec!["Line one".to_string(), "Line two".to_string()]);
    }

    #[test]
    fn test_has_selector() {
        assert!(has_selector("<div id='q'>1</div>", "#q"));
        assert!(!has_selector("<div id='q'>1</div>", "#r"));
        assert!(!has_selector("<div></div>", "<<<"));
    }
}
