use std::collections::{HashMap, HashSet};

use scraper::{Html, Selector};

use crate::normalize::normalize;

/// What a single extraction pass produces: the set of absolute outbound
/// links discovered on the page, and a word → occurrence-count map of the
/// tokens in its visible text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractResult {
    pub links: HashSet<String>,
    pub tokens: HashMap<String, u64>,
}

/// Parse raw bytes fetched from `base_url` into links and word tokens.
///
/// Bytes are decoded as UTF-8 with replacement regardless of what the server
/// claimed as `Content-Type` — a page can lie about its encoding. Malformed
/// markup never panics: `scraper` (html5ever under the hood) tolerates
/// arbitrary tag soup, and an empty or binary document simply yields empty
/// link/token sets.
pub fn extract(bytes: &[u8], base_url: &str) -> ExtractResult {
    let text = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&text);

    let links = extract_links(&document, base_url);
    let tokens = extract_tokens(&document);

    ExtractResult { links, tokens }
}

fn extract_links(document: &Html, base_url: &str) -> HashSet<String> {
    let mut links = HashSet::new();

    if let Ok(sel) = Selector::parse("a[href]") {
        for el in document.select(&sel) {
            if let Some(href) = el.value().attr("href") {
                push_link(&mut links, href, base_url);
            }
        }
    }
    if let Ok(sel) = Selector::parse("img[src], script[src], iframe[src]") {
        for el in document.select(&sel) {
            if let Some(src) = el.value().attr("src") {
                push_link(&mut links, src, base_url);
            }
        }
    }

    links
}

fn push_link(links: &mut HashSet<String>, raw: &str, base_url: &str) {
    if let Some(normalized) = normalize(raw, Some(base_url)) {
        links.insert(normalized);
    }
}

/// Tokens are maximal runs of Unicode letters in the page's visible text
/// (script/style contents excluded), lower-cased, length >= 2.
fn extract_tokens(document: &Html) -> HashMap<String, u64> {
    let mut text = String::new();
    collect_text_excluding(document.root_element(), &mut text);

    let mut tokens: HashMap<String, u64> = HashMap::new();
    for word in tokenize(&text) {
        *tokens.entry(word).or_insert(0) += 1;
    }
    tokens
}

/// Split `text` into maximal runs of Unicode letters, lower-cased, dropping
/// runs shorter than 2 characters. Used both for page text and — per the
/// search engine's contract — for query strings, so a query tokenizes
/// identically to the documents it's matched against.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() >= 2)
        .map(|w| w.chars().flat_map(|c| c.to_lowercase()).collect())
        .collect()
}

/// Recursively collect text, skipping the contents of `<script>`/`<style>`
/// elements entirely (their tags are never tokenized either).
fn collect_text_excluding(node: scraper::ElementRef, out: &mut String) {
    for child in node.children() {
        if let Some(text) = child.value().as_text() {
            out.push(' ');
            out.push_str(text);
        } else if let Some(el) = scraper::ElementRef::wrap(child) {
            let tag = el.value().name();
            if tag != "script" && tag != "style" {
                collect_text_excluding(el, out);
            }
        }
    }
}
