//! Source attribution and citation formatting
//!
//! Turns raw source URLs into human-readable, deduplicated, clickable
//! citation labels, and rewrites the trailing "(sources...)" annotation
//! of a generated answer into a stable citation list.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    /// Trailing parenthesised group at the end of an answer, e.g.
    /// "(https://a.com, https://b.com)." — the citation annotation.
    static ref TRAILING_PAREN: Regex =
        Regex::new(r"\(([^()]*)\)\.?\s*$").expect("valid regex");

    /// Words that commonly make up concatenated domain names. Used to
    /// split e.g. "businessinsider" into "business insider".
    static ref DOMAIN_WORDS: HashSet<&'static str> = [
        "news", "business", "insider", "times", "ny", "new", "york", "post",
        "daily", "mail", "finance", "financial", "yahoo", "google", "market",
        "markets", "watch", "street", "wall", "journal", "reuters",
        "bloomberg", "guardian", "tech", "crunch", "verge", "wired", "world",
        "report", "reports", "wiki", "wikipedia", "express", "herald",
        "tribune", "globe", "sun", "star", "mirror", "telegraph", "observer",
        "economist", "fortune", "forbes", "money", "invest", "investing",
        "investor", "investors", "investments", "stock", "stocks", "trade",
        "trading", "capital", "bank", "banking", "research", "insight",
        "insights", "analysis", "analytics", "data", "info", "review",
        "reviews", "digest", "wire", "press", "media", "radio", "sports",
        "sport", "science", "nature", "health", "life", "style", "travel",
        "food", "auto", "motor", "motors", "cars", "home", "house", "estate",
        "real", "zone", "hub", "spot", "point", "center", "central",
        "online", "live", "today", "weekly", "morning", "evening",
        "national", "international", "global", "local", "city", "metro",
        "web", "digital", "cloud", "open", "example", "quote", "exchange",
        "group", "corp", "company", "companies", "venture", "ventures",
        "fool", "motley", "seeking", "alpha", "zacks", "barrons", "cnbc",
        "cnn", "bbc", "nbc", "abc", "fox", "npr", "wsj", "usa",
    ]
    .into_iter()
    .collect();

    /// Public suffix labels stripped from the right of a hostname before
    /// picking the registrable domain.
    static ref TLD_LABELS: HashSet<&'static str> = [
        "com", "org", "net", "io", "co", "ai", "dev", "app", "gov", "edu",
        "info", "biz", "uk", "us", "de", "fr", "jp", "in", "ca", "au",
    ]
    .into_iter()
    .collect();
}

/// Render a clickable terminal hyperlink (OSC 8) for the given URL and text.
pub fn hyperlink(url: &str, text: &str) -> String {
    const ESC: &str = "\u{1b}";
    format!("{ESC}]8;;{url}{ESC}\\{text}{ESC}]8;;{ESC}\\")
}

/// Derive a human-readable display name from a URL.
///
/// The hostname's registrable domain (and subdomain, if any) are split
/// into constituent words, deduplicated preserving first occurrence, and
/// case-normalized: tokens of up to 3 characters are upper-cased, longer
/// ones title-cased.
///
/// Example: "https://finance.yahoo.com/quote/NVDA/" → "Yahoo Finance".
pub fn attribute(url: &str) -> String {
    let host = host_of(url);
    let mut labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();

    while labels.len() > 1 {
        let Some(last) = labels.last().copied() else {
            break;
        };
        if TLD_LABELS.contains(last) {
            labels.pop();
        } else {
            break;
        }
    }

    let mut words: Vec<String> = Vec::new();
    if let Some(domain) = labels.last() {
        words.extend(segment(domain));

        if labels.len() > 1 {
            let subdomain = labels[labels.len() - 2];
            if subdomain != "www" {
                words.extend(segment(subdomain));
            }
        }
    }

    let mut seen = HashSet::new();
    let unique: Vec<&String> = words.iter().filter(|w| seen.insert(w.as_str())).collect();

    unique
        .into_iter()
        .map(|w| format_word(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map each URL to a (display_name, url) pair.
pub fn extract_source_names<'a, I>(urls: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a str>,
{
    urls.into_iter()
        .map(|url| (attribute(url), url.to_string()))
        .collect()
}

/// Rewrite the trailing parenthesised source annotation of `text` into a
/// deduplicated hyperlinked citation list.
///
/// With a ticker the annotation becomes a single "Yahoo Finance" link to
/// the canonical quote page. Without one, the annotation is read as a
/// comma-separated URL list; each URL is attributed and deduplicated by
/// display name (not URL), preserving first-seen order.
///
/// Text without a trailing parenthesis, or whose annotation is already a
/// formatted citation list, is returned unchanged.
pub fn format_sources(text: &str, ticker: Option<&str>) -> String {
    let captures = match TRAILING_PAREN.captures(text) {
        Some(c) => c,
        None => return text.to_string(),
    };

    let inner = captures.get(1).map(|m| m.as_str()).unwrap_or_default();

    // Idempotence: an already-hyperlinked citation list is left alone.
    if inner.starts_with("Source: ") && inner.contains("\u{1b}]8;;") {
        return text.to_string();
    }

    let mut hyperlinks = Vec::new();

    if let Some(ticker) = ticker {
        let url = format!("https://finance.yahoo.com/quote/{}", ticker);
        hyperlinks.push(hyperlink(&url, "Yahoo Finance"));
    } else {
        let mut seen_names = HashSet::new();
        for (name, url) in extract_source_names(inner.split(", ")) {
            if seen_names.insert(name.clone()) {
                hyperlinks.push(hyperlink(&url, &name));
            }
        }
    }

    let matched = captures.get(0).expect("whole match");
    format!(
        "{}(Source: {}).",
        &text[..matched.start()],
        hyperlinks.join(", ")
    )
}

fn host_of(url: &str) -> String {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);

    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    host.split('@').last().unwrap_or_default() // drop userinfo
        .split(':')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Split one concatenated hostname label into dictionary words.
///
/// Dynamic programming over the lexicon, minimizing word count; a label
/// with no full segmentation is returned whole.
fn segment(label: &str) -> Vec<String> {
    let chars: Vec<char> = label.chars().collect();
    let n = chars.len();
    if n == 0 {
        return Vec::new();
    }

    // best[i] = (word_count, start_of_last_word) for prefix of length i
    let mut best: Vec<Option<(usize, usize)>> = vec![None; n + 1];
    best[0] = Some((0, 0));

    for end in 1..=n {
        for start in 0..end {
            let Some((count, _)) = best[start] else {
                continue;
            };
            let candidate: String = chars[start..end].iter().collect();
            if DOMAIN_WORDS.contains(candidate.as_str()) {
                let better = match best[end] {
                    None => true,
                    Some((existing, _)) => count + 1 < existing,
                };
                if better {
                    best[end] = Some((count + 1, start));
                }
            }
        }
    }

    if best[n].is_none() {
        return vec![label.to_string()];
    }

    let mut words = Vec::new();
    let mut end = n;
    while end > 0 {
        let (_, start) = best[end].expect("reachable prefix");
        words.push(chars[start..end].iter().collect::<String>());
        end = start;
    }
    words.reverse();
    words
}

fn format_word(word: &str) -> String {
    if word.len() <= 3 {
        word.to_uppercase()
    } else {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
            None => String::new(),
        }
    }
}
