//! Safety-filtered URL and image extraction for message content.
//!
//! Every `http(s)` URL is pulled out of the text. Survivors of the filter
//! become links or images on the message; everything else is dropped.
//! Malformed URLs are dropped silently.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

// ---------------------------------------------------------------------------
// Pattern Definitions
// ---------------------------------------------------------------------------

/// Ad, tracking and shortener domains. Subdomains match too.
const BLOCKED_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "adservice.google.com",
    "adnxs.com",
    "taboola.com",
    "outbrain.com",
    "scorecardresearch.com",
    "facebook.net",
    "bit.ly",
    "tinyurl.com",
    "goo.gl",
    "ow.ly",
    "example.com",
    "example.org",
    "localhost",
];

/// Hosts that are dead, defunct, or only ever linked as a joke.
const DEAD_DOMAINS: &[&str] = &[
    "geocities.com",
    "angelfire.com",
    "myspace.com",
    "vine.co",
    "del.icio.us",
    "digg.com",
    "friendster.com",
    "plus.google.com",
];

/// URL fragments that give away a rickroll or a broken link.
const SUSPECT_FRAGMENTS: &[&str] = &[
    "dqw4w9wgxcq",
    "rickroll",
    "never-gonna-give-you-up",
    "/404",
    "not-found",
    "notfound",
    "broken-link",
    "lorem",
];

/// Image hosts that serve cross-origin friendly content.
const IMAGE_HOSTS: &[&str] = &[
    "i.imgur.com",
    "upload.wikimedia.org",
    "images.unsplash.com",
    "picsum.photos",
    "media.giphy.com",
    "i.redd.it",
    "cdn.pixabay.com",
    "images.pexels.com",
];

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp"];

static URL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s<>"'`]+"#).ok());

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Content with its URLs removed, plus the safe ones sorted by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Display text with every URL stripped and whitespace collapsed.
    pub content: String,
    /// Safe non-image links.
    pub links: Vec<String>,
    /// Safe images on allow-listed hosts.
    pub images: Vec<String>,
}

/// How one URL was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Link,
    Image,
    Drop,
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn classify(url: &Url) -> Verdict {
    let Some(host) = url.host_str().map(str::to_lowercase) else {
        return Verdict::Drop;
    };
    if BLOCKED_DOMAINS
        .iter()
        .chain(DEAD_DOMAINS)
        .any(|d| host_matches(&host, d))
    {
        return Verdict::Drop;
    }
    let full = url.as_str().to_lowercase();
    if SUSPECT_FRAGMENTS.iter().any(|f| full.contains(f)) {
        return Verdict::Drop;
    }

    let path = url.path().to_lowercase();
    let looks_like_image = IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext));
    let trusted_image_host = IMAGE_HOSTS.iter().any(|h| host_matches(&host, h));
    match (looks_like_image, trusted_image_host) {
        (true, true) => Verdict::Image,
        // Images are only embedded from trusted hosts.
        (true, false) => Verdict::Drop,
        (false, true) if host == "picsum.photos" => Verdict::Image,
        _ => Verdict::Link,
    }
}

/// Pull URLs out of `content`, keeping only the safe ones.
pub fn extract(content: &str) -> Extracted {
    let Some(re) = URL_RE.as_ref() else {
        return Extracted {
            content: content.to_owned(),
            ..Extracted::default()
        };
    };

    let mut extracted = Extracted::default();
    let mut stripped = String::with_capacity(content.len());
    let mut cursor = 0;
    for found in re.find_iter(content) {
        let raw = found
            .as_str()
            .trim_end_matches(['.', ',', '!', '?', ')', ']', ';', ':']);
        let end = found.start().saturating_add(raw.len());
        stripped.push_str(content.get(cursor..found.start()).unwrap_or_default());
        stripped.push_str(content.get(end..found.end()).unwrap_or_default());
        cursor = found.end();

        let Ok(url) = Url::parse(raw) else {
            continue;
        };
        let url_text = url.to_string();
        match classify(&url) {
            Verdict::Link if !extracted.links.contains(&url_text) => extracted.links.push(url_text),
            Verdict::Image if !extracted.images.contains(&url_text) => {
                extracted.images.push(url_text);
            }
            _ => {}
        }
    }
    stripped.push_str(content.get(cursor..).unwrap_or_default());
    extracted.content = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    extracted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        let out = extract("no links here");
        assert_eq!(out.content, "no links here");
        assert!(out.links.is_empty() && out.images.is_empty());
    }

    #[test]
    fn safe_link_is_extracted_and_stripped() {
        let out = extract("check https://www.rust-lang.org/learn. so good");
        assert_eq!(out.links, vec!["https://www.rust-lang.org/learn"]);
        assert_eq!(out.content, "check . so good");
    }

    #[test]
    fn blocked_and_dead_links_are_dropped() {
        let out = extract("ads https://ad.doubleclick.net/x and https://www.geocities.com/page");
        assert!(out.links.is_empty());
        assert_eq!(out.content, "ads and");
    }

    #[test]
    fn rickrolls_are_dropped() {
        let out = extract("trust me https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert!(out.links.is_empty());
        assert_eq!(out.content, "trust me");
    }

    #[test]
    fn images_only_from_trusted_hosts() {
        let out = extract("look https://i.imgur.com/cat.png and https://sketchy.host/cat.png");
        assert_eq!(out.images, vec!["https://i.imgur.com/cat.png"]);
        assert!(out.links.is_empty());
    }

    #[test]
    fn lookalike_hosts_do_not_match() {
        assert!(host_matches("ads.bit.ly", "bit.ly"));
        assert!(!host_matches("notbit.ly", "bit.ly"));
    }

    #[test]
    fn malformed_urls_are_silently_dropped() {
        let out = extract("broken http://[::1 link");
        assert!(out.links.is_empty());
        assert_eq!(out.content, "broken link");
    }

    #[test]
    fn uppercase_schemes_are_extracted_and_filtered() {
        let out = extract("see HTTPS://WWW.Rust-Lang.org/learn and HTTP://BIT.LY/x now");
        assert_eq!(out.content, "see and now");
        assert_eq!(out.links, vec!["https://www.rust-lang.org/learn"]);
    }
}
