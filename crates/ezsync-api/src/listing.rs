// Directory listing parser
//
// The card renders each directory as an HTML page with a single `<pre>`
// block, one entry per line: a loosely formatted timestamp, a size column,
// and an anchor. Anchors pointing at `download` are files, anchors pointing
// at `dir` are subdirectories. The markup is not a specified contract, so
// parsing is tolerant: a line without a readable timestamp still yields an
// entry (timestamp 0), and a page without a `<pre>` block yields nothing.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{Local, NaiveDate, TimeZone};
use regex::Regex;

/// Names the card emits for navigation rather than content.
pub const DEFAULT_IGNORED: [&str; 3] = [".", "..", "back to photo"];

static PRE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<pre[^>]*>(.*?)</pre>").expect("valid pre regex"));

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))[^>]*>(.*?)</a>"#)
        .expect("valid anchor regex")
});

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)-(\d+)-(\d+)\s+(\d+):(\d+):(\d+)").expect("valid timestamp regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

// ── Entry types ─────────────────────────────────────────────────────

/// A file entry: `name`, the raw query string identifying its content on
/// the device, and its modification time in epoch seconds (0 if unknown).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub query: String,
    pub modified_at: i64,
}

/// A subdirectory entry: display `name` and the `href` relative to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDir {
    pub name: String,
    pub href: String,
}

/// One parsed listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEntry {
    File(RemoteFile),
    Directory(RemoteDir),
}

impl RemoteEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::File(f) => &f.name,
            Self::Directory(d) => &d.name,
        }
    }
}

/// A parsed directory page, in the order the device listed it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub files: Vec<RemoteFile>,
    pub dirs: Vec<RemoteDir>,
    /// The page had no listing block at all. Always empty when set.
    pub no_container: bool,
}

impl DirectoryListing {
    /// The listing for a page that carried no `<pre>` block.
    pub fn without_container() -> Self {
        Self {
            no_container: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }
}

// ── Ignore list ─────────────────────────────────────────────────────

/// Display names excluded from listings.
///
/// Always contains [`DEFAULT_IGNORED`]; dot-prefixed names are excluded
/// regardless of the set's contents. Matching is case-insensitive, like the
/// card's FAT filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreList {
    names: BTreeSet<String>,
}

impl Default for IgnoreList {
    fn default() -> Self {
        Self {
            names: DEFAULT_IGNORED.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl IgnoreList {
    /// The default list extended with user-configured names.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        list.names
            .extend(extra.into_iter().map(|s| s.into().to_lowercase()));
        list
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        name.starts_with('.') || self.names.contains(&name.to_lowercase())
    }
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Parse a listing page.
///
/// Returns `None` when the page has no `<pre>` block at all, so callers can
/// tell "no listing container" apart from "container with zero entries".
pub fn parse_listing(html: &str, ignore: &IgnoreList) -> Option<DirectoryListing> {
    let block = PRE_BLOCK.captures(html)?.get(1)?.as_str();

    let mut listing = DirectoryListing::default();
    for line in block.lines().filter(|l| !l.trim().is_empty()) {
        let Some(entry) = parse_line(line) else {
            continue;
        };
        if ignore.is_ignored(entry.name()) {
            continue;
        }
        match entry {
            RemoteEntry::File(f) => listing.files.push(f),
            RemoteEntry::Directory(d) => listing.dirs.push(d),
        }
    }
    Some(listing)
}

/// Parse a single listing line into an entry.
///
/// Lines without an anchor, or whose anchor is neither a download nor a
/// directory link, yield `None`.
pub fn parse_line(line: &str) -> Option<RemoteEntry> {
    let caps = ANCHOR.captures(line)?;
    let whole = caps.get(0)?;
    let raw_href = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str();
    let href = decode_entities(raw_href.trim());
    let name = decode_entities(TAG.replace_all(caps.get(4)?.as_str(), "").trim());

    let (path, query) = split_href(&href);
    if path.ends_with("download") {
        let modified_at = parse_timestamp(&line[..whole.start()]).unwrap_or(0);
        Some(RemoteEntry::File(RemoteFile {
            name,
            query: query.to_owned(),
            modified_at,
        }))
    } else if path.ends_with("dir") {
        Some(RemoteEntry::Directory(RemoteDir { name, href }))
    } else {
        None
    }
}

/// Parse the card's timestamp column into epoch seconds (host local time).
///
/// The card pads single-digit fields with spaces (`2021- 3- 5  9: 4:07`),
/// so `"- "` and `": "` are rewritten to zero-padded form first.
pub fn parse_timestamp(field: &str) -> Option<i64> {
    let fixed = field.replace("- ", "-0").replace(": ", ":0");
    let caps = TIMESTAMP.captures(&fixed)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let year = i32::try_from(num(1)?).ok()?;
    let naive = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?.and_hms_opt(
        num(4)?,
        num(5)?,
        num(6)?,
    )?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

/// Split an href into its path and raw query (fragment dropped).
fn split_href(href: &str) -> (&str, &str) {
    let without_fragment = href.split('#').next().unwrap_or(href);
    match without_fragment.split_once('?') {
        Some((path, query)) => (path, query),
        None => (without_fragment, ""),
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
