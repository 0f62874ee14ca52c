use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Every link of an autoindex-style directory listing.
selector!(LINK_SELECTOR, "a[href]");
// Snapshot names are zero-padded dates, so lexicographic order is chronological.
regex!(SNAPSHOT_NAME_REGEX, r"^wikipedia-\d+\.tar$");
