//! In-memory sorted indexes over CDXJ lines and page URLs.
//!
//! Both containers are ordered and deduplicating: inserting an existing key
//! is a no-op, so whichever writer gets there first wins. Workers build their
//! own [`SortedIndexes`] per file and the orchestrator merges them serially,
//! which keeps the final traversal order independent of task completion
//! order and needs no locking.

use std::collections::{BTreeMap, BTreeSet};

use crate::pages::PageInfo;

/// Sorted, deduplicated CDXJ lines and pages for one run (or one file).
#[derive(Debug, Default)]
pub struct SortedIndexes {
    /// CDXJ lines in ascending byte order. Each line is `\n`-terminated, and
    /// because a line starts with its SURT key this is exactly CDX order.
    cdx: BTreeSet<String>,
    /// Pages keyed by URL.
    pages: BTreeMap<String, PageInfo>,
}

impl SortedIndexes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a CDXJ line if no identical line is present.
    pub fn insert_cdx(&mut self, line: String) {
        self.cdx.insert(line);
    }

    /// Insert a page unless its URL was already seen; the first writer wins.
    pub fn insert_page(&mut self, page: PageInfo) {
        self.pages.entry(page.url.clone()).or_insert(page);
    }

    /// Fold another index into this one, keeping first-writer-wins semantics.
    pub fn merge(&mut self, other: SortedIndexes) {
        self.cdx.extend(other.cdx);
        for (url, page) in other.pages {
            self.pages.entry(url).or_insert(page);
        }
    }

    /// CDXJ lines in ascending byte order.
    pub fn cdx_lines(&self) -> impl ExactSizeIterator<Item = &str> {
        self.cdx.iter().map(String::as_str)
    }

    /// Pages in ascending URL order.
    pub fn pages(&self) -> impl ExactSizeIterator<Item = &PageInfo> {
        self.pages.values()
    }

    pub fn cdx_len(&self) -> usize {
        self.cdx.len()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, title: &str) -> PageInfo {
        PageInfo {
            url: url.into(),
            title: Some(title.into()),
            ts: None,
        }
    }

    #[test]
    fn cdx_lines_come_back_sorted_and_unique() {
        let mut index = SortedIndexes::new();
        index.insert_cdx("com,b)/ 2023 {}\n".into());
        index.insert_cdx("com,a)/ 2023 {}\n".into());
        index.insert_cdx("com,b)/ 2023 {}\n".into());

        let lines: Vec<&str> = index.cdx_lines().collect();
        assert_eq!(lines, vec!["com,a)/ 2023 {}\n", "com,b)/ 2023 {}\n"]);
    }

    #[test]
    fn first_page_for_a_url_wins() {
        let mut index = SortedIndexes::new();
        index.insert_page(page("https://a/", "first"));
        index.insert_page(page("https://a/", "second"));

        let pages: Vec<_> = index.pages().collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title.as_deref(), Some("first"));
    }

    #[test]
    fn merge_is_first_writer_wins_in_merge_order() {
        let mut first = SortedIndexes::new();
        first.insert_page(page("https://a/", "from-first"));

        let mut second = SortedIndexes::new();
        second.insert_page(page("https://a/", "from-second"));
        second.insert_page(page("https://b/", "only-second"));

        first.merge(second);
        let pages: Vec<_> = first.pages().collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].title.as_deref(), Some("from-first"));
    }
}
