use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// TOC depth bucket. Levels 3 through 6 all collapse into `Three`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TocLevel {
    One,
    Two,
    Three,
}

impl TocLevel {
    pub fn from_markers(count: usize) -> Self {
        match count {
            1 => TocLevel::One,
            2 => TocLevel::Two,
            _ => TocLevel::Three,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub level: TocLevel,
    pub text: String,
    pub slug: String,
}

/// Collision-avoiding slug generator. Scoped to one document: build a new one
/// per compile so suffix counters never carry over.
#[derive(Debug, Default)]
pub struct Slugger {
    occurrences: HashMap<String, usize>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slug `text`, appending `-1`, `-2`, ... when the slug was already handed out.
    pub fn slug(&mut self, text: &str) -> String {
        let mut base = slug::slugify(text);
        if base.is_empty() {
            base = "section".to_string();
        }

        let mut candidate = base.clone();
        // Keep bumping the base counter: "intro-1" may already exist as a literal heading.
        while self.occurrences.contains_key(&candidate) {
            let count = self.occurrences.entry(base.clone()).or_insert(0);
            *count += 1;
            candidate = format!("{}-{}", base, count);
        }
        self.occurrences.insert(candidate.clone(), 0);
        candidate
    }

    /// Mark `slug` as taken so later calls suffix around it.
    pub fn reserve(&mut self, slug: &str) {
        self.occurrences.entry(slug.to_string()).or_insert(0);
    }
}

fn heading_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})[ \t]+(.+?)[ \t]*$").expect("valid heading regex"))
}

/// Table of contents scanned from the raw source, line by line. Each entry
/// carries its zero-based line index.
pub fn scan_headings(source: &str) -> Vec<(usize, TocEntry)> {
    let mut slugger = Slugger::new();
    source
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let caps = heading_line().captures(line)?;
            let markers = caps.get(1)?.as_str().len();
            let text = caps.get(2)?.as_str().trim_end_matches('#').trim().to_string();
            if text.is_empty() {
                return None;
            }
            let slug = slugger.slug(&text);
            Some((
                index,
                TocEntry {
                    level: TocLevel::from_markers(markers),
                    text,
                    slug,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_toc(source: &str) -> Vec<TocEntry> {
        scan_headings(source).into_iter().map(|(_, entry)| entry).collect()
    }

    #[test]
    fn title_and_sub() {
        let toc = extract_toc("# Title\n\ntext\n## Sub\n");
        assert_eq!(
            toc,
            vec![
                TocEntry { level: TocLevel::One, text: "Title".into(), slug: "title".into() },
                TocEntry { level: TocLevel::Two, text: "Sub".into(), slug: "sub".into() },
            ]
        );
    }

    #[test]
    fn deep_levels_collapse_to_three() {
        let toc = extract_toc("### a\n#### b\n##### c\n###### d\n");
        assert_eq!(toc.len(), 4);
        assert!(toc.iter().all(|e| e.level == TocLevel::Three));
    }

    #[test]
    fn seven_markers_is_not_a_heading() {
        assert!(extract_toc("####### too deep\n").is_empty());
        assert!(extract_toc("#nospace\n").is_empty());
    }

    #[test]
    fn duplicates_get_suffixes_in_order() {
        let toc = extract_toc("# Intro\n## Intro\n### Intro\n");
        let slugs: Vec<&str> = toc.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["intro", "intro-1", "intro-2"]);
    }

    #[test]
    fn literal_suffix_heading_does_not_collide() {
        let toc = extract_toc("# Intro\n# Intro 1\n# Intro\n");
        let slugs: Vec<&str> = toc.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs.len(), 3);
        let mut dedup = slugs.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 3, "slugs must be unique: {:?}", slugs);
    }

    #[test]
    fn n_headings_yield_n_unique_nonempty_entries() {
        let src = "# A\nbody\n## B\n## B\n### !!!\n### !!!\ntext # not a heading\n#### C\n";
        let toc = extract_toc(src);
        assert_eq!(toc.len(), 6);
        let mut slugs: Vec<&str> = toc.iter().map(|e| e.slug.as_str()).collect();
        assert!(slugs.iter().all(|s| !s.is_empty()));
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), 6);
        assert_eq!(toc[0].text, "A");
        assert_eq!(toc[5].text, "C");
    }

    #[test]
    fn closing_hashes_are_trimmed() {
        let toc = extract_toc("## Setup ##\n");
        assert_eq!(toc[0].text, "Setup");
        assert_eq!(toc[0].slug, "setup");
    }

    #[test]
    fn fresh_slugger_per_document() {
        let first = extract_toc("# Intro\n");
        let second = extract_toc("# Intro\n");
        assert_eq!(first[0].slug, "intro");
        assert_eq!(second[0].slug, "intro");
    }

    #[test]
    fn slugger_counts_repeats() {
        let mut s = Slugger::new();
        assert_eq!(s.slug("Intro"), "intro");
        assert_eq!(s.slug("Intro"), "intro-1");
        assert_eq!(s.slug("intro"), "intro-2");
    }

    #[test]
    fn reserved_slugs_are_skipped() {
        let mut s = Slugger::new();
        s.reserve("intro");
        assert_eq!(s.slug("Intro"), "intro-1");
    }

    #[test]
    fn scan_reports_source_lines() {
        let lines: Vec<usize> = scan_headings("# A\ntext\n\n## B\n")
            .into_iter()
            .map(|(line, _)| line)
            .collect();
        assert_eq!(lines, vec![0, 3]);
    }
}
