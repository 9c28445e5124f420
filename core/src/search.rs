use crate::models::{Paper, PaperMeta};
use crate::tokenizer::tokenize;
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Default result cap for a search request.
pub const DEFAULT_LIMIT: usize = 50;

/// Number of context characters around an abstract match (split across both sides).
const ABSTRACT_CONTEXT_CHARS: usize = 100;

/// Highlight snippets are cut to this many characters before marking.
const HIGHLIGHT_SNIPPET_CHARS: usize = 200;

/// Where a posting came from. The variant carries everything a snippet
/// needs, so highlight matches do not re-fetch the paper.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMatch {
    Title,
    Tag,
    Author,
    Abstract,
    Highlight { page: u32, text: String },
}

impl FieldMatch {
    /// Fixed per-field score contribution.
    pub fn weight(&self) -> i64 {
        match self {
            Self::Title => 10,
            Self::Tag => 8,
            Self::Author => 7,
            Self::Highlight { .. } => 6,
            Self::Abstract => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Tag => "tag",
            Self::Author => "author",
            Self::Highlight { .. } => "highlight",
            Self::Abstract => "abstract",
        }
    }
}

#[derive(Debug, Clone)]
struct Posting {
    paper_id: String,
    field: FieldMatch,
}

/// Per-paper accumulator for one query: running score, the sequence the
/// paper was first discovered at (the tie-break key), and the match
/// records snippets are built from.
struct Hit<'a> {
    score: i64,
    seq: usize,
    records: Vec<(&'a FieldMatch, &'a str)>,
}

/// Boundary to the paper store the index is rebuilt from: a cheap listing
/// plus a full load per id.
pub trait PaperStore {
    fn list_all(&self) -> Vec<PaperMeta>;
    fn load_full(&self, id: &str) -> Option<Paper>;
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub field: &'static str,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub paper_id: String,
    pub title: String,
    pub score: i64,
    pub matches: Vec<SearchMatch>,
}

/// In-memory inverted index over paper titles, tags, highlights, abstracts
/// and author names. Ephemeral: derivable at any time by replaying `add_paper`
/// for every paper in the store, which is exactly what `rebuild` does.
#[derive(Default)]
pub struct SearchIndex {
    papers: HashMap<String, Paper>,
    postings: HashMap<String, Vec<Posting>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a paper. All prior postings for the id are removed
    /// first so repeated edits do not accumulate duplicate postings.
    pub fn add_paper(&mut self, paper: &Paper) {
        self.remove_paper(&paper.id);

        for token in tokenize(&paper.title) {
            self.push(token, &paper.id, FieldMatch::Title);
        }
        for tag in &paper.tags {
            for token in tokenize(tag) {
                self.push(token, &paper.id, FieldMatch::Tag);
            }
        }
        for hl in &paper.highlights {
            let combined = match &hl.comment {
                Some(comment) => format!("{} {}", hl.text, comment),
                None => hl.text.clone(),
            };
            for token in tokenize(&combined) {
                self.push(
                    token,
                    &paper.id,
                    FieldMatch::Highlight { page: hl.page, text: hl.text.clone() },
                );
            }
        }
        if let Some(abstract_text) = &paper.abstract_text {
            for token in tokenize(abstract_text) {
                self.push(token, &paper.id, FieldMatch::Abstract);
            }
        }
        for author in &paper.authors {
            for token in tokenize(&author.name) {
                self.push(token, &paper.id, FieldMatch::Author);
            }
        }

        self.papers.insert(paper.id.clone(), paper.clone());
    }

    fn push(&mut self, token: String, paper_id: &str, field: FieldMatch) {
        self.postings
            .entry(token)
            .or_default()
            .push(Posting { paper_id: paper_id.to_string(), field });
    }

    fn remove_paper(&mut self, paper_id: &str) {
        self.papers.remove(paper_id);
        self.postings.retain(|_, list| {
            list.retain(|p| p.paper_id != paper_id);
            !list.is_empty()
        });
    }

    /// Throw away everything and re-index every paper the store reports.
    /// A paper that fails to load is logged and skipped, never fatal.
    pub fn rebuild<S: PaperStore>(&mut self, store: &S) {
        self.postings.clear();
        self.papers.clear();

        for meta in store.list_all() {
            match store.load_full(&meta.id) {
                Some(paper) => self.add_paper(&paper),
                None => {
                    tracing::warn!(paper_id = %meta.id, "skipping paper that failed to load");
                }
            }
        }
        tracing::info!(papers = self.papers.len(), terms = self.postings.len(), "index rebuilt");
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    /// Score and rank papers for a query. Scores are plain sums of the
    /// per-field weights of every matching posting; ties keep the order in
    /// which papers were first discovered while walking the query terms.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut hits: HashMap<&str, Hit<'_>> = HashMap::new();
        for token in &tokens {
            if let Some(list) = self.postings.get(token.as_str()) {
                for posting in list {
                    let seq = hits.len();
                    let hit = hits
                        .entry(posting.paper_id.as_str())
                        .or_insert_with(|| Hit { score: 0, seq, records: Vec::new() });
                    hit.score += posting.field.weight();
                    hit.records.push((&posting.field, token.as_str()));
                }
            }
        }

        let mut ranked: Vec<(&str, Hit<'_>)> = hits.into_iter().collect();
        ranked.sort_by(|a, b| b.1.score.cmp(&a.1.score).then(a.1.seq.cmp(&b.1.seq)));
        ranked.truncate(limit);

        let mut results = Vec::with_capacity(ranked.len());
        for (paper_id, hit) in ranked {
            let paper = match self.papers.get(paper_id) {
                Some(p) => p,
                None => continue,
            };

            // One snippet per scalar field; every matching highlight keeps its own.
            let mut seen_fields: HashSet<&'static str> = HashSet::new();
            let mut matches = Vec::new();
            for &(field, token) in &hit.records {
                let name = field.name();
                if seen_fields.contains(name) && name != "highlight" {
                    continue;
                }
                if let Some(snippet) = snippet_for(paper, field, token, &tokens) {
                    let page = match field {
                        FieldMatch::Highlight { page, .. } => Some(*page),
                        _ => None,
                    };
                    matches.push(SearchMatch { field: name, snippet, page });
                    if name != "highlight" {
                        seen_fields.insert(name);
                    }
                }
            }

            results.push(SearchResult {
                paper_id: paper.id.clone(),
                title: paper.title.clone(),
                score: hit.score,
                matches,
            });
        }
        results
    }
}

/// Pick the snippet source text for one match record, then mark the query
/// terms in it. Empty sources yield no snippet at all.
fn snippet_for(
    paper: &Paper,
    field: &FieldMatch,
    token: &str,
    query_tokens: &[String],
) -> Option<String> {
    let source = match field {
        FieldMatch::Title => Some(paper.title.clone()),
        FieldMatch::Tag => paper
            .tags
            .iter()
            .find(|tag| tag.to_lowercase().contains(token))
            .cloned(),
        FieldMatch::Author => paper
            .authors
            .iter()
            .find(|a| a.name.to_lowercase().contains(token))
            .map(|a| a.name.clone()),
        FieldMatch::Abstract => paper
            .abstract_text
            .as_deref()
            .map(|text| extract_context(text, token, ABSTRACT_CONTEXT_CHARS)),
        FieldMatch::Highlight { text, .. } => {
            Some(text.chars().take(HIGHLIGHT_SNIPPET_CHARS).collect())
        }
    }?;
    if source.is_empty() {
        return None;
    }
    Some(highlight_terms(&source, query_tokens))
}

/// Window of roughly `context_chars` characters around the first
/// case-insensitive occurrence of `token`, with `...` affixes when the
/// window does not touch the string boundary.
fn extract_context(text: &str, token: &str, context_chars: usize) -> String {
    let lowered = text.to_lowercase();
    // Byte offset into the lowercased copy; clamp in case lowercasing
    // changed the length (rare multi-byte case folds).
    let pos = match lowered.find(token) {
        Some(p) => p.min(text.len()),
        None => return text.chars().take(context_chars).collect(),
    };

    let half = context_chars / 2;
    let mut start = pos.saturating_sub(half);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + token.len() + half).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }

    let mut snippet = text[start..end].to_string();
    if start > 0 {
        snippet = format!("...{snippet}");
    }
    if end < text.len() {
        snippet.push_str("...");
    }
    snippet
}

/// Wrap every case-insensitive occurrence of each query token in <mark> tags.
fn highlight_terms(text: &str, tokens: &[String]) -> String {
    let mut marked = text.to_string();
    for token in tokens {
        let pat = match RegexBuilder::new(&regex::escape(token)).case_insensitive(true).build() {
            Ok(p) => p,
            Err(_) => continue,
        };
        marked = pat
            .replace_all(&marked, |caps: &regex::Captures| format!("<mark>{}</mark>", &caps[0]))
            .to_string();
    }
    marked
}
