use crate::models::{Highlight, Paper, PaperMeta};
use crate::search::PaperStore;
use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Current time as an RFC3339 string, the format used for every timestamp
/// stored on disk.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Convert a DOI to a filesystem-safe paper id.
pub fn slugify_doi(doi: &str) -> String {
    doi.replace(['/', '.'], "-").to_lowercase()
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..12].to_string()
}

/// Paper id from the DOI when there is one, otherwise a short hash of the
/// current wall clock.
pub fn generate_paper_id(doi: Option<&str>) -> String {
    match doi {
        Some(doi) => slugify_doi(doi),
        None => {
            let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
            format!("paper-{}", short_hash(&nanos.to_string()))
        }
    }
}

pub fn new_highlight_id(paper_id: &str, text: &str) -> String {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("h_{}", short_hash(&format!("{paper_id}:{text}:{nanos}")))
}

/// File-based paper store: one `<id>.json` plus an optional `<id>.pdf` per
/// paper under a single library directory.
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating library directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn json_path(&self, paper_id: &str) -> PathBuf {
        self.root.join(format!("{paper_id}.json"))
    }

    fn pdf_file(&self, paper_id: &str) -> PathBuf {
        self.root.join(format!("{paper_id}.pdf"))
    }

    pub fn exists(&self, paper_id: &str) -> bool {
        self.json_path(paper_id).exists()
    }

    /// Load a full paper. Unreadable or unparseable files are logged and
    /// reported as absent.
    pub fn load_paper(&self, paper_id: &str) -> Option<Paper> {
        let path = self.json_path(paper_id);
        let data = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&data) {
            Ok(paper) => Some(paper),
            Err(e) => {
                tracing::warn!(paper_id, error = %e, "failed to parse paper file");
                None
            }
        }
    }

    /// Persist a paper, bumping its modification timestamp.
    pub fn save_paper(&self, paper: &mut Paper) -> Result<()> {
        paper.date_modified = now_rfc3339();
        let json = serde_json::to_string_pretty(paper)?;
        fs::write(self.json_path(&paper.id), json)
            .with_context(|| format!("writing paper {}", paper.id))?;
        Ok(())
    }

    /// Delete a paper's JSON and PDF. Returns whether anything was removed.
    pub fn delete_paper(&self, paper_id: &str) -> Result<bool> {
        let mut deleted = false;
        let json_path = self.json_path(paper_id);
        if json_path.exists() {
            fs::remove_file(&json_path)?;
            deleted = true;
        }
        let pdf_path = self.pdf_file(paper_id);
        if pdf_path.exists() {
            fs::remove_file(&pdf_path)?;
            deleted = true;
        }
        Ok(deleted)
    }

    /// List all papers without highlights, newest first by `date_added`.
    pub fn list_papers(&self) -> Vec<PaperMeta> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read library directory");
                return Vec::new();
            }
        };

        let mut papers: Vec<PaperMeta> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let data = match fs::read_to_string(&path) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read paper file");
                    continue;
                }
            };
            match serde_json::from_str::<PaperMeta>(&data) {
                Ok(meta) => papers.push(meta),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse paper file");
                }
            }
        }

        papers.sort_by(|a, b| b.date_added.cmp(&a.date_added));
        papers
    }

    /// Find a paper id by DOI: slug lookup first, then a scan over the
    /// library for papers imported under a different id.
    pub fn find_by_doi(&self, doi: &str) -> Option<String> {
        let slug = slugify_doi(doi);
        if self.exists(&slug) {
            return Some(slug);
        }
        self.list_papers()
            .into_iter()
            .find(|p| {
                p.doi
                    .as_deref()
                    .is_some_and(|d| d.eq_ignore_ascii_case(doi))
            })
            .map(|p| p.id)
    }

    pub fn save_pdf(&self, paper_id: &str, content: &[u8]) -> Result<()> {
        fs::write(self.pdf_file(paper_id), content)
            .with_context(|| format!("writing pdf for {paper_id}"))?;
        Ok(())
    }

    pub fn pdf_path(&self, paper_id: &str) -> Option<PathBuf> {
        let path = self.pdf_file(paper_id);
        path.exists().then_some(path)
    }

    /// Append a highlight. Ok(false) when the paper does not exist.
    pub fn add_highlight(&self, paper_id: &str, highlight: Highlight) -> Result<bool> {
        let mut paper = match self.load_paper(paper_id) {
            Some(p) => p,
            None => return Ok(false),
        };
        paper.highlights.push(highlight);
        self.save_paper(&mut paper)?;
        Ok(true)
    }

    pub fn update_highlight(
        &self,
        paper_id: &str,
        highlight_id: &str,
        comment: Option<String>,
        color: Option<String>,
    ) -> Result<bool> {
        let mut paper = match self.load_paper(paper_id) {
            Some(p) => p,
            None => return Ok(false),
        };
        let mut found = false;
        for hl in &mut paper.highlights {
            if hl.id == highlight_id {
                if let Some(comment) = comment {
                    hl.comment = Some(comment);
                }
                if let Some(color) = color {
                    hl.color = color;
                }
                found = true;
                break;
            }
        }
        if found {
            self.save_paper(&mut paper)?;
        }
        Ok(found)
    }

    pub fn delete_highlight(&self, paper_id: &str, highlight_id: &str) -> Result<bool> {
        let mut paper = match self.load_paper(paper_id) {
            Some(p) => p,
            None => return Ok(false),
        };
        let before = paper.highlights.len();
        paper.highlights.retain(|hl| hl.id != highlight_id);
        if paper.highlights.len() == before {
            return Ok(false);
        }
        self.save_paper(&mut paper)?;
        Ok(true)
    }

    pub fn update_tags(&self, paper_id: &str, tags: Vec<String>) -> Result<bool> {
        let mut paper = match self.load_paper(paper_id) {
            Some(p) => p,
            None => return Ok(false),
        };
        paper.tags = tags;
        self.save_paper(&mut paper)?;
        Ok(true)
    }

    /// Apply tag additions and removals across several papers, returning
    /// how many were updated. Missing papers are skipped.
    pub fn bulk_update_tags(
        &self,
        paper_ids: &[String],
        add_tags: &[String],
        remove_tags: &[String],
    ) -> Result<usize> {
        let mut updated = 0;
        for paper_id in paper_ids {
            let mut paper = match self.load_paper(paper_id) {
                Some(p) => p,
                None => continue,
            };
            for tag in add_tags {
                if !paper.tags.contains(tag) {
                    paper.tags.push(tag.clone());
                }
            }
            paper.tags.retain(|tag| !remove_tags.contains(tag));
            self.save_paper(&mut paper)?;
            updated += 1;
        }
        Ok(updated)
    }
}

impl PaperStore for Store {
    fn list_all(&self) -> Vec<PaperMeta> {
        self.list_papers()
    }

    fn load_full(&self, id: &str) -> Option<Paper> {
        self.load_paper(id)
    }
}
