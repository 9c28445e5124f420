use anyhow::Result;
use core::models::{Author, Paper};
use core::storage::{generate_paper_id, now_rfc3339};
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
pub use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Timeout for every outbound metadata/PDF request.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

lazy_static! {
    static ref DOI_RE: Regex = Regex::new(r"10\.\d{4,}/[^\s]+").expect("valid regex");
    static ref DOI_PREFIX_RE: Regex = Regex::new(r"^10\.\d{4,}/").expect("valid regex");
    static ref ARXIV_RE: Regex = Regex::new(r"arxiv\.org/abs/(\d+\.\d+)").expect("valid regex");
    static ref BIORXIV_RE: Regex =
        Regex::new(r"biorxiv\.org/content/([^v\s]+)").expect("valid regex");
    static ref OBJECT_PDF_RE: Regex = ci_regex(
        r#"<(?:object|embed)[^>]+(?:data|src)=["']([^"'#]+\.pdf)[^"']*["']"#
    );
    static ref IFRAME_PDF_RE: Regex = ci_regex(r#"<iframe[^>]+src=["']([^"']+\.pdf[^"']*)["']"#);
    static ref DOWNLOAD_PDF_RE: Regex =
        ci_regex(r#"href=["'](/(?:download|storage)/[^"'#]+\.pdf)["']"#);
    static ref REL_PDF_RE: Regex = ci_regex(r#"/[^\s"'<>]+\.pdf"#);
    static ref ABS_PDF_RE: Regex = ci_regex(r#"(?:https?:)?//[^\s"'<>]+\.pdf"#);
    static ref JNEUROSCI_PDF_RE: Regex =
        Regex::new(r#"href="(/content/jneuro/[^"]+\.full\.pdf)""#).expect("valid regex");
}

fn ci_regex(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("valid regex")
}

/// Shared HTTP client for all fetches.
pub fn http_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent("paper-library/0.1")
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(FETCH_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Metadata as reported by an upstream source, before it becomes a Paper.
#[derive(Debug, Clone, Default)]
pub struct FetchedMetadata {
    pub title: String,
    pub authors: Vec<Author>,
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub url: Option<String>,
    pub pdf_url: Option<String>,
}

/// Pull a DOI out of whatever the user pasted: a bare DOI, a doi.org URL,
/// an arXiv or bioRxiv URL, or any URL with an embedded DOI.
pub fn extract_doi_from_input(input: &str) -> Option<String> {
    let input = input.trim();

    if DOI_PREFIX_RE.is_match(input) {
        return Some(input.to_string());
    }
    if input.contains("doi.org") {
        if let Some(m) = DOI_RE.find(input) {
            return Some(m.as_str().to_string());
        }
    }
    if let Some(caps) = ARXIV_RE.captures(input) {
        return Some(format!("arXiv:{}", &caps[1]));
    }
    if let Some(caps) = BIORXIV_RE.captures(input) {
        return Some(format!("bioRxiv:{}", &caps[1]));
    }
    DOI_RE.find(input).map(|m| m.as_str().to_string())
}

async fn get_json(client: &Client, url: &str) -> Option<Value> {
    let resp = match client.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(url, error = %e, "metadata request failed");
            return None;
        }
    };
    if !resp.status().is_success() {
        return None;
    }
    let text = resp.text().await.ok()?;
    serde_json::from_str(&text).ok()
}

fn non_empty(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

pub async fn fetch_metadata_semantic_scholar(client: &Client, doi: &str) -> Option<FetchedMetadata> {
    let url = match doi.strip_prefix("arXiv:") {
        Some(arxiv_id) => format!("https://api.semanticscholar.org/v1/paper/arXiv:{arxiv_id}"),
        None => format!("https://api.semanticscholar.org/v1/paper/{doi}"),
    };
    let data = get_json(client, &url).await?;

    let authors = data["authors"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|a| Author {
                    name: a["name"].as_str().unwrap_or("").to_string(),
                    affiliation: None,
                })
                .collect()
        })
        .unwrap_or_default();

    Some(FetchedMetadata {
        title: data["title"].as_str().unwrap_or("").to_string(),
        authors,
        abstract_text: non_empty(&data["abstract"]),
        journal: non_empty(&data["venue"]),
        year: data["year"].as_i64().map(|y| y as i32),
        url: non_empty(&data["url"]),
        pdf_url: non_empty(&data["openAccessPdf"]["url"]),
    })
}

pub async fn fetch_metadata_crossref(client: &Client, doi: &str) -> Option<FetchedMetadata> {
    if doi.starts_with("arXiv:") || doi.starts_with("bioRxiv:") {
        return None;
    }
    let url = format!("https://api.crossref.org/works/{doi}");
    let data = get_json(client, &url).await?;
    let message = &data["message"];

    let authors = message["author"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|a| {
                    let given = a["given"].as_str().unwrap_or("");
                    let family = a["family"].as_str().unwrap_or("");
                    Author {
                        name: format!("{given} {family}").trim().to_string(),
                        affiliation: None,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let year = message["published-print"]["date-parts"][0][0]
        .as_i64()
        .or_else(|| message["published-online"]["date-parts"][0][0].as_i64())
        .map(|y| y as i32);

    Some(FetchedMetadata {
        title: message["title"][0].as_str().unwrap_or("").to_string(),
        authors,
        abstract_text: non_empty(&message["abstract"]),
        journal: non_empty(&message["container-title"][0]),
        year,
        url: non_empty(&message["URL"]),
        pdf_url: None,
    })
}

/// Metadata waterfall: Semantic Scholar first, CrossRef as fallback.
/// Returns the metadata together with the source that produced it.
pub async fn fetch_metadata(client: &Client, doi: &str) -> Option<(FetchedMetadata, &'static str)> {
    if let Some(metadata) = fetch_metadata_semantic_scholar(client, doi).await {
        return Some((metadata, "semantic_scholar"));
    }
    if let Some(metadata) = fetch_metadata_crossref(client, doi).await {
        return Some((metadata, "crossref"));
    }
    None
}

/// Fetch a URL and keep the body only when the server says it is a PDF.
pub async fn download_pdf_from_url(client: &Client, url: &str) -> Option<Vec<u8>> {
    let resp = match client.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::info!(url, error = %e, "pdf download failed");
            return None;
        }
    };
    if !resp.status().is_success() {
        return None;
    }
    let is_pdf = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/pdf"));
    if !is_pdf {
        return None;
    }
    resp.bytes().await.ok().map(|b| b.to_vec())
}

fn resolve_pdf_url(scihub_domain: &str, url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else if url.starts_with('/') {
        format!("https://{scihub_domain}{url}")
    } else if !url.starts_with("http") {
        format!("https://{scihub_domain}/{url}")
    } else {
        url.to_string()
    }
}

/// Scrape a Sci-Hub article page for an embedded PDF, trying the known
/// embedding patterns in order.
pub async fn fetch_pdf_scihub(client: &Client, scihub_domain: &str, doi: &str) -> Option<Vec<u8>> {
    let page_url = format!("https://{scihub_domain}/{doi}");
    let resp = match client.get(&page_url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::info!(url = %page_url, error = %e, "sci-hub page fetch failed");
            return None;
        }
    };
    if !resp.status().is_success() {
        return None;
    }
    let html = resp.text().await.ok()?;

    let mut candidates: Vec<String> = Vec::new();
    if let Some(caps) = OBJECT_PDF_RE.captures(&html) {
        candidates.push(resolve_pdf_url(scihub_domain, &caps[1]));
    }
    if let Some(caps) = IFRAME_PDF_RE.captures(&html) {
        candidates.push(resolve_pdf_url(scihub_domain, &caps[1]));
    }
    if let Some(caps) = DOWNLOAD_PDF_RE.captures(&html) {
        candidates.push(format!("https://{scihub_domain}{}", &caps[1]));
    }
    for m in REL_PDF_RE.find_iter(&html) {
        candidates.push(format!("https://{scihub_domain}{}", m.as_str()));
    }
    for m in ABS_PDF_RE.find_iter(&html) {
        candidates.push(resolve_pdf_url(scihub_domain, m.as_str()));
    }

    for url in candidates {
        tracing::info!(%url, "trying candidate pdf url");
        if let Some(pdf) = download_pdf_from_url(client, &url).await {
            return Some(pdf);
        }
    }
    None
}

fn publisher_pdf_urls(doi: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let doi_lower = doi.to_lowercase();

    // PLOS journals serve a printable PDF directly by DOI
    let plos = [
        "journal.pone",
        "journal.pcbi",
        "journal.pgen",
        "journal.ppat",
        "journal.pbio",
        "journal.pmed",
        "journal.pntd",
    ];
    if plos.iter().any(|j| doi.contains(j)) {
        urls.push(format!(
            "https://journals.plos.org/plosone/article/file?id={doi}&type=printable"
        ));
    }

    // eLife DOIs may carry a version suffix after the article number
    if doi_lower.contains("elife") {
        if let Some(rest) = doi_lower.split("elife.").nth(1) {
            let article_id = rest.split('.').next().unwrap_or(rest);
            urls.push(format!(
                "https://cdn.elifesciences.org/articles/{article_id}/elife-{article_id}-v1.pdf"
            ));
        }
    }

    urls
}

/// PDF waterfall: open-access URL from metadata, then arXiv/bioRxiv direct
/// links, then publisher-specific URLs, then Sci-Hub as a last resort.
pub async fn fetch_pdf(
    client: &Client,
    scihub_domain: &str,
    doi: &str,
    metadata: Option<&FetchedMetadata>,
) -> Option<Vec<u8>> {
    if let Some(pdf_url) = metadata.and_then(|m| m.pdf_url.as_deref()) {
        if let Some(pdf) = download_pdf_from_url(client, pdf_url).await {
            return Some(pdf);
        }
    }

    if let Some(arxiv_id) = doi.strip_prefix("arXiv:") {
        let url = format!("https://arxiv.org/pdf/{arxiv_id}.pdf");
        if let Some(pdf) = download_pdf_from_url(client, &url).await {
            return Some(pdf);
        }
    }

    if let Some(biorxiv_id) = doi.strip_prefix("bioRxiv:") {
        let url = format!("https://www.biorxiv.org/content/{biorxiv_id}.full.pdf");
        if let Some(pdf) = download_pdf_from_url(client, &url).await {
            return Some(pdf);
        }
    }

    let mut urls = publisher_pdf_urls(doi);

    // JNeurosci needs a page scrape to find the PDF link
    if doi.to_lowercase().contains("jneurosci") {
        let lookup = format!("https://www.jneurosci.org/lookup/doi/{doi}");
        if let Ok(resp) = client.get(&lookup).send().await {
            if resp.status().is_success() {
                if let Ok(html) = resp.text().await {
                    if let Some(caps) = JNEUROSCI_PDF_RE.captures(&html) {
                        urls.push(format!("https://www.jneurosci.org{}", &caps[1]));
                    }
                }
            }
        }
    }

    for url in urls {
        if let Some(pdf) = download_pdf_from_url(client, &url).await {
            return Some(pdf);
        }
    }

    fetch_pdf_scihub(client, scihub_domain, doi).await
}

/// Structural sanity check on downloaded bytes.
pub fn validate_pdf(content: &[u8]) -> bool {
    content.starts_with(b"%PDF-")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    /// Metadata and PDF both landed.
    Success,
    /// Metadata only; the PDF could not be fetched.
    Partial,
}

/// Import a paper by DOI: metadata waterfall, then the PDF waterfall.
/// None means no source had metadata for the DOI.
pub async fn import_by_doi(
    client: &Client,
    scihub_domain: &str,
    doi: &str,
) -> Option<(Paper, Option<Vec<u8>>, ImportStatus)> {
    let (metadata, source) = fetch_metadata(client, doi).await?;
    tracing::info!(doi, source, "fetched metadata");

    let now = now_rfc3339();
    let paper = Paper {
        id: generate_paper_id(Some(doi)),
        doi: Some(doi.to_string()),
        title: if metadata.title.is_empty() {
            "Untitled".to_string()
        } else {
            metadata.title.clone()
        },
        authors: metadata.authors.clone(),
        abstract_text: metadata.abstract_text.clone(),
        journal: metadata.journal.clone(),
        year: metadata.year,
        url: metadata.url.clone(),
        date_added: now.clone(),
        date_modified: now,
        tags: Vec::new(),
        highlights: Vec::new(),
    };

    let pdf = fetch_pdf(client, scihub_domain, doi, Some(&metadata)).await;
    match pdf {
        Some(content) if validate_pdf(&content) => {
            Some((paper, Some(content), ImportStatus::Success))
        }
        _ => Some((paper, None, ImportStatus::Partial)),
    }
}
