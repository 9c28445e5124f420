use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use app_core::config::{self, Config};
use app_core::models::{Author, Highlight, HighlightAnchor, Paper, PaperMeta};
use app_core::search::{SearchIndex, SearchResult, DEFAULT_LIMIT};
use app_core::storage::{new_highlight_id, now_rfc3339, Store};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub library_root: PathBuf,
    pub store: Arc<Store>,
    // axum serves from multiple worker threads, so the index sits behind a
    // lock: writers for add/rebuild, readers for search.
    pub index: Arc<RwLock<SearchIndex>>,
    pub client: importer::Client,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}
fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total: usize,
}

#[derive(Deserialize)]
pub struct ImportRequest {
    pub input: String,
}

#[derive(Serialize)]
pub struct ImportResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

#[derive(Deserialize)]
pub struct PaperUpdate {
    pub title: Option<String>,
    pub authors: Option<Vec<Author>>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub url: Option<String>,
}

#[derive(Deserialize)]
pub struct TagUpdate {
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct BulkTagRequest {
    pub paper_ids: Vec<String>,
    #[serde(default)]
    pub add_tags: Vec<String>,
    #[serde(default)]
    pub remove_tags: Vec<String>,
}

#[derive(Serialize)]
pub struct BulkTagResponse {
    pub status: &'static str,
    pub updated_count: usize,
    pub message: String,
}

#[derive(Deserialize)]
pub struct HighlightCreate {
    pub page: u32,
    pub color: String,
    pub text: String,
    pub anchor: HighlightAnchor,
    pub comment: Option<String>,
}

#[derive(Deserialize)]
pub struct HighlightUpdate {
    pub comment: Option<String>,
    pub color: Option<String>,
}

#[derive(Serialize)]
pub struct HighlightResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

type HandlerError = (StatusCode, String);

fn internal(e: anyhow::Error) -> HandlerError {
    tracing::error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn not_found(what: &str) -> HandlerError {
    (StatusCode::NOT_FOUND, format!("{what} not found"))
}

/// Build the application: open the library, rebuild the search index from
/// it, and wire up the routes.
pub fn build_app(library_root: PathBuf) -> Result<Router> {
    let papers_dir = config::papers_dir(&library_root)?;
    let store = Arc::new(Store::new(papers_dir)?);

    let mut index = SearchIndex::new();
    index.rebuild(store.as_ref());

    let state = AppState {
        library_root,
        store,
        index: Arc::new(RwLock::new(index)),
        client: importer::http_client()?,
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/papers", get(list_papers_handler))
        .route("/api/papers/import", post(import_handler))
        .route("/api/papers/bulk-tag", post(bulk_tag_handler))
        .route(
            "/api/papers/:paper_id",
            get(get_paper_handler).put(update_paper_handler).delete(delete_paper_handler),
        )
        .route("/api/papers/:paper_id/tags", put(update_tags_handler))
        .route("/api/papers/:paper_id/pdf", get(get_pdf_handler))
        .route("/api/papers/:paper_id/refetch-pdf", post(refetch_pdf_handler))
        .route("/api/papers/:paper_id/highlights", post(create_highlight_handler))
        .route(
            "/api/papers/:paper_id/highlights/:highlight_id",
            put(update_highlight_handler).delete(delete_highlight_handler),
        )
        .route("/api/search", get(search_handler))
        .route("/api/config", get(get_config_handler).put(update_config_handler))
        .with_state(state)
        .layer(cors);
    Ok(app)
}

async fn list_papers_handler(State(state): State<AppState>) -> Json<Vec<PaperMeta>> {
    Json(state.store.list_papers())
}

async fn get_paper_handler(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
) -> Result<Json<Paper>, HandlerError> {
    state
        .store
        .load_paper(&paper_id)
        .map(Json)
        .ok_or_else(|| not_found("paper"))
}

async fn import_handler(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, HandlerError> {
    let doi = match importer::extract_doi_from_input(&request.input) {
        Some(doi) => doi,
        None => {
            return Ok(Json(ImportResponse {
                status: "error",
                paper_id: None,
                message: "Could not parse DOI from input. Try pasting the full URL or upload PDF manually.".to_string(),
                missing: None,
                existing_id: None,
                error: Some("invalid_doi"),
            }));
        }
    };

    if let Some(existing_id) = state.store.find_by_doi(&doi) {
        let title = state
            .store
            .load_paper(&existing_id)
            .map(|p| p.title)
            .unwrap_or_else(|| "Unknown".to_string());
        return Ok(Json(ImportResponse {
            status: "error",
            paper_id: None,
            message: format!("Paper already in library: '{title}'"),
            missing: None,
            existing_id: Some(existing_id),
            error: Some("duplicate"),
        }));
    }

    let cfg = config::load_config(&state.library_root).map_err(internal)?;
    let imported = importer::import_by_doi(&state.client, &cfg.scihub_domain, &doi).await;

    let (mut paper, pdf, status) = match imported {
        Some(result) => result,
        None => {
            return Ok(Json(ImportResponse {
                status: "error",
                paper_id: None,
                message: "Could not fetch metadata. Check the DOI and try again.".to_string(),
                missing: None,
                existing_id: None,
                error: Some("fetch_failed"),
            }));
        }
    };

    state.store.save_paper(&mut paper).map_err(internal)?;
    if let Some(content) = &pdf {
        state.store.save_pdf(&paper.id, content).map_err(internal)?;
    }
    state.index.write().add_paper(&paper);

    let response = match status {
        importer::ImportStatus::Success => ImportResponse {
            status: "success",
            paper_id: Some(paper.id),
            message: "Paper imported successfully".to_string(),
            missing: None,
            existing_id: None,
            error: None,
        },
        importer::ImportStatus::Partial => ImportResponse {
            status: "partial",
            paper_id: Some(paper.id),
            message: "Metadata imported, but PDF unavailable".to_string(),
            missing: Some(vec!["pdf"]),
            existing_id: None,
            error: None,
        },
    };
    Ok(Json(response))
}

async fn update_paper_handler(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
    Json(update): Json<PaperUpdate>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let mut paper = state.store.load_paper(&paper_id).ok_or_else(|| not_found("paper"))?;

    if let Some(title) = update.title {
        paper.title = title;
    }
    if let Some(authors) = update.authors {
        paper.authors = authors;
    }
    if let Some(abstract_text) = update.abstract_text {
        paper.abstract_text = Some(abstract_text);
    }
    if let Some(journal) = update.journal {
        paper.journal = Some(journal);
    }
    if let Some(year) = update.year {
        paper.year = Some(year);
    }
    if let Some(url) = update.url {
        paper.url = Some(url);
    }

    state.store.save_paper(&mut paper).map_err(internal)?;
    state.index.write().add_paper(&paper);

    Ok(Json(serde_json::json!({ "status": "success", "paper_id": paper_id })))
}

async fn update_tags_handler(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
    Json(update): Json<TagUpdate>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let updated = state.store.update_tags(&paper_id, update.tags).map_err(internal)?;
    if !updated {
        return Err(not_found("paper"));
    }
    reindex(&state, &paper_id);
    Ok(Json(serde_json::json!({ "status": "success", "paper_id": paper_id })))
}

async fn bulk_tag_handler(
    State(state): State<AppState>,
    Json(request): Json<BulkTagRequest>,
) -> Result<Json<BulkTagResponse>, HandlerError> {
    let updated_count = state
        .store
        .bulk_update_tags(&request.paper_ids, &request.add_tags, &request.remove_tags)
        .map_err(internal)?;

    for paper_id in &request.paper_ids {
        reindex(&state, paper_id);
    }

    Ok(Json(BulkTagResponse {
        status: "success",
        updated_count,
        message: format!("Updated tags for {updated_count} papers"),
    }))
}

async fn delete_paper_handler(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let deleted = state.store.delete_paper(&paper_id).map_err(internal)?;
    if !deleted {
        return Err(not_found("paper"));
    }
    // Deletions resync via a full rebuild
    state.index.write().rebuild(state.store.as_ref());
    Ok(Json(serde_json::json!({ "status": "success", "message": "Paper deleted" })))
}

async fn get_pdf_handler(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let path = state.store.pdf_path(&paper_id).ok_or_else(|| not_found("PDF"))?;
    let content = tokio::fs::read(&path).await.map_err(|e| internal(e.into()))?;
    Ok(([(header::CONTENT_TYPE, "application/pdf")], content))
}

async fn refetch_pdf_handler(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let paper = state.store.load_paper(&paper_id).ok_or_else(|| not_found("paper"))?;

    if state.store.pdf_path(&paper_id).is_some() {
        return Ok(Json(serde_json::json!({ "status": "success", "message": "PDF already exists" })));
    }
    let doi = paper
        .doi
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Paper has no DOI".to_string()))?;

    let cfg = config::load_config(&state.library_root).map_err(internal)?;
    match importer::fetch_pdf(&state.client, &cfg.scihub_domain, &doi, None).await {
        Some(content) if importer::validate_pdf(&content) => {
            state.store.save_pdf(&paper_id, &content).map_err(internal)?;
            Ok(Json(serde_json::json!({ "status": "success", "message": "PDF fetched successfully" })))
        }
        _ => Ok(Json(serde_json::json!({ "status": "error", "message": "Could not fetch PDF" }))),
    }
}

async fn create_highlight_handler(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
    Json(data): Json<HighlightCreate>,
) -> Result<Json<HighlightResponse>, HandlerError> {
    if !state.store.exists(&paper_id) {
        return Err(not_found("paper"));
    }

    let validation_error = if data.anchor.start.page != data.anchor.end.page {
        Some("Highlight cannot span multiple pages")
    } else if data.page != data.anchor.start.page {
        Some("Page number mismatch in anchor")
    } else if data.text.trim().is_empty() {
        Some("Highlight text cannot be empty")
    } else {
        None
    };
    if let Some(message) = validation_error {
        return Ok(Json(HighlightResponse {
            status: "error",
            highlight_id: None,
            message: Some(message.to_string()),
            error: Some("validation_failed"),
        }));
    }

    let highlight_id = new_highlight_id(&paper_id, &data.text);
    let highlight = Highlight {
        id: highlight_id.clone(),
        page: data.page,
        color: data.color,
        text: data.text,
        anchor: data.anchor,
        comment: data.comment,
        created_at: now_rfc3339(),
    };

    if state.store.add_highlight(&paper_id, highlight).map_err(internal)? {
        reindex(&state, &paper_id);
        return Ok(Json(HighlightResponse {
            status: "success",
            highlight_id: Some(highlight_id),
            message: None,
            error: None,
        }));
    }

    Ok(Json(HighlightResponse {
        status: "error",
        highlight_id: None,
        message: Some("Failed to save highlight".to_string()),
        error: Some("save_failed"),
    }))
}

async fn update_highlight_handler(
    State(state): State<AppState>,
    Path((paper_id, highlight_id)): Path<(String, String)>,
    Json(update): Json<HighlightUpdate>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let updated = state
        .store
        .update_highlight(&paper_id, &highlight_id, update.comment, update.color)
        .map_err(internal)?;
    if !updated {
        return Err(not_found("highlight"));
    }
    reindex(&state, &paper_id);
    Ok(Json(serde_json::json!({ "status": "success", "highlight_id": highlight_id })))
}

async fn delete_highlight_handler(
    State(state): State<AppState>,
    Path((paper_id, highlight_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let deleted = state
        .store
        .delete_highlight(&paper_id, &highlight_id)
        .map_err(internal)?;
    if !deleted {
        return Err(not_found("highlight"));
    }
    reindex(&state, &paper_id);
    Ok(Json(serde_json::json!({ "status": "success", "message": "Highlight deleted" })))
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    let results = state.index.read().search(&params.q, params.limit);
    let total = results.len();
    Json(SearchResponse { query: params.q, results, total })
}

async fn get_config_handler(
    State(state): State<AppState>,
) -> Result<Json<Config>, HandlerError> {
    config::load_config(&state.library_root).map(Json).map_err(internal)
}

async fn update_config_handler(
    State(state): State<AppState>,
    Json(new_config): Json<Config>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    config::save_config(&state.library_root, &new_config).map_err(internal)?;
    Ok(Json(serde_json::json!({ "status": "success", "message": "Config updated" })))
}

/// Reload a paper from disk and replace it in the index, keeping the index
/// consistent after any mutation elsewhere in the system.
fn reindex(state: &AppState, paper_id: &str) {
    if let Some(paper) = state.store.load_paper(paper_id) {
        state.index.write().add_paper(&paper);
    }
}
