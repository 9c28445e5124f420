use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use app_core::models::{AnchorPoint, Author, Highlight, HighlightAnchor, Paper};
use app_core::storage::Store;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::tempdir;
use tower::ServiceExt;

fn paper(id: &str, title: &str, tags: &[&str], date_added: &str) -> Paper {
    Paper {
        id: id.to_string(),
        doi: None,
        title: title.to_string(),
        authors: vec![Author { name: "Grace Hopper".to_string(), affiliation: None }],
        abstract_text: Some("A study of compilers and compilation.".to_string()),
        journal: None,
        year: Some(2024),
        url: None,
        date_added: date_added.to_string(),
        date_modified: date_added.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        highlights: Vec::new(),
    }
}

fn seed_library(root: &Path) -> Store {
    let store = Store::new(root.join("papers")).unwrap();

    let mut p1 = paper(
        "deep-genomics",
        "Deep Learning for Genomics",
        &["machine-learning"],
        "2024-02-01T00:00:00Z",
    );
    p1.highlights.push(Highlight {
        id: "h1".to_string(),
        page: 4,
        color: "yellow".to_string(),
        text: "transformers capture regulatory grammar".to_string(),
        anchor: HighlightAnchor {
            start: AnchorPoint { page: 4, offset: 0 },
            end: AnchorPoint { page: 4, offset: 40 },
        },
        comment: None,
        created_at: "2024-02-01T00:00:00Z".to_string(),
    });
    store.save_paper(&mut p1).unwrap();

    let mut p2 = paper("protein-design", "Protein Design", &[], "2024-01-01T00:00:00Z");
    store.save_paper(&mut p2).unwrap();

    store
}

async fn get(app: Router, uri: &str) -> (StatusCode, Bytes) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body)
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Bytes) {
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body)
}

#[tokio::test]
async fn search_returns_ranked_results_with_snippets() {
    let dir = tempdir().unwrap();
    seed_library(dir.path());
    let app = server::build_app(dir.path().to_path_buf()).unwrap();

    let (status, body) = get(app, "/api/search?q=deep%20genomics").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"].as_u64().unwrap(), 1);
    let hit = &json["results"][0];
    assert_eq!(hit["paper_id"], "deep-genomics");
    assert!(hit["score"].as_i64().unwrap() >= 20);
    let title_match = hit["matches"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["field"] == "title")
        .unwrap();
    let snippet = title_match["snippet"].as_str().unwrap();
    assert!(snippet.contains("<mark>Deep</mark>"));
    assert!(snippet.contains("<mark>Genomics</mark>"));
}

#[tokio::test]
async fn highlight_matches_carry_their_page() {
    let dir = tempdir().unwrap();
    seed_library(dir.path());
    let app = server::build_app(dir.path().to_path_buf()).unwrap();

    let (status, body) = get(app, "/api/search?q=regulatory").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"].as_u64().unwrap(), 1);
    let hl = json["results"][0]["matches"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["field"] == "highlight")
        .unwrap();
    assert_eq!(hl["page"].as_u64().unwrap(), 4);
    assert!(hl["snippet"].as_str().unwrap().contains("<mark>regulatory</mark>"));
}

#[tokio::test]
async fn stopword_query_matches_nothing() {
    let dir = tempdir().unwrap();
    seed_library(dir.path());
    let app = server::build_app(dir.path().to_path_buf()).unwrap();

    let (status, body) = get(app, "/api/search?q=the%20and%20is").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"].as_u64().unwrap(), 0);
    assert!(json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn papers_list_is_newest_first() {
    let dir = tempdir().unwrap();
    seed_library(dir.path());
    let app = server::build_app(dir.path().to_path_buf()).unwrap();

    let (status, body) = get(app, "/api/papers").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let papers = json.as_array().unwrap();
    assert_eq!(papers.len(), 2);
    assert_eq!(papers[0]["id"], "deep-genomics");
    assert_eq!(papers[1]["id"], "protein-design");
}

#[tokio::test]
async fn missing_paper_is_404() {
    let dir = tempdir().unwrap();
    seed_library(dir.path());
    let app = server::build_app(dir.path().to_path_buf()).unwrap();

    let (status, _) = get(app, "/api/papers/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn new_highlights_become_searchable() {
    let dir = tempdir().unwrap();
    seed_library(dir.path());
    let app = server::build_app(dir.path().to_path_buf()).unwrap();

    let body = json!({
        "page": 2,
        "color": "green",
        "text": "mitochondria are the powerhouse",
        "anchor": {
            "start": { "page": 2, "offset": 0 },
            "end": { "page": 2, "offset": 30 }
        }
    });
    let (status, resp) =
        post_json(app.clone(), "/api/papers/protein-design/highlights", body).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&resp).unwrap();
    assert_eq!(json["status"], "success");

    let (_, body) = get(app, "/api/search?q=mitochondria").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"].as_u64().unwrap(), 1);
    assert_eq!(json["results"][0]["paper_id"], "protein-design");
}

#[tokio::test]
async fn highlight_anchor_validation_rejects_page_mismatch() {
    let dir = tempdir().unwrap();
    seed_library(dir.path());
    let app = server::build_app(dir.path().to_path_buf()).unwrap();

    let body = json!({
        "page": 2,
        "color": "green",
        "text": "spans pages",
        "anchor": {
            "start": { "page": 2, "offset": 0 },
            "end": { "page": 3, "offset": 5 }
        }
    });
    let (status, resp) = post_json(app, "/api/papers/protein-design/highlights", body).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&resp).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"], "validation_failed");
}

#[tokio::test]
async fn deleting_a_paper_removes_it_from_search() {
    let dir = tempdir().unwrap();
    seed_library(dir.path());
    let app = server::build_app(dir.path().to_path_buf()).unwrap();

    let (_, body) = get(app.clone(), "/api/search?q=protein").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"].as_u64().unwrap(), 1);

    let req = Request::delete("/api/papers/protein-design").body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (_, body) = get(app, "/api/search?q=protein").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"].as_u64().unwrap(), 0);
}

#[tokio::test]
async fn import_rejects_unparseable_input() {
    let dir = tempdir().unwrap();
    seed_library(dir.path());
    let app = server::build_app(dir.path().to_path_buf()).unwrap();

    let (status, resp) =
        post_json(app, "/api/papers/import", json!({ "input": "not a doi at all" })).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&resp).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"], "invalid_doi");
}

#[tokio::test]
async fn config_roundtrip() {
    let dir = tempdir().unwrap();
    seed_library(dir.path());
    let app = server::build_app(dir.path().to_path_buf()).unwrap();

    let (status, body) = get(app.clone(), "/api/config").await;
    assert_eq!(status, StatusCode::OK);
    let mut cfg: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(cfg["default_highlight_color"], "yellow");

    cfg["default_highlight_color"] = json!("green");
    let req = Request::put("/api/config")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(cfg.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (_, body) = get(app, "/api/config").await;
    let cfg: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(cfg["default_highlight_color"], "green");
}
