use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
}

/// Position of one end of a highlight within a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub page: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightAnchor {
    pub start: AnchorPoint,
    pub end: AnchorPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub page: u32,
    pub color: String,
    pub text: String,
    pub anchor: HighlightAnchor,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: String,
}

/// Full paper record as stored on disk, including highlights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    #[serde(default)]
    pub doi: Option<String>,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    pub date_added: String,
    pub date_modified: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
}

/// Paper without highlights, used for listings and the rebuild scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperMeta {
    pub id: String,
    #[serde(default)]
    pub doi: Option<String>,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    pub date_added: String,
    pub date_modified: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<&Paper> for PaperMeta {
    fn from(p: &Paper) -> Self {
        Self {
            id: p.id.clone(),
            doi: p.doi.clone(),
            title: p.title.clone(),
            authors: p.authors.clone(),
            abstract_text: p.abstract_text.clone(),
            journal: p.journal.clone(),
            year: p.year,
            url: p.url.clone(),
            date_added: p.date_added.clone(),
            date_modified: p.date_modified.clone(),
            tags: p.tags.clone(),
        }
    }
}
