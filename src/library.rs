//! Paper library: imported PDFs plus a JSON catalog describing them

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::settings::APP_NAME;

const CATALOG_FILENAME: &str = "library.json";
const PAPERS_DIR: &str = "papers";

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("library catalog is unreadable: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("not a PDF file: {}", .0.display())]
    NotPdf(PathBuf),

    #[error("no paper with id {0}")]
    NotFound(i64),
}

impl LibraryError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub authors: Option<String>,
    pub file_path: PathBuf,
    pub added_at: DateTime<Utc>,
}

/// Stored excerpt row. Nothing in the reader writes these yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcerptRecord {
    pub id: i64,
    pub paper_id: i64,
    pub content: String,
    pub page_number: usize,
    pub created_at: DateTime<Utc>,
}

/// Flashcard row reserved for review scheduling. Nothing computes these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub excerpt_id: i64,
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interval: i64,
    #[serde(default = "default_ease")]
    pub ease_factor: f64,
    #[serde(default)]
    pub reps: i64,
    #[serde(default)]
    pub lapses: i64,
}

fn default_ease() -> f64 {
    2.5
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub next_paper_id: i64,
    #[serde(default)]
    pub papers: Vec<Paper>,
    #[serde(default)]
    pub excerpts: Vec<ExcerptRecord>,
    #[serde(default)]
    pub cards: Vec<Card>,
}

/// What the reader needs from wherever papers are kept
pub trait Library {
    /// Every paper, newest first. An empty library is not an error.
    fn list_papers(&self) -> Result<Vec<Paper>, LibraryError>;

    /// Import a paper; the returned message is shown to the user as is
    fn add_paper(&mut self, source: &Path) -> Result<String, LibraryError>;

    fn read_document_bytes(&self, path: &Path) -> Result<Vec<u8>, LibraryError>;
}

/// Library kept in a directory: `papers/` for the PDFs, `library.json` for
/// the catalog.
pub struct FileLibrary {
    root: PathBuf,
    catalog: Catalog,
}

impl FileLibrary {
    /// Open (creating if needed) the library rooted at `root`
    pub fn open(root: &Path) -> Result<Self, LibraryError> {
        let papers = root.join(PAPERS_DIR);
        fs::create_dir_all(&papers).map_err(|e| LibraryError::io(&papers, e))?;

        let catalog_path = root.join(CATALOG_FILENAME);
        let catalog = if catalog_path.exists() {
            let content =
                fs::read_to_string(&catalog_path).map_err(|e| LibraryError::io(&catalog_path, e))?;
            serde_json::from_str(&content)?
        } else {
            Catalog::default()
        };

        info!(
            "Library at {root:?} holds {} papers",
            catalog.papers.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            catalog,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn papers_dir(&self) -> PathBuf {
        self.root.join(PAPERS_DIR)
    }

    fn save(&self) -> Result<(), LibraryError> {
        let path = self.root.join(CATALOG_FILENAME);
        let content = serde_json::to_string_pretty(&self.catalog)?;
        fs::write(&path, content).map_err(|e| LibraryError::io(&path, e))
    }

    /// Health line, like a database connection check
    pub fn status(&self) -> String {
        format!(
            "Library connected. Papers stored: {}",
            self.catalog.papers.len()
        )
    }

    /// Remove a paper, its stored file, and every excerpt and card hanging
    /// off it.
    pub fn remove_paper(&mut self, id: i64) -> Result<Paper, LibraryError> {
        let index = self
            .catalog
            .papers
            .iter()
            .position(|p| p.id == id)
            .ok_or(LibraryError::NotFound(id))?;
        let paper = self.catalog.papers.remove(index);

        let removed_excerpts: HashSet<i64> = self
            .catalog
            .excerpts
            .iter()
            .filter(|e| e.paper_id == id)
            .map(|e| e.id)
            .collect();
        self.catalog.excerpts.retain(|e| e.paper_id != id);
        self.catalog
            .cards
            .retain(|c| !removed_excerpts.contains(&c.excerpt_id));

        self.save()?;

        if let Err(e) = fs::remove_file(&paper.file_path) {
            warn!("Could not delete {:?}: {e}", paper.file_path);
        }
        info!("Removed paper {id} ({})", paper.title);
        Ok(paper)
    }
}

impl Library for FileLibrary {
    fn list_papers(&self) -> Result<Vec<Paper>, LibraryError> {
        let mut papers = self.catalog.papers.clone();
        papers.sort_by(|a, b| b.added_at.cmp(&a.added_at).then(b.id.cmp(&a.id)));
        Ok(papers)
    }

    fn add_paper(&mut self, source: &Path) -> Result<String, LibraryError> {
        let is_pdf = source
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(LibraryError::NotPdf(source.to_path_buf()));
        }
        if !source.is_file() {
            return Err(LibraryError::io(
                source,
                std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            ));
        }

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "paper".to_string());
        let dest = unique_destination(&self.papers_dir(), &stem);
        fs::copy(source, &dest).map_err(|e| LibraryError::io(&dest, e))?;

        let title = dest
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(stem);

        self.catalog.next_paper_id += 1;
        self.catalog.papers.push(Paper {
            id: self.catalog.next_paper_id,
            title: title.clone(),
            authors: None,
            file_path: dest,
            added_at: Utc::now(),
        });
        self.save()?;

        info!("Added paper '{title}' from {source:?}");
        Ok(format!("Paper added successfully: {title}"))
    }

    fn read_document_bytes(&self, path: &Path) -> Result<Vec<u8>, LibraryError> {
        fs::read(path).map_err(|e| LibraryError::io(path, e))
    }
}

/// First of `stem.pdf`, `stem_1.pdf`, `stem_2.pdf`, ... that does not exist
fn unique_destination(dir: &Path, stem: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.pdf"));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}.pdf")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Default library location under the platform data directory
pub fn default_library_dir() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .context("Could not determine data directory")?
        .join(APP_NAME))
}

/// Compute the XDG-compliant log file path.
/// Uses `state_dir` on platforms that have it, falls back to `cache_dir`.
pub fn resolve_log_path() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine state or cache directory")?;

    let log_dir = base.join(APP_NAME);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {log_dir:?}"))?;

    Ok(log_dir.join(format!("{APP_NAME}.log")))
}
