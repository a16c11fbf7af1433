use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("case root does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid case metadata {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("case metadata {0} has an empty name")]
    EmptyName(PathBuf),
    #[error("walking case root: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One benchmark scenario instance rooted at `directory`.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub directory: PathBuf,
    pub name: String,
    pub description: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step {
    pub name: String,
    /// `local`, or a container image to run `command` in.
    #[serde(default = "default_resource")]
    pub resource: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub parameters: Value,
}

fn default_resource() -> String {
    "local".to_string()
}

#[derive(Debug, Deserialize)]
struct CaseMetadata {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    steps: Vec<Step>,
}

impl Case {
    pub fn results_dir(&self) -> PathBuf {
        self.directory.join("results")
    }

    pub fn run_dir(&self, run: u32) -> PathBuf {
        self.results_dir().join(format!("run_{}", run))
    }

    fn load(metadata_path: &Path) -> Result<Self, CatalogueError> {
        let raw = fs::read_to_string(metadata_path).map_err(|source| CatalogueError::Io {
            path: metadata_path.to_path_buf(),
            source,
        })?;
        let meta: CaseMetadata =
            serde_json::from_str(&raw).map_err(|source| CatalogueError::Parse {
                path: metadata_path.to_path_buf(),
                source,
            })?;
        if meta.name.trim().is_empty() {
            return Err(CatalogueError::EmptyName(metadata_path.to_path_buf()));
        }
        let directory = metadata_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Case {
            directory,
            name: meta.name,
            description: meta.description,
            steps: meta.steps,
        })
    }
}

/// Finds every case under `root`, sorted by directory.
///
/// Result directories and hidden directories are not descended into.
pub fn discover(root: &Path) -> Result<Vec<Case>, CatalogueError> {
    if !root.is_dir() {
        return Err(CatalogueError::MissingRoot(root.to_path_buf()));
    }
    let walker = WalkDir::new(root).follow_links(true).into_iter().filter_entry(|e| {
        if e.depth() == 0 || !e.file_type().is_dir() {
            return true;
        }
        let name = e.file_name().to_string_lossy();
        name != "results" && !name.starts_with('.')
    });
    let mut cases = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name() == METADATA_FILE {
            let case = Case::load(entry.path())?;
            debug!(case = %case.name, dir = %case.directory.display(), "discovered case");
            cases.push(case);
        }
    }
    cases.sort_by(|a, b| a.directory.cmp(&b.directory));
    cases.dedup_by(|a, b| a.directory == b.directory);
    Ok(cases)
}
