//! Build input collection
//!
//! Reads the declared build-relevant files for a cell into an
//! [`InputSet`]. Directory inputs are walked in sorted order so the
//! result never depends on filesystem enumeration order.

use crate::build::recipe::BuildRecipe;
use crate::cache::fingerprint::InputSet;
use crate::config::schema::InputConfig;
use crate::error::{DrydockError, DrydockResult};
use crate::matrix::MatrixCell;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Logical name of the rendered recipe input
pub const RECIPE_INPUT: &str = "@recipe";

/// Logical name of the Dockerfile input
pub const DOCKERFILE_INPUT: &str = "@dockerfile";

/// Reads declared inputs from the project tree
#[derive(Debug, Clone)]
pub struct InputCollector {
    project_dir: PathBuf,
    declared: Vec<InputConfig>,
}

impl InputCollector {
    pub fn new(project_dir: impl Into<PathBuf>, declared: Vec<InputConfig>) -> Self {
        Self {
            project_dir: project_dir.into(),
            declared,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Collect every input for `cell`
    ///
    /// Fails with `InputUnavailable` on the first input that cannot be read.
    pub async fn collect(&self, cell: &MatrixCell, recipe: &BuildRecipe) -> DrydockResult<InputSet> {
        let mut inputs = InputSet::new();
        inputs.insert(RECIPE_INPUT, recipe.describe());

        if let Some(dockerfile) = recipe.dockerfile() {
            let content = read_input(cell, DOCKERFILE_INPUT, dockerfile).await?;
            inputs.insert(DOCKERFILE_INPUT, content);
        }

        for input in &self.declared {
            let path = self.project_dir.join(cell.render(&input.path)?);
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|e| unavailable(cell, &input.name, &path, e))?;

            if metadata.is_dir() {
                for (relative, file) in walk_sorted(cell, &input.name, &path).await? {
                    let content = read_input(cell, &input.name, &file).await?;
                    inputs.insert(format!("{}/{}", input.name, relative), content);
                }
            } else {
                let content = read_input(cell, &input.name, &path).await?;
                inputs.insert(input.name.clone(), content);
            }
        }

        debug!("[{}] collected {} input(s)", cell, inputs.len());
        Ok(inputs)
    }
}

async fn read_input(cell: &MatrixCell, name: &str, path: &Path) -> DrydockResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| unavailable(cell, name, path, e))
}

fn unavailable(cell: &MatrixCell, name: &str, path: &Path, source: std::io::Error) -> DrydockError {
    DrydockError::InputUnavailable {
        cell: cell.key(),
        input: name.to_string(),
        path: path.to_path_buf(),
        source,
    }
}

/// All regular files under `root`, as (`/`-joined relative path, absolute path),
/// sorted by relative path
async fn walk_sorted(
    cell: &MatrixCell,
    name: &str,
    root: &Path,
) -> DrydockResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| unavailable(cell, name, &dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| unavailable(cell, name, &dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| unavailable(cell, name, &path, e))?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((relative, path));
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
