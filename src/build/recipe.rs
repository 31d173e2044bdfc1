//! Per-cell build recipe
//!
//! Renders the `[image]` section for one cell: the image tag, and either
//! the Dockerfile build (context, build args, base image) or a reference
//! to pull.

use crate::config::schema::ImageConfig;
use crate::error::DrydockResult;
use crate::matrix::MatrixCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where the cell's image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeSource {
    /// Build from a Dockerfile
    Build {
        context: PathBuf,
        dockerfile: PathBuf,
        build_args: BTreeMap<String, String>,
        base_image: Option<String>,
    },
    /// Pull a prebuilt reference
    Pull { reference: String },
}

/// Fully rendered build instructions for one cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecipe {
    /// Image reference the cell runs in
    pub tag: String,
    pub source: RecipeSource,
}

impl BuildRecipe {
    /// Render the recipe for `cell`
    pub fn for_cell(image: &ImageConfig, project_dir: &Path, cell: &MatrixCell) -> DrydockResult<Self> {
        if let Some(ref template) = image.pull {
            let reference = cell.render(template)?;
            return Ok(Self {
                tag: reference.clone(),
                source: RecipeSource::Pull { reference },
            });
        }

        let mut build_args = BTreeMap::new();
        for (key, template) in &image.build_args {
            build_args.insert(key.clone(), cell.render(template)?);
        }

        let base_image = match image.base_image {
            Some(ref template) => Some(cell.render(template)?),
            None => None,
        };
        if let Some(ref base) = base_image {
            build_args
                .entry("BASE_IMAGE".to_string())
                .or_insert_with(|| base.clone());
        }

        let context = project_dir.join(cell.render(&image.context)?);
        let dockerfile = project_dir.join(cell.render(&image.dockerfile)?);

        Ok(Self {
            tag: format!("{}:{}", image.repository, cell.storage_id()),
            source: RecipeSource::Build {
                context,
                dockerfile,
                build_args,
                base_image,
            },
        })
    }

    /// Canonical text of everything in the recipe that affects the image
    ///
    /// Host paths are excluded; file contents are fingerprinted as inputs.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("tag={}", self.tag)];
        match &self.source {
            RecipeSource::Pull { reference } => {
                lines.push(format!("pull={}", reference));
            }
            RecipeSource::Build {
                build_args,
                base_image,
                ..
            } => {
                if let Some(base) = base_image {
                    lines.push(format!("base={}", base));
                }
                for (key, value) in build_args {
                    lines.push(format!("arg:{}={}", key, value));
                }
            }
        }
        lines.join("\n")
    }

    /// Dockerfile path, for build recipes
    pub fn dockerfile(&self) -> Option<&Path> {
        match &self.source {
            RecipeSource::Build { dockerfile, .. } => Some(dockerfile),
            RecipeSource::Pull { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> MatrixCell {
        MatrixCell::new([("python", "3.11"), ("backend", "sqlite"), ("executor", "local")])
    }

    #[test]
    fn build_recipe_renders_templates() {
        let recipe = BuildRecipe::for_cell(&ImageConfig::default(), Path::new("/src"), &cell()).unwrap();

        assert_eq!(
            recipe.tag,
            format!("localhost/drydock:{}", cell().storage_id())
        );
        assert!(recipe
            .tag
            .starts_with("localhost/drydock:python-3.11_backend-sqlite_executor-local-"));
        match recipe.source {
            RecipeSource::Build {
                ref dockerfile,
                ref build_args,
                ref base_image,
                ..
            } => {
                assert_eq!(dockerfile, &PathBuf::from("/src/Dockerfile.ci"));
                assert_eq!(build_args.get("PYTHON_VERSION").unwrap(), "3.11");
                assert_eq!(
                    build_args.get("BASE_IMAGE").unwrap(),
                    "python:3.11-slim-bookworm"
                );
                assert_eq!(base_image.as_deref(), Some("python:3.11-slim-bookworm"));
            }
            RecipeSource::Pull { .. } => panic!("expected build recipe"),
        }
    }

    #[test]
    fn pull_recipe_uses_reference_as_tag() {
        let image = ImageConfig {
            pull: Some("ghcr.io/acme/ci:{python}-{backend}".to_string()),
            ..ImageConfig::default()
        };
        let recipe = BuildRecipe::for_cell(&image, Path::new("/src"), &cell()).unwrap();
        assert_eq!(recipe.tag, "ghcr.io/acme/ci:3.11-sqlite");
        assert!(recipe.dockerfile().is_none());
    }

    #[test]
    fn describe_ignores_paths() {
        let a = BuildRecipe::for_cell(&ImageConfig::default(), Path::new("/a"), &cell()).unwrap();
        let b = BuildRecipe::for_cell(&ImageConfig::default(), Path::new("/b"), &cell()).unwrap();
        assert_eq!(a.describe(), b.describe());
        assert!(a.describe().contains("arg:BACKEND=sqlite"));
    }

    #[test]
    fn case_variant_cells_get_distinct_tags() {
        let upper = MatrixCell::new([("backend", "PG")]);
        let lower = MatrixCell::new([("backend", "pg")]);
        assert_eq!(upper.slug(), lower.slug());

        let image = ImageConfig {
            base_image: None,
            build_args: BTreeMap::new(),
            ..ImageConfig::default()
        };
        let a = BuildRecipe::for_cell(&image, Path::new("/src"), &upper).unwrap();
        let b = BuildRecipe::for_cell(&image, Path::new("/src"), &lower).unwrap();
        assert_ne!(a.tag, b.tag);
    }

    #[test]
    fn long_cells_stay_within_tag_limit() {
        let value = "x".repeat(300);
        let c = MatrixCell::new([("python", "3.11"), ("backend", value.as_str())]);
        let recipe = BuildRecipe::for_cell(&ImageConfig::default(), Path::new("/src"), &c).unwrap();
        let tag = recipe.tag.rsplit(':').next().unwrap();
        assert!(tag.len() <= 128);
    }
}
