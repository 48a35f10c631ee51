use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, BuildResult};
use crate::job::{Job, Step};
use crate::recipe::template::expand;
use crate::rule::Recipe;

/// Copies `source` to `dest`, creating missing parent directories of `dest`.
pub async fn copy_file(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> BuildResult<u64> {
    let source = source.as_ref();
    let dest = dest.as_ref();

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                BuildError::io(format!("creating {}", parent.display()), e)
            })?;
        }
    }

    tokio::fs::copy(source, dest).await.map_err(|e| {
        BuildError::io(
            format!("copying {} to {}", source.display(), dest.display()),
            e,
        )
    })
}

/// Produces the target by copying a single templated source.
#[derive(Debug, Clone)]
pub struct CopyRecipe {
    source: String,
    root: PathBuf,
}

impl CopyRecipe {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            root: PathBuf::from("."),
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

#[async_trait]
impl Recipe for CopyRecipe {
    async fn build(&self, job: Job) -> BuildResult<()> {
        let source = expand(&self.source, job.captures(), None)?;
        if job.dep([&source]).await? == Step::Done {
            return Ok(());
        }

        copy_file(self.root.join(&source), self.root.join(job.name())).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("copy {}", self.source)
    }
}
