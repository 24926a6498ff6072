//! Schema and query path expansion

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path {0} does not exist")]
    Missing(PathBuf),

    #[error("failed to list {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Expand files and directories into the `.sql` files they stand for
///
/// A file is used as given. A directory contributes its own `.sql` files
/// (not those of subdirectories) in name order, skipping hidden files and
/// `*.down.sql` rollback migrations.
pub fn sql_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, PathError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            return Err(PathError::Missing(path.clone()));
        }

        for entry in WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| PathError::Walk {
                path: path.clone(),
                source,
            })?;
            if entry.file_type().is_file() && is_schema_or_query_file(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    debug!("Expanded {} path(s) into {} file(s)", paths.len(), files.len());
    Ok(files)
}

fn is_schema_or_query_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('.') && name.ends_with(".sql") && !name.ends_with(".down.sql")
}
