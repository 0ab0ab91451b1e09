//! Course grade config files (`<courses_dir>/<course_id>.toml`)

use crate::config_tree::{CategoryConfig, GradeConfigTree};
use crate::error::GradeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// On-disk course file: the config tree plus an optional course threshold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseFile {
    #[serde(default)]
    pub passing_threshold: Option<f64>,
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

impl CourseFile {
    /// Parse and validate; `origin` names the source in error paths
    pub fn parse(content: &str, origin: &str) -> Result<Self, GradeError> {
        let course: CourseFile = toml::from_str(content)
            .map_err(|e| GradeError::malformed(origin, e.message().to_string()))?;
        course.tree().validate()?;
        Ok(course)
    }

    pub fn tree(&self) -> GradeConfigTree {
        GradeConfigTree {
            categories: self.categories.clone(),
        }
    }
}

/// Directory of course files
#[derive(Debug, Clone)]
pub struct CourseCatalog {
    dir: PathBuf,
}

impl CourseCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load one course; unknown or unsafe ids are `CourseNotFound`
    pub async fn load(&self, course_id: &str) -> Result<CourseFile, GradeError> {
        if !is_valid_course_id(course_id) {
            return Err(GradeError::CourseNotFound(course_id.to_string()));
        }

        let path = self.dir.join(format!("{}.toml", course_id));
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GradeError::CourseNotFound(course_id.to_string()));
            }
            Err(e) => return Err(edu_common::Error::Io(e).into()),
        };

        debug!(course_id, path = %path.display(), "Loaded course config");
        CourseFile::parse(&content, &path.display().to_string())
    }
}

fn is_valid_course_id(course_id: &str) -> bool {
    !course_id.is_empty()
        && course_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
