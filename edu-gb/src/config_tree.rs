//! Grade configuration tree: category → item → question
//!
//! The tree is authored externally and read-only here. Item and category
//! totals are always derived from question points; nothing above the
//! question level carries its own point value.

use crate::error::GradeError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeConfigTree {
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Informational; reported in the view, not applied to the overall roll-up
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemConfig {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionConfig {
    pub id: String,
    pub points: f64,
}

impl GradeConfigTree {
    /// Fail fast on anything the reducer cannot turn into a sensible view
    pub fn validate(&self) -> Result<(), GradeError> {
        let mut category_ids = HashSet::new();
        let mut item_ids = HashSet::new();
        let mut question_ids = HashSet::new();

        for (ci, category) in self.categories.iter().enumerate() {
            let cpath = format!("categories[{}]", ci);
            check_id(&cpath, &category.id)?;
            if !category_ids.insert(category.id.as_str()) {
                return Err(GradeError::malformed(
                    cpath,
                    format!("duplicate category id '{}'", category.id),
                ));
            }
            if !category.weight.is_finite() || category.weight < 0.0 {
                return Err(GradeError::malformed(
                    format!("{}.weight", cpath),
                    format!("weight must be a non-negative number, got {}", category.weight),
                ));
            }

            for (ii, item) in category.items.iter().enumerate() {
                let ipath = format!("{}.items[{}]", cpath, ii);
                check_id(&ipath, &item.id)?;
                if !item_ids.insert(item.id.as_str()) {
                    return Err(GradeError::malformed(
                        ipath,
                        format!("duplicate item id '{}'", item.id),
                    ));
                }

                for (qi, question) in item.questions.iter().enumerate() {
                    let qpath = format!("{}.questions[{}]", ipath, qi);
                    check_id(&qpath, &question.id)?;
                    if !question_ids.insert(question.id.as_str()) {
                        return Err(GradeError::malformed(
                            qpath,
                            format!("duplicate question id '{}'", question.id),
                        ));
                    }
                    if !question.points.is_finite() || question.points < 0.0 {
                        return Err(GradeError::malformed(
                            format!("{}.points", qpath),
                            format!("points must be a non-negative number, got {}", question.points),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn question_count(&self) -> usize {
        self.categories
            .iter()
            .flat_map(|c| &c.items)
            .map(|i| i.questions.len())
            .sum()
    }
}

fn check_id(path: &str, id: &str) -> Result<(), GradeError> {
    if id.trim().is_empty() {
        return Err(GradeError::malformed(format!("{}.id", path), "id must not be empty"));
    }
    Ok(())
}
