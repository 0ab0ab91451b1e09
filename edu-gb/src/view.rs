//! Gradebook view model (derived, never persisted)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    NotStarted,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemGrade {
    pub id: String,
    pub title: Option<String>,
    pub earned: f64,
    pub possible: f64,
    pub percentage: u32,
    pub status: ItemStatus,
    /// Questions with at least one attempt
    pub attempted_questions: u32,
    pub total_attempts: u64,
    pub last_attempt_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryGrade {
    pub id: String,
    pub name: Option<String>,
    pub weight: f64,
    pub earned: f64,
    pub possible: f64,
    pub percentage: u32,
    pub items: Vec<ItemGrade>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallGrade {
    pub earned: f64,
    pub possible: f64,
    pub percentage: u32,
    pub is_passing: bool,
    pub completed_items: u32,
    pub total_items: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeView {
    pub categories: Vec<CategoryGrade>,
    pub overall: OverallGrade,
    pub passing_threshold: f64,
}

impl GradeView {
    pub fn item(&self, item_id: &str) -> Option<&ItemGrade> {
        self.categories
            .iter()
            .flat_map(|c| &c.items)
            .find(|i| i.id == item_id)
    }

    pub fn category(&self, category_id: &str) -> Option<&CategoryGrade> {
        self.categories.iter().find(|c| c.id == category_id)
    }
}
