//! Grade tree reduction
//!
//! `reduce` is a pure function of (config tree, attempts, threshold): no I/O,
//! no shared state, inputs untouched. Every read recomputes the whole view.

use crate::attempts::{AttemptMap, AttemptRecord};
use crate::config_tree::{CategoryConfig, GradeConfigTree, ItemConfig, QuestionConfig};
use crate::error::GradeError;
use crate::view::{CategoryGrade, GradeView, ItemGrade, ItemStatus, OverallGrade};

/// Roll question scores up to items, categories and the overall grade
pub fn reduce(
    tree: &GradeConfigTree,
    attempts: &AttemptMap,
    passing_threshold: f64,
) -> Result<GradeView, GradeError> {
    tree.validate()?;
    if !passing_threshold.is_finite() || !(0.0..=100.0).contains(&passing_threshold) {
        return Err(GradeError::InvalidThreshold(passing_threshold));
    }

    let categories = tree
        .categories
        .iter()
        .map(|category| reduce_category(category, attempts))
        .collect::<Result<Vec<_>, _>>()?;

    let earned: f64 = categories.iter().map(|c| c.earned).sum();
    let possible: f64 = categories.iter().map(|c| c.possible).sum();
    let items = categories.iter().flat_map(|c| &c.items);
    let percentage = percentage(earned, possible);

    let overall = OverallGrade {
        earned,
        possible,
        percentage,
        // No gradable items: never passing, whatever the threshold
        is_passing: possible > 0.0 && f64::from(percentage) >= passing_threshold,
        completed_items: count_u32(items.clone().filter(|i| i.status == ItemStatus::Completed)),
        total_items: count_u32(items),
    };

    Ok(GradeView {
        categories,
        overall,
        passing_threshold,
    })
}

fn reduce_category(
    category: &CategoryConfig,
    attempts: &AttemptMap,
) -> Result<CategoryGrade, GradeError> {
    let items = category
        .items
        .iter()
        .map(|item| reduce_item(item, attempts))
        .collect::<Result<Vec<_>, _>>()?;

    let earned: f64 = items.iter().map(|i| i.earned).sum();
    let possible: f64 = items.iter().map(|i| i.possible).sum();

    Ok(CategoryGrade {
        id: category.id.clone(),
        name: category.name.clone(),
        weight: category.weight,
        earned,
        possible,
        percentage: percentage(earned, possible),
        items,
    })
}

fn reduce_item(item: &ItemConfig, attempts: &AttemptMap) -> Result<ItemGrade, GradeError> {
    let mut earned = 0.0;
    let mut possible = 0.0;
    let mut attempted_questions = 0u32;
    let mut total_attempts = 0u64;
    let mut last_attempt_time = None;

    for question in &item.questions {
        let attempt = attempts.get(&question.id);
        earned += contribution(question, attempt)?;
        possible += question.points;

        if let Some(record) = attempt {
            if record.attempts > 0 {
                attempted_questions += 1;
            }
            total_attempts += u64::from(record.attempts);
            last_attempt_time = last_attempt_time.max(record.last_attempt_time);
        }
    }

    let status = if possible > 0.0 && earned > 0.0 {
        ItemStatus::Completed
    } else {
        ItemStatus::NotStarted
    };

    Ok(ItemGrade {
        id: item.id.clone(),
        title: item.title.clone(),
        earned,
        possible,
        percentage: percentage(earned, possible),
        status,
        attempted_questions,
        total_attempts,
        last_attempt_time,
    })
}

/// Score counted toward the item: clamped to `[0, points]`
fn contribution(
    question: &QuestionConfig,
    attempt: Option<&AttemptRecord>,
) -> Result<f64, GradeError> {
    let Some(record) = attempt else {
        return Ok(0.0);
    };
    if !record.score.is_finite() {
        return Err(GradeError::AttemptMalformed {
            question_id: question.id.clone(),
            reason: format!("score must be a finite number, got {}", record.score),
        });
    }
    Ok(record.score.clamp(0.0, question.points))
}

/// Integer percentage rounded half-up; 0 when nothing is possible
pub fn percentage(earned: f64, possible: f64) -> u32 {
    if possible <= 0.0 {
        return 0;
    }
    let pct = (100.0 * earned / possible + 0.5).floor();
    pct.clamp(0.0, 100.0) as u32
}

fn count_u32<T>(iter: impl Iterator<Item = T>) -> u32 {
    u32::try_from(iter.count()).unwrap_or(u32::MAX)
}
