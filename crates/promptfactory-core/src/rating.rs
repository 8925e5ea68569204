//! Rubric-based manual ratings and their read-side aggregation.
//!
//! Scores here are on the 0-5 rubric scale. The 0-100 accuracy produced by
//! the evaluative heuristic is a different quantity and lives on
//! `SavedVersion::model_accuracy`.

use crate::model::{
    new_id, now_rfc3339, ModelMessage, Mutation, RatingCategory, Rubric, TestResult,
    VersionRatings,
};
use serde::Serialize;
use std::collections::BTreeMap;

pub const RUBRIC_SCORE_MIN: f64 = 0.0;
pub const RUBRIC_SCORE_MAX: f64 = 5.0;
pub const DEPRECATED_MARKER: &str = " (deprecated)";
pub const UNKNOWN_RUBRIC: &str = "unknown rubric";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingBook {
    categories: Vec<RatingCategory>,
    rubrics: Vec<Rubric>,
    history_rubrics: Vec<Rubric>,
    ratings: VersionRatings,
    test_results: Vec<TestResult>,
}

/// Test runs merged by (version, model) for counting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedResult {
    pub version_id: String,
    pub model_id: String,
    pub runs: usize,
    pub latest_at: String,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// The best score among compared entries, or `None` when every entry holds
/// that same score (a unanimous result has no leader).
pub fn strict_leader(scores: &[Option<f64>]) -> Option<f64> {
    let max = scores
        .iter()
        .flatten()
        .copied()
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))?;
    if scores.iter().all(|s| *s == Some(max)) {
        None
    } else {
        Some(max)
    }
}

/// Counts test runs per (version, model); output sorted by key.
pub fn merge_test_results(results: &[TestResult]) -> Vec<MergedResult> {
    let mut merged: BTreeMap<(String, String), MergedResult> = BTreeMap::new();
    for r in results {
        let entry = merged
            .entry((r.version_id.clone(), r.model_id.clone()))
            .or_insert_with(|| MergedResult {
                version_id: r.version_id.clone(),
                model_id: r.model_id.clone(),
                runs: 0,
                latest_at: r.timestamp.clone(),
            });
        entry.runs += 1;
        if r.timestamp > entry.latest_at {
            entry.latest_at = r.timestamp.clone();
        }
    }
    merged.into_values().collect()
}

impl RatingBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(
        categories: Vec<RatingCategory>,
        rubrics: Vec<Rubric>,
        history_rubrics: Vec<Rubric>,
        ratings: VersionRatings,
        test_results: Vec<TestResult>,
    ) -> Self {
        Self {
            categories,
            rubrics,
            history_rubrics,
            ratings,
            test_results,
        }
    }

    pub fn categories(&self) -> &[RatingCategory] {
        &self.categories
    }

    pub fn rubrics(&self) -> &[Rubric] {
        &self.rubrics
    }

    pub fn history_rubrics(&self) -> &[Rubric] {
        &self.history_rubrics
    }

    pub fn version_ratings(&self) -> &VersionRatings {
        &self.ratings
    }

    pub fn test_results(&self) -> &[TestResult] {
        &self.test_results
    }

    pub fn add_category(&mut self, name: &str) -> RatingCategory {
        let order = self.categories.iter().map(|c| c.order + 1).max().unwrap_or(0);
        let category = RatingCategory {
            id: new_id(),
            name: name.to_string(),
            order,
        };
        self.categories.push(category.clone());
        category
    }

    pub fn find_category(&self, reference: &str) -> Option<&RatingCategory> {
        self.categories
            .iter()
            .find(|c| c.id == reference)
            .or_else(|| self.categories.iter().find(|c| c.name == reference))
    }

    /// Adds an active rubric; `None` when the category is unknown.
    pub fn add_rubric(&mut self, category_id: &str, content: &str) -> Option<Rubric> {
        if !self.categories.iter().any(|c| c.id == category_id) {
            return None;
        }
        let rubric = Rubric {
            id: new_id(),
            category_id: category_id.to_string(),
            content: content.to_string(),
        };
        self.rubrics.push(rubric.clone());
        Some(rubric)
    }

    pub fn update_rubric(&mut self, rubric_id: &str, content: &str) -> Mutation {
        match self.rubrics.iter_mut().find(|r| r.id == rubric_id) {
            Some(r) => {
                r.content = content.to_string();
                Mutation::Applied
            }
            None => Mutation::NotFound,
        }
    }

    /// Moves an active rubric to the history list. Recorded scores stay.
    pub fn retire_rubric(&mut self, rubric_id: &str) -> Mutation {
        let Some(idx) = self.rubrics.iter().position(|r| r.id == rubric_id) else {
            return Mutation::NotFound;
        };
        let rubric = self.rubrics.remove(idx);
        tracing::info!(
            event = "promptfactory.rubric.retired",
            rubric_id = %rubric.id,
            category_id = %rubric.category_id
        );
        self.history_rubrics.push(rubric);
        Mutation::Applied
    }

    /// Active rubric first, then history. The flag is true for history.
    pub fn find_rubric(&self, rubric_id: &str) -> Option<(&Rubric, bool)> {
        self.rubrics
            .iter()
            .find(|r| r.id == rubric_id)
            .map(|r| (r, false))
            .or_else(|| {
                self.history_rubrics
                    .iter()
                    .find(|r| r.id == rubric_id)
                    .map(|r| (r, true))
            })
    }

    /// Never fails: unknown ids render as a placeholder.
    pub fn rubric_display_label(&self, rubric_id: &str) -> String {
        match self.find_rubric(rubric_id) {
            Some((r, false)) => r.content.clone(),
            Some((r, true)) => format!("{}{}", r.content, DEPRECATED_MARKER),
            None => UNKNOWN_RUBRIC.to_string(),
        }
    }

    /// Records a 0-5 score. Scores outside the scale are `Ignored`; rubrics
    /// in neither list are `NotFound`.
    pub fn set_score(&mut self, version_id: &str, model_id: &str, rubric_id: &str, score: f64) -> Mutation {
        if !(RUBRIC_SCORE_MIN..=RUBRIC_SCORE_MAX).contains(&score) {
            return Mutation::Ignored;
        }
        if self.find_rubric(rubric_id).is_none() {
            return Mutation::NotFound;
        }
        self.ratings
            .entry(version_id.to_string())
            .or_default()
            .entry(model_id.to_string())
            .or_default()
            .insert(rubric_id.to_string(), score);
        Mutation::Applied
    }

    pub fn clear_score(&mut self, version_id: &str, model_id: &str, rubric_id: &str) -> Mutation {
        let Some(by_model) = self.ratings.get_mut(version_id) else {
            return Mutation::NotFound;
        };
        let Some(by_rubric) = by_model.get_mut(model_id) else {
            return Mutation::NotFound;
        };
        if by_rubric.remove(rubric_id).is_none() {
            return Mutation::NotFound;
        }
        if by_rubric.is_empty() {
            by_model.remove(model_id);
        }
        if by_model.is_empty() {
            self.ratings.remove(version_id);
        }
        Mutation::Applied
    }

    pub fn score(&self, version_id: &str, model_id: &str, rubric_id: &str) -> Option<f64> {
        self.ratings
            .get(version_id)?
            .get(model_id)?
            .get(rubric_id)
            .copied()
    }

    fn scores_for(&self, version_id: &str, keep: impl Fn(&str) -> bool) -> Vec<f64> {
        let Some(by_model) = self.ratings.get(version_id) else {
            return Vec::new();
        };
        by_model
            .values()
            .flat_map(|by_rubric| by_rubric.iter())
            .filter(|(rubric_id, _)| keep(rubric_id.as_str()))
            .map(|(_, score)| *score)
            .collect()
    }

    /// Mean of every score of the version, across models, for rubrics of the
    /// category (active or retired). `None` when nothing was scored.
    pub fn category_average(&self, version_id: &str, category_id: &str) -> Option<f64> {
        let rubric_ids: Vec<&str> = self
            .rubrics
            .iter()
            .chain(self.history_rubrics.iter())
            .filter(|r| r.category_id == category_id)
            .map(|r| r.id.as_str())
            .collect();
        mean(&self.scores_for(version_id, |id| rubric_ids.contains(&id)))
    }

    /// Mean of every score of the version across models and rubrics.
    pub fn overall_average(&self, version_id: &str) -> Option<f64> {
        mean(&self.scores_for(version_id, |_| true))
    }

    /// Mean score of one rubric for the version across models.
    pub fn rubric_average(&self, version_id: &str, rubric_id: &str) -> Option<f64> {
        mean(&self.scores_for(version_id, |id| id == rubric_id))
    }

    /// Categories in display order with the version's average for each.
    pub fn category_summary(&self, version_id: &str) -> Vec<(RatingCategory, Option<f64>)> {
        let mut categories = self.categories.clone();
        categories.sort_by_key(|c| c.order);
        categories
            .into_iter()
            .map(|c| {
                let avg = self.category_average(version_id, &c.id);
                (c, avg)
            })
            .collect()
    }

    /// Rubric ids scored for the version that should appear in a table:
    /// active rubrics in list order, then retired ones that carry scores.
    pub fn rubrics_for_display(&self, version_ids: &[&str]) -> Vec<String> {
        let scored = |rubric_id: &str| {
            version_ids
                .iter()
                .any(|v| self.rubric_average(v, rubric_id).is_some())
        };
        self.rubrics
            .iter()
            .map(|r| r.id.clone())
            .chain(
                self.history_rubrics
                    .iter()
                    .filter(|r| scored(&r.id))
                    .map(|r| r.id.clone()),
            )
            .collect()
    }

    pub fn forget_version(&mut self, version_id: &str) {
        self.ratings.remove(version_id);
    }

    /// Snapshots the current ratings and transcript for a test run.
    pub fn record_test_result(
        &mut self,
        version_id: &str,
        model_id: &str,
        messages: Vec<ModelMessage>,
    ) -> TestResult {
        let ratings = self
            .ratings
            .get(version_id)
            .and_then(|m| m.get(model_id))
            .cloned()
            .unwrap_or_default();
        let result = TestResult {
            id: new_id(),
            version_id: version_id.to_string(),
            model_id: model_id.to_string(),
            timestamp: now_rfc3339(),
            ratings,
            messages,
        };
        self.test_results.push(result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        book: RatingBook,
        quality: String,
        tone: String,
        accurate: String,
        concise: String,
        friendly: String,
    }

    fn fixture() -> Fixture {
        let mut book = RatingBook::new();
        let quality = book.add_category("Quality").id;
        let tone = book.add_category("Tone").id;
        let accurate = book.add_rubric(&quality, "Answers are accurate").unwrap().id;
        let concise = book.add_rubric(&quality, "Answers are concise").unwrap().id;
        let friendly = book.add_rubric(&tone, "Tone is friendly").unwrap().id;
        Fixture {
            book,
            quality,
            tone,
            accurate,
            concise,
            friendly,
        }
    }

    #[test]
    fn test_averages_are_none_without_scores() {
        let f = fixture();
        assert_eq!(f.book.category_average("v1", &f.quality), None);
        assert_eq!(f.book.overall_average("v1"), None);
        assert_eq!(f.book.rubric_average("v1", &f.accurate), None);
    }

    #[test]
    fn test_averages_only_use_qualifying_scores() {
        let mut f = fixture();
        let b = &mut f.book;
        assert!(b.set_score("v1", "gpt", &f.accurate, 4.0).is_applied());
        assert!(b.set_score("v1", "gemini", &f.concise, 3.0).is_applied());
        assert!(b.set_score("v1", "gpt", &f.friendly, 1.0).is_applied());
        // unrelated version
        assert!(b.set_score("v2", "gpt", &f.accurate, 0.0).is_applied());

        assert_eq!(b.category_average("v1", &f.quality), Some(3.5));
        assert_eq!(b.category_average("v1", &f.tone), Some(1.0));
        assert_eq!(b.overall_average("v1"), Some(8.0 / 3.0));
        assert_eq!(b.overall_average("v2"), Some(0.0));
    }

    #[test]
    fn test_zero_is_a_score_not_an_absence() {
        let mut f = fixture();
        assert!(f.book.set_score("v1", "gpt", &f.friendly, 0.0).is_applied());
        assert_eq!(f.book.category_average("v1", &f.tone), Some(0.0));
        assert!(f.book.clear_score("v1", "gpt", &f.friendly).is_applied());
        assert_eq!(f.book.category_average("v1", &f.tone), None);
        assert!(f.book.version_ratings().is_empty());
    }

    #[test]
    fn test_retiring_keeps_scores_and_marks_label() {
        let mut f = fixture();
        f.book.set_score("v1", "gpt", &f.accurate, 5.0);
        f.book.set_score("v1", "gpt", &f.friendly, 2.0);
        let overall_before = f.book.overall_average("v1");
        let category_before = f.book.category_average("v1", &f.quality);

        assert!(f.book.retire_rubric(&f.accurate).is_applied());
        assert_eq!(f.book.retire_rubric(&f.accurate), Mutation::NotFound);

        assert_eq!(f.book.overall_average("v1"), overall_before);
        assert_eq!(f.book.category_average("v1", &f.quality), category_before);
        assert_eq!(f.book.score("v1", "gpt", &f.accurate), Some(5.0));
        assert_eq!(
            f.book.rubric_display_label(&f.accurate),
            "Answers are accurate (deprecated)"
        );
        assert_eq!(f.book.rubric_display_label(&f.concise), "Answers are concise");
        assert_eq!(f.book.rubric_display_label("nope"), UNKNOWN_RUBRIC);
    }

    #[test]
    fn test_set_score_guards() {
        let mut f = fixture();
        assert_eq!(f.book.set_score("v1", "m", &f.accurate, 5.5), Mutation::Ignored);
        assert_eq!(f.book.set_score("v1", "m", &f.accurate, f64::NAN), Mutation::Ignored);
        assert_eq!(f.book.set_score("v1", "m", "ghost", 3.0), Mutation::NotFound);
        assert!(f.book.add_rubric("ghost-category", "x").is_none());
    }

    #[test]
    fn test_strict_leader() {
        assert_eq!(strict_leader(&[Some(4.0), Some(4.0)]), None);
        assert_eq!(strict_leader(&[Some(4.0), Some(3.0)]), Some(4.0));
        assert_eq!(strict_leader(&[Some(4.0), None]), Some(4.0));
        assert_eq!(strict_leader(&[Some(4.0), Some(4.0), Some(2.0)]), Some(4.0));
        assert_eq!(strict_leader(&[None, None]), None);
        assert_eq!(strict_leader(&[Some(3.0)]), None);
    }

    #[test]
    fn test_category_summary_follows_display_order() {
        let mut f = fixture();
        f.book.set_score("v1", "m", &f.friendly, 4.0);
        let summary = f.book.category_summary("v1");
        let names: Vec<_> = summary.iter().map(|(c, _)| c.name.as_str()).collect();
        assert_eq!(names, ["Quality", "Tone"]);
        assert_eq!(summary[0].1, None);
        assert_eq!(summary[1].1, Some(4.0));
        assert_eq!(f.book.find_category("Tone").map(|c| &c.id), Some(&f.tone));
    }

    #[test]
    fn test_test_results_snapshot_and_merge() {
        let mut f = fixture();
        f.book.set_score("v1", "gpt", &f.accurate, 3.0);
        let first = f.book.record_test_result("v1", "gpt", vec![]);
        f.book.set_score("v1", "gpt", &f.accurate, 5.0);
        f.book.record_test_result("v1", "gpt", vec![]);
        f.book.record_test_result("v1", "gemini", vec![]);

        assert_eq!(first.ratings.get(&f.accurate), Some(&3.0));
        let merged = merge_test_results(f.book.test_results());
        assert_eq!(merged.len(), 2);
        let gpt = merged.iter().find(|m| m.model_id == "gpt").unwrap();
        assert_eq!(gpt.runs, 2);
    }

    #[test]
    fn test_retired_rubrics_only_shown_when_scored() {
        let mut f = fixture();
        f.book.retire_rubric(&f.concise);
        f.book.retire_rubric(&f.friendly);
        f.book.set_score("v1", "m", &f.friendly, 2.0);
        let shown = f.book.rubrics_for_display(&["v1"]);
        assert_eq!(shown, vec![f.accurate.clone(), f.friendly.clone()]);
    }
}
