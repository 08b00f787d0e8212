//! Benchmarker: statistics from true labels, predicted labels and scores.
//!
//! Score rows of width 1 describe a binary problem: classes are `{0, 1}`,
//! the positive class is 1 and every metric is reported once. Wider rows
//! describe `k` classes; labels are expanded one-vs-rest and every metric
//! is reported per class in class order.
//!
//! Degenerate inputs never fail: a zero denominator, or a class with no
//! positive or no negative examples, yields [`Rate::UNDEFINED`].

use crate::models::statistics::{Rate, Reported, Statistics};
use crate::{AppError, Result};

/// Convert label rows into class indices.
///
/// A single-value row is a class index; a wider row is one-hot or a score
/// vector and resolves to its first maximum.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` for an empty row or a single value
/// that is not a non-negative integer.
pub fn to_class_indices(rows: &[Vec<f64>]) -> Result<Vec<usize>> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| row_class(index, row))
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_class(index: usize, row: &[f64]) -> Result<usize> {
    match row {
        [] => Err(AppError::InvalidInput(format!("label row {index} is empty"))),
        [value] => {
            if !value.is_finite() || *value < 0.0 || value.fract().abs() > 0.0 {
                return Err(AppError::InvalidInput(format!(
                    "label row {index} holds {value}, expected a class index"
                )));
            }
            Ok(*value as usize)
        }
        _ => {
            let mut best = 0;
            for (column, value) in row.iter().enumerate().skip(1) {
                if value.total_cmp(&row[best]).is_gt() {
                    best = column;
                }
            }
            Ok(best)
        }
    }
}

/// Confusion counts and ranking scores for one class against the rest.
#[derive(Debug, Clone, Copy)]
#[allow(clippy::struct_field_names)]
struct ClassCounts {
    tp: u64,
    tn: u64,
    fp: u64,
    fn_: u64,
    roc_auc: Rate,
    pr_auc: Rate,
}

#[allow(clippy::similar_names)]
impl ClassCounts {
    fn tpr(&self) -> Rate {
        Rate::ratio(self.tp, self.tp + self.fn_)
    }

    fn tnr(&self) -> Rate {
        Rate::ratio(self.tn, self.tn + self.fp)
    }

    fn ppv(&self) -> Rate {
        Rate::ratio(self.tp, self.tp + self.fp)
    }

    fn npv(&self) -> Rate {
        Rate::ratio(self.tn, self.tn + self.fn_)
    }

    fn fpr(&self) -> Rate {
        Rate::ratio(self.fp, self.fp + self.tn)
    }

    fn fnr(&self) -> Rate {
        Rate::ratio(self.fn_, self.fn_ + self.tp)
    }

    fn fdr(&self) -> Rate {
        Rate::ratio(self.fp, self.fp + self.tp)
    }

    fn f_score(&self) -> Rate {
        Rate::ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }
}

/// Validated inputs for one statistics computation.
#[derive(Debug, Clone)]
pub struct Benchmarker {
    y_true: Vec<usize>,
    y_pred: Vec<usize>,
    y_score: Vec<Vec<f64>>,
    width: usize,
    classes: usize,
}

impl Benchmarker {
    /// Validate labels, predictions and score rows.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if the inputs are empty, their
    /// lengths differ, score rows have inconsistent widths, or a label
    /// falls outside the class space implied by the score width.
    pub fn new(y_true: Vec<usize>, y_pred: Vec<usize>, y_score: Vec<Vec<f64>>) -> Result<Self> {
        let samples = y_true.len();
        if samples == 0 {
            return Err(AppError::InvalidInput("no labels to benchmark".into()));
        }
        if y_pred.len() != samples || y_score.len() != samples {
            return Err(AppError::InvalidInput(format!(
                "length mismatch: {samples} labels, {} predictions, {} scores",
                y_pred.len(),
                y_score.len()
            )));
        }

        let width = y_score.first().map_or(0, Vec::len);
        if width == 0 {
            return Err(AppError::InvalidInput("score rows are empty".into()));
        }
        if let Some(index) = y_score.iter().position(|row| row.len() != width) {
            return Err(AppError::InvalidInput(format!(
                "score row {index} has width {}, expected {width}",
                y_score[index].len()
            )));
        }

        let classes = if width == 1 { 2 } else { width };
        if let Some(label) = y_true.iter().chain(&y_pred).find(|label| **label >= classes) {
            return Err(AppError::InvalidInput(format!(
                "class {label} outside label space of {classes} classes"
            )));
        }

        Ok(Self {
            y_true,
            y_pred,
            y_score,
            width,
            classes,
        })
    }

    /// Number of classes in the label space.
    #[must_use]
    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Whether the problem is binary (score width 1).
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.width == 1
    }

    /// Compute the statistics record.
    #[must_use]
    pub fn calculate_stats(&self) -> Statistics {
        let correct = self
            .y_true
            .iter()
            .zip(&self.y_pred)
            .filter(|(truth, pred)| truth == pred)
            .count();
        let accuracy = Rate::ratio(correct as u64, self.y_true.len() as u64);

        let per_class: Vec<ClassCounts> = if self.is_binary() {
            vec![self.class_counts(1, 0)]
        } else {
            (0..self.classes).map(|class| self.class_counts(class, class)).collect()
        };

        let binary = self.is_binary();
        let report = |metric: fn(&ClassCounts) -> Rate| -> Reported<Rate> {
            if binary {
                Reported::Single(metric(&per_class[0]))
            } else {
                Reported::PerClass(per_class.iter().map(metric).collect())
            }
        };
        let count = |metric: fn(&ClassCounts) -> u64| -> Reported<u64> {
            if binary {
                Reported::Single(metric(&per_class[0]))
            } else {
                Reported::PerClass(per_class.iter().map(metric).collect())
            }
        };

        Statistics {
            accuracy,
            roc_auc_score: report(|c| c.roc_auc),
            pr_auc_score: report(|c| c.pr_auc),
            f_score: report(ClassCounts::f_score),
            tpr: report(ClassCounts::tpr),
            tnr: report(ClassCounts::tnr),
            ppv: report(ClassCounts::ppv),
            npv: report(ClassCounts::npv),
            fpr: report(ClassCounts::fpr),
            fnr: report(ClassCounts::fnr),
            fdr: report(ClassCounts::fdr),
            tp: count(|c| c.tp),
            tn: count(|c| c.tn),
            fp: count(|c| c.fp),
            fn_: count(|c| c.fn_),
        }
    }

    #[allow(clippy::similar_names)]
    fn class_counts(&self, class: usize, column: usize) -> ClassCounts {
        let mut counts = ClassCounts {
            tp: 0,
            tn: 0,
            fp: 0,
            fn_: 0,
            roc_auc: Rate::UNDEFINED,
            pr_auc: Rate::UNDEFINED,
        };

        let mut truth = Vec::with_capacity(self.y_true.len());
        for (actual, predicted) in self.y_true.iter().zip(&self.y_pred) {
            let is_positive = *actual == class;
            match (is_positive, *predicted == class) {
                (true, true) => counts.tp += 1,
                (false, false) => counts.tn += 1,
                (false, true) => counts.fp += 1,
                (true, false) => counts.fn_ += 1,
            }
            truth.push(is_positive);
        }

        let scores: Vec<f64> = self.y_score.iter().map(|row| row[column]).collect();
        counts.roc_auc = roc_auc(&truth, &scores);
        counts.pr_auc = average_precision(&truth, &scores);
        counts
    }
}

/// Area under the ROC curve from the rank statistic, averaging tied ranks.
#[allow(clippy::cast_precision_loss)]
fn roc_auc(truth: &[bool], scores: &[f64]) -> Rate {
    let positives = truth.iter().filter(|t| **t).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return Rate::UNDEFINED;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]].total_cmp(&scores[order[start]]).is_eq() {
            end += 1;
        }
        // Ranks start+1..=end share their mean.
        let mean_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| truth[i]).count();
        positive_rank_sum += mean_rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Rate((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Average precision: precision at each distinct threshold weighted by the
/// recall gained there.
#[allow(clippy::cast_precision_loss)]
fn average_precision(truth: &[bool], scores: &[f64]) -> Rate {
    let positives = truth.iter().filter(|t| **t).count();
    if positives == 0 {
        return Rate::UNDEFINED;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut true_hits = 0usize;
    let mut false_hits = 0usize;
    let mut previous_recall = 0.0;
    let mut precision_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end < order.len() && scores[order[end]].total_cmp(&scores[order[start]]).is_eq() {
            if truth[order[end]] {
                true_hits += 1;
            } else {
                false_hits += 1;
            }
            end += 1;
        }
        let precision = true_hits as f64 / (true_hits + false_hits) as f64;
        let recall = true_hits as f64 / positives as f64;
        precision_sum += (recall - previous_recall) * precision;
        previous_recall = recall;
        start = end;
    }

    Rate(precision_sum)
}
