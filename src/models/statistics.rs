//! Inference statistics produced by the benchmarker.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A normalized rate or score.
///
/// Undefined values (zero denominators, single-class inputs) are carried as
/// NaN. JSON has no NaN, so the value is written as `null` and `null` reads
/// back as NaN. Two NaN rates compare equal.
#[derive(Debug, Clone, Copy)]
pub struct Rate(pub f64);

impl Rate {
    /// The undefined sentinel.
    pub const UNDEFINED: Self = Self(f64::NAN);

    /// `numerator / denominator`, or the sentinel when the denominator is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(numerator: u64, denominator: u64) -> Self {
        if denominator == 0 {
            Self::UNDEFINED
        } else {
            Self(numerator as f64 / denominator as f64)
        }
    }

    /// Whether the value is the undefined sentinel.
    #[must_use]
    pub fn is_undefined(self) -> bool {
        self.0.is_nan()
    }

    /// Underlying float.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Rate {
    fn eq(&self, other: &Self) -> bool {
        (self.0.is_nan() && other.0.is_nan()) || self.0.to_bits() == other.0.to_bits()
    }
}

impl Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_finite() {
            serializer.serialize_some(&self.0)
        } else {
            serializer.serialize_none()
        }
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN)))
    }
}

/// A metric reported once for binary problems or per class otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reported<T> {
    /// Binary label space: the value for the positive class.
    Single(T),
    /// One-vs-rest values aligned to class order.
    PerClass(Vec<T>),
}

impl<T: Copy> Reported<T> {
    /// Values in class order; a binary metric yields one element.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        match self {
            Self::Single(value) => vec![*value],
            Self::PerClass(values) => values.clone(),
        }
    }
}

/// Statistics record for one dataset role of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Fraction of predictions equal to the true label.
    pub accuracy: Rate,
    /// Area under the ROC curve.
    pub roc_auc_score: Reported<Rate>,
    /// Area under the precision-recall curve (average precision).
    pub pr_auc_score: Reported<Rate>,
    /// F1 score.
    pub f_score: Reported<Rate>,
    /// True positive rate (sensitivity).
    #[serde(rename = "TPR")]
    pub tpr: Reported<Rate>,
    /// True negative rate (specificity).
    #[serde(rename = "TNR")]
    pub tnr: Reported<Rate>,
    /// Positive predictive value (precision).
    #[serde(rename = "PPV")]
    pub ppv: Reported<Rate>,
    /// Negative predictive value.
    #[serde(rename = "NPV")]
    pub npv: Reported<Rate>,
    /// False positive rate.
    #[serde(rename = "FPR")]
    pub fpr: Reported<Rate>,
    /// False negative rate.
    #[serde(rename = "FNR")]
    pub fnr: Reported<Rate>,
    /// False discovery rate.
    #[serde(rename = "FDR")]
    pub fdr: Reported<Rate>,
    /// True positive count.
    #[serde(rename = "TP")]
    pub tp: Reported<u64>,
    /// True negative count.
    #[serde(rename = "TN")]
    pub tn: Reported<u64>,
    /// False positive count.
    #[serde(rename = "FP")]
    pub fp: Reported<u64>,
    /// False negative count.
    #[serde(rename = "FN")]
    pub fn_: Reported<u64>,
}
