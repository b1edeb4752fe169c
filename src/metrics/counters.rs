//! Counter metrics

use super::names;
use crate::error::DialErrorKind;

/// Label for an attempt outcome
pub fn outcome_label(failure: Option<DialErrorKind>) -> &'static str {
    match failure {
        None => "success",
        Some(kind) => kind.as_str(),
    }
}

/// Record a completed dial attempt
pub fn dial_completed(failure: Option<DialErrorKind>) {
    metrics::counter!(names::DIALS_TOTAL, "outcome" => outcome_label(failure)).increment(1);
}
