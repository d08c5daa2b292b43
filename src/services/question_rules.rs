use thiserror::Error;

use crate::db::types::QuestionKind;
use crate::repositories::questions::NewOption;

pub(crate) const MIN_POINTS: i32 = 1;
pub(crate) const MAX_POINTS: i32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum QuestionRuleError {
    #[error("question text must not be empty")]
    EmptyText,
    #[error("points must be between 1 and 100, got {0}")]
    PointsOutOfRange(i32),
    #[error("question must have at least one answer option")]
    NoOptions,
    #[error("answer option #{0} has empty text")]
    EmptyOptionText(usize),
    #[error("single choice question must have exactly one correct option, got {0}")]
    SingleNeedsExactlyOneCorrect(usize),
    #[error("multiple choice question must have at least one correct option")]
    MultipleNeedsCorrect,
}

/// Save-time checks. Grading relies on these having held when the question was stored.
pub(crate) fn validate_question(
    kind: QuestionKind,
    text: &str,
    points: i32,
    options: &[NewOption<'_>],
) -> Result<(), QuestionRuleError> {
    if text.trim().is_empty() {
        return Err(QuestionRuleError::EmptyText);
    }
    if !(MIN_POINTS..=MAX_POINTS).contains(&points) {
        return Err(QuestionRuleError::PointsOutOfRange(points));
    }
    if options.is_empty() {
        return Err(QuestionRuleError::NoOptions);
    }
    if let Some(position) = options.iter().position(|option| option.text.trim().is_empty()) {
        return Err(QuestionRuleError::EmptyOptionText(position + 1));
    }

    let correct = options.iter().filter(|option| option.is_correct).count();
    match kind {
        QuestionKind::Single if correct != 1 => {
            Err(QuestionRuleError::SingleNeedsExactlyOneCorrect(correct))
        }
        QuestionKind::Multiple if correct == 0 => Err(QuestionRuleError::MultipleNeedsCorrect),
        _ => Ok(()),
    }
}
