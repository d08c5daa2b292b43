use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{AnswerOption, Question};
use crate::db::types::QuestionKind;
use crate::repositories::questions::NewOption;

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct AnswerOptionInput {
    pub(crate) text: String,
    #[serde(default)]
    #[serde(alias = "isCorrect")]
    pub(crate) is_correct: bool,
}

/// Used for both create and update; an update replaces the whole option list.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionInput {
    #[validate(length(max = 10000, message = "text is too long"))]
    pub(crate) text: String,
    pub(crate) kind: QuestionKind,
    #[serde(default = "default_points")]
    pub(crate) points: i32,
    #[validate(length(max = 50, message = "a question can have at most 50 options"))]
    pub(crate) options: Vec<AnswerOptionInput>,
}

impl QuestionInput {
    pub(crate) fn new_options(&self) -> Vec<NewOption<'_>> {
        self.options
            .iter()
            .map(|option| NewOption { text: option.text.trim(), is_correct: option.is_correct })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerOptionResponse {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) is_correct: bool,
    pub(crate) order_index: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) text: String,
    pub(crate) kind: QuestionKind,
    pub(crate) points: i32,
    pub(crate) order_index: i32,
    pub(crate) options: Vec<AnswerOptionResponse>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl QuestionResponse {
    /// `options` may hold options of other questions; only this question's are kept.
    pub(crate) fn from_db(question: Question, options: &[AnswerOption]) -> Self {
        let mut own: Vec<AnswerOptionResponse> = options
            .iter()
            .filter(|option| option.question_id == question.id)
            .map(|option| AnswerOptionResponse {
                id: option.id.clone(),
                text: option.text.clone(),
                is_correct: option.is_correct,
                order_index: option.order_index,
            })
            .collect();
        own.sort_by_key(|option| option.order_index);

        Self {
            id: question.id,
            test_id: question.test_id,
            text: question.text,
            kind: question.kind,
            points: question.points,
            order_index: question.order_index,
            options: own,
            created_at: format_primitive(question.created_at),
            updated_at: format_primitive(question.updated_at),
        }
    }
}

fn default_points() -> i32 {
    1
}
