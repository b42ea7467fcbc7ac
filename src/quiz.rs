//! Test construction and scoring.
//!
//! Tests are plain data; totals and scores are computed by free functions.
//! Typed questions carry 0 marks when authored and only count toward a
//! score once the caller has marked the answer as validated.

use serde::{Deserialize, Serialize};

use crate::authoring::{AnswerType, QuestionSpec, TestSpec};
use crate::model::{Question, Test};

const DEFAULT_MCQ_MARKS: u32 = 1;

/// Builds a stored [`Test`] from its authoring spec. A fresh identifier is
/// assigned on every call.
pub fn build_test(spec: &TestSpec) -> Test {
    let questions: Vec<Question> = spec.questions.iter().map(normalize_question).collect();
    let mut test = Test {
        id: crate::new_id(),
        title: spec.title.clone(),
        time_limit: spec.time_limit,
        test_type: spec.test_type.clone(),
        questions,
        total_marks: 0,
    };
    test.total_marks = compute_total_marks(&test);
    test
}

fn normalize_question(spec: &QuestionSpec) -> Question {
    match spec.answer_type {
        AnswerType::MultipleChoice => Question::MultipleChoice {
            question: spec.question.clone(),
            options: spec.options.clone().unwrap_or_default(),
            correct_answer: spec.correct_answer.clone(),
            marks: spec.marks.unwrap_or(DEFAULT_MCQ_MARKS),
        },
        AnswerType::Typed => Question::Typed {
            question: spec.question.clone(),
            answer: spec.answer.clone().unwrap_or_default(),
            marks: 0,
        },
    }
}

pub fn compute_total_marks(test: &Test) -> u32 {
    test.questions.iter().map(Question::marks).sum()
}

/// One submitted answer. `validated` is attached by whoever reviews typed
/// answers; it is ignored for multiple-choice questions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRecord {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub validated: bool,
}

impl AnswerRecord {
    pub fn choice(answer: impl Into<String>) -> Self {
        Self {
            answer: Some(answer.into()),
            validated: false,
        }
    }
}

/// Scores `answers` against `test`, pairing them with questions by position.
/// Missing trailing answers score nothing.
pub fn score_submission(test: &Test, answers: &[AnswerRecord]) -> u32 {
    test.questions
        .iter()
        .zip(answers)
        .map(|(question, submitted)| match question {
            Question::MultipleChoice {
                correct_answer,
                marks,
                ..
            } => {
                let correct = correct_answer.is_some() && submitted.answer == *correct_answer;
                if correct { *marks } else { 0 }
            }
            Question::Typed { marks, .. } => {
                if submitted.validated { *marks } else { 0 }
            }
        })
        .sum()
}
