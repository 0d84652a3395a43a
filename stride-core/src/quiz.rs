//! Quiz scoring

use crate::{QuizQuestion, ValidationError};
use serde::{Deserialize, Serialize};

/// Pass mark as a fraction: 7 / 10.
pub const PASS_NUMERATOR: i32 = 7;
pub const PASS_DENOMINATOR: i32 = 10;

/// Result of scoring one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QuizScore {
    pub score: i32,
    pub total: i32,
    pub passed: bool,
}

/// `score / total >= 0.7`, compared in integers. An empty quiz never passes.
pub fn is_passing(score: i32, total: i32) -> bool {
    if total <= 0 {
        return false;
    }
    i64::from(score) * i64::from(PASS_DENOMINATOR) >= i64::from(total) * i64::from(PASS_NUMERATOR)
}

/// Score `answers` against `questions`.
///
/// There must be exactly one answer per question and every answer must
/// address an existing option of its question.
pub fn score_answers(
    questions: &[QuizQuestion],
    answers: &[i32],
) -> Result<QuizScore, ValidationError> {
    if answers.len() != questions.len() {
        return Err(ValidationError::AnswerCountMismatch {
            expected: questions.len(),
            got: answers.len(),
        });
    }
    let total = question_total(questions.len())?;

    let mut score = 0;
    for (index, (question, &selected)) in questions.iter().zip(answers).enumerate() {
        let in_range = usize::try_from(selected)
            .map(|s| s < question.options.len())
            .unwrap_or(false);
        if !in_range {
            return Err(ValidationError::AnswerOutOfRange {
                index,
                selected,
                options: question.options.len(),
            });
        }
        if selected == question.correct_index {
            score += 1;
        }
    }

    Ok(QuizScore {
        score,
        total,
        passed: is_passing(score, total),
    })
}

fn question_total(count: usize) -> Result<i32, ValidationError> {
    i32::try_from(count).map_err(|_| ValidationError::InvalidValue {
        field: "questions".to_string(),
        reason: format!("{} questions exceed the supported maximum", count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_total_refuses_oversized_quiz() {
        assert_eq!(question_total(5), Ok(5));
        assert_eq!(question_total(i32::MAX as usize), Ok(i32::MAX));
        let err = question_total(i32::MAX as usize + 1).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidValue { ref field, .. } if field == "questions"
        ));
    }

    fn quiz(correct: &[i32]) -> Vec<QuizQuestion> {
        correct
            .iter()
            .enumerate()
            .map(|(i, &correct_index)| QuizQuestion {
                prompt: format!("Question {}", i + 1),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_index,
            })
            .collect()
    }

    #[test]
    fn test_all_correct_passes() {
        let questions = quiz(&[0, 1, 2, 3, 0]);
        let result = score_answers(&questions, &[0, 1, 2, 3, 0]).unwrap();
        assert_eq!(
            result,
            QuizScore {
                score: 5,
                total: 5,
                passed: true
            }
        );
    }

    #[test]
    fn test_one_correct_fails() {
        let questions = quiz(&[0, 1, 2, 3, 0]);
        let result = score_answers(&questions, &[1, 1, 1, 1, 1]).unwrap();
        assert_eq!(result.score, 1);
        assert_eq!(result.total, 5);
        assert!(!result.passed);
    }

    #[test]
    fn test_pass_mark_is_seventy_percent() {
        assert!(is_passing(7, 10));
        assert!(!is_passing(6, 10));
        assert!(is_passing(4, 5)); // 80%
        assert!(!is_passing(3, 5)); // 60%
        assert!(!is_passing(0, 0));
    }

    #[test]
    fn test_answer_count_must_match() {
        let questions = quiz(&[0, 1]);
        let err = score_answers(&questions, &[0]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::AnswerCountMismatch {
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn test_answer_index_must_address_an_option() {
        let questions = quiz(&[0, 1]);
        assert!(matches!(
            score_answers(&questions, &[0, 4]),
            Err(ValidationError::AnswerOutOfRange { index: 1, selected: 4, .. })
        ));
        assert!(matches!(
            score_answers(&questions, &[-1, 1]),
            Err(ValidationError::AnswerOutOfRange { index: 0, .. })
        ));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_quiz() -> impl Strategy<Value = (Vec<QuizQuestion>, Vec<i32>)> {
        prop::collection::vec((2usize..6, any::<prop::sample::Index>(), any::<prop::sample::Index>()), 1..12)
            .prop_map(|specs| {
                let mut questions = Vec::new();
                let mut answers = Vec::new();
                for (options, correct, chosen) in specs {
                    questions.push(QuizQuestion {
                        prompt: "q".to_string(),
                        options: (0..options).map(|o| o.to_string()).collect(),
                        correct_index: correct.index(options) as i32,
                    });
                    answers.push(chosen.index(options) as i32);
                }
                (questions, answers)
            })
    }

    proptest! {
        #[test]
        fn prop_score_bounded_by_total((questions, answers) in arb_quiz()) {
            let result = score_answers(&questions, &answers).unwrap();
            prop_assert!(result.score >= 0);
            prop_assert!(result.score <= result.total);
            prop_assert_eq!(result.total as usize, questions.len());
        }

        #[test]
        fn prop_answering_correctly_always_passes((questions, _) in arb_quiz()) {
            let correct: Vec<i32> = questions.iter().map(|q| q.correct_index).collect();
            let result = score_answers(&questions, &correct).unwrap();
            prop_assert_eq!(result.score, result.total);
            prop_assert!(result.passed);
        }
    }
}
