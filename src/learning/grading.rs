//! 测验评分

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use validator::Validate;

/// 存储在 quizzes.questions 中的题目（含答案）
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuizQuestion {
    #[validate(length(min = 1, max = 64, message = "题目 id 不能为空"))]
    pub id: String,
    #[validate(length(min = 1, max = 1000, message = "题干不能为空"))]
    pub text: String,
    #[validate(length(min = 2, message = "每道题至少需要两个选项"))]
    pub options: Vec<String>,
    pub correct_answers: Vec<usize>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[validate(range(min = 1, message = "题目分值至少为 1"))]
    pub points: i64,
}

/// 发给学生的题目，不含答案
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub multiple: bool,
    pub points: i64,
}

impl From<&QuizQuestion> for PublicQuestion {
    fn from(q: &QuizQuestion) -> Self {
        Self {
            id: q.id.clone(),
            text: q.text.clone(),
            options: q.options.clone(),
            multiple: q.correct_answers.len() > 1,
            points: q.points,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub question_id: String,
    pub is_correct: bool,
    pub points_earned: i64,
    pub correct_answers: Vec<usize>,
    pub user_answers: Vec<usize>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeOutcome {
    pub score: i64,
    pub max_score: i64,
    pub percentage: f64,
    pub passed: bool,
    pub breakdown: Vec<AnswerResult>,
}

impl GradeOutcome {
    pub fn is_perfect(&self) -> bool {
        self.max_score > 0 && self.score == self.max_score
    }
}

/// 检查题目集合的结构性约束
pub fn validate_questions(questions: &[QuizQuestion]) -> Result<(), String> {
    if questions.is_empty() {
        return Err("测验至少需要一道题".to_string());
    }

    let mut seen = BTreeSet::new();
    for question in questions {
        question
            .validate()
            .map_err(|e| format!("题目 {} 无效: {}", question.id, e))?;

        if !seen.insert(question.id.as_str()) {
            return Err(format!("题目 id 重复: {}", question.id));
        }
        if question.correct_answers.is_empty() {
            return Err(format!("题目 {} 没有正确答案", question.id));
        }
        if let Some(bad) = question
            .correct_answers
            .iter()
            .find(|&&idx| idx >= question.options.len())
        {
            return Err(format!("题目 {} 的答案 {} 超出选项范围", question.id, bad));
        }
    }
    Ok(())
}

/// 按题评分：所选选项集合与正确答案集合完全一致才得分，顺序和重复不影响
pub fn grade(
    questions: &[QuizQuestion],
    answers: &HashMap<String, Vec<usize>>,
    passing_score: i64,
) -> GradeOutcome {
    let mut score = 0;
    let mut max_score = 0;
    let mut breakdown = Vec::with_capacity(questions.len());

    for question in questions {
        max_score += question.points;

        let user_answers = answers.get(&question.id).cloned().unwrap_or_default();
        let chosen: BTreeSet<usize> = user_answers.iter().copied().collect();
        let expected: BTreeSet<usize> = question.correct_answers.iter().copied().collect();

        let is_correct = !chosen.is_empty() && chosen == expected;
        let points_earned = if is_correct { question.points } else { 0 };
        score += points_earned;

        breakdown.push(AnswerResult {
            question_id: question.id.clone(),
            is_correct,
            points_earned,
            correct_answers: question.correct_answers.clone(),
            user_answers,
            explanation: question.explanation.clone(),
        });
    }

    let percentage = if max_score > 0 {
        score as f64 * 100.0 / max_score as f64
    } else {
        0.0
    };

    GradeOutcome {
        score,
        max_score,
        percentage,
        passed: max_score > 0 && percentage >= passing_score as f64,
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, correct: Vec<usize>, points: i64) -> QuizQuestion {
        QuizQuestion {
            id: id.to_string(),
            text: format!("question {id}"),
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_answers: correct,
            explanation: None,
            points,
        }
    }

    fn answers(pairs: &[(&str, Vec<usize>)]) -> HashMap<String, Vec<usize>> {
        pairs
            .iter()
            .map(|(id, a)| (id.to_string(), a.clone()))
            .collect()
    }

    #[test]
    fn full_marks_pass() {
        let questions = vec![question("q1", vec![1], 1), question("q2", vec![0, 2], 2)];
        let outcome = grade(
            &questions,
            &answers(&[("q1", vec![1]), ("q2", vec![2, 0])]),
            70,
        );
        assert_eq!(outcome.score, 3);
        assert_eq!(outcome.max_score, 3);
        assert!(outcome.passed);
        assert!(outcome.is_perfect());
    }

    #[test]
    fn partial_multi_select_earns_nothing() {
        let questions = vec![question("q1", vec![0, 2], 2)];
        let outcome = grade(&questions, &answers(&[("q1", vec![0])]), 50);
        assert_eq!(outcome.score, 0);
        assert!(!outcome.passed);
        assert!(!outcome.breakdown[0].is_correct);
    }

    #[test]
    fn duplicate_choices_are_ignored() {
        let questions = vec![question("q1", vec![1], 1)];
        let outcome = grade(&questions, &answers(&[("q1", vec![1, 1])]), 100);
        assert!(outcome.passed);
    }

    #[test]
    fn unanswered_question_is_wrong() {
        let questions = vec![question("q1", vec![1], 1), question("q2", vec![0], 3)];
        let outcome = grade(&questions, &answers(&[("q1", vec![1])]), 50);
        assert_eq!(outcome.score, 1);
        assert_eq!(outcome.percentage, 25.0);
        assert!(!outcome.passed);
        assert!(outcome.breakdown[1].user_answers.is_empty());
    }

    #[test]
    fn passing_score_is_inclusive() {
        let questions = vec![question("q1", vec![0], 1), question("q2", vec![0], 1)];
        let outcome = grade(&questions, &answers(&[("q1", vec![0])]), 50);
        assert_eq!(outcome.percentage, 50.0);
        assert!(outcome.passed);
    }

    #[test]
    fn public_question_hides_answers() {
        let q = question("q1", vec![0, 1], 2);
        let public = PublicQuestion::from(&q);
        assert!(public.multiple);
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("correct_answers"));
    }

    #[test]
    fn rejects_out_of_range_answer() {
        let err = validate_questions(&[question("q1", vec![3], 1)]).unwrap_err();
        assert!(err.contains("q1"));
    }

    #[test]
    fn rejects_empty_and_duplicate_sets() {
        assert!(validate_questions(&[]).is_err());
        assert!(validate_questions(&[question("q1", vec![], 1)]).is_err());
        assert!(
            validate_questions(&[question("q1", vec![0], 1), question("q1", vec![1], 1)]).is_err()
        );
    }

    #[test]
    fn rejects_single_option_question() {
        let mut q = question("q1", vec![0], 1);
        q.options.truncate(1);
        assert!(validate_questions(&[q]).is_err());
    }
}
