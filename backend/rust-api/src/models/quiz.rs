use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::bson_datetime_as_chrono;

/// One of the four multiple-choice options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
}

impl AnswerOption {
    /// Strict parse: only the exact upper-case letters are accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "A" => Some(AnswerOption::A),
            "B" => Some(AnswerOption::B),
            "C" => Some(AnswerOption::C),
            "D" => Some(AnswerOption::D),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerOption::A => "A",
            AnswerOption::B => "B",
            AnswerOption::C => "C",
            AnswerOption::D => "D",
        }
    }
}

/// Daily quiz stored in MongoDB "daily_quizzes" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: String,

    /// One active quiz per civil date
    pub quiz_date: NaiveDate,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Entry fee in rupees with paise precision
    pub entry_fee: f64,

    #[serde(default)]
    pub prize_pool: f64,

    /// Local civil time ("HH:MM" or "HH:MM:SS") after which results are published
    pub results_time: String,

    pub is_active: bool,

    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl Quiz {
    pub fn parsed_results_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.results_time, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&self.results_time, "%H:%M"))
            .ok()
    }

    /// Entry fee in the gateway's minor currency unit (paise).
    pub fn entry_fee_minor(&self) -> Option<i64> {
        let minor = (self.entry_fee * 100.0).round();
        (minor.is_finite() && minor > 0.0 && minor <= i64::MAX as f64).then_some(minor as i64)
    }
}

/// Question stored in MongoDB "quiz_questions" collection.
/// `correct_option` is the answer key and never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    pub question_order: i32,
    pub question_text: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_option: AnswerOption,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOptions {
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
}

/// Player-facing question without the correct option
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub position: i32,
    pub question_text: String,
    pub options: QuestionOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl From<Question> for QuestionView {
    fn from(question: Question) -> Self {
        QuestionView {
            id: question.id,
            position: question.question_order,
            question_text: question.question_text,
            options: QuestionOptions {
                a: question.option_a,
                b: question.option_b,
                c: question.option_c,
                d: question.option_d,
            },
            category: question.category,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: String,
    pub quiz_date: NaiveDate,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub entry_fee: f64,
    pub prize_pool: f64,
    pub results_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_published_at: Option<DateTime<FixedOffset>>,
}

/// Where a player stands for one quiz: not paid, paid but not played, or done.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participation {
    pub quiz_id: String,
    pub has_paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub has_submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(entry_fee: f64, results_time: &str) -> Quiz {
        Quiz {
            id: "quiz-1".to_string(),
            quiz_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            title: "Daily".to_string(),
            description: None,
            entry_fee,
            prize_pool: 1000.0,
            results_time: results_time.to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_answer_option_parse_is_strict() {
        assert_eq!(AnswerOption::parse("A"), Some(AnswerOption::A));
        assert_eq!(AnswerOption::parse("D"), Some(AnswerOption::D));
        assert_eq!(AnswerOption::parse("a"), None);
        assert_eq!(AnswerOption::parse("E"), None);
        assert_eq!(AnswerOption::parse(" A"), None);
    }

    #[test]
    fn test_entry_fee_minor_rounds_to_paise() {
        assert_eq!(quiz(49.0, "21:00").entry_fee_minor(), Some(4900));
        assert_eq!(quiz(19.99, "21:00").entry_fee_minor(), Some(1999));
        assert_eq!(quiz(0.0, "21:00").entry_fee_minor(), None);
        assert_eq!(quiz(-10.0, "21:00").entry_fee_minor(), None);
    }

    #[test]
    fn test_results_time_accepts_optional_seconds() {
        let expected = NaiveTime::from_hms_opt(21, 0, 0).unwrap();
        assert_eq!(quiz(10.0, "21:00:00").parsed_results_time(), Some(expected));
        assert_eq!(quiz(10.0, "21:00").parsed_results_time(), Some(expected));
        assert_eq!(quiz(10.0, "nine pm").parsed_results_time(), None);
    }

    #[test]
    fn test_question_view_hides_answer_key() {
        let view = QuestionView::from(Question {
            id: "q1".to_string(),
            quiz_id: "quiz-1".to_string(),
            question_order: 1,
            question_text: "2 + 2?".to_string(),
            option_a: "3".to_string(),
            option_b: "4".to_string(),
            option_c: "5".to_string(),
            option_d: "22".to_string(),
            correct_option: AnswerOption::B,
            category: Some("math".to_string()),
        });
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("correctOption").is_none());
        assert!(json.get("correct_option").is_none());
        assert_eq!(json["options"]["b"], "4");
    }
}
