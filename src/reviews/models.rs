use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::packages::ParticipantRole;

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;
pub const MAX_COMMENT_CHARS: usize = 2000;

/// key: reviews-questions -> standard rating prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewQuestion {
    pub id: &'static str,
    pub label: &'static str,
    pub min: i64,
    pub max: i64,
}

pub const QUESTIONS: [ReviewQuestion; 4] = [
    ReviewQuestion {
        id: "easeOfUse",
        label: "How easy was it to complete the signing process?",
        min: MIN_RATING,
        max: MAX_RATING,
    },
    ReviewQuestion {
        id: "clarity",
        label: "How clear were the documents and instructions?",
        min: MIN_RATING,
        max: MAX_RATING,
    },
    ReviewQuestion {
        id: "speed",
        label: "How satisfied were you with the speed of the process?",
        min: MIN_RATING,
        max: MAX_RATING,
    },
    ReviewQuestion {
        id: "overall",
        label: "How would you rate your overall experience?",
        min: MIN_RATING,
        max: MAX_RATING,
    },
];

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAnswers {
    pub ease_of_use: i64,
    pub clarity: i64,
    pub speed: i64,
    pub overall: i64,
}

impl ReviewAnswers {
    fn entries(&self) -> [(&'static str, i64); 4] {
        [
            ("easeOfUse", self.ease_of_use),
            ("clarity", self.clarity),
            ("speed", self.speed),
            ("overall", self.overall),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReviewRequest {
    pub answers: ReviewAnswers,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReviewValidationError {
    #[error("rating for `{question}` must be between 1 and 5, got {value}")]
    RatingOutOfRange { question: &'static str, value: i64 },
    #[error("comment must be at most 2000 characters, got {len}")]
    CommentTooLong { len: usize },
}

/// A submission that passed validation, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReview {
    pub answers: ReviewAnswers,
    pub average_rating: f64,
    pub comment: Option<String>,
}

impl SubmitReviewRequest {
    pub fn validate(self) -> Result<ValidatedReview, ReviewValidationError> {
        let entries = self.answers.entries();
        for (question, value) in entries {
            if !(MIN_RATING..=MAX_RATING).contains(&value) {
                return Err(ReviewValidationError::RatingOutOfRange { question, value });
            }
        }

        let comment = self
            .comment
            .map(|comment| comment.trim().to_string())
            .filter(|comment| !comment.is_empty());
        if let Some(comment) = &comment {
            let len = comment.chars().count();
            if len > MAX_COMMENT_CHARS {
                return Err(ReviewValidationError::CommentTooLong { len });
            }
        }

        let total: i64 = entries.iter().map(|(_, value)| value).sum();
        let average = total as f64 / entries.len() as f64;
        Ok(ValidatedReview {
            answers: self.answers,
            average_rating: (average * 100.0).round() / 100.0,
            comment,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub eligible: bool,
    pub already_reviewed: bool,
    pub questions: &'static [ReviewQuestion],
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub package_id: Uuid,
    pub owner_id: i32,
    pub reviewer_id: Uuid,
    pub reviewer_email: String,
    pub reviewer_name: Option<String>,
    pub reviewer_role: ParticipantRole,
    pub answers: ReviewAnswers,
    pub average_rating: f64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public projection shown on the marketing site.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedReview {
    pub reviewer_name: Option<String>,
    pub reviewer_role: ParticipantRole,
    pub average_rating: f64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// First word of a display name, so full names never reach public pages.
pub fn first_name(name: &str) -> Option<String> {
    name.split_whitespace().next().map(str::to_string)
}
