use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{error, info};
use uuid::Uuid;

use super::models::{
    first_name, Eligibility, FeaturedReview, Review, ReviewAnswers, SubmitReviewRequest,
    QUESTIONS,
};
use crate::error::{AppError, AppResult};
use crate::packages::{self, ParticipantRole};

const REVIEW_UNIQUE_CONSTRAINT: &str = "reviews_package_reviewer_email_key";
pub const FEATURED_MIN_AVERAGE: f64 = 4.0;
pub const FEATURED_LIMIT: i64 = 6;

/// key: reviews-service -> one review per package participant
#[derive(Clone)]
pub struct ReviewService {
    pool: PgPool,
}

fn review_from_row(row: &PgRow) -> Review {
    let role: String = row.get("reviewer_role");
    Review {
        id: row.get("id"),
        package_id: row.get("package_id"),
        owner_id: row.get("owner_id"),
        reviewer_id: row.get("reviewer_id"),
        reviewer_email: row.get("reviewer_email"),
        reviewer_name: row.get("reviewer_name"),
        reviewer_role: ParticipantRole::parse(&role),
        answers: ReviewAnswers {
            ease_of_use: i64::from(row.get::<i16, _>("ease_of_use")),
            clarity: i64::from(row.get::<i16, _>("clarity")),
            speed: i64::from(row.get::<i16, _>("speed")),
            overall: i64::from(row.get::<i16, _>("overall")),
        },
        average_rating: row.get("average_rating"),
        comment: row.get("comment"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl ReviewService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn review_exists(&self, package_id: Uuid, email: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE package_id = $1 AND reviewer_email = $2)",
        )
        .bind(package_id)
        .bind(email.to_lowercase())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn eligibility(
        &self,
        package_id: Uuid,
        participant_id: Uuid,
    ) -> AppResult<Eligibility> {
        let (participant, _) = packages::find_participant(&self.pool, package_id, participant_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let already_reviewed = self.review_exists(package_id, &participant.email).await?;
        Ok(Eligibility {
            eligible: !already_reviewed,
            already_reviewed,
            questions: &QUESTIONS,
        })
    }

    pub async fn submit(
        &self,
        package_id: Uuid,
        participant_id: Uuid,
        request: SubmitReviewRequest,
    ) -> AppResult<Review> {
        let review = request
            .validate()
            .map_err(|err| AppError::BadRequest(err.to_string()))?;

        let (participant, owner_id) =
            packages::find_participant(&self.pool, package_id, participant_id)
                .await?
                .ok_or(AppError::NotFound)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO reviews (
                id,
                package_id,
                owner_id,
                reviewer_id,
                reviewer_email,
                reviewer_name,
                reviewer_role,
                ease_of_use,
                clarity,
                speed,
                overall,
                average_rating,
                comment
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(package_id)
        .bind(owner_id)
        .bind(participant.id)
        .bind(participant.email.to_lowercase())
        .bind(participant.name.as_deref())
        .bind(participant.role.as_str())
        .bind(review.answers.ease_of_use as i16)
        .bind(review.answers.clarity as i16)
        .bind(review.answers.speed as i16)
        .bind(review.answers.overall as i16)
        .bind(review.average_rating)
        .bind(review.comment.as_deref())
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(row) => {
                let review = review_from_row(&row);
                info!(
                    package = %package_id,
                    reviewer = %participant.id,
                    average = review.average_rating,
                    "review submitted"
                );
                Ok(review)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some(REVIEW_UNIQUE_CONSTRAINT) =>
            {
                Err(AppError::Conflict(
                    "A review was already submitted for this package".into(),
                ))
            }
            Err(e) => {
                error!(?e, "DB error inserting review");
                Err(AppError::Db(e))
            }
        }
    }

    /// All reviews of a package, visible to the package owner only.
    pub async fn list_for_package(
        &self,
        user_id: i32,
        package_id: Uuid,
    ) -> AppResult<Vec<Review>> {
        let owner_id: Option<i32> =
            sqlx::query_scalar("SELECT owner_id FROM packages WHERE id = $1")
                .bind(package_id)
                .fetch_optional(&self.pool)
                .await?;
        match owner_id {
            None => return Err(AppError::NotFound),
            Some(owner_id) if owner_id != user_id => return Err(AppError::Forbidden),
            Some(_) => {}
        }
        let rows =
            sqlx::query("SELECT * FROM reviews WHERE package_id = $1 ORDER BY created_at DESC")
                .bind(package_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(review_from_row).collect())
    }

    pub async fn featured(&self, limit: i64) -> AppResult<Vec<FeaturedReview>> {
        let rows = sqlx::query(
            r#"
            SELECT reviewer_name, reviewer_role, average_rating, comment, created_at
            FROM reviews
            WHERE average_rating >= $1 AND comment IS NOT NULL
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(FEATURED_MIN_AVERAGE)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let name: Option<String> = row.get("reviewer_name");
                let role: String = row.get("reviewer_role");
                FeaturedReview {
                    reviewer_name: name.as_deref().and_then(first_name),
                    reviewer_role: ParticipantRole::parse(&role),
                    average_rating: row.get("average_rating"),
                    comment: row.get("comment"),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }
}
