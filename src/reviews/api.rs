use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{Eligibility, FeaturedReview, Review, SubmitReviewRequest};
use super::service::{ReviewService, FEATURED_LIMIT};
use crate::error::AppResult;
use crate::extractor::AuthUser;

/// key: reviews-api -> public submission, owner listing
pub fn routes() -> Router {
    Router::new()
        .route("/api/reviews/featured", get(featured_reviews))
        .route(
            "/api/reviews/packages/:package_id/participant/:participant_id/review/eligibility",
            get(review_eligibility),
        )
        .route(
            "/api/reviews/packages/:package_id/participant/:participant_id/review",
            post(submit_review),
        )
        .route(
            "/api/reviews/packages/:package_id/reviews",
            get(package_reviews),
        )
}

pub async fn featured_reviews(
    Extension(pool): Extension<PgPool>,
) -> AppResult<Json<Vec<FeaturedReview>>> {
    let reviews = ReviewService::new(pool).featured(FEATURED_LIMIT).await?;
    Ok(Json(reviews))
}

pub async fn review_eligibility(
    Extension(pool): Extension<PgPool>,
    Path((package_id, participant_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Eligibility>> {
    let eligibility = ReviewService::new(pool)
        .eligibility(package_id, participant_id)
        .await?;
    Ok(Json(eligibility))
}

pub async fn submit_review(
    Extension(pool): Extension<PgPool>,
    Path((package_id, participant_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SubmitReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    let review = ReviewService::new(pool)
        .submit(package_id, participant_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn package_reviews(
    AuthUser { user_id }: AuthUser,
    Extension(pool): Extension<PgPool>,
    Path(package_id): Path<Uuid>,
) -> AppResult<Json<Vec<Review>>> {
    let reviews = ReviewService::new(pool)
        .list_for_package(user_id, package_id)
        .await?;
    Ok(Json(reviews))
}
