pub mod api;
pub mod models;
pub mod service;

pub use api::routes;
pub use models::{
    Eligibility, FeaturedReview, Review, ReviewAnswers, ReviewQuestion, ReviewValidationError,
    SubmitReviewRequest, ValidatedReview, QUESTIONS,
};
pub use service::ReviewService;
