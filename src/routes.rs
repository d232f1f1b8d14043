use axum::Router;

use crate::{auth, billing, packages, reviews};

pub async fn root() -> &'static str {
    "SignDesk API"
}

pub fn api_routes() -> Router {
    Router::new()
        .merge(auth::routes())
        .merge(billing::routes())
        .merge(packages::routes())
        .merge(reviews::routes())
}
