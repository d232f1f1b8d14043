use axum::extract::{Path, Query};
use axum::{
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{Executor, PgPool, Postgres, Row};
use uuid::Uuid;

use crate::auth::normalize_email;
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;

const PARTICIPANT_UNIQUE_CONSTRAINT: &str = "package_participants_package_email_key";

/// key: packages-status -> document package lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Draft,
    Pending,
    Finished,
    Rejected,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Draft => "draft",
            PackageStatus::Pending => "pending",
            PackageStatus::Finished => "finished",
            PackageStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PackageStatus::Draft),
            "pending" => Some(PackageStatus::Pending),
            "finished" => Some(PackageStatus::Finished),
            "rejected" => Some(PackageStatus::Rejected),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: PackageStatus) -> bool {
        matches!(
            (self, next),
            (PackageStatus::Draft, PackageStatus::Pending)
                | (PackageStatus::Pending, PackageStatus::Finished)
                | (PackageStatus::Pending, PackageStatus::Rejected)
        )
    }
}

/// Role of a package participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Signer,
    Reviewer,
    Approver,
    Viewer,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Signer => "signer",
            ParticipantRole::Reviewer => "reviewer",
            ParticipantRole::Approver => "approver",
            ParticipantRole::Viewer => "viewer",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "reviewer" => ParticipantRole::Reviewer,
            "approver" => ParticipantRole::Approver,
            "viewer" => ParticipantRole::Viewer,
            _ => ParticipantRole::Signer,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub package_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: ParticipantRole,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: Uuid,
    pub owner_id: i32,
    pub title: String,
    pub status: PackageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Deserialize)]
pub struct NewParticipant {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<ParticipantRole>,
}

#[derive(Debug, Deserialize)]
pub struct NewPackage {
    pub title: String,
    #[serde(default)]
    pub participants: Vec<NewParticipant>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: PackageStatus,
}

#[derive(Debug, Deserialize)]
pub struct PackageFilter {
    #[serde(default)]
    pub status: Option<PackageStatus>,
}

pub fn routes() -> Router {
    Router::new()
        .route("/api/packages", get(list_packages).post(create_package))
        .route("/api/packages/:id", get(get_package))
        .route("/api/packages/:id/participants", post(add_participant))
        .route("/api/packages/:id/status", post(update_status))
}

fn package_from_row(row: &PgRow) -> AppResult<Package> {
    let status: String = row.get("status");
    let status = PackageStatus::parse(&status)
        .ok_or_else(|| AppError::Message(format!("unknown package status `{status}`")))?;
    Ok(Package {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        participants: Vec::new(),
    })
}

fn participant_from_row(row: &PgRow) -> Participant {
    let role: String = row.get("role");
    Participant {
        id: row.get("id"),
        package_id: row.get("package_id"),
        email: row.get("email"),
        name: row.get("name"),
        role: ParticipantRole::parse(&role),
    }
}

fn validate_participant(participant: &NewParticipant) -> AppResult<String> {
    let email = normalize_email(&participant.email);
    if !email.contains('@') {
        return Err(AppError::BadRequest("Participant email required".into()));
    }
    Ok(email)
}

async fn insert_participant<'e, E>(
    executor: E,
    package_id: Uuid,
    participant: NewParticipant,
) -> AppResult<Participant>
where
    E: Executor<'e, Database = Postgres>,
{
    let email = validate_participant(&participant)?;
    let role = participant.role.unwrap_or(ParticipantRole::Signer);
    let result = sqlx::query(
        "INSERT INTO package_participants (id, package_id, email, name, role) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id, package_id, email, name, role",
    )
    .bind(Uuid::new_v4())
    .bind(package_id)
    .bind(&email)
    .bind(participant.name.as_deref())
    .bind(role.as_str())
    .fetch_one(executor)
    .await;
    match result {
        Ok(row) => Ok(participant_from_row(&row)),
        Err(sqlx::Error::Database(db_err))
            if db_err.constraint() == Some(PARTICIPANT_UNIQUE_CONSTRAINT) =>
        {
            Err(AppError::Conflict(format!(
                "{email} is already a participant of this package"
            )))
        }
        Err(e) => {
            tracing::error!(?e, "DB error adding participant");
            Err(AppError::Db(e))
        }
    }
}

/// Loads a package and its participants, enforcing that `user_id` owns it.
pub async fn load_owned_package(
    pool: &PgPool,
    user_id: i32,
    package_id: Uuid,
) -> AppResult<Package> {
    let row = sqlx::query(
        "SELECT id, owner_id, title, status, created_at, updated_at FROM packages WHERE id = $1",
    )
    .bind(package_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Err(AppError::NotFound);
    };
    let mut package = package_from_row(&row)?;
    if package.owner_id != user_id {
        return Err(AppError::Forbidden);
    }
    package.participants = sqlx::query(
        "SELECT id, package_id, email, name, role FROM package_participants \
         WHERE package_id = $1 ORDER BY created_at ASC",
    )
    .bind(package_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(participant_from_row)
    .collect();
    Ok(package)
}

/// Participant of `package_id` together with the package owner.
pub async fn find_participant(
    pool: &PgPool,
    package_id: Uuid,
    participant_id: Uuid,
) -> AppResult<Option<(Participant, i32)>> {
    let row = sqlx::query(
        "SELECT p.id, p.package_id, p.email, p.name, p.role, pk.owner_id \
         FROM package_participants p \
         JOIN packages pk ON pk.id = p.package_id \
         WHERE p.package_id = $1 AND p.id = $2",
    )
    .bind(package_id)
    .bind(participant_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| {
        let owner_id: i32 = row.get("owner_id");
        (participant_from_row(&row), owner_id)
    }))
}

/// Moves `package_id` from `from` to `to` only while it is still in `from`.
pub async fn transition_status(
    pool: &PgPool,
    package_id: Uuid,
    from: PackageStatus,
    to: PackageStatus,
) -> AppResult<DateTime<Utc>> {
    if !from.can_transition_to(to) {
        return Err(AppError::BadRequest(format!(
            "Cannot move package from {} to {}",
            from.as_str(),
            to.as_str()
        )));
    }
    let updated_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "UPDATE packages SET status = $2, updated_at = NOW() \
         WHERE id = $1 AND status = $3 RETURNING updated_at",
    )
    .bind(package_id)
    .bind(to.as_str())
    .bind(from.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error updating package status");
        AppError::Db(e)
    })?;
    updated_at.ok_or_else(|| {
        tracing::warn!(
            package = %package_id,
            from = from.as_str(),
            "package status changed concurrently"
        );
        AppError::Conflict(format!(
            "Package is no longer {}; reload and retry",
            from.as_str()
        ))
    })
}

pub async fn create_package(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Json(payload): Json<NewPackage>,
) -> AppResult<(StatusCode, Json<Package>)> {
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title required".into()));
    }
    for participant in &payload.participants {
        validate_participant(participant)?;
    }

    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        "INSERT INTO packages (id, owner_id, title, status) VALUES ($1, $2, $3, 'draft') \
         RETURNING id, owner_id, title, status, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&title)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error creating package");
        AppError::Db(e)
    })?;
    let mut package = package_from_row(&row)?;
    for participant in payload.participants {
        package
            .participants
            .push(insert_participant(&mut *tx, package.id, participant).await?);
    }
    tx.commit().await?;
    tracing::info!(package = %package.id, user_id, "package created");
    Ok((StatusCode::CREATED, Json(package)))
}

pub async fn list_packages(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Query(filter): Query<PackageFilter>,
) -> AppResult<Json<Vec<Package>>> {
    let rows = sqlx::query(
        "SELECT id, owner_id, title, status, created_at, updated_at FROM packages \
         WHERE owner_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
         ORDER BY updated_at DESC",
    )
    .bind(user_id)
    .bind(filter.status.map(|status| status.as_str()))
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error listing packages");
        AppError::Db(e)
    })?;
    let packages = rows
        .iter()
        .map(package_from_row)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(packages))
}

pub async fn get_package(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Package>> {
    Ok(Json(load_owned_package(&pool, user_id, id).await?))
}

pub async fn add_participant(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewParticipant>,
) -> AppResult<(StatusCode, Json<Participant>)> {
    let package = load_owned_package(&pool, user_id, id).await?;
    if package.status != PackageStatus::Draft {
        return Err(AppError::BadRequest(
            "Participants can only be added to draft packages".into(),
        ));
    }
    let participant = insert_participant(&pool, package.id, payload).await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

pub async fn update_status(
    Extension(pool): Extension<PgPool>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusChange>,
) -> AppResult<Json<Package>> {
    let mut package = load_owned_package(&pool, user_id, id).await?;
    let updated_at = transition_status(&pool, id, package.status, payload.status).await?;
    tracing::info!(
        package = %id,
        from = package.status.as_str(),
        to = payload.status.as_str(),
        "package status changed"
    );
    package.status = payload.status;
    package.updated_at = updated_at;
    Ok(Json(package))
}
