use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    contacts::{
        birthdays,
        dto::{ContactData, ContactResponse, SearchParams},
        repo,
    },
    state::AppState,
};

pub fn contact_routes() -> Router<AppState> {
    Router::new()
        .route("/contacts", post(create_contact).get(list_contacts))
        .route("/contacts/search", get(search_contacts))
        .route("/contacts/birthdays", get(upcoming_birthdays))
        .route(
            "/contacts/:id",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ContactData>,
) -> Result<(StatusCode, Json<ContactResponse>), (StatusCode, String)> {
    let contact = repo::create(&state.db, user_id, &payload)
        .await
        .map_err(conflict_or_internal)?;
    info!(user_id = %user_id, contact_id = %contact.id, "contact created");
    Ok((StatusCode::CREATED, Json(contact.into())))
}

#[instrument(skip(state))]
pub async fn list_contacts(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<ContactResponse>>, (StatusCode, String)> {
    let contacts = repo::list_by_user(&state.db, user_id)
        .await
        .map_err(internal)?;
    Ok(Json(contacts.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn get_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ContactResponse>, (StatusCode, String)> {
    match repo::get_by_id(&state.db, user_id, id).await.map_err(internal)? {
        Some(contact) => Ok(Json(contact.into())),
        None => Err((StatusCode::NOT_FOUND, "Contact not found".into())),
    }
}

#[instrument(skip(state, payload))]
pub async fn update_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContactData>,
) -> Result<Json<ContactResponse>, (StatusCode, String)> {
    match repo::update(&state.db, user_id, id, &payload)
        .await
        .map_err(conflict_or_internal)?
    {
        Some(contact) => {
            info!(user_id = %user_id, contact_id = %id, "contact updated");
            Ok(Json(contact.into()))
        }
        None => Err((StatusCode::NOT_FOUND, "Contact not found".into())),
    }
}

#[instrument(skip(state))]
pub async fn delete_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    repo::delete(&state.db, user_id, id).await.map_err(internal)?;
    info!(user_id = %user_id, contact_id = %id, "contact deleted");
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[instrument(skip(state))]
pub async fn search_contacts(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ContactResponse>>, (StatusCode, String)> {
    let contacts = repo::search(&state.db, user_id, &params.query)
        .await
        .map_err(internal)?;
    Ok(Json(contacts.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn upcoming_birthdays(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<ContactResponse>>, (StatusCode, String)> {
    let contacts = repo::list_by_user(&state.db, user_id)
        .await
        .map_err(internal)?;
    let today = OffsetDateTime::now_utc().date();
    let upcoming = birthdays::within_next_week(contacts, today).map_err(internal)?;
    Ok(Json(upcoming.into_iter().map(Into::into).collect()))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!(error = %e, "contact operation failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Contact emails are globally unique; a duplicate surfaces from the
/// storage layer as a unique violation.
fn conflict_or_internal(e: anyhow::Error) -> (StatusCode, String) {
    if let Some(sqlx::Error::Database(db_err)) = e.downcast_ref::<sqlx::Error>() {
        if db_err.is_unique_violation() {
            return (StatusCode::CONFLICT, "Contact email already exists".into());
        }
    }
    internal(e)
}
