use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, header::SET_COOKIE},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    auth::{client_identity, session_cookie, session_person},
    error::AppError,
    state::AppState,
    store::MAX_WISHES,
    utils::unique_names,
};

#[derive(Deserialize)]
pub struct InitRequest {
    #[serde(alias = "familyMembers")]
    participants: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    #[serde(alias = "password")]
    credential: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRequest {
    person_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    wish_list: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct CredentialAssignment {
    person: String,
    credential: String,
}

#[derive(Serialize)]
pub struct InitResponse {
    success: bool,
    message: String,
    credentials: Vec<CredentialAssignment>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    success: bool,
    assigned_giftee: String,
    person_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishListResponse {
    success: bool,
    wish_list: Vec<String>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|_| AppError::MalformedPayload)
}

pub async fn init_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InitRequest>, JsonRejection>,
) -> Result<Json<InitResponse>, AppError> {
    let raw = body(payload)?.participants.unwrap_or_default();

    if raw.len() < 2 {
        return Err(AppError::Validation(
            "Please provide at least 2 participants".into(),
        ));
    }

    let participants = unique_names(&raw);
    if participants.len() < 2 {
        return Err(AppError::Validation(
            "Please provide at least 2 unique participants".into(),
        ));
    }

    let draw = draw::generate(&participants, state.config.strategy)?;

    let store = state.ready().await;
    store.replace_all(draw).await;

    let credentials = store
        .credentials()
        .await
        .into_iter()
        .map(|(person, credential)| CredentialAssignment { person, credential })
        .collect();

    info!("Assignments initialized for {} participants", participants.len());

    Ok(Json(InitResponse {
        success: true,
        message: format!(
            "Assignments initialized for {} participants",
            participants.len()
        ),
        credentials,
    }))
}

pub async fn clear_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.ready().await.clear_all().await;

    Json(StatusResponse {
        success: true,
        message: Some("All assignments cleared".into()),
    })
}

pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let credential = body(payload)?
        .credential
        .filter(|credential| !credential.is_empty())
        .ok_or_else(|| AppError::Validation("Credential is required".into()))?;

    let client = client_identity(&headers);

    state.ready().await;
    let session = state.gateway.verify(&client, &credential).await?;

    Ok((
        [(SET_COOKIE, session_cookie(&session.person).to_string())],
        Json(VerifyResponse {
            success: true,
            assigned_giftee: session.giftee,
            person_name: session.person,
        }),
    ))
}

pub async fn wishlist_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<WishListResponse>, AppError> {
    let person = session_person(&headers)?;

    let wish_list = state.ready().await.wish_list(&person).await;

    Ok(Json(WishListResponse {
        success: true,
        wish_list,
    }))
}

pub async fn wishlist_by_name_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<PersonRequest>, JsonRejection>,
) -> Result<Json<WishListResponse>, AppError> {
    let person_name = body(payload)?
        .person_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::Validation("Person name is required".into()))?;

    // any session will do, there is no ownership check
    session_person(&headers)?;

    let wish_list = state.ready().await.wish_list(&person_name).await;

    Ok(Json(WishListResponse {
        success: true,
        wish_list,
    }))
}

pub async fn submit_wishlist_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let wish_list = body(payload)?
        .wish_list
        .ok_or_else(|| AppError::Validation("Wish list is required".into()))?;

    let person = session_person(&headers)?;

    if wish_list.len() > MAX_WISHES {
        return Err(AppError::Validation(format!(
            "A wish list holds at most {MAX_WISHES} wishes"
        )));
    }

    let success = state
        .ready()
        .await
        .set_wish_list(&person, wish_list.clone())
        .await;

    if success {
        info!("Wish list submitted: {person} {wish_list:?}");
    } else {
        warn!("Ignored wish list for unknown person {person}");
    }

    Ok(Json(StatusResponse {
        success,
        message: None,
    }))
}
