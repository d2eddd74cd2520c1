use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    error::{ApiError, MessageBody},
    state::AppState,
    users::{
        dto::{CreateUserRequest, PublicUser, UpdateUserRequest},
        password,
        repo::StoreError,
        repo_types::NewUser,
    },
};

const INCOMPLETE: &str = "Dados incompletos!";
const EMAIL_TAKEN: &str = "Email já cadastrado!";
const NOTHING_TO_UPDATE: &str = "Nenhum dado fornecido para atualização!";
const INVALID_UPDATE: &str = "Dados inválidos para atualização!";
const BLANK_REQUIRED: &str = "Nome e email não podem ficar vazios!";
const DELETED: &str = "Usuário deletado com sucesso!";

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user)
                .put(update_user)
                .patch(update_user)
                .delete(delete_user),
        )
}

// Non-integer ids are treated like unknown ones.
fn user_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    match path {
        Ok(Path(id)) => Ok(id),
        Err(e) => {
            warn!(error = %e, "malformed user id");
            Err(ApiError::NotFound)
        }
    }
}

fn store_failure(action: &str, e: StoreError) -> ApiError {
    match e {
        StoreError::DuplicateEmail(detail) => {
            warn!(%detail, "email uniqueness violated");
            ApiError::Conflict(EMAIL_TAKEN.into())
        }
        StoreError::Database(e) => {
            error!(error = %e, action, "persistence failure");
            ApiError::Persistence(format!("Erro ao {action} usuário: {e}"))
        }
    }
}

fn hash_failure(action: &str, e: anyhow::Error) -> ApiError {
    ApiError::Persistence(format!("Erro ao {action} usuário: {e}"))
}

#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let Ok(Json(payload)) = payload else {
        warn!("create rejected: body is not a JSON object");
        return Err(ApiError::Validation(INCOMPLETE.into()));
    };
    let Some(req) = payload.validate() else {
        warn!("create rejected: nome, email and senha are required");
        return Err(ApiError::Validation(INCOMPLETE.into()));
    };

    match state.store.find_by_email(&req.email).await {
        Ok(Some(_)) => {
            warn!(email = %req.email, "email already registered");
            return Err(ApiError::Conflict(EMAIL_TAKEN.into()));
        }
        Ok(None) => {}
        Err(e) => return Err(store_failure("criar", e)),
    }

    let password_hash = password::hash(&req.password).map_err(|e| hash_failure("criar", e))?;

    let user = state
        .store
        .insert(NewUser {
            name: req.name,
            email: req.email,
            password_hash,
            address: req.address,
            phone: req.phone,
        })
        .await
        .map_err(|e| store_failure("criar", e))?;

    info!(user_id = user.id, email = %user.email, "user created");
    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))))
}

#[instrument(skip_all)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = state
        .store
        .list()
        .await
        .map_err(|e| store_failure("listar", e))?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

#[instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<PublicUser>, ApiError> {
    let id = user_id(path)?;
    let user = state
        .store
        .find(id)
        .await
        .map_err(|e| store_failure("buscar", e))?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<serde_json::Map<String, serde_json::Value>>, JsonRejection>,
) -> Result<Json<PublicUser>, ApiError> {
    let id = user_id(path)?;
    let mut user = state
        .store
        .find(id)
        .await
        .map_err(|e| store_failure("atualizar", e))?
        .ok_or(ApiError::NotFound)?;

    let body = match payload {
        Ok(Json(body)) if !body.is_empty() => body,
        _ => {
            warn!(user_id = id, "update rejected: empty body");
            return Err(ApiError::Validation(NOTHING_TO_UPDATE.into()));
        }
    };
    let changes = match UpdateUserRequest::from_body(body) {
        Ok(changes) => changes,
        Err(e) => {
            warn!(user_id = id, error = %e, "update rejected: malformed field");
            return Err(ApiError::Validation(INVALID_UPDATE.into()));
        }
    };
    if !changes.keeps_required_fields() {
        warn!(user_id = id, "update rejected: blank nome or email");
        return Err(ApiError::Validation(BLANK_REQUIRED.into()));
    }

    if let Some(plain) = changes.new_password() {
        user.password_hash = password::hash(plain).map_err(|e| hash_failure("atualizar", e))?;
    }
    changes.apply_to(&mut user);

    let updated = state
        .store
        .update(&user)
        .await
        .map_err(|e| store_failure("atualizar", e))?
        .ok_or(ApiError::NotFound)?;

    info!(user_id = updated.id, "user updated");
    Ok(Json(PublicUser::from(&updated)))
}

#[instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageBody>, ApiError> {
    let id = user_id(path)?;
    let deleted = state
        .store
        .delete(id)
        .await
        .map_err(|e| store_failure("deletar", e))?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    info!(user_id = id, "user deleted");
    Ok(Json(MessageBody::new(DELETED)))
}
