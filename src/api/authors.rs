//! `/api/author` endpoints.

use super::error::ApiError;
use super::payload::{self, AuthorPayload};
use super::{created, json_bytes, no_content, AppState};
use crate::entity::{Author, EntityId};
use crate::gateway::AUTHOR_LIST;
use crate::key::{AUTHORS_TAG, BOOKS_TAG};
use crate::repository::{DataRepository, Page, PageQuery};
use crate::url::RouteName;
use crate::validation::Validate;
use crate::view::{self, Group, SerializationContext};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;

async fn find_author(state: &AppState, id: EntityId) -> Result<Author, ApiError> {
    DataRepository::<Author>::find(state.store.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound)
}

fn reject_invalid(author: &Author) -> Result<(), ApiError> {
    let violations = author.validate();
    if violations.is_empty() {
        Ok(())
    } else {
        debug!("Author rejected with {} violation(s)", violations.len());
        Err(ApiError::ValidationFailed(violations))
    }
}

pub async fn list_authors(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let page = Page::from_query(query, state.api.authors_page_limit);
    let body = state
        .gateway
        .list::<Author, _>(AUTHOR_LIST, state.store.as_ref(), page)
        .await?;
    Ok(json_bytes(StatusCode::OK, body))
}

pub async fn detail_author(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> Result<Response, ApiError> {
    let author = find_author(&state, id).await?;
    let context = SerializationContext::create().with_groups(&[Group::GET_BOOKS]);
    Ok(json_bytes(StatusCode::OK, view::to_json(&author, &context)?))
}

pub async fn create_author(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: AuthorPayload = payload::decode(&body)?;
    let mut author = payload.to_author();
    reject_invalid(&author)?;

    let mut uow = state.store.unit_of_work();
    let id = uow.persist(&mut author);
    uow.flush().await?;
    state.gateway.invalidate(&[AUTHORS_TAG]).await?;
    info!("Created author {}", id);

    let context = SerializationContext::create().with_groups(&[Group::GET_BOOKS]);
    let body = view::to_json(&author, &context)?;
    Ok(created(state.urls.generate(RouteName::DetailAuthor, id), body))
}

/// Book listings embed author names, so both tags are invalidated.
pub async fn update_author(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut author = find_author(&state, id).await?;
    let payload: AuthorPayload = payload::decode(&body)?;
    payload.apply_to(&mut author);
    reject_invalid(&author)?;

    let mut uow = state.store.unit_of_work();
    uow.persist(&mut author);
    uow.flush().await?;
    state.gateway.invalidate(&[AUTHORS_TAG, BOOKS_TAG]).await?;
    info!("Updated author {}", id);

    Ok(no_content())
}

/// Removes the author's books and the author in one flush.
pub async fn delete_author(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> Result<Response, ApiError> {
    let author = find_author(&state, id).await?;

    let mut uow = state.store.unit_of_work();
    uow.remove_with_books(&author);
    uow.flush().await?;
    state.gateway.invalidate(&[AUTHORS_TAG, BOOKS_TAG]).await?;
    info!("Deleted author {} and their books", id);

    Ok(no_content())
}
