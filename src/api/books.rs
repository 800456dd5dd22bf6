//! `/api/books` endpoints.

use super::error::ApiError;
use super::payload::{self, BookPayload};
use super::{created, json_bytes, no_content, versioned_content_type, AppState};
use crate::entity::{Author, Book, EntityId, NO_ID};
use crate::gateway::BOOK_LIST;
use crate::key::BOOKS_TAG;
use crate::repository::{DataRepository, Page, PageQuery};
use crate::url::RouteName;
use crate::validation::Validate;
use crate::view::{self, Group, SerializationContext};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;

async fn find_book(state: &AppState, id: EntityId) -> Result<Book, ApiError> {
    DataRepository::<Book>::find(state.store.as_ref(), id)
        .await?
        .ok_or(ApiError::NotFound)
}

/// Unknown ids, including [`NO_ID`], resolve to no author.
async fn resolve_author(state: &AppState, id: EntityId) -> Result<Option<Author>, ApiError> {
    let author = DataRepository::<Author>::find(state.store.as_ref(), id).await?;
    if author.is_none() && id != NO_ID {
        debug!("Author {} not found, book left without author", id);
    }
    Ok(author)
}

fn reject_invalid(book: &Book) -> Result<(), ApiError> {
    let violations = book.validate();
    if violations.is_empty() {
        Ok(())
    } else {
        debug!("Book rejected with {} violation(s)", violations.len());
        Err(ApiError::ValidationFailed(violations))
    }
}

pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let page = Page::from_query(query, state.api.books_page_limit);
    let body = state
        .gateway
        .list::<Book, _>(BOOK_LIST, state.store.as_ref(), page)
        .await?;
    Ok(json_bytes(StatusCode::OK, body))
}

/// Rendered under the version negotiated from `Accept`, echoed in `Content-Type`.
pub async fn detail_book(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let version = state.versions.resolve_headers(&headers);
    let book = find_book(&state, id).await?;

    let context = SerializationContext::create()
        .with_groups(&[Group::GET_BOOKS])
        .with_version(&version);
    let mut response = json_bytes(StatusCode::OK, view::to_json(&book, &context)?);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, versioned_content_type(&version));
    Ok(response)
}

pub async fn create_book(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let payload: BookPayload = payload::decode(&body)?;
    let mut book = payload.to_book();
    reject_invalid(&book)?;

    let author_id = payload.id_author.flatten().unwrap_or(NO_ID);
    book.author = resolve_author(&state, author_id).await?;

    let mut uow = state.store.unit_of_work();
    let id = uow.persist(&mut book);
    uow.flush().await?;
    state.gateway.invalidate(&[BOOKS_TAG]).await?;
    info!("Created book {} {:?}", id, book.title);

    // The author may have been deleted while this book was being saved
    let book = find_book(&state, id).await?;

    let context = SerializationContext::create().with_groups(&[Group::GET_BOOKS]);
    let body = view::to_json(&book, &context)?;
    Ok(created(state.urls.generate(RouteName::DetailBook, id), body))
}

/// Fields absent from the body are left as they are; `idAuthor` re-resolves
/// the author only when present.
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut book = find_book(&state, id).await?;
    let payload: BookPayload = payload::decode(&body)?;

    payload.apply_to(&mut book);
    if let Some(author_id) = payload.id_author {
        book.author = resolve_author(&state, author_id.unwrap_or(NO_ID)).await?;
    }
    reject_invalid(&book)?;

    let mut uow = state.store.unit_of_work();
    uow.persist(&mut book);
    uow.flush().await?;
    state.gateway.invalidate(&[BOOKS_TAG]).await?;
    info!("Updated book {}", id);

    Ok(no_content())
}

pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> Result<Response, ApiError> {
    let book = find_book(&state, id).await?;
    let (store, book) = (state.store.as_ref(), &book);
    state
        .gateway
        .invalidate_around(&[BOOKS_TAG], move || async move {
            let mut uow = store.unit_of_work();
            uow.remove(book);
            uow.flush().await
        })
        .await?;
    info!("Deleted book {}", id);

    Ok(no_content())
}
