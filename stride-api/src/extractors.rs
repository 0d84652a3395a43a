//! Custom path extractors for type-safe entity IDs.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use stride_core::EntityIdType;
use uuid::Uuid;

use crate::error::ApiError;

/// Extractor for a typed entity id from the single `:id` path parameter.
///
/// A malformed id is rejected as `INVALID_INPUT` naming the entity, rather
/// than axum's plain-text path rejection.
///
/// ```rust,ignore
/// async fn module_progress(PathId(module_id): PathId<ModuleId>) -> ApiResult<...>
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PathId<T: EntityIdType>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathId<T>
where
    S: Send + Sync,
    T: EntityIdType,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(uuid): Path<Uuid> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                ApiError::invalid_input(format!("Invalid {} ID: {}", T::ENTITY_NAME, e))
            })?;
        Ok(PathId(T::new(uuid)))
    }
}
