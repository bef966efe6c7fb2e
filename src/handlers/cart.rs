use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use validator::Validate;

use crate::{
    auth::AuthUser,
    services::cart::{Cart, CartItemRequest},
    ApiResponse, ApiResult, AppState,
};

/// Add one unit of an item to the caller's cart
#[utoipa::path(
    post,
    path = "/api/cart/add",
    request_body = CartItemRequest,
    responses(
        (status = 200, description = "Added to cart", body = crate::MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
    payload: Result<Json<CartItemRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(request) = payload?;
    request.validate()?;
    state
        .services
        .cart
        .add(auth_user.user_id, &request.item_id)
        .await?;
    Ok(Json(ApiResponse::message(true, "Added To Cart")))
}

/// Remove one unit of an item from the caller's cart
#[utoipa::path(
    post,
    path = "/api/cart/remove",
    request_body = CartItemRequest,
    responses(
        (status = 200, description = "Removed from cart", body = crate::MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
    payload: Result<Json<CartItemRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(request) = payload?;
    request.validate()?;
    state
        .services
        .cart
        .remove(auth_user.user_id, &request.item_id)
        .await?;
    Ok(Json(ApiResponse::message(true, "Removed From Cart")))
}

/// The caller's cart as `{ itemId: quantity }`
#[utoipa::path(
    post,
    path = "/api/cart/get",
    responses(
        (status = 200, description = "Cart contents under `data` as `{ itemId: quantity }`", body = crate::MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn get_cart(State(state): State<AppState>, auth_user: AuthUser) -> ApiResult<Cart> {
    let cart = state.services.cart.get(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}
