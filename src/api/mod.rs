//! API layer - HTTP handlers and routing
//!
//! Public endpoints live directly under `/api`; everything under
//! `/api/secured` requires a Bearer access token, and some of those routes
//! additionally require the buyer or seller role.

pub mod auth;
pub mod middleware;
pub mod products;
pub mod vending;

use axum::{
    http::{header, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the API router (mounted at `/api`)
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let buyer_routes = Router::new()
        .route("/deposit", post(vending::deposit))
        .route("/reset-deposit", post(vending::reset_deposit))
        .route("/buy", post(vending::buy))
        .route("/balance", get(vending::balance))
        .route_layer(axum_middleware::from_fn(middleware::require_buyer));

    let seller_routes = Router::new()
        .route(
            "/product",
            put(products::create_product)
                .post(products::update_product)
                .delete(products::delete_product),
        )
        .route_layer(axum_middleware::from_fn(middleware::require_seller));

    let secured_routes = Router::new()
        .route("/ping", get(auth::secured_ping))
        .route("/logout", post(auth::logout))
        .merge(buyer_routes)
        .merge(seller_routes)
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .route("/ping", get(auth::ping))
        .route("/login", post(auth::login))
        .route("/refresh-token", post(auth::refresh_token))
        .route("/logout-all", post(auth::logout_all))
        .route("/user/register", post(auth::register))
        .route("/products", get(products::list_products))
        .nest("/secured", secured_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
