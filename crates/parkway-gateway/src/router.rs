use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::error::panic_response;
use crate::handlers;
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/hello", get(handlers::hello))
        .route(
            "/user",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/user/search", get(handlers::search_users))
        .route(
            "/user/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        );

    with_middleware(routes).with_state(state)
}

/// Wrap every route of `router` in the shared middleware stack.
fn with_middleware<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(panic_response));

    router.layer(middleware)
}
