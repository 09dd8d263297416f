use axum::{Router, routing::get};

use crate::modules::permissions::controller::get_permissions;
use crate::state::AppState;

pub fn init_permissions_router() -> Router<AppState> {
    Router::new().route("/", get(get_permissions))
}
