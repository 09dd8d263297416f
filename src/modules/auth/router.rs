use axum::{
    Router,
    routing::{get, post},
};

use crate::modules::auth::controller::{login_user, session, whoami};
use crate::state::AppState;

pub fn init_auth_router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login_user))
        .route("/session", get(session))
        .route("/whoami", get(whoami))
}
