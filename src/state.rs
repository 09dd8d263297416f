use members_config::{CorsConfig, JwtConfig, ServerConfig};
use members_db::{PgPool, init_db_pool};

use crate::modules::permissions::registry::PgPermissionRegistry;
use crate::modules::users::service::UserService;
use crate::modules::users::store::PgUserStore;

/// The user service wired to PostgreSQL.
pub type PgUserService = UserService<PgUserStore, PgPermissionRegistry>;

#[derive(Clone, Debug)]
pub struct AppState {
    pub db: PgPool,
    pub jwt_config: JwtConfig,
    pub cors_config: CorsConfig,
    pub server_config: ServerConfig,
}

impl AppState {
    pub fn new(db: PgPool, jwt_config: JwtConfig, server_config: ServerConfig) -> Self {
        Self {
            db,
            jwt_config,
            cors_config: CorsConfig::from_env(),
            server_config,
        }
    }

    pub fn user_service(&self) -> PgUserService {
        UserService::new(
            PgUserStore::new(self.db.clone()),
            PgPermissionRegistry::new(self.db.clone()),
            self.server_config.public_url.clone(),
        )
    }

    pub fn permission_registry(&self) -> PgPermissionRegistry {
        PgPermissionRegistry::new(self.db.clone())
    }
}

pub async fn init_app_state() -> anyhow::Result<AppState> {
    Ok(AppState {
        db: init_db_pool().await?,
        jwt_config: JwtConfig::from_env(),
        cors_config: CorsConfig::from_env(),
        server_config: ServerConfig::from_env(),
    })
}
