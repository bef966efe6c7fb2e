use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod order_repository;
pub mod user_repository;

pub use order_repository::{NewOrder, OrderLedger, OrderRepository, OrderUpdate};
pub use user_repository::{NewUser, UserRepository, UserStore};

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[cfg(test)]
pub(crate) async fn test_db() -> Arc<DatabaseConnection> {
    let cfg = crate::db::DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        ..Default::default()
    };
    let db = crate::db::establish_connection_with_config(&cfg)
        .await
        .expect("sqlite connects");
    crate::db::run_migrations(&db).await.expect("migrations run");
    Arc::new(db)
}
