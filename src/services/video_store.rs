use crate::entities::{prelude::*, *};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("video {0} not found")]
    NotFound(String),

    #[error("video {0} was modified concurrently")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Clone)]
pub struct NewVideo {
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
}

/// Video records keyed by ID.
///
/// `update` is a whole-record replace guarded by `version`: it succeeds only
/// if the stored version still equals the one the caller read.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<videos::Model, StoreError>;
    async fn insert(&self, video: NewVideo) -> Result<videos::Model, StoreError>;
    async fn update(&self, video: videos::Model) -> Result<videos::Model, StoreError>;
}

pub struct SeaOrmVideoStore {
    db: DatabaseConnection,
}

impl SeaOrmVideoStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VideoStore for SeaOrmVideoStore {
    async fn get(&self, id: &str) -> Result<videos::Model, StoreError> {
        Videos::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert(&self, video: NewVideo) -> Result<videos::Model, StoreError> {
        let now = Utc::now();
        let model = videos::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(video.user_id),
            title: Set(video.title),
            description: Set(video.description),
            thumbnail_url: Set(None),
            video_url: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn update(&self, video: videos::Model) -> Result<videos::Model, StoreError> {
        let id = video.id.clone();
        let expected_version = video.version;

        let mut active = videos::ActiveModel::from(video).reset_all();
        active.version = Set(expected_version + 1);
        active.updated_at = Set(Utc::now());

        match Videos::update(active)
            .filter(videos::Column::Version.eq(expected_version))
            .exec(&self.db)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(DbErr::RecordNotUpdated) => {
                tracing::warn!(
                    "Optimistic update of video {} lost against version {}",
                    id,
                    expected_version
                );
                Err(StoreError::Conflict(id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database;
    use sea_orm::Database;

    async fn store() -> SeaOrmVideoStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        database::run_migrations(&db).await.unwrap();
        SeaOrmVideoStore::new(db)
    }

    fn draft(user_id: &str) -> NewVideo {
        NewVideo {
            user_id: user_id.to_string(),
            title: "Boots".to_string(),
            description: Some("Trailer".to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = store().await;
        let created = store.insert(draft("user-1")).await.unwrap();
        assert_eq!(created.version, 1);
        assert!(created.video_url.is_none());

        let fetched = store.get(&created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = store().await;
        assert!(matches!(
            store.get("does-not-exist").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = store().await;
        let mut video = store.insert(draft("user-1")).await.unwrap();
        video.video_url = Some("videos,landscape/abc.mp4".to_string());

        let updated = store.update(video).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(
            store.get(&updated.id).await.unwrap().video_url.as_deref(),
            Some("videos,landscape/abc.mp4")
        );
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = store().await;
        let original = store.insert(draft("user-1")).await.unwrap();
        let id = original.id.clone();

        let mut first = original.clone();
        first.title = "First".to_string();
        store.update(first).await.unwrap();

        let mut stale = original;
        stale.title = "Second".to_string();
        assert!(matches!(
            store.update(stale).await,
            Err(StoreError::Conflict(_))
        ));
        let current = store.get(&id).await.unwrap();
        assert_eq!(current.title, "First");
        assert_eq!(current.version, 2);
    }
}
