use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use tokio::sync::broadcast;

use crate::dao::{
    models::{
        BattleResultEntity, BattleRoomEntity, LeaderboardEntryEntity, LeaderboardIncrement,
        MatchEntity, ProfileDocument, QuestionEntity, merge_profile,
    },
    realtime_store::{ChangeFeed, RealtimeStore, allocate_id},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchDocument, END_SUFFIX, LEADERBOARD_PREFIX, MATCH_PREFIX,
        QUESTION_PREFIX, RESULT_PREFIX, ROOM_PREFIX, USER_PREFIX, doc_id,
    },
};

const MAX_CONFLICT_RETRIES: usize = 5;
const ALL_DOCS: &str = "_all_docs";

/// Realtime store persisting every collection as prefixed documents of a single
/// CouchDB database. Change feeds are published by this process on its own writes.
#[derive(Clone)]
pub struct CouchRealtimeStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    room_feed: Arc<ChangeFeed<BattleRoomEntity>>,
    match_feed: Arc<ChangeFeed<MatchEntity>>,
}

impl CouchRealtimeStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(CouchDaoError::Client)?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
            room_feed: Arc::new(ChangeFeed::new(config.feed_capacity)),
            match_feed: Arc::new(ChangeFeed::new(config.feed_capacity)),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.with_auth(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(CouchDaoError::transport(database.clone()))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(CouchDaoError::transport(database.clone()))?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::status(database, create.status()))
                }
            }
            other => Err(CouchDaoError::status(database, other)),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<CouchDocument<T>>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(CouchDaoError::transport(doc_id))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CouchDocument<T>>()
                .await
                .map(Some)
                .map_err(CouchDaoError::transport(doc_id)),
            other => Err(CouchDaoError::status(doc_id, other)),
        }
    }

    async fn current_rev(&self, doc_id: &str) -> CouchResult<Option<String>> {
        Ok(self
            .get_document::<serde_json::Value>(doc_id)
            .await?
            .and_then(|doc| doc.rev))
    }

    /// PUT a document. Returns `Ok(false)` when CouchDB reports a revision conflict.
    async fn put_document<T>(&self, document: &CouchDocument<T>) -> CouchResult<bool>
    where
        T: Serialize,
    {
        let response = self
            .request(Method::PUT, &document.id)
            .json(document)
            .send()
            .await
            .map_err(CouchDaoError::transport(document.id.clone()))?;

        match response.status() {
            StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(CouchDaoError::status(document.id.clone(), other)),
        }
    }

    /// Overwrite a document regardless of concurrent writers (last write wins).
    async fn overwrite<T>(&self, doc_id: String, body: T) -> CouchResult<()>
    where
        T: Serialize,
    {
        let mut document = CouchDocument::new(doc_id, None, body);
        for _ in 0..MAX_CONFLICT_RETRIES {
            document.rev = self.current_rev(&document.id).await?;
            if self.put_document(&document).await? {
                return Ok(());
            }
        }
        Err(CouchDaoError::Contended(document.id))
    }

    /// Read-modify-write guarded by `_rev`, retried on conflicts.
    async fn update<T, F>(&self, doc_id: String, mut apply: F) -> CouchResult<T>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnMut(Option<T>) -> T,
    {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let existing = self.get_document::<T>(&doc_id).await?;
            let (rev, body) = match existing {
                Some(doc) => (doc.rev, Some(doc.body)),
                None => (None, None),
            };
            let next = apply(body);
            let document = CouchDocument::new(doc_id.clone(), rev, next.clone());
            if self.put_document(&document).await? {
                return Ok(next);
            }
        }
        Err(CouchDaoError::Contended(doc_id))
    }

    async fn delete_document(&self, doc_id: &str) -> CouchResult<bool> {
        let Some(rev) = self.current_rev(doc_id).await? else {
            return Ok(false);
        };

        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(CouchDaoError::transport(doc_id))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(CouchDaoError::status(doc_id, other)),
        }
    }

    async fn all_docs(&self, prefix: &str, include_docs: bool) -> CouchResult<AllDocsResponse> {
        let query = [
            ("include_docs", include_docs.to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(CouchDaoError::transport(ALL_DOCS))?;

        if !response.status().is_success() {
            return Err(CouchDaoError::status(ALL_DOCS, response.status()));
        }

        response
            .json::<AllDocsResponse>()
            .await
            .map_err(CouchDaoError::transport(ALL_DOCS))
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let payload = self.all_docs(prefix, true).await?;

        let mut documents = Vec::new();
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed: CouchDocument<T> =
                    from_value(doc).map_err(|source| CouchDaoError::Decode {
                        target: row.id.clone(),
                        source,
                    })?;
                documents.push(parsed.body);
            }
        }

        Ok(documents)
    }

    async fn delete_prefix(&self, prefix: &str) -> CouchResult<usize> {
        let payload = self.all_docs(prefix, false).await?;
        let mut cleared = 0;
        for row in payload.rows {
            let Some(value) = row.value else { continue };
            let response = self
                .request(Method::DELETE, &row.id)
                .query(&[("rev", value.rev)])
                .send()
                .await
                .map_err(CouchDaoError::transport(row.id.clone()))?;
            if response.status().is_success() {
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

impl RealtimeStore for CouchRealtimeStore {
    fn create_room(
        &self,
        mut room: BattleRoomEntity,
    ) -> BoxFuture<'static, StorageResult<BattleRoomEntity>> {
        let store = self.clone();
        Box::pin(async move {
            if room.id.is_empty() {
                room.id = allocate_id();
            }
            let document = CouchDocument::new(doc_id(ROOM_PREFIX, &room.id), None, room.clone());
            if !store.put_document(&document).await? {
                return Err(CouchDaoError::Contended(document.id).into());
            }
            store.room_feed.publish(&room.id, Some(room.clone()));
            Ok(room)
        })
    }

    fn find_room(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<BattleRoomEntity>>> {
        let store = self.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let doc = store
                .get_document::<BattleRoomEntity>(&doc_id(ROOM_PREFIX, &id))
                .await?;
            Ok(doc.map(|doc| doc.body))
        })
    }

    fn save_room(&self, room: BattleRoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = room.id.clone();
            store
                .overwrite(doc_id(ROOM_PREFIX, &id), room.clone())
                .await?;
            store.room_feed.publish(&id, Some(room));
            Ok(())
        })
    }

    fn delete_room(&self, id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let deleted = store.delete_document(&doc_id(ROOM_PREFIX, &id)).await?;
            if deleted {
                store.room_feed.publish(&id, None);
            }
            Ok(deleted)
        })
    }

    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<BattleRoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.list_documents(ROOM_PREFIX).await?) })
    }

    fn find_match(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        Box::pin(async move {
            let doc = store
                .get_document::<MatchEntity>(&doc_id(MATCH_PREFIX, &room_id))
                .await?;
            Ok(doc.map(|doc| doc.body))
        })
    }

    fn save_match(&self, node: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let room_id = node.room_id.clone();
            store
                .overwrite(doc_id(MATCH_PREFIX, &room_id), node.clone())
                .await?;
            store.match_feed.publish(&room_id, Some(node));
            Ok(())
        })
    }

    fn delete_match(&self, room_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        Box::pin(async move {
            let deleted = store
                .delete_document(&doc_id(MATCH_PREFIX, &room_id))
                .await?;
            if deleted {
                store.match_feed.publish(&room_id, None);
            }
            Ok(deleted)
        })
    }

    fn save_battle_result(
        &self,
        mut result: BattleResultEntity,
    ) -> BoxFuture<'static, StorageResult<String>> {
        let store = self.clone();
        Box::pin(async move {
            if result.id.is_empty() {
                result.id = allocate_id();
            }
            let id = result.id.clone();
            store.overwrite(doc_id(RESULT_PREFIX, &id), result).await?;
            Ok(id)
        })
    }

    fn list_battle_results(&self) -> BoxFuture<'static, StorageResult<Vec<BattleResultEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.list_documents(RESULT_PREFIX).await?) })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = doc_id(QUESTION_PREFIX, &question.id);
            Ok(store.overwrite(id, question).await?)
        })
    }

    fn find_question(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let store = self.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let doc = store
                .get_document::<QuestionEntity>(&doc_id(QUESTION_PREFIX, &id))
                .await?;
            Ok(doc.map(|doc| doc.body))
        })
    }

    fn find_profile(&self, uid: &str) -> BoxFuture<'static, StorageResult<Option<ProfileDocument>>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move {
            let doc = store
                .get_document::<ProfileDocument>(&doc_id(USER_PREFIX, &uid))
                .await?;
            Ok(doc.map(|doc| doc.body))
        })
    }

    fn merge_profile(
        &self,
        uid: &str,
        updates: ProfileDocument,
    ) -> BoxFuture<'static, StorageResult<ProfileDocument>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move {
            let merged = store
                .update(doc_id(USER_PREFIX, &uid), |existing: Option<ProfileDocument>| {
                    let mut profile = existing.unwrap_or_default();
                    merge_profile(&mut profile, &updates);
                    profile
                })
                .await?;
            Ok(merged)
        })
    }

    fn increment_leaderboard(
        &self,
        uid: &str,
        increment: LeaderboardIncrement,
    ) -> BoxFuture<'static, StorageResult<LeaderboardEntryEntity>> {
        let store = self.clone();
        let uid = uid.to_owned();
        Box::pin(async move {
            let entry = store
                .update(
                    doc_id(LEADERBOARD_PREFIX, &uid),
                    |existing: Option<LeaderboardEntryEntity>| match existing {
                        Some(mut entry) => {
                            entry.apply(&increment);
                            entry
                        }
                        None => LeaderboardEntryEntity::seeded(&uid, &increment),
                    },
                )
                .await?;
            Ok(entry)
        })
    }

    fn list_leaderboard(&self) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.list_documents(LEADERBOARD_PREFIX).await?) })
    }

    fn reset_leaderboard(&self) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.delete_prefix(LEADERBOARD_PREFIX).await?) })
    }

    fn watch_room(&self, id: &str) -> broadcast::Receiver<Option<BattleRoomEntity>> {
        self.room_feed.subscribe(id)
    }

    fn watch_match(&self, room_id: &str) -> broadcast::Receiver<Option<MatchEntity>> {
        self.match_feed.subscribe(room_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .with_auth(store.client.get(&url))
                .send()
                .await
                .map_err(CouchDaoError::transport(url.clone()))?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::status(url, response.status()).into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
