//! MongoDB backend built on the official driver
//!
//! Sessions are driver `ClientSession`s with a started transaction, which
//! requires a replica set or sharded cluster. Batched writes go through the
//! client-level bulk write command (MongoDB 8.0 or newer).

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::error::ErrorKind;
use mongodb::options::{
    ClientOptions, DeleteOneModel, IndexOptions, InsertOneModel, ReturnDocument,
    UpdateModifications, UpdateOneModel,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};

use super::{BulkWriteOutcome, DocumentStore, FindOptions, StoreResult, UpdateOutcome, WriteModel};
use crate::config::MongoConfig;
use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation};

/// Map a driver error onto the structured store error
fn map_error(operation: DatabaseOperation, err: mongodb::error::Error) -> DatabaseError {
    let message = err.to_string();
    let kind = if message.contains("E11000") {
        DatabaseErrorKind::ConstraintViolation
    } else {
        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::Io(..) => DatabaseErrorKind::ConnectionFailed,
            ErrorKind::Transaction { .. } => DatabaseErrorKind::TransactionFailed,
            ErrorKind::BsonDeserialization(..) | ErrorKind::BsonSerialization(..) => {
                DatabaseErrorKind::TypeConversion
            }
            _ => DatabaseErrorKind::QueryFailed,
        }
    };
    DatabaseError::new(operation, kind, message)
}

/// Document store backed by a MongoDB deployment
///
/// Cloning shares the driver's connection pool.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Connect with the settings in `config` and ping the server
    ///
    /// The ping is bounded by the configured timeout. `config` is expected
    /// to be validated already.
    pub async fn connect(config: &MongoConfig) -> StoreResult<Self> {
        let url_safe = config.sanitized_connection_string();
        tracing::debug!("Connecting to MongoDB: {}", url_safe);

        let mut options = ClientOptions::parse(config.connection_string())
            .await
            .map_err(|e| {
                DatabaseError::new(
                    DatabaseOperation::Connect,
                    DatabaseErrorKind::Configuration,
                    format!("invalid connection string '{}': {}", url_safe, e),
                )
            })?;
        options.max_idle_time = config.max_idle_time();
        if let Some(timeout) = config.timeout() {
            options.connect_timeout = Some(timeout);
            options.server_selection_timeout = Some(timeout);
        }

        let client = Client::with_options(options).map_err(|e| {
            DatabaseError::connection_failed(format!("failed to create client: {}", e))
        })?;
        let store = Self {
            database: client.database(&config.database),
            client,
        };

        let ping = store.ping();
        let pinged = match config.timeout() {
            Some(timeout) => tokio::time::timeout(timeout, ping).await.map_err(|_| {
                DatabaseError::timeout(DatabaseOperation::Connect, "ping timed out")
            })?,
            None => ping.await,
        };
        pinged.map_err(|e| {
            DatabaseError::connection_failed(format!(
                "failed to reach MongoDB at '{}': {}",
                url_safe, e.message
            ))
        })?;

        tracing::info!(
            "MongoDB connected: url={}, db={}",
            url_safe,
            config.database
        );
        Ok(store)
    }

    /// Underlying driver client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    type Session = ClientSession;

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| map_error(DatabaseOperation::Connect, e))?;
        Ok(())
    }

    async fn start_session(&self) -> StoreResult<ClientSession> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| map_error(DatabaseOperation::Transaction, e))?;
        session
            .start_transaction()
            .await
            .map_err(|e| map_error(DatabaseOperation::Transaction, e))?;
        Ok(session)
    }

    async fn commit_session(&self, mut session: ClientSession) -> StoreResult<()> {
        session
            .commit_transaction()
            .await
            .map_err(|e| map_error(DatabaseOperation::Transaction, e))
    }

    async fn abort_session(&self, mut session: ClientSession) -> StoreResult<()> {
        session
            .abort_transaction()
            .await
            .map_err(|e| map_error(DatabaseOperation::Transaction, e))
    }

    async fn find(
        &self,
        session: Option<&mut ClientSession>,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let mut action = self.collection(collection).find(filter);
        if let Some(sort) = options.sort {
            action = action.sort(sort);
        }
        if let Some(skip) = options.skip {
            action = action.skip(skip);
        }
        if let Some(limit) = options.limit.filter(|n| *n > 0) {
            action = action.limit(limit);
        }
        let map = |e: mongodb::error::Error| map_error(DatabaseOperation::Query, e);

        match session {
            Some(session) => {
                let mut cursor = action.session(&mut *session).await.map_err(map)?;
                let mut docs = Vec::new();
                while let Some(doc) = cursor.next(&mut *session).await {
                    docs.push(doc.map_err(map)?);
                }
                Ok(docs)
            }
            None => {
                let cursor = action.await.map_err(map)?;
                cursor.try_collect().await.map_err(map)
            }
        }
    }

    async fn find_one(
        &self,
        session: Option<&mut ClientSession>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<Option<Document>> {
        let action = self.collection(collection).find_one(filter);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };
        result.map_err(|e| map_error(DatabaseOperation::Query, e))
    }

    async fn count(
        &self,
        session: Option<&mut ClientSession>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<u64> {
        let action = self.collection(collection).count_documents(filter);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };
        result.map_err(|e| map_error(DatabaseOperation::Query, e))
    }

    async fn insert_one(
        &self,
        session: Option<&mut ClientSession>,
        collection: &str,
        document: Document,
    ) -> StoreResult<()> {
        let action = self.collection(collection).insert_one(document);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };
        result
            .map(|_| ())
            .map_err(|e| map_error(DatabaseOperation::Insert, e))
    }

    async fn insert_many(
        &self,
        session: Option<&mut ClientSession>,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<u64> {
        let action = self
            .collection(collection)
            .insert_many(documents)
            .ordered(false);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };
        result
            .map(|r| r.inserted_ids.len() as u64)
            .map_err(|e| map_error(DatabaseOperation::Insert, e))
    }

    async fn find_one_and_update(
        &self,
        session: Option<&mut ClientSession>,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<Option<Document>> {
        let action = self
            .collection(collection)
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };
        result.map_err(|e| map_error(DatabaseOperation::Update, e))
    }

    async fn find_one_and_delete(
        &self,
        session: Option<&mut ClientSession>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<Option<Document>> {
        let action = self.collection(collection).find_one_and_delete(filter);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };
        result.map_err(|e| map_error(DatabaseOperation::Delete, e))
    }

    async fn delete_one(
        &self,
        session: Option<&mut ClientSession>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<u64> {
        let action = self.collection(collection).delete_one(filter);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };
        result
            .map(|r| r.deleted_count)
            .map_err(|e| map_error(DatabaseOperation::Delete, e))
    }

    async fn update_many(
        &self,
        session: Option<&mut ClientSession>,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<UpdateOutcome> {
        let action = self.collection(collection).update_many(filter, update);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };
        result
            .map(|r| UpdateOutcome {
                matched: r.matched_count,
                modified: r.modified_count,
            })
            .map_err(|e| map_error(DatabaseOperation::Update, e))
    }

    async fn bulk_write(
        &self,
        session: Option<&mut ClientSession>,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> StoreResult<BulkWriteOutcome> {
        let namespace = self.collection(collection).namespace();
        let models: Vec<mongodb::options::WriteModel> = models
            .into_iter()
            .map(|model| match model {
                WriteModel::InsertOne { document } => mongodb::options::WriteModel::InsertOne(
                    InsertOneModel::builder()
                        .namespace(namespace.clone())
                        .document(document)
                        .build(),
                ),
                WriteModel::UpdateOne { filter, update } => {
                    mongodb::options::WriteModel::UpdateOne(
                        UpdateOneModel::builder()
                            .namespace(namespace.clone())
                            .filter(filter)
                            .update(UpdateModifications::Document(update))
                            .build(),
                    )
                }
                WriteModel::DeleteOne { filter } => mongodb::options::WriteModel::DeleteOne(
                    DeleteOneModel::builder()
                        .namespace(namespace.clone())
                        .filter(filter)
                        .build(),
                ),
            })
            .collect();

        let action = self.client.bulk_write(models).ordered(false);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };
        let summary = result.map_err(|e| map_error(DatabaseOperation::BulkWrite, e))?;

        Ok(BulkWriteOutcome {
            inserted: u64::try_from(summary.inserted_count).unwrap_or(0),
            matched: u64::try_from(summary.matched_count).unwrap_or(0),
            modified: u64::try_from(summary.modified_count).unwrap_or(0),
            deleted: u64::try_from(summary.deleted_count).unwrap_or(0),
        })
    }

    async fn create_unique_index(&self, collection: &str, field: &str) -> StoreResult<()> {
        let mut keys = Document::new();
        keys.insert(field, 1);
        let index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection(collection)
            .create_index(index)
            .await
            .map(|_| ())
            .map_err(|e| map_error(DatabaseOperation::Index, e).add_context(field.to_string()))
    }
}
