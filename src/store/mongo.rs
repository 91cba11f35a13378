use super::{IndexSpec, SchemaStore, StoreError};
use crate::config::MongoSettings;
use crate::migration::{MigrationRecord, RunState};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, Credential, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{debug, info};

/// Server error codes the engine distinguishes.
const NAMESPACE_NOT_FOUND: i32 = 26;
const INDEX_NOT_FOUND: i32 = 27;
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const DUPLICATE_KEY: i32 = 11000;

const APP_NAME: &str = "mongo-migrator";

/// [`SchemaStore`] backed by a MongoDB database.
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Connect using the given settings and verify the server answers a ping.
    pub async fn connect(settings: &MongoSettings) -> Result<Self, StoreError> {
        debug!(state = %RunState::Connecting, "Migration run state");
        let mut options = ClientOptions::parse(settings.connection_uri()).await?;
        options.app_name = Some(APP_NAME.to_string());

        if let Some(name) = settings.replica_set_name() {
            options.repl_set_name = Some(name.to_string());
        }

        if settings.username().is_some() || settings.password().is_some() {
            options.credential = Some(
                Credential::builder()
                    .username(settings.username().map(str::to_string))
                    .password(settings.password().map(str::to_string))
                    .source(settings.auth_database().map(str::to_string))
                    .build(),
            );
        }

        let client = Client::with_options(options)?;
        let store = Self::new(client, &settings.database);

        store
            .database
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        info!(target = %settings.redacted(), "Connected to MongoDB");

        Ok(store)
    }

    /// Wrap an already configured client.
    pub fn new(client: Client, database_name: &str) -> Self {
        let database = client.database(database_name);
        Self { client, database }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    fn records(&self, name: &str) -> Collection<MigrationRecord> {
        self.database.collection(name)
    }
}

fn server_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        _ => None,
    }
}

fn index_model(index: &IndexSpec) -> IndexModel {
    let mut keys = Document::new();
    for (field, direction) in &index.keys {
        keys.insert(field.clone(), direction.as_i32());
    }

    let mut options = IndexOptions::builder().name(index.name.clone()).build();
    if index.unique {
        options.unique = Some(true);
    }
    if index.sparse {
        options.sparse = Some(true);
    }

    IndexModel::builder().keys(keys).options(options).build()
}

#[async_trait]
impl SchemaStore for MongoStore {
    fn describe(&self) -> String {
        format!("mongodb database {}", self.database.name())
    }

    async fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        let names = self
            .database
            .list_collection_names(doc! { "name": name })
            .await?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        match self.database.create_collection(name, None).await {
            Ok(()) => Ok(()),
            Err(e) if server_code(&e) == Some(NAMESPACE_EXISTS) => {
                Err(StoreError::CollectionExists(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        match self.collection(name).drop(None).await {
            Ok(()) => Ok(()),
            Err(e) if server_code(&e) == Some(NAMESPACE_NOT_FOUND) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn index_names(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        match self.collection(collection).list_index_names().await {
            Ok(names) => Ok(names),
            Err(e) if server_code(&e) == Some(NAMESPACE_NOT_FOUND) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        debug!(collection, index = %index.name, "Creating index");
        match self
            .collection(collection)
            .create_index(index_model(index), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => match server_code(&e) {
                Some(INDEX_OPTIONS_CONFLICT) | Some(INDEX_KEY_SPECS_CONFLICT) => {
                    Err(StoreError::IndexConflict {
                        collection: collection.to_string(),
                        index: index.name.clone(),
                        reason: e.to_string(),
                    })
                }
                Some(DUPLICATE_KEY) => Err(StoreError::DuplicateKey(e.to_string())),
                _ => Err(e.into()),
            },
        }
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError> {
        match self.collection(collection).drop_index(name, None).await {
            Ok(()) => Ok(()),
            Err(e) => match server_code(&e) {
                Some(INDEX_NOT_FOUND) => Err(StoreError::IndexNotFound {
                    collection: collection.to_string(),
                    index: name.to_string(),
                }),
                Some(NAMESPACE_NOT_FOUND) => {
                    Err(StoreError::CollectionNotFound(collection.to_string()))
                }
                _ => Err(e.into()),
            },
        }
    }

    async fn find_records(&self, collection: &str) -> Result<Vec<MigrationRecord>, StoreError> {
        let cursor = self.records(collection).find(None, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_record(
        &self,
        collection: &str,
        record: &MigrationRecord,
    ) -> Result<(), StoreError> {
        match self.records(collection).insert_one(record, None).await {
            Ok(_) => Ok(()),
            Err(e) if server_code(&e) == Some(DUPLICATE_KEY) => {
                Err(StoreError::DuplicateKey(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_record(&self, collection: &str, identifier: &str) -> Result<u64, StoreError> {
        let result = self
            .records(collection)
            .delete_one(doc! { "identifier": identifier }, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn shutdown(&self) {
        // Client is an Arc internally; shutting down a clone closes the shared pool.
        self.client.clone().shutdown().await;
    }
}
