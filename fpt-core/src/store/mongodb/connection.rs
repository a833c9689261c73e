//! MongoDB client construction and connection-string handling.
//!
//! Connection strings are never logged or echoed verbatim; every error path
//! goes through [`redact_store_url`].

use super::MongoStore;
use crate::Result;
use crate::error::{FptError, redact_store_url};
use mongodb::Client;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use std::time::Duration;
use url::Url;

/// Connect and server-selection timeout applied when the URL sets none.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

impl MongoStore {
    /// Creates a store from a connection string.
    ///
    /// The database comes from the URL path; when the URL names none,
    /// `fallback_database` (the project id) is used.
    ///
    /// # Errors
    /// Returns a configuration error when the URL is malformed or no database
    /// name can be determined. Creating the client does not contact the
    /// server; use [`test_connection`](crate::store::DocumentStore::test_connection).
    pub async fn new(connection_string: &str, fallback_database: &str) -> Result<Self> {
        validate_connection_string(connection_string)?;

        let options = create_client_options(connection_string).await?;
        let database = options
            .default_database
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| Some(fallback_database.to_string()).filter(|name| !name.is_empty()))
            .ok_or_else(|| {
                FptError::configuration(
                    "No database in MongoDB URL and no project id configured. \
                     Use mongodb://host:port/database_name or set a project id.",
                )
            })?;

        let client = Client::with_options(options).map_err(|e| {
            FptError::store_unavailable(
                format!(
                    "Failed to create MongoDB client for {}",
                    redact_store_url(connection_string)
                ),
                e,
            )
        })?;

        tracing::debug!(database = %database, "Created MongoDB client");

        Ok(Self { client, database })
    }

    /// Pings the server.
    pub(super) async fn ping(&self) -> Result<()> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| FptError::store_unavailable("MongoDB ping failed", e))?;
        Ok(())
    }
}

/// Validates the scheme and host of a MongoDB connection string.
///
/// # Errors
/// Returns a configuration error for non-MongoDB schemes or a missing host.
pub fn validate_connection_string(connection_string: &str) -> Result<()> {
    let url = Url::parse(connection_string).map_err(|e| {
        FptError::configuration(format!("Invalid MongoDB connection string format: {}", e))
    })?;

    if !matches!(url.scheme(), "mongodb" | "mongodb+srv") {
        return Err(FptError::configuration(
            "Connection string must use mongodb:// or mongodb+srv:// scheme",
        ));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(FptError::configuration(
            "Connection string must specify a host",
        ));
    }

    Ok(())
}

async fn create_client_options(connection_string: &str) -> Result<ClientOptions> {
    let mut options = ClientOptions::parse(connection_string).await.map_err(|e| {
        FptError::configuration(format!(
            "Failed to parse MongoDB connection options for {}: {}",
            redact_store_url(connection_string),
            e
        ))
    })?;

    options.connect_timeout.get_or_insert(DEFAULT_TIMEOUT);
    options.server_selection_timeout.get_or_insert(DEFAULT_TIMEOUT);
    options.app_name = Some(format!("fpt-{}", env!("CARGO_PKG_VERSION")));

    Ok(options)
}
