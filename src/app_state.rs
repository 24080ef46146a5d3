//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{Error, db::initialize, expense::QueryConfig};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The config that controls how expense listings are limited.
    pub query_config: QueryConfig,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_connection: Connection, query_config: QueryConfig) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            query_config,
            db_connection: Arc::new(Mutex::new(db_connection)),
        })
    }
}
