//! Opening and initialising the application's SQLite database.

use std::{path::Path, time::Duration};

use rusqlite::Connection;

use crate::{Error, expense::create_expense_table};

/// How long a connection waits for another connection's write lock before
/// giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection to the database file at `path`, creating it if needed.
///
/// Several processes may share the same database file, so the connection
/// waits for up to five seconds for the write lock rather than failing
/// immediately.
///
/// # Errors
/// Returns an [Error::SqlError] if the file cannot be opened.
pub fn open_connection(path: impl AsRef<Path>) -> Result<Connection, Error> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;

    Ok(connection)
}

/// Create the tables and indexes for the domain models if they do not exist.
///
/// # Errors
/// Returns an [Error::SqlError] if a table cannot be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction = connection.unchecked_transaction()?;

    create_expense_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
