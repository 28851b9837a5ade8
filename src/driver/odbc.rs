use super::{Driver, DriverConnection, DriverCursor, DriverError};
use async_trait::async_trait;
use odbc_api::handles::State;
use odbc_api::{Connection, ConnectionOptions, Environment};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, warn};

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment, DriverError> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new()?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

impl From<odbc_api::Error> for DriverError {
    fn from(e: odbc_api::Error) -> Self {
        let sqlstate = match &e {
            odbc_api::Error::Diagnostics { record, .. } => Some(record.state.as_str().to_string()),
            _ => None,
        };
        DriverError {
            message: e.to_string(),
            sqlstate,
        }
    }
}

/// Driver backed by the system ODBC driver manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct OdbcDriver;

#[async_trait]
impl Driver for OdbcDriver {
    type Connection = OdbcConnection;

    async fn connect(&self, connection_string: &str) -> Result<OdbcConnection, DriverError> {
        let connection_string = connection_string.to_owned();
        tokio::task::spawn_blocking(move || -> Result<OdbcConnection, DriverError> {
            let env = environment()?;
            let conn = env
                .connect_with_connection_string(&connection_string, ConnectionOptions::default())?;
            // Work stays pending until the session commits on release.
            conn.set_autocommit(false)?;
            debug!("ODBC connection established");
            Ok(OdbcConnection {
                inner: Arc::new(Mutex::new(conn)),
            })
        })
        .await
        .map_err(|e| DriverError::new(format!("connect task failed: {e}")))?
    }
}

/// ODBC connection shared with the cursors opened on it.
pub struct OdbcConnection {
    inner: Arc<Mutex<Connection<'static>>>,
}

impl DriverConnection for OdbcConnection {
    type Cursor = OdbcCursor;

    fn cursor(&self) -> Result<OdbcCursor, DriverError> {
        Ok(OdbcCursor {
            connection: Arc::clone(&self.inner),
        })
    }

    fn close(self) -> Result<(), DriverError> {
        let conn = Arc::try_unwrap(self.inner)
            .map_err(|_| DriverError::new("ODBC connection still shared by an open cursor"))?
            .into_inner()
            .map_err(|_| DriverError::new("ODBC connection lock poisoned"))?;
        disconnect(conn)?;
        debug!("ODBC connection closed");
        Ok(())
    }
}

/// Disconnect explicitly so a failure is returned instead of panicking in
/// `Connection::drop`.
fn disconnect(conn: Connection<'static>) -> Result<(), odbc_api::Error> {
    let mut handle = conn.into_handle();
    let mut result = handle.disconnect().into_result(&handle);
    if let Err(e) = &result
        && needs_rollback(e)
    {
        if let Err(rollback) = handle.rollback().into_result(&handle) {
            warn!(error = %rollback, "rollback before disconnect failed");
        }
        result = handle.disconnect().into_result(&handle);
    }
    if result.is_err() {
        // Freeing a handle that is still connected panics; leak it instead.
        std::mem::forget(handle);
    }
    result
}

/// Disconnect refuses while a transaction is open (SQLSTATE 25000).
fn needs_rollback(e: &odbc_api::Error) -> bool {
    matches!(
        e,
        odbc_api::Error::Diagnostics { record, .. } if record.state == State::INVALID_STATE_TRANSACTION
    )
}

/// Statement side of an ODBC connection.
pub struct OdbcCursor {
    connection: Arc<Mutex<Connection<'static>>>,
}

impl OdbcCursor {
    /// Run `f` against the underlying connection, e.g. to execute statements.
    pub fn with_connection<R>(
        &self,
        f: impl FnOnce(&Connection<'static>) -> R,
    ) -> Result<R, DriverError> {
        let guard = lock(&self.connection)?;
        Ok(f(&guard))
    }
}

impl DriverCursor for OdbcCursor {
    fn commit(&mut self) -> Result<(), DriverError> {
        lock(&self.connection)?.commit()?;
        Ok(())
    }

    fn close(self) -> Result<(), DriverError> {
        drop(self.connection);
        Ok(())
    }
}

fn lock<'a>(
    conn: &'a Mutex<Connection<'static>>,
) -> Result<MutexGuard<'a, Connection<'static>>, DriverError> {
    conn.lock()
        .map_err(|_| DriverError::new("ODBC connection lock poisoned"))
}
