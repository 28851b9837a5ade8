use super::{DriverConnection, DriverCursor, DriverError};
use tracing::{debug, error, info, warn};

/// Result of a release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Commit and both closes were issued.
    Released,
    /// The session had been released before; nothing was sent to the driver.
    AlreadyReleased,
}

/// A connection and the cursor opened on it, released together exactly once.
///
/// Release order is commit, cursor close, connection close. Each step runs
/// even when an earlier one fails; the first failure is returned. Dropping an
/// unreleased session releases it and logs any failure.
pub struct Session<C: DriverConnection> {
    connection: Option<C>,
    cursor: Option<C::Cursor>,
    released: bool,
}

impl<C: DriverConnection> Session<C> {
    /// Open a cursor on `connection`. The connection is closed again if that fails.
    pub fn open(connection: C) -> Result<Self, DriverError> {
        match connection.cursor() {
            Ok(cursor) => {
                debug!("Cursor opened");
                Ok(Self {
                    connection: Some(connection),
                    cursor: Some(cursor),
                    released: false,
                })
            }
            Err(e) => {
                if let Err(close_err) = connection.close() {
                    warn!(error = %close_err, "closing connection after cursor failure failed");
                }
                Err(e)
            }
        }
    }

    pub fn connection(&self) -> Option<&C> {
        self.connection.as_ref()
    }

    pub fn cursor(&self) -> Option<&C::Cursor> {
        self.cursor.as_ref()
    }

    pub fn cursor_mut(&mut self) -> Option<&mut C::Cursor> {
        self.cursor.as_mut()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn release(&mut self) -> Result<ReleaseOutcome, DriverError> {
        if self.released {
            debug!("Session already released; skipping commit and close");
            return Ok(ReleaseOutcome::AlreadyReleased);
        }
        self.released = true;

        let mut first_err: Option<DriverError> = None;

        if let Some(mut cursor) = self.cursor.take() {
            if let Err(e) = cursor.commit() {
                warn!(error = %e, "commit on release failed");
                keep_first(&mut first_err, e);
            }
            if let Err(e) = cursor.close() {
                warn!(error = %e, "cursor close failed");
                keep_first(&mut first_err, e);
            }
        }

        if let Some(connection) = self.connection.take()
            && let Err(e) = connection.close()
        {
            warn!(error = %e, "connection close failed");
            keep_first(&mut first_err, e);
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                info!("Database session released");
                Ok(ReleaseOutcome::Released)
            }
        }
    }
}

impl<C: DriverConnection> Drop for Session<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.release() {
            error!(error = %e, "releasing database session on drop failed");
        }
    }
}

fn keep_first(slot: &mut Option<DriverError>, e: DriverError) {
    if slot.is_none() {
        *slot = Some(e);
    }
}
