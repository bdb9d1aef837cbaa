//! Error type for `ident-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown link precedence: {0:?}")]
  UnknownPrecedence(String),
}

impl Error {
  /// Whether SQLite refused the statement because another connection holds
  /// the lock.
  fn is_busy(&self) -> bool {
    let sqlite = match self {
      Error::Sqlite(e) | Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => e,
      _ => return false,
    };
    matches!(
      sqlite.sqlite_error_code(),
      Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
  }
}

impl From<Error> for ident_core::Error {
  fn from(e: Error) -> Self {
    if e.is_busy() {
      ident_core::Error::ConcurrencyConflict(e.to_string())
    } else {
      ident_core::Error::Store(Box::new(e))
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
