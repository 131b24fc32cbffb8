//! Managed-session scope: one commit, rollback and close per top-level call.
//!
//! # Invariants
//! - An owned session is committed when `work` succeeds, rolled back when it
//!   fails, and closed on every path (unwinding included, via `Drop`).
//! - An inherited session is never committed, rolled back or closed here.
//! - `table` must resolve to an engine before `work` runs.
//! - The error returned by `work` is passed through unchanged.

use super::Session;
use crate::db::DbError;
use crate::manager::Manager;
use log::warn;

/// Runs `work` inside a managed session.
///
/// With `parent = None` a new session is created from `manager` (restricted
/// to `bind` when given) and owned by this scope. With `parent = Some(..)`
/// the caller's session is used and its lifecycle stays with the caller.
///
/// # Errors
/// - `UnknownBind`/`UnmappedTable` before `work` runs.
/// - Whatever `work` returns, after rollback of an owned session.
/// - The commit failure of an owned session, after rollback.
pub fn managed_session<T, E, F>(
    manager: &Manager,
    bind: Option<&str>,
    parent: Option<&mut Session>,
    table: &str,
    work: F,
) -> Result<T, E>
where
    F: FnOnce(&mut Session) -> Result<T, E>,
    E: From<DbError>,
{
    if let Some(session) = parent {
        session.get_bind(table)?;
        return work(session);
    }

    let mut session = manager.create_session(bind)?;
    session.get_bind(table)?;

    let outcome = match work(&mut session) {
        Ok(value) => match session.commit() {
            Ok(()) => Ok(value),
            Err(err) => {
                rollback_quietly(&mut session, table);
                Err(E::from(err))
            }
        },
        Err(err) => {
            rollback_quietly(&mut session, table);
            Err(err)
        }
    };
    session.close();
    outcome
}

fn rollback_quietly(session: &mut Session, table: &str) {
    if let Err(err) = session.rollback() {
        warn!(
            "event=scope_rollback module=session status=error session_id={} table={} error={}",
            session.id(),
            table,
            err
        );
    }
}
