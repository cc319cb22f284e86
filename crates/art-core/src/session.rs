//! Process-wide session cache, one logged-in session per engine kind
//!
//! This is the single piece of intentional global state: adapters share the
//! session of their engine so every test does not log in again. Call
//! [`forget`] (normally through an adapter's `logout`) to reset it.

use crate::backend::BackendKind;
use crate::error::{ApiError, ApiResult};
use dashmap::DashMap;
use std::any::Any;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

type AnySession = Arc<dyn Any + Send + Sync>;

static SESSIONS: OnceLock<DashMap<BackendKind, AnySession>> = OnceLock::new();

fn sessions() -> &'static DashMap<BackendKind, AnySession> {
    SESSIONS.get_or_init(DashMap::new)
}

/// Return the cached session for `kind`, logging in first if there is none.
///
/// `login` runs with no lock held on the cache. When two callers race, the
/// first session stored wins and the other is dropped.
pub fn get_or_login<S, F>(kind: BackendKind, login: F) -> ApiResult<Arc<S>>
where
    S: Any + Send + Sync,
    F: FnOnce() -> ApiResult<S>,
{
    let cached = sessions().get(&kind).map(|entry| entry.value().clone());
    if let Some(session) = cached {
        return downcast(kind, session);
    }

    info!(engine = %kind, "Opening session");
    let fresh = Arc::new(login()?) as AnySession;
    let session = sessions().entry(kind).or_insert(fresh).value().clone();
    downcast(kind, session)
}

/// The cached session for `kind`, if one is open
pub fn current<S>(kind: BackendKind) -> ApiResult<Option<Arc<S>>>
where
    S: Any + Send + Sync,
{
    let session = sessions().get(&kind).map(|entry| entry.value().clone());
    session.map(|s| downcast(kind, s)).transpose()
}

/// Drop the cached session for `kind`, returning it if it was open
pub fn forget<S>(kind: BackendKind) -> ApiResult<Option<Arc<S>>>
where
    S: Any + Send + Sync,
{
    match sessions().remove(&kind) {
        Some((_, session)) => {
            debug!(engine = %kind, "Forgot session");
            downcast(kind, session).map(Some)
        }
        None => Ok(None),
    }
}

/// Drop every cached session
pub fn forget_all() {
    sessions().clear();
}

pub fn is_open(kind: BackendKind) -> bool {
    sessions().contains_key(&kind)
}

fn downcast<S>(kind: BackendKind, session: AnySession) -> ApiResult<Arc<S>>
where
    S: Any + Send + Sync,
{
    session.downcast::<S>().map_err(|_| {
        ApiError::Session(format!(
            "session cached for {} is not a {}",
            kind,
            std::any::type_name::<S>()
        ))
    })
}
