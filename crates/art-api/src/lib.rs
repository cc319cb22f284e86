//! Engine API facade
//!
//! Test code asks for an adapter by element and collection name and gets
//! whichever engine the run options select:
//!
//! ```ignore
//! use art_api::{get_api, OpOptions};
//!
//! let vms = get_api("vm", "vms")?;
//! let vm = vms.find("vm1", "name", &OpOptions::new())?;
//! ```

use art_cli::CliBackend;
use art_config::RunOptions;
use art_rest::RestBackend;
use art_sdk::SdkBackend;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use art_core::{
    ApiError, ApiResult, Backend, BackendKind, Entity, EntityKind, Fetched, GetTarget, OpOptions,
    Outcome, Schema, Value,
};

/// Adapter for `element`/`collection` on the engine named by the process-wide options
pub fn get_api(element: &str, collection: &str) -> ApiResult<Box<dyn Backend>> {
    let options = art_config::options().map_err(|err| ApiError::Session(err.to_string()))?;
    get_api_with(element, collection, options)
}

/// Adapter for `element`/`collection` on the engine named by `options`
pub fn get_api_with(
    element: &str,
    collection: &str,
    options: Arc<RunOptions>,
) -> ApiResult<Box<dyn Backend>> {
    let schema = match &options.validation.schema_path {
        Some(path) => Schema::install_from_file(path)?,
        None => Schema::shared()?,
    };
    let kind = schema.entity_kind(element, collection)?;
    debug!(engine = %options.engine, element, collection, "Selecting adapter");

    let backend: Box<dyn Backend> = match options.engine {
        BackendKind::Rest => Box::new(RestBackend::new(kind, options, schema)),
        BackendKind::Cli => Box::new(CliBackend::new(kind, options, schema)),
        BackendKind::Sdk => Box::new(SdkBackend::new(kind, options, schema)),
        BackendKind::Bridged => bridged(kind, options, schema)?,
    };
    Ok(backend)
}

#[cfg(feature = "java")]
fn bridged(
    kind: EntityKind,
    options: Arc<RunOptions>,
    schema: Arc<Schema>,
) -> ApiResult<Box<dyn Backend>> {
    use art_bridge::{BridgeBackend, BridgeRuntime, JpypeRuntime};
    use std::sync::OnceLock;

    static RUNTIME: OnceLock<Arc<dyn BridgeRuntime>> = OnceLock::new();

    let runtime = match RUNTIME.get() {
        Some(runtime) => runtime.clone(),
        None => {
            let started: Arc<dyn BridgeRuntime> =
                Arc::new(JpypeRuntime::start(&options).map_err(ApiError::from)?);
            RUNTIME.get_or_init(|| started).clone()
        }
    };
    Ok(Box::new(BridgeBackend::new(kind, options, schema, runtime)))
}

#[cfg(not(feature = "java"))]
fn bridged(
    _kind: EntityKind,
    _options: Arc<RunOptions>,
    _schema: Arc<Schema>,
) -> ApiResult<Box<dyn Backend>> {
    Err(ApiError::unsupported(
        BackendKind::Bridged,
        "built without the `java` feature",
    ))
}

/// Close the shared session of the configured engine
pub fn logout() -> ApiResult<bool> {
    let options = art_config::options().map_err(|err| ApiError::Session(err.to_string()))?;
    logout_with(options)
}

pub fn logout_with(options: Arc<RunOptions>) -> ApiResult<bool> {
    get_api_with("vm", "vms", options)?.logout()
}

/// Install the fmt subscriber; `RUST_LOG` overrides the `info` default
pub fn init_logging() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}
