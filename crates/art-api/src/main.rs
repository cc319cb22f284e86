//! Smoke run against a configured engine
//!
//! `art <run.yaml> [collection]` logs in, lists the collection and logs out.

use anyhow::{Context, Result};
use art_api::{get_api, init_logging, GetTarget, OpOptions, Schema};
use art_config::RunOptions;
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<()> {
    init_logging()?;

    let mut args = std::env::args().skip(1);
    let config = args
        .next()
        .map(PathBuf::from)
        .context("usage: art <run.yaml> [collection]")?;
    let collection = args.next().unwrap_or_else(|| "vms".to_string());

    let options = RunOptions::load(&config)
        .with_context(|| format!("loading {}", config.display()))?;
    let options = art_config::init(options)?;
    info!(engine = %options.engine, url = %options.api.base_url(), "Starting smoke run");

    let schema = match &options.validation.schema_path {
        Some(path) => Schema::install_from_file(path)?,
        None => Schema::shared()?,
    };
    let element = schema
        .collection_item(&collection)
        .with_context(|| format!("unknown collection '{collection}'"))?
        .to_string();

    let api = get_api(&element, &collection)?;
    api.login()?;
    let entities = api
        .get(&GetTarget::collection(&collection), &OpOptions::new())?
        .into_list();
    for entity in &entities {
        info!(
            id = entity.id().unwrap_or("-"),
            name = entity.name().unwrap_or("-"),
            "{element}"
        );
    }
    info!(count = entities.len(), collection = %collection, "Listed");

    api.logout()?;
    Ok(())
}
