//! Key command - print the cache key of a Dockerfile

use super::open_cache;
use crate::cache::CacheKey;
use crate::cli::args::{KeyArgs, OutputFormat};
use crate::config::Config;
use crate::error::BerthResult;

/// Execute the key command
pub async fn execute(args: KeyArgs, config: &Config) -> BerthResult<()> {
    let cache = open_cache(&args.dockerfile, config)?;
    let key = if args.export {
        cache.export_key(&args.dockerfile)?
    } else {
        cache.image_key(&args.dockerfile)?
    };
    println!("{}", render(&key, args.format)?);
    Ok(())
}

fn render(key: &CacheKey, format: OutputFormat) -> BerthResult<String> {
    match format {
        OutputFormat::Plain => Ok(key.reference.clone()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(key)?),
    }
}
