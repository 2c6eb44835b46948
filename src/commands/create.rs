//! Create command handler
//!
//! Validates the run configuration, enumerates the sources, wires up the S3
//! client and hands the run to the engine. Ctrl-C cancels the run through
//! the context's cancellation token.

use crate::config::RunConfig;
use crate::engine::{self, RunContext};
use crate::store::S3Store;
use crate::{listing, manifest};
use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_config::Region;
use log::{info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn handle_create(config: RunConfig) -> Result<()> {
    config.validate()?;

    let region_provider = RegionProviderChain::first_try(
        config.region.clone().map(Region::new),
    )
    .or_default_provider();
    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;
    let store = Arc::new(S3Store::new(aws_sdk_s3::Client::new(&sdk_config)));

    let entries = match (&config.src_manifest, &config.src_bucket, &config.src_prefix) {
        (Some(path), _, _) => {
            info!("loading source manifest {}", path.display());
            manifest::load_csv(path, config.skip_manifest_header)?
        }
        (None, Some(bucket), Some(prefix)) => {
            listing::list_source_entries(store.as_ref(), bucket, prefix).await?
        }
        // validate() has already ruled this out
        _ => unreachable!("validated config names a source"),
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            ctrl_c.cancel();
        }
    });

    let ctx = RunContext::new(
        store,
        config.limits(),
        &config.dst_bucket,
        &config.dst_prefix,
        &config.dst_key,
    )
    .with_cancel(cancel)
    .with_concurrency(config.group_concurrency, config.part_concurrency);

    let final_obj = engine::run(Arc::new(ctx), entries).await?;
    println!(
        "✅ Archive created: s3://{}/{} ({} bytes)",
        final_obj.bucket, final_obj.key, final_obj.size
    );
    Ok(())
}
