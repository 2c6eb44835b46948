// Command execution router for starch

pub mod create;

use crate::cli::Commands;

/// Execute the specified command by routing to appropriate handler
pub async fn execute_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Create {
            src_manifest,
            skip_manifest_header,
            src_bucket,
            src_prefix,
            dst_bucket,
            dst_prefix,
            dst_key,
            region,
            batch_target_mib,
            group_concurrency,
            part_concurrency,
        } => {
            let config = crate::config::RunConfig {
                src_manifest,
                skip_manifest_header,
                src_bucket,
                src_prefix,
                dst_bucket,
                dst_prefix,
                dst_key,
                region,
                batch_target_mib,
                group_concurrency,
                part_concurrency,
            };
            create::handle_create(config).await
        }
    }
}
