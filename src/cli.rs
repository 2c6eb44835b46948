// CLI module for starch
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "starch")]
#[command(about = "Server-side tar archiving for S3 object stores")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Concatenate source objects into one tar archive, in place
    Create {
        /// CSV manifest of source objects (bucket,key,size,etag)
        #[arg(long)]
        src_manifest: Option<PathBuf>,
        /// Skip the manifest's first row
        #[arg(long)]
        skip_manifest_header: bool,
        /// Source bucket (with --src-prefix, instead of a manifest)
        #[arg(long)]
        src_bucket: Option<String>,
        /// Archive every object under this source prefix
        #[arg(long)]
        src_prefix: Option<String>,
        /// Destination bucket
        #[arg(long)]
        dst_bucket: String,
        /// Destination key prefix; scratch objects live under it during the run
        #[arg(long, default_value = "")]
        dst_prefix: String,
        /// Final archive key, relative to the destination prefix
        #[arg(long)]
        dst_key: String,
        /// Store region
        #[arg(long)]
        region: Option<String>,
        /// Batch target in MiB for the small-file grouping policy
        #[arg(long, default_value_t = 10)]
        batch_target_mib: u64,
        /// Parallel group assemblies
        #[arg(long, default_value_t = 25)]
        group_concurrency: usize,
        /// Parallel part uploads per multipart upload
        #[arg(long, default_value_t = 100)]
        part_concurrency: usize,
    },
}
