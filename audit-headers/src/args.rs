use std::path::PathBuf;

use clap::Parser;

/// Keeps track of which request headers end up in audit logs and hashes the sensitive ones
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file that contains needed information to start audit-headers.
    #[arg(short, long)]
    pub config_file: PathBuf,
}
