use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(version, about = "Virtual disks and an ext2-like filesystem inside flat files")]
pub struct Cli {
    /// Script to execute line by line; commands are read from stdin when absent
    #[arg(long, short)]
    pub script: Option<PathBuf>,

    /// Prefix of every mount id
    #[arg(long, env = "MIA_OPERATOR_ID", default_value = mia_fs::DEFAULT_OPERATOR_ID)]
    pub operator_id: String,
}
