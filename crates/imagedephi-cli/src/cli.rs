use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command line client for imagedephi item annotations
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub cmd: OptsCmd,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server URL, overrides the configured one
    #[arg(env = "IMAGEDEPHI_URL", long, global = true)]
    pub url: Option<String>,

    /// Directory for the session cookie file
    #[arg(env = "IMAGEDEPHI_DATA_DIR", long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum OptsCmd {
    /// Log in and store the session token
    Login {
        #[arg(env = "IMAGEDEPHI_USERNAME", long, short)]
        username: Option<String>,
    },
    /// Forget the stored session and revoke its token
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Print an item's tile metadata
    Tiles { item_id: String },
    /// Print an item's redaction annotations as GeoJSON
    Geojson { item_id: String },
    /// List the associated images of an item
    Images { item_id: String },
    /// Replace an item's annotations with the GeoJSON keyspace in a file
    PutGeojson { item_id: String, file: PathBuf },
}

impl OptsCmd {
    /// Whether the stored session should be revalidated before running.
    pub fn needs_session(&self) -> bool {
        !matches!(self, OptsCmd::Login { .. } | OptsCmd::Logout)
    }
}
