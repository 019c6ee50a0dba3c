// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: One subcommand per site lifecycle operation plus config scaffolding.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "siteforge")]
#[command(about = "Provision, update and tear down router sites on Docker and Podman")]
#[command(version)]
pub struct Cli {
    /// Site file; searched for in the current directory when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Runtime socket, overriding the site file and the recorded endpoint
    #[arg(long, global = true, value_name = "SOCKET")]
    pub endpoint: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// JSON lines output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Change nothing: create runs against an in-memory runtime, update and
    /// delete only report what they would do
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a new siteforge.yml in the current directory
    Init {
        /// Site name
        #[arg(short, long)]
        name: Option<String>,

        /// Router image reference
        #[arg(long)]
        router_image: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Create the site described by the site file
    Create,

    /// Show the site as found in the runtime
    Status,

    /// Remove every resource of the site
    Delete,

    /// Migrate the site to this release
    Update {
        /// Abort between tasks once this much time has passed (e.g. 90s, 10m)
        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        timeout: Option<Duration>,
    },

    /// Reissue the site CA and server credential and restart the router,
    /// invalidating every link issued so far
    RevokeAccess,
}
