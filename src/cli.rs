use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use resmgr::ExistingProfile;

#[derive(Parser)]
#[command(name = "tierctl")]
#[command(version)]
#[command(about = "Tiered CDB resource plans and lockdown profiles", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Policy file (overrides the config file setting)
    #[arg(short, long, global = true, env = "TIERCTL_POLICY")]
    pub policy: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate the policy file without touching the database
    Validate,

    /// Show drift between the policy and the live catalog
    Diff,

    /// Apply the resource plan and lockdown profiles
    Apply(ApplyArgs),

    /// Show known plans and the active resource-manager plan
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Set the plan as the active resource-manager plan after submit
    #[arg(long)]
    pub activate: bool,

    /// Don't issue any external call, just show what would happen
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Skip lockdown profile application
    #[arg(long)]
    pub skip_lockdown: bool,

    /// What to do when a lockdown profile already exists
    #[arg(long, value_enum, default_value_t = OnExistingProfile::Skip)]
    pub on_existing_profile: OnExistingProfile,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OnExistingProfile {
    /// Fail if the profile exists
    Error,
    /// Keep the profile, add missing rules only
    Skip,
    /// Drop and recreate the profile
    Replace,
}

impl std::fmt::Display for OnExistingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Skip => "skip",
            Self::Replace => "replace",
        };
        f.write_str(s)
    }
}

impl From<OnExistingProfile> for ExistingProfile {
    fn from(v: OnExistingProfile) -> Self {
        match v {
            OnExistingProfile::Error => Self::Error,
            OnExistingProfile::Skip => Self::Skip,
            OnExistingProfile::Replace => Self::Replace,
        }
    }
}
