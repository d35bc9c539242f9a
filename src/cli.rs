use crate::api::{RobotCommand, RobotMode};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ROVER-TUI",
    version,
    about = "Terminal remote control for a Wi-Fi robot rover with camera health checks"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the interactive control center.
    Tui,
    /// Send a single command to the robot.
    Send(SendArgs),
    /// Switch the robot's autonomous driving mode.
    Mode(ModeArgs),
    /// Probe both devices and report their reachability.
    Test(TestArgs),
    /// Show or update the stored device addresses.
    Devices(DevicesArgs),
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Command to send.
    #[arg(value_enum)]
    pub command: RobotCommand,

    /// For directional commands: hold for this many milliseconds, then stop.
    #[arg(long)]
    pub hold_ms: Option<u64>,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Args)]
pub struct ModeArgs {
    /// Mode to activate.
    #[arg(value_enum)]
    pub mode: RobotMode,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Args)]
pub struct TestArgs {
    /// Print machine-readable JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Address overrides for a single invocation. Never persisted.
#[derive(Debug, Args, Default)]
pub struct TargetArgs {
    /// Robot (motion controller) address, overriding the stored one.
    #[arg(long)]
    pub robot: Option<String>,

    /// Camera module address, overriding the stored one.
    #[arg(long)]
    pub camera: Option<String>,
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Store a new robot (motion controller) address. Pass '' to unset.
    #[arg(long)]
    pub robot: Option<String>,

    /// Store a new camera module address. Pass '' to unset.
    #[arg(long)]
    pub camera: Option<String>,

    /// Forget both stored addresses.
    #[arg(long, default_value_t = false, conflicts_with_all = ["robot", "camera"])]
    pub clear: bool,
}
