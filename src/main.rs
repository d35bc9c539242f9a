mod api;
mod cli;
mod input;
mod session;
mod settings;
mod theme;
mod tui;

use anyhow::{Context, Result};
use api::{RobotClient, RobotCommand};
use clap::Parser;
use cli::{Cli, Command};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Tui) => {
            tui::run_tui().await?;
        }
        Some(Command::Send(args)) => {
            let client = client_for(&args.target)?;
            client.send_command(args.command).await?;
            println!("Sent '{}' to the robot.", args.command);

            match args.hold_ms {
                Some(hold_ms) if args.command.is_directional() => {
                    tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                    client.send_command(RobotCommand::Stop).await?;
                    println!("Sent 'stop' after {hold_ms} ms.");
                }
                Some(_) => {
                    eprintln!("Warning: --hold-ms only applies to directional commands, ignored.");
                }
                None => {}
            }
        }
        Some(Command::Mode(args)) => {
            let client = client_for(&args.target)?;
            client.set_mode(args.mode).await?;
            println!("Robot mode set to '{}'.", args.mode);
        }
        Some(Command::Test(args)) => {
            let client = client_for(&args.target)?;
            let state = session::SessionState::new();
            session::run_connection_test(&client, &state).await;
            let snapshot = state.snapshot();

            if args.json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("robot:  {}", snapshot.robot.label());
                println!("camera: {}", snapshot.camera.label());
            }
        }
        Some(Command::Devices(args)) => {
            run_devices(&args)?;
        }
    }

    Ok(())
}

fn client_for(target: &cli::TargetArgs) -> Result<RobotClient> {
    let stored = match settings::load_settings() {
        Ok(stored) => stored,
        Err(err) => {
            eprintln!("Warning: {err:#}");
            settings::DeviceSettings::default()
        }
    };

    let robot = target
        .robot
        .as_deref()
        .and_then(settings::normalize_address)
        .or(stored.robot_addr);
    let camera = target
        .camera
        .as_deref()
        .and_then(settings::normalize_address)
        .or(stored.camera_addr);
    RobotClient::new(robot, camera)
}

fn run_devices(args: &cli::DevicesArgs) -> Result<()> {
    if args.clear {
        settings::save_settings(&settings::DeviceSettings::default())
            .context("failed clearing device settings")?;
        println!("Cleared stored device addresses.");
        return Ok(());
    }

    let mut stored = settings::load_settings()?;
    let mut changed = false;
    if let Some(raw) = &args.robot {
        stored.robot_addr = settings::normalize_address(raw);
        changed = true;
    }
    if let Some(raw) = &args.camera {
        stored.camera_addr = settings::normalize_address(raw);
        changed = true;
    }
    if changed {
        settings::save_settings(&stored)?;
        println!(
            "Saved device settings: {}",
            settings::settings_path()?.display()
        );
    }

    println!(
        "robot:  {}",
        stored.robot_addr.as_deref().unwrap_or("(not set)")
    );
    println!(
        "camera: {}",
        stored.camera_addr.as_deref().unwrap_or("(not set)")
    );
    Ok(())
}
