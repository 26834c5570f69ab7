use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("player command is empty")]
    EmptyCommand,
    #[error("album has no tracks")]
    NoTracks,
    #[error("failed to run player: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("player exited with {0}")]
    Exit(ExitStatus),
}

/// Where the player's output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerOutput {
    /// Spawn and return immediately.
    Detached,
    /// Relay stdout line by line and wait for exit.
    Stdout,
    /// Relay stderr line by line and wait for exit.
    Stderr,
    /// Write stdout and stderr to a timestamped file in this directory and wait for exit.
    LogFile(PathBuf),
}

/// Build the player invocation: the command template split on whitespace,
/// followed by the track paths in playback order.
pub fn build_command(exec_cmd: &str, paths: &[String]) -> Result<Command, PlayerError> {
    let mut parts = exec_cmd.split_whitespace();
    let program = parts.next().ok_or(PlayerError::EmptyCommand)?;
    if paths.is_empty() {
        return Err(PlayerError::NoTracks);
    }

    let mut cmd = Command::new(program);
    cmd.args(parts).args(paths);
    Ok(cmd)
}

/// Launch the player on `paths`.
pub fn play(exec_cmd: &str, paths: &[String], output: &PlayerOutput) -> Result<(), PlayerError> {
    let mut cmd = build_command(exec_cmd, paths)?;
    log::info!("Playing {} tracks with {}", paths.len(), exec_cmd);

    match output {
        PlayerOutput::Detached => {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?;
            Ok(())
        }
        PlayerOutput::Stdout => {
            let mut child = cmd.stdout(Stdio::piped()).spawn()?;
            if let Some(out) = child.stdout.take() {
                relay_lines(out)?;
            }
            check_status(child.wait()?)
        }
        PlayerOutput::Stderr => {
            let mut child = cmd.stderr(Stdio::piped()).spawn()?;
            if let Some(err) = child.stderr.take() {
                relay_lines(err)?;
            }
            check_status(child.wait()?)
        }
        PlayerOutput::LogFile(dir) => {
            let log_path = log_file_path(dir, chrono::Local::now());
            let file = File::create(&log_path)?;
            log::info!("Player output -> {}", log_path.display());
            let status = cmd
                .stdout(file.try_clone()?)
                .stderr(file)
                .status()?;
            check_status(status)
        }
    }
}

fn relay_lines(stream: impl Read) -> std::io::Result<()> {
    for line in BufReader::new(stream).lines() {
        println!("{}", line?);
    }
    Ok(())
}

fn check_status(status: ExitStatus) -> Result<(), PlayerError> {
    if status.success() {
        Ok(())
    } else {
        Err(PlayerError::Exit(status))
    }
}

fn log_file_path(dir: &Path, now: chrono::DateTime<chrono::Local>) -> PathBuf {
    dir.join(format!(
        "{}_{}.txt",
        crate::APP_NAME,
        now.format("%Y-%m-%d_%H-%M-%S")
    ))
}
