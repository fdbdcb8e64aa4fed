mod acquisition;
mod backend;
mod config;
mod dashboard;
mod error;
mod metrics;
mod peaks;
mod pulse_data;
mod sse;
mod stream;
mod timeseries;
mod visibility;
mod visualization;

use acquisition::{AcquisitionManager, PulseUpdate};
use backend::HttpBackend;
use clap::Parser;
use config::Config;
use crossbeam_channel::Sender;
use dashboard::Dashboard;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use visibility::Visibility;

#[derive(Parser)]
#[command(
    name = "pulse-meter",
    version,
    about = "Live power readout from a light-based energy meter"
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the backend base URL from the config file
    #[arg(long)]
    base_url: Option<String>,
    /// Start in the hidden state
    #[arg(long)]
    hidden: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        log::warn!("{}; using defaults", e);
        Config::default()
    });
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }

    // Acquisition results and host signals all funnel into the dashboard loop
    let (update_sender, update_receiver) = crossbeam_channel::unbounded::<PulseUpdate>();

    let backend = Arc::new(HttpBackend::new(&config));
    let (manager, command_sender) =
        AcquisitionManager::new(config.clone(), backend, update_sender.clone());
    let acquisition = std::thread::spawn(move || manager.run());

    std::thread::spawn(move || read_host_signals(update_sender));

    let initial = if cli.hidden {
        Visibility::Hidden
    } else {
        Visibility::Visible
    };
    Dashboard::new(&config, update_receiver, command_sender, initial).run();

    if acquisition.join().is_err() {
        log::error!("Acquisition thread panicked");
    }
}

/// Host shim: `hidden` / `visible` / `quit` lines on stdin.
fn read_host_signals(sender: Sender<PulseUpdate>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match parse_host_line(&line) {
            Some(update) => {
                if sender.send(update).is_err() {
                    return;
                }
            }
            None if line.trim().is_empty() => {}
            None => log::warn!("Unknown host signal {:?} (expected hidden, visible or quit)", line.trim()),
        }
    }
}

fn parse_host_line(line: &str) -> Option<PulseUpdate> {
    match line.trim() {
        "quit" | "exit" => Some(PulseUpdate::Shutdown),
        other => other.parse::<Visibility>().ok().map(PulseUpdate::Visibility),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_line() {
        assert_eq!(
            parse_host_line("hidden"),
            Some(PulseUpdate::Visibility(Visibility::Hidden))
        );
        assert_eq!(
            parse_host_line(" visible \n"),
            Some(PulseUpdate::Visibility(Visibility::Visible))
        );
        assert_eq!(parse_host_line("quit"), Some(PulseUpdate::Shutdown));
        assert_eq!(parse_host_line("reload"), None);
    }

    #[test]
    fn test_cli_args() {
        let cli = Cli::parse_from(["pulse-meter", "--base-url", "http://meter.local", "--hidden"]);
        assert_eq!(cli.base_url.as_deref(), Some("http://meter.local"));
        assert!(cli.hidden);
        assert!(cli.config.is_none());
    }
}
