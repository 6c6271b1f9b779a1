use std::env;
use std::path::PathBuf;

use riftgate_client::app;
use riftgate_client::settings::{RiftgateSettings, SETTINGS_FILE};

fn main() {
    let mut config_dir = PathBuf::from(".");
    let mut seed: Option<u64> = None;
    let mut write_defaults = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(value) = args.next() else {
                    eprintln!("--config expects a directory argument");
                    std::process::exit(2);
                };
                config_dir = PathBuf::from(value);
            }
            "--seed" => {
                let Some(value) = args.next() else {
                    eprintln!("--seed expects a numeric argument");
                    std::process::exit(2);
                };
                match value.parse::<u64>() {
                    Ok(parsed) => seed = Some(parsed),
                    Err(err) => {
                        eprintln!("invalid seed '{value}': {err}");
                        std::process::exit(2);
                    }
                }
            }
            "--write-config" => write_defaults = true,
            "--help" | "-h" => {
                println!("Usage: riftgate_client [--config <dir>] [--seed <u64>] [--write-config]");
                return;
            }
            other => {
                eprintln!("unknown argument: {other}");
                std::process::exit(2);
            }
        }
    }

    let mut settings = match RiftgateSettings::load(&config_dir) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load {}: {err}", config_dir.join(SETTINGS_FILE).display());
            std::process::exit(2);
        }
    };
    if write_defaults {
        if let Err(err) = settings.save(&config_dir) {
            eprintln!("failed to write {}: {err}", config_dir.join(SETTINGS_FILE).display());
            std::process::exit(1);
        }
    }

    if seed.is_some() {
        settings.spawn.seed = seed;
    }
    let seed = settings.spawn.seed.unwrap_or_else(app::random_seed);
    app::run(settings, seed);
}
