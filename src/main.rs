//! lcdpreview - LCD Menu Renderer Previewer
//!
//! Binds the device's menu renderer, watches its inputs and reads menu commands from stdin.

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use lcdpreview::config::{FileConfig, Overrides};
use lcdpreview::{Application, DisplayProfile, PreviewConfig};
use std::path::PathBuf;

fn cli() -> Command {
    Command::new("lcdpreview")
        .version(lcdpreview::VERSION)
        .about("Preview an embedded LCD menu renderer on the desktop")
        .long_about(
            "lcdpreview loads the device's own menu renderer, shows its framebuffer and \
             rebinds it whenever config/menu.xml, the settings files, fonts/ or assets/ change.",
        )
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Renderer checkout; watched paths are relative to it"),
        )
        .arg(
            Arg::new("lcd")
                .long("lcd")
                .value_name("PROFILE")
                .value_parser(value_parser!(DisplayProfile))
                .help("Display profile: 128, 240, 1in44 or 1in3"),
        )
        .arg(
            Arg::new("renderer")
                .long("renderer")
                .value_name("RENDERER")
                .help("builtin:demo or cmd:<renderer host command>"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Settings file (default: <config dir>/lcdpreview/config.toml)"),
        )
        .arg(
            Arg::new("no-watch")
                .long("no-watch")
                .action(ArgAction::SetTrue)
                .help("Disable hot reload"),
        )
        .arg(
            Arg::new("debounce-ms")
                .long("debounce-ms")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Quiet period before a reload fires"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; RUST_LOG controls the level
    env_logger::init();

    let matches = cli().get_matches();

    let file = match matches.get_one::<PathBuf>("config") {
        Some(path) => FileConfig::load(path, true)?,
        None => match FileConfig::default_path() {
            Some(path) => FileConfig::load(&path, false)?,
            None => FileConfig::default(),
        },
    };

    let overrides = Overrides {
        root: matches.get_one::<PathBuf>("root").cloned(),
        display_profile: matches.get_one::<DisplayProfile>("lcd").copied(),
        renderer: matches.get_one::<String>("renderer").cloned(),
        debounce_ms: matches.get_one::<u64>("debounce-ms").copied(),
        no_watch: matches.get_flag("no-watch"),
    };

    let config = PreviewConfig::resolve(file, overrides).context("invalid configuration")?;
    log::info!("renderer root {}", config.root.display());

    let mut app = Application::new(config)?;
    app.run().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert!(!lcdpreview::VERSION.is_empty());
    }

    #[test]
    fn flags_parse() {
        let matches = cli()
            .try_get_matches_from([
                "lcdpreview",
                "--lcd",
                "240",
                "--no-watch",
                "--debounce-ms",
                "50",
            ])
            .unwrap();
        assert_eq!(
            matches.get_one::<DisplayProfile>("lcd"),
            Some(&DisplayProfile::Lcd1in3)
        );
        assert!(matches.get_flag("no-watch"));
        assert_eq!(matches.get_one::<u64>("debounce-ms"), Some(&50));
    }
}
