//! Line commands accepted by the interactive driver.

use crate::bridge::LogicalAction;
use crate::config::DisplayProfile;
use crate::error::{PreviewError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Action(LogicalAction),
    Reload,
    Status,
    Frame,
    /// `None` hands the choice back to the renderer
    Lcd(Option<DisplayProfile>),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  up | down | left | right | select | back | home   drive the menu
  enc+ | enc-                                        turn the encoder one detent
  reload                                             rebind the renderer now
  status                                             show binding and capabilities
  frame                                              print the current frame
  lcd <128|240|1in44|1in3|default>                   switch display profile
  help | quit";

impl AppCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let command = match head.to_ascii_lowercase().as_str() {
            "reload" | "r" => AppCommand::Reload,
            "status" => AppCommand::Status,
            "frame" | "f" => AppCommand::Frame,
            "help" | "?" => AppCommand::Help,
            "quit" | "exit" | "q" => AppCommand::Quit,
            "lcd" => match words.next() {
                Some("default") => AppCommand::Lcd(None),
                Some(profile) => AppCommand::Lcd(Some(profile.parse()?)),
                None => return Err(PreviewError::config("lcd needs a profile")),
            },
            other => AppCommand::Action(other.parse()?),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_actions_and_controls() {
        assert_eq!(
            AppCommand::parse("enc+").unwrap(),
            Some(AppCommand::Action(LogicalAction::EncoderCw))
        );
        assert_eq!(
            AppCommand::parse("  Select ").unwrap(),
            Some(AppCommand::Action(LogicalAction::Select))
        );
        assert_eq!(AppCommand::parse("reload").unwrap(), Some(AppCommand::Reload));
        assert_eq!(AppCommand::parse("").unwrap(), None);
    }

    #[test]
    fn lcd_takes_a_profile() {
        assert_eq!(
            AppCommand::parse("lcd 240").unwrap(),
            Some(AppCommand::Lcd(Some(DisplayProfile::Lcd1in3)))
        );
        assert_eq!(AppCommand::parse("lcd default").unwrap(), Some(AppCommand::Lcd(None)));
        assert!(AppCommand::parse("lcd").is_err());
        assert!(AppCommand::parse("lcd 320").is_err());
        assert!(AppCommand::parse("dance").is_err());
    }
}
