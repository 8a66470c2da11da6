use crate::app::messages::AppCommand;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Spawn a blocking thread that reads line commands and forwards them onto a channel.
///
/// End of input is sent as `Quit`. Lines that do not parse are reported and skipped.
pub fn spawn_command_thread<R>(
    reader: R,
    tx: UnboundedSender<AppCommand>,
    shutdown: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || {
        for line in reader.lines() {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    eprintln!("Input thread error: {}", err);
                    break;
                }
            };
            match AppCommand::parse(&line) {
                Ok(Some(command)) => {
                    if tx.send(command).is_err() {
                        return;
                    }
                }
                Ok(None) => continue,
                Err(err) => eprintln!("{} (try 'help')", err.message()),
            }
        }
        let _ = tx.send(AppCommand::Quit);
    })
}
