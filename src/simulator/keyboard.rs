use super::server::SimulatorHandle;
use crate::error::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press does on the simulated pad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadKey {
    Confirm,
    Retry,
    Cancel,
    Scribble,
    Quit,
}

impl PadKey {
    pub fn from_code(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('c') | KeyCode::Enter => Some(PadKey::Confirm),
            KeyCode::Char('r') => Some(PadKey::Retry),
            KeyCode::Char('x') => Some(PadKey::Cancel),
            KeyCode::Char('s') | KeyCode::Char(' ') => Some(PadKey::Scribble),
            KeyCode::Char('q') | KeyCode::Esc => Some(PadKey::Quit),
            _ => None,
        }
    }

    /// Apply the key to the simulator; returns false when the user asked to quit
    pub fn apply(self, pad: &SimulatorHandle) -> bool {
        match self {
            PadKey::Confirm => {
                info!("Confirm pressed");
                pad.press_confirm();
            }
            PadKey::Retry => {
                info!("Retry pressed");
                pad.press_retry();
            }
            PadKey::Cancel => {
                info!("Cancel pressed");
                pad.press_cancel();
            }
            PadKey::Scribble => {
                debug!("Scribbling on simulated pad");
                pad.scribble(120);
            }
            PadKey::Quit => return false,
        }
        true
    }
}

/// Keyboard control of the simulated pad's buttons
pub struct SimulatorKeyboard {
    pad: SimulatorHandle,
    cancellation_token: CancellationToken,
}

impl SimulatorKeyboard {
    pub fn new(pad: SimulatorHandle) -> Self {
        Self {
            pad,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keys; the receiver fires when the user quits
    pub async fn start(&self) -> Result<oneshot::Receiver<()>> {
        info!("Simulator keys: s=scribble c=confirm r=retry x=cancel q=quit");

        let pad = self.pad.clone();
        let cancellation_token = self.cancellation_token.clone();
        let (quit_tx, quit_rx) = oneshot::channel();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() {
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.kind != KeyEventKind::Press {
                                continue;
                            }
                            match PadKey::from_code(key_event.code) {
                                Some(key) => {
                                    if !key.apply(&pad) {
                                        info!("Quit key pressed");
                                        let _ = quit_tx.send(());
                                        break;
                                    }
                                }
                                None => debug!("Key pressed: {:?}", key_event.code),
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Simulator keyboard task exited");
        });

        Ok(quit_rx)
    }

    pub async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::PadSimulator;

    #[test]
    fn test_key_mapping() {
        assert_eq!(PadKey::from_code(KeyCode::Char('c')), Some(PadKey::Confirm));
        assert_eq!(PadKey::from_code(KeyCode::Enter), Some(PadKey::Confirm));
        assert_eq!(PadKey::from_code(KeyCode::Char('x')), Some(PadKey::Cancel));
        assert_eq!(PadKey::from_code(KeyCode::Esc), Some(PadKey::Quit));
        assert_eq!(PadKey::from_code(KeyCode::Char('z')), None);
    }

    #[tokio::test]
    async fn test_quit_key_stops() {
        let simulator = PadSimulator::new().bind("127.0.0.1:0").await.unwrap();
        let handle = simulator.handle();

        assert!(PadKey::Scribble.apply(&handle));
        assert!(!PadKey::Quit.apply(&handle));
    }
}
