//! Keystroke injection using enigo
//!
//! Provides two methods for sending a character to the focused window:
//! - **Key**: One key click per character (default, seen by games that read raw key events)
//! - **Text**: enigo's unicode text input (handles characters with no key on the layout)

use serde::Deserialize;
use thiserror::Error;

/// Input method for sending characters
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMethod {
    /// Click `Key::Unicode(c)` for every character
    #[default]
    Key,
    /// Use enigo's native text input
    Text,
}

impl InputMethod {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "text" => InputMethod::Text,
            _ => InputMethod::Key,
        }
    }
}

/// Error type for keystroke operations
#[derive(Debug, Error)]
pub enum TypingError {
    #[error("failed to initialize keyboard input: {0}")]
    Init(String),
    #[error("failed to send {ch:?}: {reason}")]
    Send { ch: char, reason: String },
}

/// Destination for synthetic keystrokes.
///
/// Owned by the dispatcher worker thread while it runs.
pub trait KeystrokeSink: Send {
    fn send_char(&mut self, ch: char) -> Result<(), TypingError>;
}

#[cfg(feature = "desktop")]
pub use enigo_sink::EnigoSink;

#[cfg(feature = "desktop")]
mod enigo_sink {
    use super::{InputMethod, KeystrokeSink, TypingError};
    use enigo::{Direction, Enigo, Key, Keyboard, Settings};

    /// Keyboard handler using enigo
    pub struct EnigoSink {
        enigo: Enigo,
        method: InputMethod,
    }

    impl EnigoSink {
        pub fn new(method: InputMethod) -> Result<Self, TypingError> {
            let enigo = Enigo::new(&Settings::default())
                .map_err(|e| TypingError::Init(e.to_string()))?;
            Ok(Self { enigo, method })
        }
    }

    impl KeystrokeSink for EnigoSink {
        fn send_char(&mut self, ch: char) -> Result<(), TypingError> {
            let result = match self.method {
                InputMethod::Key => self.enigo.key(Key::Unicode(ch), Direction::Click),
                InputMethod::Text => {
                    let mut buf = [0u8; 4];
                    self.enigo.text(ch.encode_utf8(&mut buf))
                }
            };
            result.map_err(|e| TypingError::Send {
                ch,
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_method_from_str() {
        assert_eq!(InputMethod::from_str("key"), InputMethod::Key);
        assert_eq!(InputMethod::from_str("Key"), InputMethod::Key);
        assert_eq!(InputMethod::from_str("text"), InputMethod::Text);
        assert_eq!(InputMethod::from_str("TEXT"), InputMethod::Text);
        assert_eq!(InputMethod::from_str("unknown"), InputMethod::Key);
    }

    #[test]
    fn test_input_method_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            method: InputMethod,
        }
        let w: Wrapper = toml::from_str("method = \"text\"").unwrap();
        assert_eq!(w.method, InputMethod::Text);
    }
}
