//! User interaction and credential validation.
//!
//! The session runner talks to the user only through the [`Interactive`]
//! trait, so tests can script a whole session. [`StdinPrompt`] is the
//! terminal implementation.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use protocol::{AuthKind, CredentialMode, ProtocolError};

/// Characters rejected in user ids and required (at least one) in passwords.
const SYMBOLS: &str = "`~!@#$%^&*(),<.>/?";

/// Checks a user id: no whitespace, no symbol characters.
pub fn validate_userid(userid: &str) -> protocol::Result<()> {
    if userid.is_empty() {
        return Err(ProtocolError::Validation(
            "name must not be empty".to_string(),
        ));
    }
    if userid.chars().any(|c| c.is_whitespace()) || userid.chars().any(|c| SYMBOLS.contains(c)) {
        return Err(ProtocolError::Validation(
            "name cannot contain spaces or special characters".to_string(),
        ));
    }
    Ok(())
}

/// Checks password strength: at least 8 characters, containing letters,
/// digits and symbols, with no whitespace.
pub fn validate_password(password: &str) -> protocol::Result<()> {
    let strong = password.len() >= 8
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| SYMBOLS.contains(c))
        && !password.chars().any(|c| c.is_whitespace());
    if !strong {
        return Err(ProtocolError::Validation(
            "password must be at least 8 characters and contain letters, \
             digits and symbols, without whitespace"
                .to_string(),
        ));
    }
    Ok(())
}

/// Everything the session runner needs from the user. Returning `None` from
/// the input methods means the user wants to quit.
pub trait Interactive {
    /// Asks for credentials. For [`CredentialMode::Choose`] the user also
    /// picks between login and signup; the other modes force the flavor.
    /// Returned values must already satisfy the validation rules.
    fn credentials(&mut self, mode: CredentialMode) -> Result<Option<(AuthKind, String, String)>>;

    /// Asks for the next request line.
    fn next_request(&mut self) -> Result<Option<String>>;

    /// Displays a server response.
    fn show_response(&mut self, text: &str);

    /// Displays a status or error notice.
    fn show_notice(&mut self, text: &str);
}

/// Terminal prompt reading from stdin. Invalid credentials are re-asked
/// until they pass validation or the user gives up with an empty name.
pub struct StdinPrompt;

impl StdinPrompt {
    fn read_line(prompt: &str) -> Result<Option<String>> {
        print!("{}", prompt);
        io::stdout().flush()?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl Interactive for StdinPrompt {
    fn credentials(&mut self, mode: CredentialMode) -> Result<Option<(AuthKind, String, String)>> {
        let kind = match mode {
            CredentialMode::Login => AuthKind::Login,
            CredentialMode::SignUp => {
                println!("This name needs to be registered first.");
                AuthKind::SignUp
            }
            CredentialMode::Choose => {
                let Some(choice) = Self::read_line("Please login or sign up (l/s): ")? else {
                    return Ok(None);
                };
                match choice.as_str() {
                    "l" => AuthKind::Login,
                    "s" => AuthKind::SignUp,
                    _ => return Ok(None),
                }
            }
        };

        loop {
            let Some(userid) = Self::read_line("Please enter your name: ")? else {
                return Ok(None);
            };
            if userid.is_empty() {
                return Ok(None);
            }
            if let Err(e) = validate_userid(&userid) {
                println!("{}", e);
                continue;
            }

            let Some(password) = Self::read_line("Please enter your password: ")? else {
                return Ok(None);
            };
            if let Err(e) = validate_password(&password) {
                println!("{}", e);
                continue;
            }

            return Ok(Some((kind, userid, password)));
        }
    }

    fn next_request(&mut self) -> Result<Option<String>> {
        Self::read_line("send: ")
    }

    fn show_response(&mut self, text: &str) {
        println!("Server: {}", text);
    }

    fn show_notice(&mut self, text: &str) {
        println!("{}", text);
    }
}
