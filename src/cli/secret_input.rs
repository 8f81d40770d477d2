use crate::{
    error::{Result, VaultError},
    types::Passphrase,
    vault::{FixedPassphrase, GeneratedPassphrase, PassphrasePair, PassphraseSource},
};

use super::PASSWORD_ENV_VAR;

/// Prompts on the terminal without echo.
pub(crate) struct PromptPassphrase;

impl PassphraseSource for PromptPassphrase {
    fn new_passphrase(&self, path: &str) -> Result<PassphrasePair> {
        ensure_interactive()?;
        let entered = prompt(&format!("Passphrase for {path}: "))?;
        let confirmed = prompt("Confirm passphrase: ")?;
        Ok(PassphrasePair { entered, confirmed })
    }

    fn existing_passphrase(&self, path: &str) -> Result<Passphrase> {
        ensure_interactive()?;
        prompt(&format!("Passphrase for {path}: "))
    }
}

pub(crate) fn resolve_passphrase_source(
    generate: bool,
    password: Option<String>,
) -> Result<Box<dyn PassphraseSource>> {
    if generate {
        if password.is_some() {
            return Err(VaultError::InvalidInput(
                "--generate cannot be combined with --password".to_owned(),
            ));
        }
        return Ok(Box::new(GeneratedPassphrase));
    }
    match password {
        Some(value) => Ok(Box::new(FixedPassphrase::new(Passphrase::new(value)?))),
        None => Ok(Box::new(PromptPassphrase)),
    }
}

fn ensure_interactive() -> Result<()> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(());
    }
    Err(VaultError::InvalidInput(format!(
        "no terminal for a passphrase prompt; set {PASSWORD_ENV_VAR} or pass --password"
    )))
}

fn prompt(label: &str) -> Result<Passphrase> {
    let value = rpassword::prompt_password(label)?;
    Passphrase::new(value)
}
