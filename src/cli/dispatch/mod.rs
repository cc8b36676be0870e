//! Command-line argument dispatch.
//!
//! Maps validated CLI arguments to the action to run, currently only the
//! API server.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_FRONTEND_URL, ARG_KEY_PATH, ARG_PORT};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8181);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let key_path = matches
        .get_one::<String>(ARG_KEY_PATH)
        .cloned()
        .context("missing required argument: --key-path")?;
    let frontend_base_url = matches
        .get_one::<String>(ARG_FRONTEND_URL)
        .cloned()
        .context("missing required argument: --frontend-url")?;

    Ok(Action::Server(Args {
        port,
        dsn: SecretString::from(dsn),
        key_path,
        frontend_base_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn builds_server_action_from_matches() {
        temp_env::with_vars(
            [
                ("BANKD_DSN", Some("postgres://localhost:5432/bank")),
                ("BANKD_PORT", Some("9000")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["bankd"]);
                let action = handler(&matches).unwrap();

                let Action::Server(args) = action;
                assert_eq!(args.port, 9000);
                assert_eq!(args.dsn.expose_secret(), "postgres://localhost:5432/bank");
                assert_eq!(args.key_path, "bankd.pem");
                assert_eq!(args.frontend_base_url, "https://localhost:3000");
            },
        );
    }
}
