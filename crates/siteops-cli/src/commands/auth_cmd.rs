use siteops_core::util::non_blank;

use crate::auth::{resolve_access_token, TokenSource, TokenStore};
use crate::cli::AuthCommands;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands) -> Result<(), CliError> {
    let store = TokenStore::default();
    match command {
        AuthCommands::SetToken { token } => {
            let token = non_blank(Some(token))
                .ok_or_else(|| CliError::Auth("Access token cannot be empty".to_string()))?;
            store.save(&token)?;
            println!("Access token stored in the OS keychain");
        }
        AuthCommands::Status => {
            let (_, source) = resolve_access_token(&store, |name| std::env::var(name).ok())?;
            match source {
                TokenSource::Missing => println!("No access token configured."),
                source => println!("Access token configured via {}", source.label()),
            }
        }
        AuthCommands::Logout => {
            store.clear()?;
            println!("Removed stored access token");
        }
    }
    Ok(())
}
