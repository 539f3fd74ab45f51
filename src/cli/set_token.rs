use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::civitai::auth::{cache_path, save_token, SESSION_COOKIE_NAME};
use crate::config::Config;

const LOGIN_URL: &str = "https://civitai.com/login";

pub fn run(token: Option<String>, open_browser: bool, config_path: Option<String>) -> Result<()> {
    let config = Config::load_with_path(config_path)?;
    let Some(path) = cache_path(&config.civitai) else {
        bail!("Could not determine a token cache location; set token_cache in the [civitai] config section");
    };

    if open_browser {
        info!("Opening {}", LOGIN_URL);
        if let Err(e) = open::that(LOGIN_URL) {
            warn!("Could not open a browser: {}", e);
        }
    }

    let token = match token {
        Some(token) => token,
        None => prompt_for_token(&mut io::stdin().lock())?,
    };

    store(&token, &path)
}

fn store(token: &str, path: &Path) -> Result<()> {
    save_token(token, path)?;
    println!("✅ Session token saved to {}", path.display());
    Ok(())
}

fn prompt_for_token(input: &mut impl BufRead) -> Result<String> {
    println!("Log in to civitai.com, then copy the value of the {} cookie", SESSION_COOKIE_NAME);
    println!("from your browser's developer tools (Application > Cookies).");
    print!("Token: ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read token from stdin")?;
    let token = line.trim().to_string();
    if token.is_empty() {
        bail!("No token entered");
    }
    Ok(token)
}
