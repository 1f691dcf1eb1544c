//! Implementation of the `storefront config show` command.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::ConfigCommands;
use crate::domain::models::Config;

const REDACTED: &str = "********";

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    #[serde(flatten)]
    pub config: Config,
}

impl ConfigShowOutput {
    /// Wrap `config` with the auth token masked.
    pub fn redacted(config: &Config) -> Self {
        let mut config = config.clone();
        if config.api.auth_token.is_some() {
            config.api.auth_token = Some(REDACTED.to_string());
        }
        Self { config }
    }
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_default()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

pub async fn execute(command: ConfigCommands, config: &Config, json_mode: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => output(&ConfigShowOutput::redacted(config), json_mode),
    }
    Ok(())
}
