use std::path::PathBuf;

use anyhow::bail;
use serde::Deserialize;
use url::Url;

const GH_TOKEN: &str = "GH_TOKEN";

#[derive(Debug, Deserialize)]
pub struct SdkBotConfig {
    /// Name the bot answers to in comments, with or without the leading `@`
    pub bot_name: String,
    /// Token used to talk to GitHub. Read from the `GH_TOKEN` environment variable when missing.
    #[serde(default)]
    pub github_token: Option<String>,
    /// Base URL of the GitHub REST API
    #[serde(default = "default_api_base")]
    pub github_api_base: Url,
    /// Where and how SDK packages get built
    #[serde(default)]
    pub sdk: SdkConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// The SDK repository whose pull requests get built, e.g. `Azure/azure-sdk-for-java`
    pub repo_id: String,
    /// Directory receiving one sub-directory of artifacts per pull request
    pub output_folder: PathBuf,
    /// Program (and leading arguments) building a pull request. It's called with the repository
    /// id, the pull request number, and the output directory appended.
    pub build_command: Vec<String>,
    /// Download link of an artifact, `{pr_number}` and `{file}` get substituted.
    pub download_url: String,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            repo_id: "Azure/azure-sdk-for-java".to_owned(),
            output_folder: PathBuf::from("."),
            build_command: Vec::new(),
            download_url: "http://azuresdkinfrajobstore1.blob.core.windows.net/azure/azure-sdk-for-java/pullrequests/{pr_number}/dist/{file}".to_owned(),
        }
    }
}

fn default_api_base() -> Url {
    Url::parse("https://api.github.com").expect("valid default url")
}

impl SdkBotConfig {
    /// The configured token, or the one in the environment.
    pub fn github_token(&self) -> anyhow::Result<String> {
        self.github_token_or(std::env::var(GH_TOKEN).ok())
    }

    fn github_token_or(&self, from_env: Option<String>) -> anyhow::Result<String> {
        match (&self.github_token, from_env) {
            (Some(token), _) => Ok(token.clone()),
            (None, Some(token)) if !token.trim().is_empty() => Ok(token),
            _ => bail!("no github_token configured and {} isn't set", GH_TOKEN),
        }
    }
}
