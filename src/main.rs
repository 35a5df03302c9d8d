use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rocket::routes;
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod bot;
use bot::BotHandler;

mod config;
use config::SdkBotConfig;

mod github;
use github::{GitHubIssues, IssueService};

mod sdk;
use sdk::{packages_message, BuildRequest, PackageBuilder, ScriptBuilder, SdkCommands};

mod webhooks;
use webhooks::github_webhook;

#[derive(Parser)]
#[command(version = "0.1")]
struct Opts {
    /// Configuration file for sdkbot
    #[arg(short, long)]
    config: PathBuf,
    /// Verbosity in INFO mode
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Verbosity in DEBUG mode
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Answer commands posted on GitHub issues (the default)
    Serve,
    /// Build the packages of a pull request
    Generate(GenerateOpts),
}

#[derive(Args)]
struct GenerateOpts {
    /// PR number
    #[arg(short, long)]
    pr_number: u64,
    /// Repo id, defaults to the configured SDK repository
    #[arg(short, long)]
    repo: Option<String>,
    /// Output folder for packages, defaults to the configured one
    #[arg(short, long)]
    output_folder: Option<PathBuf>,
    /// Comment on the original PR with installation instructions and download links
    #[arg(long)]
    with_comment: bool,
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    let command = opts.command.unwrap_or(Command::Serve);

    let default_level = if opts.debug {
        "debug"
    } else if opts.verbose || matches!(command, Command::Serve) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config_file = File::open(&opts.config)
        .with_context(|| format!("couldn't open {}:", opts.config.display()))?;
    let config: SdkBotConfig = serde_yaml::from_reader(BufReader::new(config_file))
        .context("couldn't parse config file")?;

    let token = config.github_token()?;
    let issues = Arc::new(
        GitHubIssues::new(&config.github_api_base, &token)
            .context("failed to create github client")?,
    );

    match command {
        Command::Serve => serve(config, token, issues).await,
        Command::Generate(generate_opts) => generate(config, token, issues, generate_opts).await,
    }
}

async fn serve(
    config: SdkBotConfig,
    token: String,
    issues: Arc<GitHubIssues>,
) -> anyhow::Result<()> {
    let builder = ScriptBuilder::new(config.sdk.build_command.clone());
    let sdk = SdkCommands::new(
        config.sdk,
        Some(token),
        Box::new(builder),
        issues.clone(),
        Handle::current(),
    );

    let bot = BotHandler::new(sdk, &config.bot_name, issues).context("failed to create sdk bot")?;
    for command in bot.commands() {
        info!("serving command `{}` {:?}", command.name, command.parameter_names);
    }

    let rocket = rocket::build()
        .mount("/", routes![github_webhook])
        .manage(bot);
    rocket
        .launch()
        .await
        .map(|_| ())
        .map_err(|err| anyhow::anyhow!("{}", err))
}

async fn generate(
    config: SdkBotConfig,
    token: String,
    issues: Arc<GitHubIssues>,
    opts: GenerateOpts,
) -> anyhow::Result<()> {
    let repo_id = opts.repo.unwrap_or(config.sdk.repo_id);
    let output_folder = opts.output_folder.unwrap_or(config.sdk.output_folder);

    let builder = ScriptBuilder::new(config.sdk.build_command);
    let artifacts = builder.build_package(&BuildRequest {
        token: Some(&token),
        repo_id: &repo_id,
        pr_number: opts.pr_number,
        output_folder: &output_folder,
    })?;

    for artifact in &artifacts {
        println!("{}", artifact.display());
    }

    if opts.with_comment {
        let pull = match issues.pull_request(&repo_id, opts.pr_number).await {
            Ok(pull) => Some(pull),
            Err(e) => {
                warn!("no installation instructions for {}#{}: {:#}", repo_id, opts.pr_number, e);
                None
            }
        };
        let message = packages_message(
            pull.as_ref(),
            &config.sdk.download_url,
            opts.pr_number,
            &artifacts,
        );
        // the packages are built, failing to announce them isn't fatal
        if let Err(e) = comment_on_pr(issues.as_ref(), &repo_id, opts.pr_number, &message).await {
            error!("unable to comment on {}#{}: {:#}\n{}", repo_id, opts.pr_number, e, message);
        }
    }

    Ok(())
}

async fn comment_on_pr(
    issues: &dyn IssueService,
    repo_id: &str,
    pr_number: u64,
    message: &str,
) -> anyhow::Result<()> {
    let pr = issues.resolve_issue(repo_id, pr_number).await?;
    issues.post_comment(&pr, message).await
}
