use std::{
    collections::BTreeSet,
    fmt::Write,
    fs,
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};

use anyhow::{bail, Context};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::{
    bot::{
        command::{CommandHandler, CommandSet},
        message_builder::MessageBuilder,
        utils::keep_tail,
    },
    config::SdkConfig,
    github::{IssueRef, IssueService, PullRequest},
};

const STDERR_TAIL_LINES: usize = 50;
const STDERR_TAIL_LENGTH: usize = 4000;

/// Everything needed to build the packages of one pull request.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub token: Option<&'a str>,
    pub repo_id: &'a str,
    pub pr_number: u64,
    pub output_folder: &'a Path,
}

/// Builds the packages of a pull request, returning the artifacts it produced.
pub trait PackageBuilder: Send + Sync {
    fn build_package(&self, request: &BuildRequest<'_>) -> anyhow::Result<BTreeSet<PathBuf>>;
}

/// Delegates the build to an external program.
pub struct ScriptBuilder {
    command: Vec<String>,
}

impl ScriptBuilder {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl PackageBuilder for ScriptBuilder {
    fn build_package(&self, request: &BuildRequest<'_>) -> anyhow::Result<BTreeSet<PathBuf>> {
        let (program, args) = self
            .command
            .split_first()
            .context("no build command configured")?;

        fs::create_dir_all(request.output_folder).with_context(|| {
            format!("couldn't create {}", request.output_folder.display())
        })?;

        let mut command = Command::new(program);
        command
            .args(args)
            .arg(request.repo_id)
            .arg(request.pr_number.to_string())
            .arg(request.output_folder);
        if let Some(token) = request.token {
            command.env("GH_TOKEN", token);
        }

        debug!("running {:?}", command);
        let output = command
            .output()
            .with_context(|| format!("couldn't run {}", program))?;

        if !output.status.success() {
            bail!(
                "build of {}#{} failed ({}):\n{}",
                request.repo_id,
                request.pr_number,
                output.status,
                stderr_tail(&output.stderr)
            );
        }

        list_artifacts(request.output_folder)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    keep_tail(&tail, STDERR_TAIL_LENGTH)
}

fn list_artifacts(folder: &Path) -> anyhow::Result<BTreeSet<PathBuf>> {
    let mut artifacts = BTreeSet::new();
    for entry in
        fs::read_dir(folder).with_context(|| format!("couldn't list {}", folder.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            artifacts.insert(entry.path());
        }
    }
    Ok(artifacts)
}

/// Markdown listing where each artifact can be downloaded.
pub fn download_message(
    url_template: &str,
    pr_number: u64,
    artifacts: &BTreeSet<PathBuf>,
) -> String {
    let mut message = MessageBuilder::new();

    if artifacts.is_empty() {
        write!(message, "Building PR #{} didn't produce any package.", pr_number).unwrap();
        return message.build();
    }

    write!(message, "# Direct download").unwrap();
    message.line();
    message.line();
    write!(message, "Your files can be directly downloaded here:").unwrap();
    message.line();
    message.line();

    for name in artifacts
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy())
    {
        let url = url_template
            .replace("{pr_number}", &pr_number.to_string())
            .replace("{file}", &name);
        message.list_item();
        write!(message, "[{}]({})", name, url).unwrap();
        message.line();
    }

    message.build()
}

/// Packages touched by a pull request: top-level entries of the repository named `azure*`.
pub fn changed_packages(pull: &PullRequest) -> BTreeSet<&str> {
    pull.files
        .iter()
        .filter(|path| path.starts_with("azure"))
        .filter_map(|path| path.split('/').next())
        .collect()
}

/// Markdown explaining how to build each package of the pull request locally, `None` when it
/// doesn't touch any package.
pub fn installation_message(pull: &PullRequest) -> Option<String> {
    let packages = changed_packages(pull);
    if packages.is_empty() {
        return None;
    }

    let clone = match &pull.head_repo_url {
        Some(url) => url.to_string(),
        None => "this repository".to_owned(),
    };
    let checkout = format!("git checkout {}", pull.head_ref);
    let mut message = MessageBuilder::new();
    write!(message, "# Installation instruction").unwrap();

    for package in packages {
        message.paragraph();
        write!(message, "## Package {}", package).unwrap();
        message.paragraph();
        write!(message, "If you have a local clone of {}, you can run:", clone).unwrap();
        message.paragraph();
        for command in [
            checkout.clone(),
            format!("mvn -pl {} clean install -DskipTests", package),
        ] {
            message.list_item();
            message.code(&command);
            message.line();
        }
        message.paragraph();
        write!(
            message,
            "to get local access. You can also build the package to distribute for testing:"
        )
        .unwrap();
        message.paragraph();
        for command in [
            checkout.clone(),
            format!(
                "mvn -pl {} clean source:jar javadoc:jar package -DskipTests",
                package
            ),
            format!(
                "mvn -pl {} com.microsoft.azure:bundler-maven-plugin:bundle",
                package
            ),
        ] {
            message.list_item();
            message.code(&command);
            message.line();
        }
    }

    Some(message.build().trim_end().to_owned())
}

/// Comment announcing the packages of a pull request: how to install them when the pull request
/// could be looked up, then where to download them.
pub fn packages_message(
    pull: Option<&PullRequest>,
    url_template: &str,
    pr_number: u64,
    artifacts: &BTreeSet<PathBuf>,
) -> String {
    let download = download_message(url_template, pr_number, artifacts);
    match pull.and_then(installation_message) {
        Some(installation) => format!("{}\n\n{}", installation, download),
        None => download,
    }
}

/// Commands building SDK packages from pull requests.
pub struct SdkCommands {
    config: SdkConfig,
    token: Option<String>,
    builder: Box<dyn PackageBuilder>,
    issues: Arc<dyn IssueService>,
    // commands run on blocking threads, GitHub is reached through this runtime
    runtime: Handle,
}

impl SdkCommands {
    pub fn new(
        config: SdkConfig,
        token: Option<String>,
        builder: Box<dyn PackageBuilder>,
        issues: Arc<dyn IssueService>,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            token,
            builder,
            issues,
            runtime,
        }
    }

    fn lookup_pull(&self, pr_number: u64) -> Option<PullRequest> {
        let lookup = self
            .runtime
            .block_on(self.issues.pull_request(&self.config.repo_id, pr_number));
        match lookup {
            Ok(pull) => {
                debug!(
                    "{}#{} comes from branch {}",
                    self.config.repo_id, pull.number, pull.head_ref
                );
                Some(pull)
            }
            Err(e) => {
                warn!(
                    "no installation instructions for {}#{}: {:#}",
                    self.config.repo_id, pr_number, e
                );
                None
            }
        }
    }

    fn build(&self, issue: &IssueRef, pr_number: &str) -> anyhow::Result<String> {
        let pr_number: u64 = pr_number
            .trim_start_matches('#')
            .parse()
            .with_context(|| format!("`{}` isn't a pull request number", pr_number))?;

        info!(
            "building {}#{} as asked on {}",
            self.config.repo_id, pr_number, issue
        );

        let output_folder = self.config.output_folder.join(pr_number.to_string());
        let artifacts = self.builder.build_package(&BuildRequest {
            token: self.token.as_deref(),
            repo_id: &self.config.repo_id,
            pr_number,
            output_folder: &output_folder,
        })?;

        let pull = self.lookup_pull(pr_number);
        Ok(packages_message(
            pull.as_ref(),
            &self.config.download_url,
            pr_number,
            &artifacts,
        ))
    }
}

impl CommandHandler for SdkCommands {
    fn register(commands: &mut CommandSet<Self>) {
        commands
            .command("build", &["pr_number"], |sdk, issue, args| {
                sdk.build(issue, &args[0])
            })
            .doc("builds the packages of a pull request and links them");
    }
}
