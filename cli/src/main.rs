use anyhow::bail;
use clap::{Parser, Subcommand};
use colored::Colorize;
use gitops::{GitHubAuth, GitHubClient, GITHUB_API_URL};
use log::info;

mod replay;

#[derive(Parser)]
#[command(author, version, about = "Operator tooling for the chartgate webhook service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-send a pull request to the webhook as a signed synchronize event
    Replay {
        /// e.g. https://github.com/acme/platform/pull/42
        pr_url: String,
        #[arg(long, default_value = "http://localhost:8080/webhook")]
        url: String,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
        #[arg(long, env = "GITHUB_INSTALLATION_ID")]
        installation_id: Option<u64>,
        #[arg(long, env = "GITHUB_API_URL", default_value = GITHUB_API_URL)]
        api_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    gate_utils::setup_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            pr_url,
            url,
            token,
            secret,
            installation_id,
            api_url,
        } => {
            let target = replay::parse_pr_url(&pr_url)?;
            let github = GitHubClient::new(GitHubAuth::Token(token), "chartgate-cli")
                .with_api_url(&api_url);
            let pr = github
                .get_pull_request(&target.owner, &target.repo, target.number)
                .await?;
            info!(
                "{}/{}#{}: {} ({}) into {}",
                target.owner,
                target.repo,
                target.number,
                pr.head.git_ref,
                pr.head.sha,
                pr.base.git_ref
            );

            let payload = replay::build_payload(&target, &pr, installation_id);
            let status = replay::send_webhook(&url, &secret, &payload).await?;
            if !replay::is_success(status) {
                eprintln!("{} webhook returned {}", "Failed:".red(), status);
                bail!("Replay of {} was rejected with {}", pr_url, status);
            }
            println!(
                "{} replayed {} to {} ({})",
                "OK".green(),
                pr_url,
                url,
                status
            );
        }
    }
    Ok(())
}
