//! GitHub pull request checkout workflow.
//!
//! Lists open pull requests for the repository in the current directory,
//! prompts for one, and checks out its head branch via the pipeline runner.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::args::RunConfig;
use crate::picker;
use crate::pipeline::{spawn_pipeline, AliasLookup};

const API_ROOT: &str = "https://api.github.com";
const TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub head: PullRequestHead,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestHead {
    #[serde(rename = "ref")]
    pub branch: String,
}

/// Lists open PRs for the current repository, prompts for one, and checks
/// out its head branch.
pub async fn checkout_pr(aliases: &dyn AliasLookup) -> Result<()> {
    let remote = picker::capture("git remote get-url origin", aliases).await?;
    let (owner, repo) = parse_remote(&remote)
        .ok_or_else(|| anyhow!("unrecognized origin remote {:?}", remote.trim()))?;
    let pulls = fetch_pulls(&owner, &repo).await?;
    if pulls.is_empty() {
        println!("no open pull requests for {}/{}", owner, repo);
        return Ok(());
    }

    let labels: Vec<String> = pulls
        .iter()
        .map(|pr| format!("#{} {} ({})", pr.number, pr.title, pr.head.branch))
        .collect();
    println!("open pull requests for {}/{}:", owner, repo);
    let Some(choice) = picker::pick_from_list(&labels)? else {
        return Ok(());
    };

    let pr = &pulls[choice];
    let command = format!(
        "git fetch origin pull/{}/head:{} && git checkout {}",
        pr.number, pr.head.branch, pr.head.branch
    );
    spawn_pipeline(&command, &RunConfig::default(), aliases)
        .await
        .map_err(|err| anyhow!("checkout failed: {}", err))?;
    println!("checked out {}", pr.head.branch);
    Ok(())
}

// Accepts `git@github.com:owner/repo.git` and `https://github.com/owner/repo`.
fn parse_remote(url: &str) -> Option<(String, String)> {
    let trimmed = url.trim().trim_end_matches(".git");
    let path = trimmed
        .strip_prefix("git@github.com:")
        .or_else(|| trimmed.split_once("github.com/").map(|(_, path)| path))?;
    let (owner, repo) = path.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

async fn fetch_pulls(owner: &str, repo: &str) -> Result<Vec<PullRequest>> {
    let client = reqwest::Client::builder()
        .user_agent(format!("aliasrack/{}", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build http client")?;
    let mut request = client
        .get(format!("{}/repos/{}/{}/pulls", API_ROOT, owner, repo))
        .header("Accept", "application/vnd.github+json");
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        request = request.bearer_auth(token);
    }
    let response = request.send().await.context("github request failed")?;
    if !response.status().is_success() {
        bail!("github returned {}", response.status());
    }
    response
        .json()
        .await
        .context("unexpected github response shape")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ssh_remotes() {
        assert_eq!(
            parse_remote("git@github.com:pipe-rack/widgets.git\n"),
            Some(("pipe-rack".to_string(), "widgets".to_string()))
        );
    }

    #[test]
    fn parses_https_remotes() {
        assert_eq!(
            parse_remote("https://github.com/octo/demo"),
            Some(("octo".to_string(), "demo".to_string()))
        );
        assert_eq!(
            parse_remote("https://github.com/octo/demo.git"),
            Some(("octo".to_string(), "demo".to_string()))
        );
    }

    #[test]
    fn rejects_other_remotes() {
        assert_eq!(parse_remote("https://gitlab.com/a/b"), None);
        assert_eq!(parse_remote("git@github.com:solo"), None);
    }

    #[test]
    fn deserializes_the_pulls_payload() {
        let payload = r#"[
            {"number": 12, "title": "Add retry", "head": {"ref": "retry-loop"}}
        ]"#;
        let pulls: Vec<PullRequest> = serde_json::from_str(payload).unwrap();
        assert_eq!(pulls[0].number, 12);
        assert_eq!(pulls[0].head.branch, "retry-loop");
    }
}
