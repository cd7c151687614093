//! manifetch - Steam manifest bundler
//!
//! Command-line front end for the resolution pipeline.

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use manifetch::cache::TreeCache;
use manifetch::download::ArchivePolicy;
use manifetch::error::ResolveError;
use manifetch::fetcher::TreeFetcher;
use manifetch::issues::{self, NewIssue};
use manifetch::pipeline;
use manifetch::prober::Verification;
use manifetch::release::{self, format_size};
use manifetch::sources::{builtin_sources, Source};
use manifetch::transport::{build_client, GithubClient, ProxyClient};

#[derive(Parser)]
#[command(name = "manifetch")]
#[command(version)]
#[command(about = "Steam manifest bundler - probes mirror repositories and packs per-game manifests into a zip")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an app id or store URL and bundle its manifest files
    Fetch {
        /// App id or storefront URL (store.steampowered.com/app/<id>)
        input: String,

        /// Directory the zip is written into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Proxy endpoint tried when direct API calls fail or are rate-limited
        #[arg(long, env = "MANIFETCH_PROXY")]
        proxy: Option<String>,

        /// Probe this repository instead of the builtin mirrors (repeatable, in priority order)
        #[arg(long = "repo", value_name = "OWNER/NAME")]
        repos: Vec<String>,

        /// Skip the tree cache entirely
        #[arg(long)]
        no_cache: bool,

        /// Keep .json files in the archive
        #[arg(long)]
        include_json: bool,

        /// Exclude paths containing this text (repeatable)
        #[arg(long, value_name = "TEXT")]
        exclude: Vec<String>,
    },

    /// List the builtin mirror repositories in probe order
    Sources,

    /// Show the latest toolset release and its assets
    Release {
        /// Release metadata proxy tried before the GitHub API
        #[arg(long, env = "MANIFETCH_PROXY")]
        proxy: Option<String>,
    },

    /// Browse or file issues on the project tracker
    Issues {
        #[command(subcommand)]
        command: IssueCommands,
    },

    /// Manage the tree cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum IssueCommands {
    /// List recent issues
    List {
        /// Issue state to list (open, closed, all)
        #[arg(long, default_value = "open")]
        state: String,
    },

    /// File a new issue (requires a GitHub token)
    Report {
        #[arg(long)]
        title: String,

        #[arg(long)]
        body: String,

        /// Labels to attach (repeatable)
        #[arg(long)]
        label: Vec<String>,

        /// GitHub token used to authenticate the submission
        #[arg(long, env = "GITHUB_TOKEN")]
        token: String,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Drop every cached tree
    Clear,

    /// Show cache entry counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(
                if cli.verbose {
                    "manifetch=debug".parse()?
                } else {
                    "manifetch=warn".parse()?
                },
            ))
            .init();
    }

    match cli.command {
        Commands::Fetch {
            input,
            output,
            proxy,
            repos,
            no_cache,
            include_json,
            exclude,
        } => {
            run_fetch(
                &input,
                &output,
                proxy.as_deref(),
                &repos,
                no_cache,
                include_json,
                &exclude,
            )
            .await
        }

        Commands::Sources => {
            for (index, source) in builtin_sources().iter().enumerate() {
                println!("{}. {} ({})", index + 1, source.name, source.repo);
            }
            Ok(())
        }

        Commands::Release { proxy } => run_release(proxy.as_deref()).await,

        Commands::Issues { command } => match command {
            IssueCommands::List { state } => run_issue_list(&state).await,
            IssueCommands::Report {
                title,
                body,
                label,
                token,
            } => {
                run_issue_report(
                    NewIssue {
                        title,
                        body,
                        labels: label,
                    },
                    &token,
                )
                .await
            }
        },

        Commands::Cache { command } => match command {
            CacheCommands::Clear => {
                let cache = TreeCache::open()?;
                let dropped = cache.clear()?;
                println!("Dropped {} cached trees", dropped);
                Ok(())
            }
            CacheCommands::Stats => {
                let cache = TreeCache::open()?;
                let stats = cache.stats()?;
                println!("{} entries ({} live)", stats.total, stats.live);
                Ok(())
            }
        },
    }
}

async fn run_fetch(
    input: &str,
    output: &std::path::Path,
    proxy: Option<&str>,
    repos: &[String],
    no_cache: bool,
    include_json: bool,
    exclude: &[String],
) -> Result<()> {
    let sources = if repos.is_empty() {
        builtin_sources()
    } else {
        let mut parsed = Vec::new();
        for coord in repos {
            match Source::parse(coord) {
                Some(source) => parsed.push(source),
                None => anyhow::bail!("invalid repository coordinate: {coord} (expected owner/name)"),
            }
        }
        parsed
    };

    let cache = if no_cache {
        None
    } else {
        match TreeCache::open() {
            Ok(cache) => {
                let _ = cache.purge_expired();
                Some(cache)
            }
            Err(err) => {
                warn!("tree cache unavailable: {err:#}");
                None
            }
        }
    };

    let client = build_client()?;
    let github = GithubClient::new(client.clone());
    let proxy_client = proxy.map(|endpoint| ProxyClient::new(client, endpoint));
    let fetcher = TreeFetcher::new(github, proxy_client, cache);

    let mut policy = ArchivePolicy::default().with_excludes(exclude);
    if include_json {
        policy = policy.include_json();
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} | {msg}")?
            .progress_chars("=>-"),
    );

    let result = pipeline::fetch_manifest(
        &fetcher,
        &sources,
        input,
        &policy,
        output,
        |index, total, path| {
            pb.set_length(total as u64);
            pb.set_position(index as u64 - 1);
            pb.set_message(path.to_string());
        },
    )
    .await;

    pb.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            if let Some(ResolveError::NotFound { diagnostics, .. }) =
                err.downcast_ref::<ResolveError>()
            {
                eprintln!("error: {err}");
                for line in diagnostics {
                    eprintln!("  {line}");
                }
                std::process::exit(1);
            }
            return Err(err);
        }
    };

    println!("Manifest ready");
    println!("  App id:     {}", report.appid);
    println!("  Repository: {}", report.source.repo);
    println!("  Files:      {}", report.files);
    println!("  Total size: {}", format_size(report.total_bytes));
    println!("  Time taken: {:.2}s", report.elapsed.as_secs_f64());
    println!("  Archive:    {}", report.archive.path.display());

    if report.verification == Verification::KeyFileMissing {
        println!("  Note: branch has no key file, match accepted unverified");
    }
    for line in &report.skipped {
        println!("  Warning: could not download {line}");
    }

    Ok(())
}

async fn run_release(proxy: Option<&str>) -> Result<()> {
    let client = build_client()?;
    let release = release::fetch_latest(&client, proxy)
        .await
        .map_err(|e| anyhow::anyhow!("Unable to load the latest release: {e}"))?;

    println!("{}", release.title());
    if let Some(published) = &release.published_at {
        println!("  Released {}  (version {})", published, release.tag_name);
    }

    let assets = release.ordered_assets();
    if assets.is_empty() {
        println!("  No assets found");
        return Ok(());
    }
    for asset in assets {
        println!(
            "  {:<40} {:>10}  {}",
            asset.name,
            format_size(asset.size),
            asset.browser_download_url
        );
    }

    Ok(())
}

async fn run_issue_list(state: &str) -> Result<()> {
    let client = build_client()?;
    let (issues, rate) = issues::list_issues(&client, state).await?;

    if issues.is_empty() {
        println!("No {state} issues.");
    }
    for issue in &issues {
        let labels = if issue.labels.is_empty() {
            String::new()
        } else {
            let names: Vec<_> = issue.labels.iter().map(|l| l.name.as_str()).collect();
            format!("  [{}]", names.join(", "))
        };
        println!(
            "#{:<5} {}  by {} {}{}",
            issue.number,
            issue.title,
            issue.author(),
            issues::since(&issue.created_at),
            labels
        );
    }

    if let (Some(remaining), Some(limit)) = (rate.remaining, rate.limit) {
        println!("Rate limit: {remaining}/{limit}");
    }

    Ok(())
}

async fn run_issue_report(issue: NewIssue, token: &str) -> Result<()> {
    let client = build_client()?;
    let (created, _) = issues::create_issue(&client, token, &issue).await?;
    println!("Submitted! #{} {}", created.number, created.html_url);
    Ok(())
}
