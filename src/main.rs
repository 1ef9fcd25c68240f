//! wt-pr-status CLI
//!
//! Prints PR status for the interactive list view and for terminal status lines.

use std::path::PathBuf;
use std::sync::Arc;

use pr_status::{EngineConfig, GhCli, PrStatusService, StatusLine, PLACEHOLDER};

const USAGE: &str = "Usage:
  wt-pr-status list [--repo <path>] [--refresh] [--enrich]
  wt-pr-status status-line --branch <name> [--repo <path>]

Environment variables:
  RUST_LOG=<filter>  Log filter for stderr output (default: warn)";

struct Args {
    command: String,
    repo: Option<PathBuf>,
    branch: Option<String>,
    refresh: bool,
    enrich: bool,
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut iter = raw.iter();
    let command = iter.next().ok_or("missing command")?.clone();
    let mut args = Args {
        command,
        repo: None,
        branch: None,
        refresh: false,
        enrich: false,
    };

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--repo" => args.repo = Some(PathBuf::from(iter.next().ok_or("--repo needs a value")?)),
            "--branch" => args.branch = Some(iter.next().ok_or("--branch needs a value")?.clone()),
            "--refresh" => args.refresh = true,
            "--enrich" => args.enrich = true,
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }

    Ok(args)
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries only status text.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    // Status-line hosts show whatever we print, so that command never exits non-zero.
    let status_line = raw.first().is_some_and(|c| c == "status-line");

    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) if status_line => {
            tracing::warn!(error = %e, "bad status-line arguments");
            println!("{}", PLACEHOLDER);
            return;
        }
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let repo = match args.repo.clone().map(Ok).unwrap_or_else(std::env::current_dir) {
        Ok(repo) => repo,
        Err(e) if status_line => {
            tracing::warn!(error = %e, "cannot determine repository");
            println!("{}", PLACEHOLDER);
            return;
        }
        Err(e) => {
            eprintln!("error: cannot determine repository: {}", e);
            std::process::exit(2);
        }
    };

    match args.command.as_str() {
        "list" => run_list(repo, &args).await,
        "status-line" => run_status_line(repo, &args).await,
        other => {
            eprintln!("error: unknown command '{}'\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn build_service(config: EngineConfig) -> Arc<PrStatusService> {
    let client = Arc::new(GhCli::with_program(config.client.program.clone()));
    Arc::new(PrStatusService::new(client, config))
}

async fn run_list(repo: PathBuf, args: &Args) {
    let config = match EngineConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };
    let service = build_service(config);

    let list = if args.enrich {
        service.list_prs_enriched(&repo, args.refresh).await
    } else {
        service.list_prs(&repo, args.refresh).await
    };

    for pr in list.prs.iter() {
        let comments = if pr.comments_known {
            format!("{}/{}", pr.comments.unresolved, pr.comments.total)
        } else {
            "-".to_string()
        };
        println!(
            "#{:<6} {:<18} ci {:>2}/{:<2} comments {:<5} {}  {}",
            pr.number,
            pr.status().label(),
            pr.ci.completed,
            pr.ci.total,
            comments,
            pr.branch,
            pr.title
        );
    }

    if list.stale {
        eprintln!("warning: showing cached data");
    }
    if let Some(e) = list.error {
        eprintln!("error: {}", e);
        if list.prs.is_empty() {
            std::process::exit(1);
        }
    }
}

async fn run_status_line(repo: PathBuf, args: &Args) {
    let Some(branch) = args.branch.as_deref() else {
        println!("{}", PLACEHOLDER);
        return;
    };

    // A broken config file must not break the status line.
    let config = EngineConfig::load_default().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "using default configuration");
        EngineConfig::default()
    });
    let status_line = StatusLine::new(build_service(config));

    println!("{}", status_line.render(&repo, branch).await);
}
