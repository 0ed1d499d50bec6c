//! # veritrace CLI Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use veritrace_cli::{audit, code, search};

/// VeriTrace: evidence-backed compliance audits of policy documents.
#[derive(Parser, Debug)]
#[command(name = "veritrace", version, about)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Audit a policy document and write the reports.
    Audit(audit::AuditArgs),
    /// Search the evidence store.
    Search(search::SearchArgs),
    /// Execute a snippet in the allow-list code runner.
    RunCode(code::RunCodeArgs),
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("veritrace=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Audit(args) => {
            let outcome = audit::run(&args).await?;
            println!("{}", outcome.final_text());
            println!();
            println!("{}", outcome.tally.headline());
        }
        Commands::Search(args) => {
            println!("{}", search::run(&args)?);
        }
        Commands::RunCode(args) => {
            println!("{}", code::run(&args));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_audit_flags() {
        let cli = Cli::try_parse_from([
            "veritrace",
            "audit",
            "policy.txt",
            "--provider",
            "anthropic",
            "--fail-fast",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Audit(args) => {
                assert_eq!(args.policy.to_str(), Some("policy.txt"));
                assert_eq!(args.provider.as_deref(), Some("anthropic"));
                assert!(args.fail_fast);
            }
            other => panic!("expected audit, got {:?}", other),
        }
    }

    #[test]
    fn test_run_code_requires_snippet_or_list() {
        assert!(Cli::try_parse_from(["veritrace", "run-code"]).is_err());
        assert!(Cli::try_parse_from(["veritrace", "run-code", "--list"]).is_ok());
    }
}
