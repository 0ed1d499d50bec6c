//! # Run-Code Subcommand

use clap::Args;
use veritrace_core::SandboxedCodeRunner;

/// Arguments for the run-code subcommand.
#[derive(Args, Debug)]
pub struct RunCodeArgs {
    /// Snippet to execute, e.g. 'sha256("text")'.
    #[arg(required_unless_present = "list")]
    pub snippet: Option<String>,

    /// List the available operations instead.
    #[arg(long)]
    pub list: bool,
}

pub fn run(args: &RunCodeArgs) -> String {
    let runner = SandboxedCodeRunner::new();
    if args.list {
        return runner.operations().collect::<Vec<_>>().join("\n");
    }
    let output = runner.run(args.snippet.as_deref().unwrap_or_default());
    output.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_snippet() {
        let output = run(&RunCodeArgs {
            snippet: Some("upper(\"audit\")".into()),
            list: false,
        });
        assert_eq!(output, "AUDIT");
    }

    #[test]
    fn test_list_operations() {
        let output = run(&RunCodeArgs {
            snippet: None,
            list: true,
        });
        assert!(output.lines().any(|l| l == "sha256"));
    }
}
