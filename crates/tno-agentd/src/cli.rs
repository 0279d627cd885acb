use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tno_observe::LoggerFormat;

#[derive(Parser, Debug)]
#[command(name = "tno-agentd", version, about = "Run and reattach tasks with the tno drivers")]
pub struct Cli {
    /// Log filter directives, e.g. `info` or `info,tno.exec=debug`
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output: text, json or journald
    #[arg(long, global = true, default_value_t = LoggerFormat::Text)]
    pub log_format: LoggerFormat,

    /// Client configuration as a JSON file (`{"options": {...}}`)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Seconds between the graceful stop request and the forced kill
    #[arg(long, global = true, default_value_t = 5)]
    pub kill_timeout: u64,

    /// Node id recorded while fingerprinting drivers
    #[arg(long, global = true, default_value = "local")]
    pub node: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a task and wait for it to finish
    Run(RunArgs),
    /// Reattach to a task started by an earlier agent and wait for it
    Attach(AttachArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Driver to use; defaults to the task's own `driver` field
    #[arg(long)]
    pub driver: Option<String>,

    /// Allocation directory; created if missing. Defaults to `<allocDir>/<task>` from
    /// the client configuration
    #[arg(long)]
    pub alloc_dir: Option<PathBuf>,

    /// Task definition as a JSON file
    #[arg(long)]
    pub task: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct AttachArgs {
    #[arg(long)]
    pub driver: String,

    /// Allocation directory the task was started in. Defaults to `<allocDir>/<task>`
    /// from the client configuration
    #[arg(long)]
    pub alloc_dir: Option<PathBuf>,

    #[arg(long)]
    pub task_name: String,

    /// Handle id printed by `run`
    pub handle_id: String,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_with_defaults() {
        let cli = Cli::try_parse_from([
            "tno-agentd",
            "run",
            "--alloc-dir",
            "/var/tno/a1",
            "--task",
            "web.json",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format, LoggerFormat::Text);
        assert_eq!(cli.kill_timeout, 5);
        assert!(cli.config.is_none());
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.driver.is_none());
        assert_eq!(args.alloc_dir, Some(PathBuf::from("/var/tno/a1")));
    }

    #[test]
    fn alloc_dir_is_optional() {
        let cli = Cli::try_parse_from(["tno-agentd", "run", "--task", "web.json"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.alloc_dir.is_none());
    }

    #[test]
    fn attach_takes_handle_id_positionally() {
        let cli = Cli::try_parse_from([
            "tno-agentd",
            "attach",
            "--driver",
            "raw_exec",
            "--alloc-dir",
            "/var/tno/a1",
            "--task-name",
            "web",
            "--log-format",
            "json",
            "PID:4242",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LoggerFormat::Json);
        let Command::Attach(args) = cli.command else {
            panic!("expected attach");
        };
        assert_eq!(args.driver, "raw_exec");
        assert_eq!(args.task_name, "web");
        assert_eq!(args.handle_id, "PID:4242");
    }

    #[test]
    fn rejects_unknown_log_format() {
        let err = Cli::try_parse_from([
            "tno-agentd",
            "--log-format",
            "xml",
            "attach",
            "--driver",
            "exec",
            "--alloc-dir",
            "/a",
            "--task-name",
            "web",
            "{}",
        ]);
        assert!(err.is_err());
    }
}
