mod cli;

use std::{
    fs, future::Future, io,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tno_core::{AllocDir, DriverContext, DriverHandle, DriverRouter, ExecContext};
use tno_model::{ClientConfig, Node, Task};
use tno_observe::{LoggerConfig, logger_init};
use tracing::{error, info, warn};

use crate::cli::{AttachArgs, Cli, Command, RunArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logger_init(&LoggerConfig::new(cli.log_format, cli.log_level.clone())) {
        eprintln!("tno-agentd: {e}");
        return ExitCode::FAILURE;
    }

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: "tno.agentd", error = %format!("{e:#}"), "agent failed");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = Arc::new(load_config(cli.config.as_deref())?);
    let kill_timeout = Duration::from_secs(cli.kill_timeout);
    let router = tno_exec::builtin_drivers();

    match cli.command {
        Command::Run(args) => run(&router, config, kill_timeout, &cli.node, args).await,
        Command::Attach(args) => attach(&router, config, kill_timeout, args).await,
    }
}

async fn run(
    router: &DriverRouter,
    config: Arc<ClientConfig>,
    kill_timeout: Duration,
    node_id: &str,
    args: RunArgs,
) -> Result<()> {
    let task = load_task(&args.task)?;
    let driver_name = match args.driver.as_deref().unwrap_or(&task.driver) {
        "" => bail!("task {:?} names no driver; pass --driver", task.name),
        name => name.to_string(),
    };

    let mut node = Node::new(node_id, node_id);
    let eligible = router.fingerprint(&config, &mut node)?;
    if !eligible.iter().any(|name| *name == driver_name) {
        bail!("driver {driver_name:?} is not enabled on this node");
    }

    let alloc_dir = alloc_dir_for(args.alloc_dir, &config, &task.name)?;
    let ctx = exec_context(&alloc_dir, &task.name)?;
    let driver = router.build(
        &driver_name,
        DriverContext::new(task.name.clone(), config).with_kill_timeout(kill_timeout),
    )?;
    let handle = driver
        .start(&ctx, &task)
        .await
        .with_context(|| format!("starting task {:?}", task.name))?;

    info!(target: "tno.agentd", task = %task.name, driver = %driver_name, handle = %handle.id(), "task started");
    println!("{}", handle.id());
    supervise(handle.as_ref()).await
}

async fn attach(
    router: &DriverRouter,
    config: Arc<ClientConfig>,
    kill_timeout: Duration,
    args: AttachArgs,
) -> Result<()> {
    let alloc_dir = alloc_dir_for(args.alloc_dir, &config, &args.task_name)?;
    let ctx = exec_context(&alloc_dir, &args.task_name)?;
    let driver = router.build(
        &args.driver,
        DriverContext::new(args.task_name.clone(), config).with_kill_timeout(kill_timeout),
    )?;
    let handle = driver
        .open(&ctx, &args.handle_id)
        .await
        .with_context(|| format!("reattaching to {:?}", args.handle_id))?;

    info!(target: "tno.agentd", task = %args.task_name, handle = %handle.id(), "reattached");
    supervise(handle.as_ref()).await
}

/// Waits for the task, killing it on Ctrl-C.
async fn supervise(handle: &dyn DriverHandle) -> Result<()> {
    supervise_until(handle, tokio::signal::ctrl_c()).await
}

/// Waits for the task, killing it once `interrupt` resolves with `Ok`.
///
/// If listening for the interrupt fails, the task is only waited on.
async fn supervise_until<I>(handle: &dyn DriverHandle, interrupt: I) -> Result<()>
where
    I: Future<Output = io::Result<()>>,
{
    let interrupted = async {
        if let Err(e) = interrupt.await {
            warn!(target: "tno.agentd", error = %e, "cannot listen for interrupts; Ctrl-C will not stop the task");
            std::future::pending::<()>().await;
        }
    };

    let mut wait = handle.wait_ch();
    let result = tokio::select! {
        res = wait.wait() => res,
        () = interrupted => {
            warn!(target: "tno.agentd", "interrupted, stopping task");
            handle.kill().await.context("stopping task")?;
            handle.wait_ch().wait().await
        }
    };

    result.context("task did not exit cleanly")?;
    info!(target: "tno.agentd", "task finished");
    Ok(())
}

/// An explicit `--alloc-dir` wins; otherwise the task gets its own directory under the
/// configured allocation root.
fn alloc_dir_for(
    explicit: Option<PathBuf>,
    config: &ClientConfig,
    task_name: &str,
) -> Result<PathBuf> {
    match (explicit, &config.alloc_dir) {
        (Some(dir), _) => Ok(dir),
        (None, Some(root)) => Ok(root.join(task_name)),
        (None, None) => bail!("no allocation directory: pass --alloc-dir or set allocDir in the config"),
    }
}

fn exec_context(alloc_dir: &Path, task_name: &str) -> Result<ExecContext> {
    let mut alloc = AllocDir::new(alloc_dir);
    alloc
        .build(&[task_name])
        .with_context(|| format!("building allocation dir {}", alloc_dir.display()))?;

    let alloc_id = alloc_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "local".to_string());
    Ok(ExecContext::new(alloc_id, Arc::new(alloc)))
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        return Ok(ClientConfig::new());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn load_task(path: &Path) -> Result<Task> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading task {}", path.display()))?;
    let task: Task =
        serde_json::from_str(&raw).with_context(|| format!("parsing task {}", path.display()))?;
    if task.name.is_empty() {
        bail!("task in {} has no name", path.display());
    }
    Ok(task)
}
