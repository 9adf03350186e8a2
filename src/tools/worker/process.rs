//! Worker subprocess spawning and termination.

use crate::tools::worker::config::{WorkerPoolConfig, WORKING_DIR_VAR};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

/// A freshly spawned worker with its pipes detached from the child handle.
#[derive(Debug)]
pub(crate) struct Spawned {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: BufReader<ChildStdout>,
}

/// Computes the complete environment a worker starts with.
///
/// The host environment is never inherited wholesale: only `PATH`, the
/// module-resolution variable, the working-directory marker and the
/// configured pass-through names are present.
#[must_use]
pub fn worker_environment(
    config: &WorkerPoolConfig,
    tool_path: &Path,
) -> Vec<(OsString, OsString)> {
    let mut env = Vec::new();

    if let Some(path) = std::env::var_os("PATH") {
        env.push((OsString::from("PATH"), path));
    }

    let module_path = config
        .module_path
        .clone()
        .or_else(|| tool_path.parent().map(Path::to_path_buf));
    if let Some(module_path) = module_path {
        env.push((
            OsString::from(&config.module_path_var),
            module_path.into_os_string(),
        ));
    }

    if let Some(dir) = &config.working_dir {
        env.push((OsString::from(WORKING_DIR_VAR), dir.clone().into_os_string()));
    }

    for name in &config.env_passthrough {
        if env.iter().any(|(existing, _)| existing == name.as_str()) {
            continue;
        }
        if let Some(value) = std::env::var_os(name) {
            env.push((OsString::from(name), value));
        }
    }

    env
}

fn build_command(config: &WorkerPoolConfig, tool_path: &Path) -> Command {
    let mut command = Command::new(&config.runtime);
    command
        .args(&config.runtime_args)
        .arg("run")
        .arg(tool_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .env_clear()
        .envs(worker_environment(config, tool_path));

    if let Some(dir) = &config.working_dir {
        command.current_dir(dir);
    }
    command
}

/// Spawns `<runtime> [args] run <tool_path>` with piped stdio.
pub(crate) fn spawn(config: &WorkerPoolConfig, tool_path: &Path) -> Result<Spawned, String> {
    let mut child = build_command(config, tool_path)
        .spawn()
        .map_err(|e| format!("failed to spawn '{} run': {}", config.runtime, e))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| "failed to capture worker stdin".to_string())?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "failed to capture worker stdout".to_string())?;

    debug!(
        tool_path = %tool_path.display(),
        pid = child.id(),
        runtime = %config.runtime,
        "Spawned worker process"
    );

    Ok(Spawned {
        child,
        stdin,
        stdout: BufReader::new(stdout),
    })
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return false;
    };
    kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> bool {
    child.start_kill().is_ok()
}

/// Asks a worker to exit, waiting up to `grace` before killing it.
pub(crate) async fn terminate(mut child: Child, grace: Duration, tool_name: &str) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }

    if send_terminate(&mut child) {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(tool = %tool_name, %status, "Worker exited after terminate");
                return;
            }
            Ok(Err(e)) => {
                warn!(tool = %tool_name, error = %e, "Failed waiting for worker exit");
            }
            Err(_) => {
                warn!(
                    tool = %tool_name,
                    grace_ms = grace.as_millis() as u64,
                    "Worker ignored terminate; killing"
                );
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!(tool = %tool_name, error = %e, "Failed to kill worker");
    }
}

/// Kills a worker immediately without a grace period.
pub(crate) async fn kill(mut child: Child, tool_name: &str) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    if let Err(e) = child.kill().await {
        warn!(tool = %tool_name, error = %e, "Failed to kill worker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn env_names(env: &[(OsString, OsString)]) -> Vec<String> {
        env.iter()
            .map(|(k, _)| k.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn environment_defaults_module_path_to_tool_directory() {
        let config = WorkerPoolConfig::new();
        let env = worker_environment(&config, Path::new("/srv/tools/search.py"));
        let module_path = env
            .iter()
            .find(|(k, _)| k == "PYTHONPATH")
            .map(|(_, v)| PathBuf::from(v));
        assert_eq!(module_path, Some(PathBuf::from("/srv/tools")));
    }

    #[test]
    fn environment_includes_working_dir_marker() {
        let config = WorkerPoolConfig::new().with_working_dir("/srv/work");
        let env = worker_environment(&config, Path::new("/srv/tools/a.py"));
        assert!(env_names(&env).contains(&WORKING_DIR_VAR.to_string()));
    }

    #[test]
    fn environment_omits_unlisted_variables() {
        let config = WorkerPoolConfig::new()
            .with_module_path_var("TOOL_PATH")
            .with_env_passthrough(Vec::<String>::new());
        let env = worker_environment(&config, Path::new("/srv/tools/a.py"));
        let names = env_names(&env);
        assert!(names.iter().all(|n| n == "PATH" || n == "TOOL_PATH"));
    }

    #[test]
    fn passthrough_copies_present_variables_only() {
        let config = WorkerPoolConfig::new()
            .with_env_passthrough(["PATH", "TOOLHOST_TEST_SURELY_UNSET_VARIABLE"]);
        let env = worker_environment(&config, Path::new("a.py"));
        let names = env_names(&env);
        let expected = usize::from(std::env::var_os("PATH").is_some());
        assert_eq!(names.iter().filter(|n| *n == "PATH").count(), expected);
        assert!(!names.contains(&"TOOLHOST_TEST_SURELY_UNSET_VARIABLE".to_string()));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let config = WorkerPoolConfig::new().with_runtime("/nonexistent/toolhost-runtime");
        let err = spawn(&config, Path::new("tool.py")).unwrap_err();
        assert!(err.contains("failed to spawn"));
    }
}
