//! Kernel process supervision.
//!
//! Owns the child OS process hosting the kernel server: locates (or
//! extracts) the executable, spawns it with the session id as its
//! positional argument, keeps its stdout/stderr drained into the host
//! log sink, and stops it with a graceful-then-forceful ladder.
//!
//! Launch failures are reported, not retried — retry policy belongs to
//! the bridge. An unexpected exit is observed by the next
//! [`is_running`](KernelSupervisor::is_running) poll, never assumed.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

// ── SupervisorConfig ─────────────────────────────────────────────

/// Configuration for [`KernelSupervisor`].
///
/// An explicit owned object: embedders construct one per session
/// instead of relying on process-wide globals, so multiple sessions can
/// coexist keyed by session id.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Kernel executable file name (platform suffix included).
    pub executable_name: String,
    /// Child working directory — the host application's data directory.
    pub data_dir: PathBuf,
    /// Cache directory for executables extracted from the host package.
    pub cache_dir: PathBuf,
    /// Additional conventional install directories to search.
    pub search_dirs: Vec<PathBuf>,
    /// Kernel executable image bundled inside the host application
    /// (`include_bytes!`), extracted when no external copy is found.
    pub embedded_kernel: Option<&'static [u8]>,
    /// Extra runtime arguments placed before the session id.
    pub runtime_args: Vec<String>,
    /// Grace period after requesting termination.
    pub graceful_timeout: Duration,
    /// Wait after escalating to forceful termination.
    pub kill_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let data_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            executable_name: default_executable_name(),
            search_dirs: vec![data_dir.join("kernel")],
            data_dir,
            cache_dir: std::env::temp_dir().join("slate"),
            embedded_kernel: None,
            runtime_args: Vec::new(),
            graceful_timeout: Duration::from_secs(5),
            kill_timeout: Duration::from_secs(2),
        }
    }
}

fn default_executable_name() -> String {
    if cfg!(windows) {
        "slate-kerneld.exe".to_string()
    } else {
        "slate-kerneld".to_string()
    }
}

// ── KernelSupervisor ─────────────────────────────────────────────

/// Owns the kernel server child process for one session.
pub struct KernelSupervisor {
    config: SupervisorConfig,
    session_id: String,
    executable: Option<PathBuf>,
    child: Option<Child>,
    drains: Vec<JoinHandle<()>>,
}

impl KernelSupervisor {
    pub fn new(session_id: impl Into<String>, config: SupervisorConfig) -> Self {
        Self {
            config,
            session_id: session_id.into(),
            executable: None,
            child: None,
            drains: Vec::new(),
        }
    }

    /// The resolved executable path, once found.
    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    /// Locate the kernel executable.
    ///
    /// Searches the extraction cache, the data directory, every
    /// configured install directory and finally the current directory;
    /// falls back to extracting the embedded image. Returns `false`
    /// only when every source fails.
    pub fn find_executable(&mut self) -> bool {
        let mut candidates = vec![self.config.cache_dir.clone(), self.config.data_dir.clone()];
        candidates.extend(self.config.search_dirs.iter().cloned());
        candidates.push(PathBuf::from("."));

        for dir in candidates {
            let path = dir.join(&self.config.executable_name);
            if path.is_file() {
                info!(path = %path.display(), "found kernel executable");
                self.executable = Some(path);
                return true;
            }
        }

        if let Some(image) = self.config.embedded_kernel {
            match self.extract_embedded(image) {
                Ok(path) => {
                    info!(path = %path.display(), "extracted embedded kernel executable");
                    self.executable = Some(path);
                    return true;
                }
                Err(e) => error!("failed to extract embedded kernel: {e}"),
            }
        }

        error!(
            name = %self.config.executable_name,
            "kernel executable not found in any location"
        );
        false
    }

    fn extract_embedded(&self, image: &[u8]) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.config.cache_dir)?;
        let target = self.config.cache_dir.join(&self.config.executable_name);
        std::fs::write(&target, image)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(target)
    }

    /// Spawn the kernel process.
    ///
    /// The child runs in the data directory with the session id as its
    /// positional argument. Its stdout/stderr are drained continuously
    /// so a chatty kernel can never stall on a full pipe buffer.
    pub fn launch(&mut self) -> bool {
        if self.executable.is_none() && !self.find_executable() {
            error!("cannot launch: kernel executable not found");
            return false;
        }
        if self.is_running() {
            warn!("kernel process already running");
            return true;
        }

        let executable = self.executable.clone().expect("resolved above");
        let mut command = Command::new(&executable);
        command
            .args(&self.config.runtime_args)
            .arg(&self.session_id)
            .current_dir(&self.config.data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(executable = %executable.display(), "failed to spawn kernel: {e}");
                return false;
            }
        };

        if let Some(stdout) = child.stdout.take() {
            self.drains.push(tokio::spawn(drain_stdout(stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            self.drains.push(tokio::spawn(drain_stderr(stderr)));
        }

        info!(
            pid = child.id().unwrap_or(0),
            session = %self.session_id,
            "kernel process started"
        );
        self.child = Some(child);
        true
    }

    /// Live process status, refreshed from the OS on every call.
    pub fn is_running(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// The child's OS process id, while it is held.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Stop the kernel process.
    ///
    /// Requests graceful termination first, waits out the grace period,
    /// escalates to a forced kill, and after the second period gives up
    /// and leaks the handle rather than blocking forever.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        info!(session = %self.session_id, "stopping kernel process");
        request_termination(&mut child);

        match timeout(self.config.graceful_timeout, child.wait()).await {
            Ok(_) => info!("kernel process stopped"),
            Err(_) => {
                warn!("kernel did not stop gracefully; killing");
                let _ = child.start_kill();
                match timeout(self.config.kill_timeout, child.wait()).await {
                    Ok(_) => info!("kernel process killed"),
                    Err(_) => warn!("kernel process survived kill; leaking handle"),
                }
            }
        }

        for drain in self.drains.drain(..) {
            drain.abort();
        }
    }
}

/// Ask the child to terminate. SIGTERM where available so the kernel
/// can tear its region down; elsewhere, the only handle is a hard kill.
fn request_termination(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: plain signal send to a pid we own.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            return;
        }
    }
    let _ = child.start_kill();
}

async fn drain_stdout(stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "kernel::out", "{line}");
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!(target: "kernel::err", "{line}");
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("slate")
            .join(format!("test_sup_{tag}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config_in(dir: &Path) -> SupervisorConfig {
        SupervisorConfig {
            data_dir: dir.to_path_buf(),
            cache_dir: dir.join("cache"),
            search_dirs: vec![],
            ..SupervisorConfig::default()
        }
    }

    #[cfg(unix)]
    fn write_fake_kernel(dir: &Path, name: &str, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn find_fails_when_nothing_exists() {
        let dir = scratch_dir("missing");
        let mut sup = KernelSupervisor::new("s", config_in(&dir));
        assert!(!sup.find_executable());
        assert!(sup.executable().is_none());
    }

    #[test]
    fn find_extracts_embedded_image() {
        let dir = scratch_dir("embed");
        let mut config = config_in(&dir);
        config.embedded_kernel = Some(b"#!/bin/sh\nexit 0\n");
        let mut sup = KernelSupervisor::new("s", config);

        assert!(sup.find_executable());
        let path = sup.executable().unwrap().to_path_buf();
        assert!(path.starts_with(dir.join("cache")));
        assert_eq!(std::fs::read(&path).unwrap(), b"#!/bin/sh\nexit 0\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0, "extracted kernel must be executable");
        }
    }

    #[cfg(unix)]
    #[test]
    fn find_prefers_cache_over_data_dir() {
        let dir = scratch_dir("prefer");
        let config = config_in(&dir);
        std::fs::create_dir_all(&config.cache_dir).unwrap();
        let cached = write_fake_kernel(&config.cache_dir, &config.executable_name, "exit 0");
        write_fake_kernel(&dir, &config.executable_name, "exit 0");

        let mut sup = KernelSupervisor::new("s", config);
        assert!(sup.find_executable());
        assert_eq!(sup.executable().unwrap(), cached);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launch_and_observe_exit() {
        let dir = scratch_dir("exit");
        let config = config_in(&dir);
        write_fake_kernel(&dir, &config.executable_name, "exit 0");

        let mut sup = KernelSupervisor::new("session", config);
        assert!(sup.launch());
        // The fake kernel exits immediately; the poll must notice.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!sup.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_terminates_long_running_child() {
        let dir = scratch_dir("stop");
        let config = config_in(&dir);
        write_fake_kernel(&dir, &config.executable_name, "exec sleep 30");

        let mut sup = KernelSupervisor::new("session", config);
        assert!(sup.launch());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sup.is_running());

        let started = std::time::Instant::now();
        sup.stop().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!sup.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launch_fails_for_non_executable() {
        let dir = scratch_dir("noexec");
        let config = config_in(&dir);
        // Present but not executable: spawn must fail, not hang.
        std::fs::write(dir.join(&config.executable_name), b"not a program").unwrap();

        let mut sup = KernelSupervisor::new("session", config);
        assert!(sup.find_executable());
        assert!(!sup.launch());
        assert!(!sup.is_running());
    }
}
