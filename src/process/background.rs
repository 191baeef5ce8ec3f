//! Background container lifecycle
//!
//! A [`BackgroundProcess`] owns one `<engine> run` invocation running on its
//! own task. Output of the runtime CLI is pumped through two broadcasters, so
//! callers can watch the logs at any time, and two one-shot latches record
//! when startup finished and when the command exited.
//!
//! ```text
//! Starting --(hooks done)--> Running --(exit)--------> Exited
//!     |                        |
//!     +-----(kill)-------------+--> Killed --(exit)--> Exited
//! ```

use super::latch::Latch;
use super::options::{resolve_image, LaunchOptions, Recipe, StartupHook, StartupHookFn};
use crate::error::{BerthError, BerthResult};
use crate::orchestration::ContainerRuntime;
use crate::stream::{Broadcaster, Captures, RegexScanner, Sink, SinkId, StderrSink};
use regex::bytes::Regex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause between escalating kill signals
const KILL_STEP_DELAY: Duration = Duration::from_millis(10);

/// Interval between container id lookups during launch
const ID_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output may trail the command's exit before the streams are closed
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Signals sent before the forceful kill
#[cfg(unix)]
const INTERRUPT_SEQUENCE: [libc::c_int; 3] = [libc::SIGINT, libc::SIGINT, libc::SIGTERM];

/// Lifecycle state of a background process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Command launched, startup hooks still running
    Starting,
    /// Startup finished
    Running,
    /// Kill requested, command not yet exited
    Killed,
    /// Command terminated
    Exited,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Killed => "killed",
            ProcessState::Exited => "exited",
        };
        f.write_str(s)
    }
}

struct Inner {
    name: String,
    runtime: Arc<dyn ContainerRuntime>,
    container_id: OnceLock<String>,
    pid: Mutex<Option<u32>>,
    reaped: AtomicBool,
    force_kill: Notify,
    kill_requested: AtomicBool,
    hook_failure: OnceLock<(String, String)>,
    started: Latch,
    exited: Latch,
    stdout: Broadcaster,
    stderr: Broadcaster,
}

impl Inner {
    fn pid(&self) -> MutexGuard<'_, Option<u32>> {
        self.pid.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to a container running in the background
///
/// Cloning is cheap; all clones control the same container.
#[derive(Clone)]
pub struct BackgroundProcess {
    inner: Arc<Inner>,
}

impl fmt::Debug for BackgroundProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundProcess")
            .field("name", &self.inner.name)
            .field("container_id", &self.inner.container_id.get())
            .field("state", &self.state())
            .finish()
    }
}

/// Build (if needed) and start `recipe` in the background
///
/// Returns once startup hooks have finished and the runtime reports exactly
/// one container with the generated name. Fails with
/// [`BerthError::StartupHook`] when a hook failed, and with
/// [`BerthError::ContainerStart`] when the command exits before it is found.
pub async fn launch(
    runtime: Arc<dyn ContainerRuntime>,
    recipe: &Recipe,
    options: LaunchOptions,
) -> BerthResult<BackgroundProcess> {
    launch_until(runtime, recipe, options, &CancellationToken::new()).await
}

/// [`launch`], abandoned with [`BerthError::Cancelled`] once `cancel` fires
///
/// A container already started by then is killed before returning.
pub async fn launch_until(
    runtime: Arc<dyn ContainerRuntime>,
    recipe: &Recipe,
    options: LaunchOptions,
    cancel: &CancellationToken,
) -> BerthResult<BackgroundProcess> {
    let image = tokio::select! {
        image = resolve_image(runtime.as_ref(), recipe, &options) => image?,
        _ = cancel.cancelled() => {
            return Err(BerthError::Cancelled("image resolution".to_string()));
        }
    };
    let proc = BackgroundProcess::spawn(runtime, &image, options);

    let started = tokio::select! {
        result = proc.finish_startup() => result,
        _ = cancel.cancelled() => {
            info!("Startup of {} cancelled", proc.name());
            Err(BerthError::Cancelled(format!("startup of {}", proc.name())))
        }
    };
    if let Err(e) = started {
        proc.kill().await;
        return Err(e);
    }
    Ok(proc)
}

impl BackgroundProcess {
    /// Start `image` on a new task without waiting for anything
    ///
    /// Never fails: a command that cannot be spawned is logged and leaves a
    /// handle whose `started` and `exited` latches have both fired.
    pub fn spawn(runtime: Arc<dyn ContainerRuntime>, image: &str, options: LaunchOptions) -> Self {
        let proc = Self {
            inner: Arc::new(Inner {
                name: random_name(),
                runtime,
                container_id: OnceLock::new(),
                pid: Mutex::new(None),
                force_kill: Notify::new(),
                kill_requested: AtomicBool::new(false),
                reaped: AtomicBool::new(false),
                hook_failure: OnceLock::new(),
                started: Latch::new(),
                exited: Latch::new(),
                stdout: Broadcaster::new(),
                stderr: Broadcaster::new(),
            }),
        };

        if options.echo_output {
            let echo: Arc<dyn Sink> = Arc::new(StderrSink);
            proc.inner.stdout.add_writer(Arc::clone(&echo));
            proc.inner.stderr.add_writer(echo);
        }

        let spec = options.run_spec(image, Some(proc.inner.name.clone()));
        let command = proc.inner.runtime.run_command(&spec);
        tokio::spawn(proc.clone().supervise(command, options.hooks));
        proc
    }

    /// Generated container name, 64 hex characters
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Container id, once resolved by [`launch`]
    pub fn container_id(&self) -> Option<&str> {
        self.inner.container_id.get().map(String::as_str)
    }

    /// Broadcaster of the container's stdout
    pub fn stdout(&self) -> &Broadcaster {
        &self.inner.stdout
    }

    /// Broadcaster of the container's stderr
    pub fn stderr(&self) -> &Broadcaster {
        &self.inner.stderr
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessState {
        if self.inner.exited.is_fired() || self.inner.reaped.load(Ordering::SeqCst) {
            ProcessState::Exited
        } else if self.inner.kill_requested.load(Ordering::SeqCst) {
            ProcessState::Killed
        } else if self.inner.started.is_fired() {
            ProcessState::Running
        } else {
            ProcessState::Starting
        }
    }

    /// Wait for startup hooks to finish (or for a failed spawn)
    pub async fn wait_started(&self) {
        self.inner.started.wait().await;
    }

    /// Wait for the command to terminate; safe to call any number of times
    pub async fn wait_until_exit(&self) {
        self.inner.exited.wait().await;
    }

    /// Run a shell-split command inside the container, returning its stdout
    pub async fn exec(&self, command: &str) -> BerthResult<String> {
        let parts = shlex::split(command).ok_or_else(|| BerthError::InvalidPattern {
            pattern: command.to_string(),
            reason: "unbalanced quotes".to_string(),
        })?;
        if parts.is_empty() {
            return Err(BerthError::EmptyCommand);
        }
        let id = self
            .container_id()
            .ok_or_else(|| BerthError::ContainerNotStarted(self.inner.name.clone()))?;
        self.inner.runtime.exec(id, &parts).await
    }

    /// Wait for `text` to appear in stdout or stderr after this call
    pub async fn wait_log_text(&self, text: &str) -> BerthResult<()> {
        let re = Regex::new(&regex::escape(text)).map_err(|e| BerthError::InvalidPattern {
            pattern: text.to_string(),
            reason: e.to_string(),
        })?;
        self.next_log_match(&re).await.map(|_| ())
    }

    /// Next match of `re` in stdout or stderr
    ///
    /// Only output written after this call is scanned. Fails with
    /// [`BerthError::LogStreamClosed`] when both streams end first.
    pub async fn next_log_match(&self, re: &Regex) -> BerthResult<Captures> {
        let waiter = LogWaiter::attach(&self.inner, re.clone());
        info!("Waiting for: {}", re.as_str());
        waiter.next().await
    }

    /// Stop the container, escalating from interrupt to a forceful kill
    ///
    /// Returns once the command has exited. Calling it on a handle that never
    /// ran a command, or that already exited, does nothing.
    pub async fn kill(&self) {
        let inner = &self.inner;
        if inner.exited.is_fired() {
            debug!("Container {} already exited", inner.name);
            return;
        }
        inner.kill_requested.store(true, Ordering::SeqCst);
        interrupt(inner).await;

        // a stored permit also covers a kill that races the spawn
        inner.force_kill.notify_one();
        info!("Sent kill signals to container: {}", inner.name);
        self.wait_until_exit().await;
    }

    async fn finish_startup(&self) -> BerthResult<()> {
        self.wait_started().await;
        if let Some((name, reason)) = self.inner.hook_failure.get() {
            return Err(BerthError::StartupHook {
                name: name.clone(),
                reason: reason.clone(),
            });
        }
        self.resolve_container_id().await.map(|_| ())
    }

    async fn resolve_container_id(&self) -> BerthResult<String> {
        let inner = &self.inner;
        loop {
            if inner.exited.is_fired() {
                return Err(BerthError::ContainerStart(format!(
                    "{} exited before it was running",
                    inner.name
                )));
            }

            let ids = inner.runtime.container_ids(&inner.name).await?;
            match ids.as_slice() {
                [id] => {
                    let id = inner.container_id.get_or_init(|| id.clone()).clone();
                    debug!("Container {} has id {}", inner.name, id);
                    return Ok(id);
                }
                [] => {}
                many => debug!("{} containers named {}, retrying", many.len(), inner.name),
            }

            tokio::select! {
                _ = inner.exited.wait() => {}
                _ = tokio::time::sleep(ID_POLL_INTERVAL) => {}
            }
        }
    }

    /// Drive the command from spawn to exit
    async fn supervise(self, mut command: Command, hooks: Vec<StartupHook>) {
        let inner = &self.inner;
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start container {}: {}", inner.name, e);
                inner.stdout.close();
                inner.stderr.close();
                inner.started.fire();
                inner.exited.fire();
                return;
            }
        };
        *inner.pid() = child.id();
        // held open for the container's lifetime, `--interactive` exits on EOF
        let stdin = child.stdin.take();

        // log waits subscribe before the first byte is pumped
        let pending: Vec<(String, PendingHook)> =
            hooks.into_iter().map(|hook| self.prepare_hook(hook)).collect();

        let mut pumps = Vec::new();
        match child.stdout.take() {
            Some(out) => pumps.push(spawn_pump(out, Arc::clone(&self.inner), Stream::Stdout)),
            None => inner.stdout.close(),
        }
        match child.stderr.take() {
            Some(err) => pumps.push(spawn_pump(err, Arc::clone(&self.inner), Stream::Stderr)),
            None => inner.stderr.close(),
        }

        tokio::spawn(self.clone().run_hooks(pending));

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = inner.force_kill.notified() => None,
        };
        let status = match finished {
            Some(status) => status,
            None => {
                if let Err(e) = child.start_kill() {
                    debug!("Forceful kill of {} failed: {}", inner.name, e);
                }
                child.wait().await
            }
        };
        // the pid may be reused once reaped, so no signal may reach it
        *inner.pid() = None;
        inner.reaped.store(true, Ordering::SeqCst);
        drop(stdin);

        for pump in pumps {
            if tokio::time::timeout(DRAIN_TIMEOUT, pump).await.is_err() {
                debug!("Output of {} still open after exit", inner.name);
            }
        }
        inner.stdout.close();
        inner.stderr.close();

        match status {
            Ok(status) => info!("Container {} exited: {}", inner.name, status),
            Err(e) => warn!("Failed to wait for container {}: {}", inner.name, e),
        }
        inner.exited.fire();
    }

    fn prepare_hook(&self, hook: StartupHook) -> (String, PendingHook) {
        let label = hook.describe();
        let pending = match hook {
            StartupHook::WaitLog(text) => match Regex::new(&regex::escape(&text)) {
                Ok(re) => PendingHook::Log(LogWaiter::attach(&self.inner, re).spawn_next()),
                Err(e) => PendingHook::Invalid(BerthError::InvalidPattern {
                    pattern: text,
                    reason: e.to_string(),
                }),
            },
            StartupHook::WaitMatch(re) => {
                PendingHook::Log(LogWaiter::attach(&self.inner, re).spawn_next())
            }
            StartupHook::Custom(_, hook) => PendingHook::Custom(hook),
        };
        (label, pending)
    }

    /// Run startup hooks in order, then release `started` whatever happened
    async fn run_hooks(self, hooks: Vec<(String, PendingHook)>) {
        let mut hooks = hooks.into_iter();
        while let Some((label, hook)) = hooks.next() {
            let result = match hook {
                PendingHook::Log(task) => match task.await {
                    Ok(result) => result.map(|_| ()),
                    Err(e) => Err(BerthError::Internal(format!("log wait aborted: {}", e))),
                },
                PendingHook::Custom(hook) => hook(self.clone()).await,
                PendingHook::Invalid(e) => Err(e),
            };

            if let Err(e) = result {
                error!("Startup hook '{}' failed for {}: {}", label, self.inner.name, e);
                let _ = self.inner.hook_failure.set((label, e.to_string()));
                for (_, rest) in hooks.by_ref() {
                    if let PendingHook::Log(task) = rest {
                        task.abort();
                    }
                }
                self.kill().await;
                break;
            }
        }
        self.inner.started.fire();
    }
}

enum PendingHook {
    Log(JoinHandle<BerthResult<Captures>>),
    Custom(StartupHookFn),
    Invalid(BerthError),
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_pump<R>(reader: R, inner: Arc<Inner>, stream: Stream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let target = match stream {
            Stream::Stdout => &inner.stdout,
            Stream::Stderr => &inner.stderr,
        };
        pump(reader, target).await;
        debug!("{:?} of {} reached end of stream", stream, inner.name);
    })
}

/// Copy a reader into a broadcaster until EOF, then close it
async fn pump<R: AsyncRead + Unpin>(mut reader: R, target: &Broadcaster) {
    let mut buf = vec![0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                target.write(&buf[..n]).await;
            }
            Err(e) => {
                debug!("Output read failed: {}", e);
                break;
            }
        }
    }
    target.close();
}

/// A pair of scanners attached to both output streams
struct LogWaiter {
    inner: Arc<Inner>,
    pattern: String,
    stdout_id: SinkId,
    stderr_id: SinkId,
    stdout_rx: mpsc::Receiver<Captures>,
    stderr_rx: mpsc::Receiver<Captures>,
}

impl LogWaiter {
    fn attach(inner: &Arc<Inner>, re: Regex) -> Self {
        let pattern = re.as_str().to_string();
        let (out_scanner, stdout_rx) = RegexScanner::new(re.clone());
        let (err_scanner, stderr_rx) = RegexScanner::new(re);
        let stdout_id = inner.stdout.add_writer(Arc::new(out_scanner));
        let stderr_id = inner.stderr.add_writer(Arc::new(err_scanner));
        Self {
            inner: Arc::clone(inner),
            pattern,
            stdout_id,
            stderr_id,
            stdout_rx,
            stderr_rx,
        }
    }

    /// First match from either stream
    async fn next(mut self) -> BerthResult<Captures> {
        let (mut stdout_open, mut stderr_open) = (true, true);
        loop {
            tokio::select! {
                m = self.stdout_rx.recv(), if stdout_open => match m {
                    Some(captures) => return Ok(captures),
                    None => stdout_open = false,
                },
                m = self.stderr_rx.recv(), if stderr_open => match m {
                    Some(captures) => return Ok(captures),
                    None => stderr_open = false,
                },
                else => return Err(BerthError::LogStreamClosed(self.pattern.clone())),
            }
        }
    }

    /// Wait on a separate task so output keeps flowing while earlier hooks run
    fn spawn_next(self) -> JoinHandle<BerthResult<Captures>> {
        tokio::spawn(self.next())
    }
}

impl Drop for LogWaiter {
    fn drop(&mut self) {
        self.inner.stdout.remove_writer(self.stdout_id);
        self.inner.stderr.remove_writer(self.stderr_id);
    }
}

/// Send the interrupt sequence while the command is alive
#[cfg(unix)]
async fn interrupt(inner: &Inner) {
    for signal in INTERRUPT_SEQUENCE {
        {
            let pid = inner.pid();
            match *pid {
                Some(pid) => send_signal(pid, signal),
                None => break,
            }
        }
        tokio::time::sleep(KILL_STEP_DELAY).await;
    }
}

#[cfg(not(unix))]
async fn interrupt(_inner: &Inner) {}

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and has no memory preconditions
    if unsafe { libc::kill(pid, signal) } != 0 {
        debug!(
            "Signal {} to {} failed: {}",
            signal,
            pid,
            std::io::Error::last_os_error()
        );
    }
}

/// 256 random bits as lowercase hex
fn random_name() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::orchestration::RunSpec;
    use async_trait::async_trait;
    use std::path::Path;
    use std::process::Stdio;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Runtime whose containers are `sh -c <script>` processes
    struct ShellRuntime {
        program: String,
        script: String,
        report_id: bool,
    }

    impl ShellRuntime {
        fn new(script: &str) -> Arc<Self> {
            Arc::new(Self {
                program: "sh".to_string(),
                script: script.to_string(),
                report_id: true,
            })
        }

        fn without_id(script: &str) -> Arc<Self> {
            Arc::new(Self {
                program: "sh".to_string(),
                script: script.to_string(),
                report_id: false,
            })
        }

        fn missing_binary() -> Arc<Self> {
            Arc::new(Self {
                program: "/nonexistent/berth-engine".to_string(),
                script: String::new(),
                report_id: false,
            })
        }
    }

    #[async_trait]
    impl ContainerRuntime for ShellRuntime {
        async fn build(&self, _dockerfile: &Path, _tag: &str) -> BerthResult<()> {
            Ok(())
        }

        async fn build_local(&self, _dockerfile: &Path, _dest: &Path) -> BerthResult<()> {
            Ok(())
        }

        async fn pull(&self, _image: &str) -> BerthResult<()> {
            Ok(())
        }

        async fn push(&self, _image: &str) -> BerthResult<()> {
            Ok(())
        }

        async fn container_ids(&self, name: &str) -> BerthResult<Vec<String>> {
            if self.report_id {
                Ok(vec![format!("id-{}", &name[..12])])
            } else {
                Ok(vec![])
            }
        }

        async fn exec(&self, container_id: &str, command: &[String]) -> BerthResult<String> {
            Ok(format!("{}:{}", container_id, command.join("|")))
        }

        async fn run(&self, _spec: &RunSpec) -> BerthResult<String> {
            Ok(String::new())
        }

        fn run_command(&self, _spec: &RunSpec) -> Command {
            let mut cmd = Command::new(&self.program);
            cmd.arg("-c")
                .arg(&self.script)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            cmd
        }

        fn runtime_name(&self) -> &str {
            "shell"
        }
    }

    fn quiet() -> LaunchOptions {
        LaunchOptions::new().echo_output(false)
    }

    fn image() -> Recipe {
        Recipe::Image("fixture:latest".to_string())
    }

    #[tokio::test]
    async fn names_are_unique_hex() {
        let runtime = ShellRuntime::new("exit 0");
        let a = BackgroundProcess::spawn(runtime.clone(), "img", quiet());
        let b = BackgroundProcess::spawn(runtime, "img", quiet());
        assert_eq!(a.name().len(), 64);
        assert!(a.name().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.name(), b.name());
        a.wait_until_exit().await;
        b.wait_until_exit().await;
    }

    #[tokio::test]
    async fn kill_without_command_is_noop() {
        let proc = BackgroundProcess::spawn(ShellRuntime::missing_binary(), "img", quiet());
        tokio::time::timeout(TIMEOUT, proc.wait_started()).await.unwrap();

        tokio::time::timeout(TIMEOUT, proc.kill()).await.unwrap();
        tokio::time::timeout(TIMEOUT, proc.wait_until_exit())
            .await
            .unwrap();
        assert_eq!(proc.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn exit_is_visible_while_output_drains() {
        // the backgrounded sleep keeps the output pipes open past the exit
        let runtime = ShellRuntime::new("sleep 3 & exit 0");
        let proc = BackgroundProcess::spawn(runtime, "img", quiet());
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(proc.inner.pid().is_none());
        assert_eq!(proc.state(), ProcessState::Exited);
        assert!(!proc.inner.exited.is_fired());

        let begin = Instant::now();
        tokio::time::timeout(TIMEOUT, proc.kill()).await.unwrap();
        assert!(begin.elapsed() < Duration::from_secs(2));
        assert!(proc.inner.exited.is_fired());
    }

    #[tokio::test]
    async fn kill_after_exit_is_noop() {
        let proc = BackgroundProcess::spawn(ShellRuntime::new("echo done"), "img", quiet());
        tokio::time::timeout(TIMEOUT, proc.wait_until_exit())
            .await
            .unwrap();

        tokio::time::timeout(TIMEOUT, proc.kill()).await.unwrap();
        proc.kill().await;
        assert_eq!(proc.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn wait_log_text_blocks_until_emitted() {
        let script = "sleep 0.05; echo ready; exec sleep 5";
        let proc = BackgroundProcess::spawn(ShellRuntime::new(script), "img", quiet());

        let begin = Instant::now();
        tokio::time::timeout(TIMEOUT, proc.wait_log_text("ready"))
            .await
            .unwrap()
            .unwrap();
        assert!(begin.elapsed() >= Duration::from_millis(40));

        tokio::time::timeout(TIMEOUT, proc.kill()).await.unwrap();
        assert_eq!(proc.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn next_log_match_returns_named_groups() {
        let script = "sleep 0.05; echo 'listening on port 8080' >&2; exec sleep 5";
        let proc = BackgroundProcess::spawn(ShellRuntime::new(script), "img", quiet());

        let re = Regex::new(r"port (?P<port>\d+)").unwrap();
        let captures = tokio::time::timeout(TIMEOUT, proc.next_log_match(&re))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(captures.get("port").map(String::as_str), Some("8080"));
        assert_eq!(captures.get("").map(String::as_str), Some("port 8080"));

        // waiters detach on return
        assert!(proc.stderr().is_empty());
        proc.kill().await;
    }

    #[tokio::test]
    async fn log_wait_fails_when_streams_close() {
        let runtime = ShellRuntime::new("echo nothing here");
        let proc = BackgroundProcess::spawn(runtime, "img", quiet());
        let re = Regex::new("never").unwrap();
        let err = tokio::time::timeout(TIMEOUT, proc.next_log_match(&re))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, BerthError::LogStreamClosed(_)));
    }

    #[tokio::test]
    async fn launch_waits_for_log_hook() {
        let script = "sleep 0.05; echo starting; echo ready >&2; exec sleep 5";
        let proc = tokio::time::timeout(
            TIMEOUT,
            launch(ShellRuntime::new(script), &image(), quiet().wait_log("ready")),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(proc.state(), ProcessState::Running);
        let id = format!("id-{}", &proc.name()[..12]);
        assert_eq!(proc.container_id(), Some(id.as_str()));

        let out = proc.exec("ls -la '/my dir'").await.unwrap();
        assert_eq!(out, format!("{}:ls|-la|/my dir", id));

        tokio::time::timeout(TIMEOUT, proc.kill()).await.unwrap();
        assert_eq!(proc.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn hook_failure_kills_but_releases_started() {
        let options = quiet().hook("health", |_proc| async {
            Err(BerthError::Internal("health check failed".to_string()))
        });
        let proc = BackgroundProcess::spawn(ShellRuntime::new("exec sleep 5"), "img", options);

        tokio::time::timeout(TIMEOUT, proc.wait_started())
            .await
            .unwrap();
        assert_eq!(proc.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn launch_reports_hook_failure() {
        let options = quiet().hook("health", |_proc| async {
            Err(BerthError::Internal("health check failed".to_string()))
        });
        let err = tokio::time::timeout(
            TIMEOUT,
            launch(ShellRuntime::new("exec sleep 5"), &image(), options),
        )
        .await
        .unwrap()
        .unwrap_err();
        match err {
            BerthError::StartupHook { name, reason } => {
                assert_eq!(name, "health");
                assert!(reason.contains("health check failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn custom_hook_sees_running_process() {
        let options = quiet().hook("exec-check", |proc| async move {
            proc.wait_log_text("up").await?;
            Ok(())
        });
        let script = "sleep 0.05; echo up; exec sleep 5";
        let proc = BackgroundProcess::spawn(ShellRuntime::new(script), "img", options);

        tokio::time::timeout(TIMEOUT, proc.wait_started())
            .await
            .unwrap();
        assert_eq!(proc.state(), ProcessState::Running);
        proc.kill().await;
    }

    #[tokio::test]
    async fn launch_fails_when_process_exits_early() {
        let runtime = ShellRuntime::without_id("exit 3");
        let err = tokio::time::timeout(TIMEOUT, launch(runtime, &image(), quiet()))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, BerthError::ContainerStart(_)));
    }

    #[tokio::test]
    async fn launch_until_stops_on_cancel() {
        let script = "exec sleep 5";
        let options = quiet().wait_log("never printed");
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let begin = Instant::now();
        let err = tokio::time::timeout(
            TIMEOUT,
            launch_until(ShellRuntime::new(script), &image(), options, &token),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, BerthError::Cancelled(ref what) if what.starts_with("startup of")));
        assert!(begin.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn exec_validation() {
        let proc = BackgroundProcess::spawn(ShellRuntime::new("exec sleep 5"), "img", quiet());
        assert!(matches!(proc.exec("   ").await, Err(BerthError::EmptyCommand)));
        assert!(matches!(
            proc.exec("echo 'open").await,
            Err(BerthError::InvalidPattern { .. })
        ));
        // id is only resolved by launch
        assert!(matches!(
            proc.exec("ls").await,
            Err(BerthError::ContainerNotStarted(_))
        ));
        proc.kill().await;
    }

    #[tokio::test]
    async fn wait_until_exit_is_concurrent_safe() {
        let proc = BackgroundProcess::spawn(ShellRuntime::new("sleep 0.05"), "img", quiet());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let proc = proc.clone();
                tokio::spawn(async move { proc.wait_until_exit().await })
            })
            .collect();
        for waiter in waiters {
            tokio::time::timeout(TIMEOUT, waiter).await.unwrap().unwrap();
        }
        proc.wait_until_exit().await;
    }
}
