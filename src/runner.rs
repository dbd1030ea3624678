use crate::adapters::claude::ClaudeAdapter;
use crate::adapters::CliCommand;
use crate::errors::{BridgeError, BridgeResult};
use crate::harness::cli_missing::{spawn_failure_code, SPAWN_FAILED_CODE};
use crate::harness::line_buffer::LineBuffer;
use crate::models::{ClientOptions, ExecutionRequest, OutputFormat};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, RwLock as StdRwLock};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Duration, Instant};

const READ_CHUNK_BYTES: usize = 4096;
const MAX_STDERR_LINE_BYTES: usize = 100_000;
/// Only the tail of stderr is kept for error messages.
const MAX_STDERR_CAPTURE_BYTES: usize = 64 * 1024;
const REAP_GRACE: Duration = Duration::from_secs(2);

/// The two ways the client surfaces drive the CLI.
#[async_trait]
pub(crate) trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> BridgeResult<String>;
    fn execute_stream(&self, request: ExecutionRequest) -> CliByteStream;
}

/// Requests termination of an in-flight execution.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Live stdout of a streaming execution.
///
/// Owns the child process: dropping the stream before it ends kills and
/// reaps the process.
pub struct CliByteStream {
    rx: mpsc::UnboundedReceiver<BridgeResult<Bytes>>,
    abort: AbortHandle,
}

impl CliByteStream {
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    #[cfg(test)]
    pub(crate) fn from_chunks(chunks: Vec<BridgeResult<Bytes>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in chunks {
            let _ = tx.send(chunk);
        }
        Self {
            rx,
            abort: AbortHandle::new(),
        }
    }
}

impl Stream for CliByteStream {
    type Item = BridgeResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for CliByteStream {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

struct ProcessHandle {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    pid: Option<u32>,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Aborted,
}

pub struct CliRunner {
    adapter: ClaudeAdapter,
    options: ClientOptions,
    env: StdRwLock<BTreeMap<String, String>>,
}

impl CliRunner {
    pub fn new(options: ClientOptions) -> Self {
        let env = options.child_env();
        Self {
            adapter: ClaudeAdapter,
            options,
            env: StdRwLock::new(env),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Adds or replaces one environment override for every later execution.
    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut env = match self.env.write() {
            Ok(env) => env,
            Err(poisoned) => poisoned.into_inner(),
        };
        env.insert(key.into(), value.into());
    }

    pub fn command_for(&self, request: &ExecutionRequest) -> CliCommand {
        let env = match self.env.read() {
            Ok(env) => env.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        self.adapter.build_command(request, &self.options, env)
    }

    /// Runs the request to completion and returns its stdout.
    pub async fn execute(&self, request: ExecutionRequest) -> BridgeResult<String> {
        self.execute_with_abort(request, &AbortHandle::new()).await
    }

    pub async fn execute_with_abort(&self, request: ExecutionRequest, abort: &AbortHandle) -> BridgeResult<String> {
        let timeout_ms = request
            .timeout_ms
            .filter(|value| *value > 0)
            .unwrap_or(self.options.timeout_ms);
        let command = self.command_for(&request);
        let mut process = launch(&command)?;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        let stdout_task = process.stdout.take().map(|stream| tokio::spawn(collect_output(stream)));
        let stderr_task = process
            .stderr
            .take()
            .map(|stream| tokio::spawn(collect_stderr(stream, process.pid)));

        let mut abort_rx = abort.subscribe();
        let outcome = tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
            _ = wait_for_abort(&mut abort_rx) => Outcome::Aborted,
            status = process.child.wait() => Outcome::Exited(status),
        };

        match outcome {
            Outcome::TimedOut => {
                tracing::warn!(pid = ?process.pid, timeout_ms, "claude cli timed out; terminating");
                abort_task(stdout_task);
                abort_task(stderr_task);
                reap_in_background(process.child);
                Err(BridgeError::Timeout { timeout_ms })
            }
            Outcome::Aborted => {
                tracing::info!(pid = ?process.pid, "claude cli execution aborted");
                abort_task(stdout_task);
                abort_task(stderr_task);
                reap_in_background(process.child);
                Err(BridgeError::Cancelled)
            }
            Outcome::Exited(Err(error)) => {
                terminate_then_kill(&mut process.child).await;
                abort_task(stdout_task);
                let stderr = join_bytes(stderr_task, Instant::now() + REAP_GRACE).await.unwrap_or_default();
                Err(BridgeError::Spawn {
                    message: error.to_string(),
                    stderr: lossy(&stderr),
                    code: SPAWN_FAILED_CODE,
                })
            }
            Outcome::Exited(Ok(status)) => {
                let stdout = join_bytes(stdout_task, deadline).await;
                let stderr = join_bytes(stderr_task, deadline).await;
                let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
                    return Err(BridgeError::Timeout { timeout_ms });
                };
                let stderr = lossy(&stderr);
                tracing::debug!(
                    pid = ?process.pid,
                    exit_code = ?status.code(),
                    stdout_bytes = stdout.len(),
                    "claude cli exited"
                );

                if !status.success() {
                    return Err(BridgeError::Exit {
                        code: status.code(),
                        stderr,
                    });
                }
                if !stderr.is_empty() {
                    tracing::warn!(pid = ?process.pid, stderr = %stderr, "claude cli wrote to stderr");
                }
                Ok(lossy(&stdout))
            }
        }
    }

    /// Starts the request with `stream-json` output and returns its stdout as
    /// it arrives. Must be called from within a Tokio runtime.
    ///
    /// Spawn failures, a non-zero exit, an explicit request timeout and an
    /// `abort_handle()` abort arrive as the final `Err` item; a clean exit
    /// simply ends the stream.
    pub fn execute_stream(&self, mut request: ExecutionRequest) -> CliByteStream {
        request.output_format = Some(OutputFormat::StreamJson);
        let command = self.command_for(&request);
        let stream_timeout = request
            .timeout_ms
            .filter(|value| *value > 0)
            .map(Duration::from_millis);
        let (tx, rx) = mpsc::unbounded_channel();
        let abort = AbortHandle::new();
        tokio::spawn(drive_stream(command, stream_timeout, tx, abort.clone()));
        CliByteStream { rx, abort }
    }
}

#[async_trait]
impl Executor for CliRunner {
    async fn execute(&self, request: ExecutionRequest) -> BridgeResult<String> {
        CliRunner::execute(self, request).await
    }

    fn execute_stream(&self, request: ExecutionRequest) -> CliByteStream {
        CliRunner::execute_stream(self, request)
    }
}

fn launch(command: &CliCommand) -> BridgeResult<ProcessHandle> {
    let mut builder = Command::new(&command.program);
    builder
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &command.env {
        builder.env(key, value);
    }

    let mut child = builder.spawn().map_err(|error| {
        tracing::error!(program = %command.program, error = %error, "failed to spawn claude cli");
        BridgeError::Spawn {
            message: error.to_string(),
            stderr: String::new(),
            code: spawn_failure_code(&error),
        }
    })?;
    let pid = child.id();
    tracing::debug!(program = %command.program, args = command.args.len(), pid = ?pid, "spawned claude cli");

    Ok(ProcessHandle {
        stdout: child.stdout.take(),
        stderr: child.stderr.take(),
        child,
        pid,
    })
}

async fn drive_stream(
    command: CliCommand,
    stream_timeout: Option<Duration>,
    tx: mpsc::UnboundedSender<BridgeResult<Bytes>>,
    abort: AbortHandle,
) {
    let mut process = match launch(&command) {
        Ok(process) => process,
        Err(error) => {
            let _ = tx.send(Err(error));
            return;
        }
    };
    let deadline = stream_timeout.map(|limit| Instant::now() + limit);
    let timeout_ms = stream_timeout.map(|limit| limit.as_millis() as u64).unwrap_or_default();
    let stderr_task = process
        .stderr
        .take()
        .map(|stream| tokio::spawn(collect_stderr(stream, process.pid)));
    let mut abort_rx = abort.subscribe();

    if let Some(mut stdout) = process.stdout.take() {
        let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
        loop {
            tokio::select! {
                biased;
                _ = wait_for_abort(&mut abort_rx) => {
                    tracing::debug!(pid = ?process.pid, "claude cli stream aborted; terminating");
                    let _ = tx.send(Err(BridgeError::Cancelled));
                    drop(tx);
                    abort_task(stderr_task);
                    terminate_then_kill(&mut process.child).await;
                    return;
                }
                _ = sleep_until_deadline(deadline) => {
                    tracing::warn!(pid = ?process.pid, timeout_ms, "claude cli stream timed out; terminating");
                    let _ = tx.send(Err(BridgeError::Timeout { timeout_ms }));
                    drop(tx);
                    abort_task(stderr_task);
                    terminate_then_kill(&mut process.child).await;
                    return;
                }
                read = stdout.read(&mut chunk) => match read {
                    Ok(0) => break,
                    Ok(size) => {
                        if tx.send(Ok(Bytes::copy_from_slice(&chunk[..size]))).is_err() {
                            terminate_then_kill(&mut process.child).await;
                            abort_task(stderr_task);
                            return;
                        }
                    }
                    Err(error) => {
                        terminate_then_kill(&mut process.child).await;
                        abort_task(stderr_task);
                        let _ = tx.send(Err(BridgeError::Io(format!("failed to read claude cli stdout: {}", error))));
                        return;
                    }
                }
            }
        }
    }

    let outcome = tokio::select! {
        biased;
        _ = wait_for_abort(&mut abort_rx) => Outcome::Aborted,
        _ = sleep_until_deadline(deadline) => Outcome::TimedOut,
        status = process.child.wait() => Outcome::Exited(status),
    };

    match outcome {
        Outcome::Aborted => {
            let _ = tx.send(Err(BridgeError::Cancelled));
            drop(tx);
            abort_task(stderr_task);
            terminate_then_kill(&mut process.child).await;
        }
        Outcome::TimedOut => {
            let _ = tx.send(Err(BridgeError::Timeout { timeout_ms }));
            drop(tx);
            abort_task(stderr_task);
            terminate_then_kill(&mut process.child).await;
        }
        Outcome::Exited(Err(error)) => {
            terminate_then_kill(&mut process.child).await;
            let stderr = join_bytes(stderr_task, Instant::now() + REAP_GRACE).await.unwrap_or_default();
            let _ = tx.send(Err(BridgeError::Spawn {
                message: error.to_string(),
                stderr: lossy(&stderr),
                code: SPAWN_FAILED_CODE,
            }));
        }
        Outcome::Exited(Ok(status)) => {
            tracing::debug!(pid = ?process.pid, exit_code = ?status.code(), "claude cli stream exited");
            if !status.success() {
                let stderr = join_bytes(stderr_task, Instant::now() + REAP_GRACE).await.unwrap_or_default();
                let _ = tx.send(Err(BridgeError::Exit {
                    code: status.code(),
                    stderr: lossy(&stderr),
                }));
            }
        }
    }
}

async fn collect_output<R>(mut stream: R) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(size) => collected.extend_from_slice(&chunk[..size]),
            Err(error) => {
                tracing::warn!(error = %error, "claude cli output read failed");
                break;
            }
        }
    }
    collected
}

/// Keeps the last `MAX_STDERR_CAPTURE_BYTES` of stderr while logging each
/// line as diagnostic noise.
async fn collect_stderr<R>(mut stream: R, pid: Option<u32>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
    let mut lines = LineBuffer::new(Some(MAX_STDERR_LINE_BYTES));
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(size) => {
                collected.extend_from_slice(&chunk[..size]);
                if collected.len() > MAX_STDERR_CAPTURE_BYTES {
                    let excess = collected.len() - MAX_STDERR_CAPTURE_BYTES;
                    collected.drain(..excess);
                }
                for line in lines.push(&chunk[..size]) {
                    if !line.trim().is_empty() {
                        tracing::debug!(pid = ?pid, line = %line, "claude cli stderr");
                    }
                }
            }
            Err(error) => {
                tracing::warn!(pid = ?pid, error = %error, "claude cli stderr read failed");
                break;
            }
        }
    }
    let rest = lines.flush();
    if !rest.trim().is_empty() {
        tracing::debug!(pid = ?pid, line = %rest, "claude cli stderr");
    }
    collected
}

async fn join_bytes(task: Option<JoinHandle<Vec<u8>>>, deadline: Instant) -> Option<Vec<u8>> {
    let Some(task) = task else {
        return Some(Vec::new());
    };
    match timeout_at(deadline, task).await {
        Ok(Ok(bytes)) => Some(bytes),
        Ok(Err(error)) => {
            tracing::warn!(error = %error, "claude cli output reader failed");
            Some(Vec::new())
        }
        Err(_) => None,
    }
}

fn abort_task<T>(task: Option<JoinHandle<T>>) {
    if let Some(task) = task {
        task.abort();
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Lets the caller see the failure without waiting out the termination grace.
fn reap_in_background(mut child: Child) {
    tokio::spawn(async move {
        terminate_then_kill(&mut child).await;
    });
}

async fn terminate_then_kill(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    if timeout(Duration::from_millis(1500), child.wait())
        .await
        .is_ok()
    {
        return;
    }

    let _ = child.start_kill();
    let _ = timeout(REAP_GRACE, child.wait()).await;
}


#[cfg(all(test, unix))]
mod tests {
    use super::{collect_stderr, AbortHandle, CliRunner, MAX_STDERR_CAPTURE_BYTES};
    use crate::errors::BridgeError;
    use crate::harness::demux::EventStream;
    use crate::models::{ClientOptions, ExecutionRequest};
    use futures::StreamExt;
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Runner whose "CLI" is `sh <script>`; the script sees the built flags as `$@`.
    fn runner_for(script: &str) -> (TempDir, CliRunner) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mock-cli.sh");
        std::fs::write(&path, script).expect("write script");
        let options = ClientOptions::default()
            .with_cli_path("/bin/sh")
            .with_cli_args([path.to_string_lossy().to_string()])
            .with_timeout_ms(10_000);
        (dir, CliRunner::new(options))
    }

    fn prompt() -> ExecutionRequest {
        ExecutionRequest::new().with_prompt("hello")
    }

    #[tokio::test]
    async fn buffered_success_returns_stdout_verbatim() {
        let (_dir, runner) = runner_for("printf '%s' '{\"id\":\"x\"}'\n");
        let output = runner.execute(prompt()).await.expect("output");
        assert_eq!(output, "{\"id\":\"x\"}");
    }

    #[tokio::test]
    async fn buffered_success_ignores_stderr_noise() {
        let (_dir, runner) = runner_for("echo warming up >&2\nprintf 'done'\n");
        assert_eq!(runner.execute(prompt()).await.expect("output"), "done");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_code_and_stderr() {
        let (_dir, runner) = runner_for("printf 'boom' >&2\nexit 1\n");
        let error = runner.execute(prompt()).await.expect_err("exit error");
        assert!(matches!(error, BridgeError::Exit { code: Some(1), .. }));
        assert_eq!(error.status(), 1);
        assert!(error.to_string().contains("exited with code 1"));
        assert!(error.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn argv_reaches_the_process_as_discrete_arguments() {
        let (_dir, runner) = runner_for("for arg in \"$@\"; do printf '%s|' \"$arg\"; done\n");
        let request = ExecutionRequest::new()
            .with_prompt("say \"hi\" $HOME")
            .with_resume("abc123")
            .with_flag("fooBar", json!(1));
        let output = runner.execute(request).await.expect("output");
        assert_eq!(output, "-p|say \"hi\" $HOME|--resume|abc123|--foo-bar|1|");
    }

    #[tokio::test]
    async fn child_sees_merged_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("env.sh");
        std::fs::write(&path, "printf '%s:%s:%s' \"$ANTHROPIC_API_KEY\" \"$MOCK_EXTRA\" \"${PATH:+inherited}\"\n")
            .expect("write script");
        let options = ClientOptions::default()
            .with_cli_path("/bin/sh")
            .with_cli_args([path.to_string_lossy().to_string()])
            .with_api_key("sk-test")
            .with_env("MOCK_EXTRA", "one");
        let runner = CliRunner::new(options);
        runner.set_env("MOCK_EXTRA", "two");

        let output = runner.execute(prompt()).await.expect("output");
        assert_eq!(output, "sk-test:two:inherited");
    }

    #[tokio::test]
    async fn timeout_rejects_with_408_and_kills_the_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("survived");
        let script = format!("sleep 2\ntouch '{}'\n", marker.display());
        let path = dir.path().join("slow.sh");
        std::fs::write(&path, script).expect("write script");
        let runner = CliRunner::new(
            ClientOptions::default()
                .with_cli_path("/bin/sh")
                .with_cli_args([path.to_string_lossy().to_string()]),
        );

        let started = std::time::Instant::now();
        let error = runner
            .execute(prompt().with_timeout_ms(200))
            .await
            .expect_err("timeout");
        assert_eq!(error.status(), 408);
        assert!(error.to_string().contains("200ms"));
        assert!(started.elapsed() < Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(!Path::new(&marker).exists());
    }

    #[tokio::test]
    async fn abort_handle_cancels_in_flight_execution() {
        let (_dir, runner) = runner_for("sleep 5\n");
        let abort = AbortHandle::new();
        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.abort();
        });
        let error = runner
            .execute_with_abort(prompt(), &abort)
            .await
            .expect_err("cancelled");
        assert!(matches!(error, BridgeError::Cancelled));
        assert_eq!(error.status(), 499);
        assert!(abort.is_aborted());
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let runner = CliRunner::new(ClientOptions::default().with_cli_path("/nonexistent/claude-cli"));
        let error = runner.execute(prompt()).await.expect_err("spawn error");
        assert_eq!(error.status(), 500);
        assert_eq!(error.code(), Some("CLI_MISSING"));
        assert!(error.to_string().starts_with("Claude CLI execution failed:"));

        let mut stream = runner.execute_stream(prompt());
        let item = stream.next().await.expect("error item");
        assert_eq!(item.expect_err("spawn error").code(), Some("CLI_MISSING"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_forces_stream_json_and_forwards_events() {
        let (_dir, runner) = runner_for(
            "case \"$*\" in *'--output-format stream-json'*) ;; *) exit 9 ;; esac\n\
             printf '{\"a\":1}\\n'\nsleep 0.1\nprintf '{\"b\":2}\\n'\n",
        );
        let mut events = EventStream::new(runner.execute_stream(prompt().with_output_format(crate::models::OutputFormat::Json)));
        assert_eq!(events.next_event().await.map(Result::unwrap), Some(json!({"a": 1})));
        assert_eq!(events.next_event().await.map(Result::unwrap), Some(json!({"b": 2})));
        assert!(events.next_event().await.is_none());
    }

    #[tokio::test]
    async fn stream_signals_non_zero_exit_after_output() {
        let (_dir, runner) = runner_for("printf '{\"a\":1}\\n'\necho bad >&2\nexit 3\n");
        let mut events = EventStream::new(runner.execute_stream(prompt()));
        assert_eq!(events.next_event().await.map(Result::unwrap), Some(json!({"a": 1})));
        let error = events.next_event().await.expect("error item").expect_err("exit error");
        assert_eq!(error.status(), 3);
        assert!(error.to_string().contains("exited with code 3"));
        assert!(events.next_event().await.is_none());
    }

    #[tokio::test]
    async fn stream_honours_explicit_request_timeout() {
        let (_dir, runner) = runner_for("printf '{\"a\":1}\\n'\nsleep 5\n");
        let mut stream = runner.execute_stream(prompt().with_timeout_ms(200));
        let first = stream.next().await.expect("chunk").expect("bytes");
        assert_eq!(&first[..], b"{\"a\":1}\n");
        let error = stream.next().await.expect("error item").expect_err("timeout");
        assert_eq!(error.status(), 408);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_stream_kills_the_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("survived");
        let path = dir.path().join("long.sh");
        std::fs::write(&path, format!("printf '{{}}\\n'\nsleep 1\ntouch '{}'\n", marker.display()))
            .expect("write script");
        let runner = CliRunner::new(
            ClientOptions::default()
                .with_cli_path("/bin/sh")
                .with_cli_args([path.to_string_lossy().to_string()]),
        );

        let mut stream = runner.execute_stream(prompt());
        let _ = stream.next().await;
        drop(stream);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn timeout_rejects_before_a_term_ignoring_child_is_reaped() {
        let (_dir, runner) = runner_for("trap '' TERM\nsleep 3\n");
        let started = std::time::Instant::now();
        let error = runner
            .execute(prompt().with_timeout_ms(200))
            .await
            .expect_err("timeout");
        assert_eq!(error.status(), 408);
        assert!(started.elapsed() < Duration::from_millis(1_200));
    }

    #[tokio::test]
    async fn aborting_a_live_stream_ends_it_with_cancelled() {
        let (_dir, runner) = runner_for("printf '{\"a\":1}\\n'\nsleep 5\nprintf '{\"b\":2}\\n'\n");
        let mut stream = runner.execute_stream(prompt());
        let first = stream.next().await.expect("chunk").expect("bytes");
        assert_eq!(&first[..], b"{\"a\":1}\n");

        stream.abort_handle().abort();
        let error = stream.next().await.expect("error item").expect_err("cancelled");
        assert!(matches!(error, BridgeError::Cancelled));
        assert_eq!(error.status(), 499);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn stderr_capture_keeps_only_the_tail() {
        let mut noise = vec![b'x'; MAX_STDERR_CAPTURE_BYTES * 2];
        noise.extend_from_slice(b"\nfinal error\n");
        let captured = collect_stderr(&noise[..], None).await;
        assert_eq!(captured.len(), MAX_STDERR_CAPTURE_BYTES);
        assert!(captured.ends_with(b"final error\n"));
    }
}
