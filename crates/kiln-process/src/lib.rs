//! Child process supervision.
//!
//! Test JVMs and external task runners are long-lived and chatty. Their output
//! is streamed line by line into the parent's sinks while the parent waits for
//! the child to exit; nothing is buffered in memory.
//!
//! There is no timeout or cancellation: once launched, a child runs to
//! completion. A slow sink can stall the child once its pipe buffer is full.

use std::{
    collections::BTreeMap,
    fmt,
    io::{self, BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::{Arc, Mutex, MutexGuard},
    thread,
};

/// A writer shared between the supervisor and its reader threads.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// A full command invocation (cwd + program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(cwd: &Path, program: &Path, args: &[String]) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            program: program.to_path_buf(),
            args: args.to_vec(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Human-readable, not a round-trippable shell snippet.
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('\t') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// What the supervisor observed about a finished child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, or `-1` when the child was terminated by a signal.
    pub exit_code: i32,
    /// JVM fatal error logs (`hs_err_pid<pid>.log`) the child left behind in
    /// its working directory.
    pub crash_logs: Vec<PathBuf>,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawns children and forwards their output.
#[derive(Clone)]
pub struct ProcessSupervisor {
    stdout: SharedWriter,
    stderr: SharedWriter,
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor").finish_non_exhaustive()
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::inherit()
    }
}

impl ProcessSupervisor {
    /// Forward child output to this process's stdout/stderr.
    pub fn inherit() -> Self {
        Self {
            stdout: Arc::new(Mutex::new(io::stdout())),
            stderr: Arc::new(Mutex::new(io::stderr())),
        }
    }

    pub fn with_sinks(stdout: SharedWriter, stderr: SharedWriter) -> Self {
        Self { stdout, stderr }
    }

    /// Run `command` with `env` merged over the inherited environment and
    /// block until it exits.
    ///
    /// Two reader threads drain stdout and stderr concurrently with the wait.
    /// Once the child has exited the readers are joined so every line the
    /// child wrote reaches the sinks before this returns.
    pub fn run(
        &self,
        command: &CommandSpec,
        env: &BTreeMap<String, String>,
    ) -> io::Result<ProcessOutcome> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(target: "kiln.process", command = %command, "spawning process");
        let mut child = cmd.spawn().map_err(|err| {
            io::Error::new(err.kind(), format!("failed to spawn `{command}`: {err}"))
        })?;
        let pid = child.id();

        let Some(stdout) = child.stdout.take() else {
            return Err(io::Error::other("child stdout was not captured"));
        };
        let Some(stderr) = child.stderr.take() else {
            return Err(io::Error::other("child stderr was not captured"));
        };

        let stdout_sink = self.stdout.clone();
        let stderr_sink = self.stderr.clone();
        let stdout_handle = match thread::Builder::new()
            .name(format!("kiln-process-{pid}-stdout"))
            .spawn(move || copy_lines(stdout, &stdout_sink, "stdout"))
        {
            Ok(handle) => handle,
            Err(err) => {
                reap(&mut child, Vec::new());
                return Err(err);
            }
        };
        let stderr_handle = match thread::Builder::new()
            .name(format!("kiln-process-{pid}-stderr"))
            .spawn(move || copy_lines(stderr, &stderr_sink, "stderr"))
        {
            Ok(handle) => handle,
            Err(err) => {
                reap(&mut child, vec![(stdout_handle, "stdout")]);
                return Err(err);
            }
        };
        let readers = vec![(stdout_handle, "stdout"), (stderr_handle, "stderr")];

        let status = match child.wait() {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(target: "kiln.process", pid, error = %err, "failed to wait for process");
                reap(&mut child, readers);
                return Err(err);
            }
        };
        join_readers(pid, readers);

        let exit_code = status.code().unwrap_or(-1);
        let crash_logs = if exit_code == 0 {
            Vec::new()
        } else {
            find_crash_logs(&command.cwd, pid)
        };
        for log in &crash_logs {
            tracing::error!(
                target: "kiln.process",
                pid,
                path = %log.display(),
                "process crashed; fatal error log left behind"
            );
        }

        tracing::debug!(target: "kiln.process", pid, exit_code, "process exited");
        Ok(ProcessOutcome {
            exit_code,
            crash_logs,
        })
    }
}

type Reader = (thread::JoinHandle<()>, &'static str);

fn join_readers(pid: u32, readers: Vec<Reader>) {
    for (handle, stream) in readers {
        if handle.join().is_err() {
            tracing::error!(target: "kiln.process", pid, stream, "output reader thread panicked");
        }
    }
}

/// Kill `child` after a supervision failure so its pipes close, then join
/// whatever readers were started.
fn reap(child: &mut Child, readers: Vec<Reader>) {
    let pid = child.id();
    if let Err(err) = child.kill() {
        tracing::warn!(target: "kiln.process", pid, error = %err, "failed to kill process");
    }
    let _ = child.wait();
    join_readers(pid, readers);
}

fn lock(sink: &SharedWriter) -> MutexGuard<'_, dyn Write + Send + 'static> {
    sink.lock().unwrap_or_else(|err| err.into_inner())
}

/// Copy `reader` into `sink` one line at a time until end of stream.
///
/// Lines that are not valid UTF-8 are dropped silently. When the sink fails
/// the error is logged once and the rest of the stream is read and discarded,
/// so the child never sees a closed pipe. A read failure ends the copy.
fn copy_lines(reader: impl Read, sink: &SharedWriter, stream: &'static str) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut forward_failed = false;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) if forward_failed => {}
            Ok(_) => {
                let Ok(line) = std::str::from_utf8(&buf) else {
                    continue;
                };
                let mut sink = lock(sink);
                if let Err(err) = sink.write_all(line.as_bytes()).and_then(|()| sink.flush()) {
                    tracing::error!(
                        target: "kiln.process",
                        stream,
                        error = %err,
                        "failed to forward process output; discarding the rest of the stream"
                    );
                    forward_failed = true;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => continue,
            Err(err) => {
                tracing::error!(target: "kiln.process", stream, error = %err, "failed to read process output");
                break;
            }
        }
    }
}

fn find_crash_logs(cwd: &Path, pid: u32) -> Vec<PathBuf> {
    let log = cwd.join(format!("hs_err_pid{pid}.log"));
    if log.is_file() {
        vec![log]
    } else {
        Vec::new()
    }
}
