use log::{debug, warn};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::select;
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep, Instant};

use super::line_buffer::LineBuffer;
use super::process_helper::ProcessHelper;
use crate::management::config::ProcessStartInfo;

/// Output still buffered in the pipes is read for at most this long after
/// the process exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output { stream: OutputStream, line: String },
    /// `code` is `None` when the process was ended by a signal.
    Exited { code: Option<i32> },
    /// The OS reported an error while waiting on the process.
    Failed { message: String },
}

/// A [`ProcessEvent`] tagged with the launch it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMessage {
    pub generation: u64,
    pub event: ProcessEvent,
}

/// Control side of a running server process.
///
/// The child itself is owned by a pump task that reads both output pipes,
/// writes queued commands to stdin and reports the exit, all as
/// [`ProcessMessage`]s on the channel given to [`ProcessHandle::spawn`].
/// Exactly one `Exited` or `Failed` is sent per launch, after every line.
pub struct ProcessHandle {
    pid: Option<u32>,
    generation: u64,
    input: mpsc::UnboundedSender<String>,
    kill_notify: Arc<Notify>,
}

impl ProcessHandle {
    pub fn spawn<T>(
        info: &ProcessStartInfo,
        generation: u64,
        events: mpsc::UnboundedSender<T>,
    ) -> io::Result<Self>
    where
        T: From<ProcessMessage> + Send + 'static,
    {
        let mut command = Command::new(&info.target);
        command
            .args(&info.args)
            .current_dir(&info.working_dir)
            .envs(&info.envs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own group, so signals also reach whatever a start script launched
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn()?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr not captured"))?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let kill_notify = Arc::new(Notify::new());

        let pump = Pump {
            generation,
            pid,
            events,
            input_rx,
            kill_notify: kill_notify.clone(),
        };
        tokio::spawn(pump.run(child, stdin, stdout, stderr));

        Ok(Self {
            pid,
            generation,
            input: input_tx,
            kill_notify,
        })
    }

    /// A handle with no process behind it. Commands written to it arrive on
    /// the returned receiver.
    #[cfg(test)]
    pub fn detached(generation: u64) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (input, input_rx) = mpsc::unbounded_channel();
        let handle = Self {
            pid: None,
            generation,
            input,
            kill_notify: Arc::new(Notify::new()),
        };
        (handle, input_rx)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queues one line for stdin. Returns `false` once the pump is gone.
    pub fn write_line(&self, line: &str) -> bool {
        self.input.send(line.to_string()).is_ok()
    }

    /// Requests termination, falling back to the pump's own kill when the
    /// signal cannot be delivered.
    pub fn terminate(&self) {
        match self.pid.map(ProcessHelper::stop) {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                warn!("could not terminate process (pid={:?}): {}", self.pid, err);
                self.kill_notify.notify_one();
            }
            None => self.kill_notify.notify_one(),
        }
    }

    pub fn kill(&self) {
        match self.pid.map(ProcessHelper::kill) {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                warn!("could not kill process (pid={:?}): {}", self.pid, err);
                self.kill_notify.notify_one();
            }
            None => self.kill_notify.notify_one(),
        }
    }
}

struct Pump<T> {
    generation: u64,
    pid: Option<u32>,
    events: mpsc::UnboundedSender<T>,
    input_rx: mpsc::UnboundedReceiver<String>,
    kill_notify: Arc<Notify>,
}

impl<T: From<ProcessMessage> + Send + 'static> Pump<T> {
    fn emit(&self, event: ProcessEvent) {
        let message = ProcessMessage {
            generation: self.generation,
            event,
        };
        if self.events.send(T::from(message)).is_err() {
            debug!("process event dropped, receiver closed");
        }
    }

    fn emit_lines(&self, stream: OutputStream, lines: Vec<String>) {
        for line in lines {
            self.emit(ProcessEvent::Output { stream, line });
        }
    }

    fn on_read(
        &self,
        stream: OutputStream,
        result: io::Result<usize>,
        chunk: &[u8],
        buffer: &mut LineBuffer,
    ) -> bool {
        match result {
            Ok(0) => {
                self.emit_lines(stream, buffer.flush().into_iter().collect());
                false
            }
            Ok(n) => {
                self.emit_lines(stream, buffer.push(&chunk[..n]));
                true
            }
            Err(err) => {
                debug!("{:?} of pid {:?} closed: {}", stream, self.pid, err);
                self.emit_lines(stream, buffer.flush().into_iter().collect());
                false
            }
        }
    }

    async fn write_command(&self, stdin: &mut ChildStdin, line: String) {
        let result = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(err) = result {
            warn!("could not write to stdin of pid {:?}: {}", self.pid, err);
        }
    }

    async fn run(
        mut self,
        mut child: Child,
        mut stdin: ChildStdin,
        mut stdout: impl AsyncRead + Unpin,
        mut stderr: impl AsyncRead + Unpin,
    ) {
        let mut out_buffer = LineBuffer::new();
        let mut err_buffer = LineBuffer::new();
        let mut out_chunk = [0u8; READ_CHUNK];
        let mut err_chunk = [0u8; READ_CHUNK];
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut input_open = true;

        let mut exit: Option<io::Result<ExitStatus>> = None;
        let drain = sleep(DRAIN_TIMEOUT);
        tokio::pin!(drain);

        loop {
            if exit.is_some() && !stdout_open && !stderr_open {
                break;
            }
            select! {
                read = stdout.read(&mut out_chunk), if stdout_open => {
                    stdout_open = self.on_read(OutputStream::Stdout, read, &out_chunk, &mut out_buffer);
                }
                read = stderr.read(&mut err_chunk), if stderr_open => {
                    stderr_open = self.on_read(OutputStream::Stderr, read, &err_chunk, &mut err_buffer);
                }
                line = self.input_rx.recv(), if input_open && exit.is_none() => {
                    match line {
                        Some(line) => self.write_command(&mut stdin, line).await,
                        None => input_open = false,
                    }
                }
                _ = self.kill_notify.notified(), if exit.is_none() => {
                    if let Err(err) = child.start_kill() {
                        warn!("could not kill process (pid={:?}): {}", self.pid, err);
                    }
                }
                status = child.wait(), if exit.is_none() => {
                    exit = Some(status);
                    drain.as_mut().reset(Instant::now() + DRAIN_TIMEOUT);
                }
                _ = &mut drain, if exit.is_some() => {
                    debug!("stopped draining output of pid {:?}", self.pid);
                    break;
                }
            }
        }

        match exit {
            Some(Ok(status)) => self.emit(ProcessEvent::Exited {
                code: status.code(),
            }),
            Some(Err(err)) => self.emit(ProcessEvent::Failed {
                message: err.to_string(),
            }),
            None => {}
        }
    }
}
