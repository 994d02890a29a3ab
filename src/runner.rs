//! Supervised execution of the external encoder.

use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::RunError;
use crate::lock;
use crate::state::BatchState;

/// How long to wait for the output pipes to close after the child has exited.
/// A grandchild that inherited the pipes can keep them open indefinitely.
const OUTPUT_DRAIN_LIMIT: Duration = Duration::from_secs(2);

/// Result of a subprocess that exited on its own.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// `None` if the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs one subprocess at a time with a timeout, honouring the batch stop flag.
pub struct SubprocessRunner<'a> {
    state: &'a BatchState,
    poll_interval: Duration,
}

/// Output collected by a reader thread, readable while the thread still runs.
struct CapturedStream {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl RunOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl<'a> SubprocessRunner<'a> {
    #[must_use]
    pub const fn new(state: &'a BatchState, poll_interval: Duration) -> Self {
        Self { state, poll_interval }
    }

    /// Run `program` with `args` and wait for it to exit.
    ///
    /// The child is registered in the batch registry while it runs.
    /// It is killed when `timeout` expires or when a stop is requested.
    pub fn run(&self, program: &Path, args: &[OsString], timeout: Duration) -> Result<RunOutput, RunError> {
        if !program.is_file() {
            return Err(RunError::ToolNotFound(program.to_path_buf()));
        }
        if self.state.is_stop_requested() {
            return Err(RunError::Cancelled {
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate_process_group(&mut cmd);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

        let mut stdout = CapturedStream::spawn(child.stdout.take());
        let mut stderr = CapturedStream::spawn(child.stderr.take());

        let child = Arc::new(Mutex::new(child));
        let label = crate::path_to_string(program.file_name().map_or(program, Path::new));
        let _registration = self.state.registry().register(label, Arc::clone(&child));

        loop {
            let status = lock(&child).try_wait();
            let status = match status {
                Ok(status) => status,
                Err(source) => {
                    kill_and_reap(&child);
                    return Err(RunError::Wait {
                        program: program.to_path_buf(),
                        source,
                    });
                }
            };

            if let Some(status) = status {
                if self.state.is_stop_requested() {
                    return Err(RunError::Cancelled {
                        stdout: stdout.snapshot(),
                        stderr: stderr.snapshot(),
                    });
                }
                let drain_until = Instant::now() + OUTPUT_DRAIN_LIMIT;
                stdout.drain(drain_until, self);
                stderr.drain(drain_until, self);
                return Ok(RunOutput {
                    exit_code: status.code(),
                    stdout: stdout.snapshot(),
                    stderr: stderr.snapshot(),
                    elapsed: start.elapsed(),
                });
            }

            if self.state.is_stop_requested() {
                kill_and_reap(&child);
                return Err(RunError::Cancelled {
                    stdout: stdout.snapshot(),
                    stderr: stderr.snapshot(),
                });
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                kill_and_reap(&child);
                return Err(RunError::Timeout {
                    elapsed,
                    stdout: stdout.snapshot(),
                    stderr: stderr.snapshot(),
                });
            }

            thread::sleep(self.poll_interval.min(timeout - elapsed));
        }
    }
}

impl CapturedStream {
    fn spawn(stream: Option<impl Read + Send + 'static>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let reader = stream.map(|mut stream| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut chunk = [0_u8; 8192];
                loop {
                    match stream.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => lock(&buffer).extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buffer, reader }
    }

    /// Wait for end of stream, giving up at `until` or when a stop is requested.
    /// A reader that is still blocked is left detached.
    fn drain(&mut self, until: Instant, runner: &SubprocessRunner<'_>) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        while !reader.is_finished() {
            if runner.state.is_stop_requested() || Instant::now() >= until {
                return;
            }
            thread::sleep(runner.poll_interval);
        }
        let _ = reader.join();
    }

    /// Output collected so far.
    fn snapshot(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buffer)).to_string()
    }
}

fn kill_and_reap(child: &Mutex<Child>) {
    let mut child = lock(child);
    let _ = child.kill();
    let _ = child.wait();
}

/// Run the child in its own process group so Ctrl+C in the terminal only reaches us.
/// The front end then stops the batch and kills the child explicitly.
fn isolate_process_group(cmd: &mut Command) {
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
}
