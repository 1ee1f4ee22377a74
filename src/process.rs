use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn describe(cmd: &Command) -> String {
    let mut s = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        s.push(' ');
        s.push_str(&arg.to_string_lossy());
    }
    s
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                warn!("failed reading child output: {e}");
            }
        }
        buf
    })
}

fn kill(child: &mut Child, name: &str) {
    if let Err(e) = child.kill() {
        warn!("failed killing {name}: {e}");
    }
    // reap to avoid leaving a zombie behind
    let _ = child.wait();
}

/// Run a command to completion, capturing stdout and stderr.
///
/// With a timeout, the child is killed once the limit passes and
/// [`Error::Timeout`] is returned. The exit status is not checked; callers
/// decide what a non-zero exit means.
pub fn run(cmd: &mut Command, timeout: Option<Duration>) -> Result<Output> {
    let name = describe(cmd);
    debug!("running: {name}");

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Command(format!("{name}: {e}")))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                kill(&mut child, &name);
                return Err(Error::Io(format!("{name}: {e}")));
            }
        }

        if let Some(limit) = timeout {
            if start.elapsed() >= limit {
                kill(&mut child, &name);
                return Err(Error::Timeout(format!("{name}: exceeded {limit:?}")));
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout
        .join()
        .map_err(|_| Error::Io(format!("{name}: stdout reader panicked")))?;
    let stderr = stderr
        .join()
        .map_err(|_| Error::Io(format!("{name}: stderr reader panicked")))?;

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_output() {
        let output = run(Command::new("sh").args(["-c", "echo out; echo err >&2"]), None).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
    }

    #[test]
    fn reports_exit_code() {
        let output = run(Command::new("sh").args(["-c", "exit 3"]), None).unwrap();
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn missing_program() {
        let err = run(&mut Command::new("/nonexistent/portage-inspect-tool"), None).unwrap_err();
        assert!(matches!(err, Error::Command(_)));
    }

    #[test]
    fn times_out() {
        let err = run(
            Command::new("sleep").arg("5"),
            Some(Duration::from_millis(50)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
