use std::io;
#[cfg(unix)]
use nix::sys::signal::{kill, killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;
#[cfg(windows)]
use winapi::shared::minwindef::FALSE;
#[cfg(windows)]
use winapi::um::handleapi::CloseHandle;
#[cfg(windows)]
use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
#[cfg(windows)]
use winapi::um::winnt::PROCESS_TERMINATE;

pub struct ProcessHelper;

impl ProcessHelper {
    /// Asks the process to terminate: SIGTERM on Unix, sent to its whole
    /// process group when `pid` leads one. Windows has no equivalent for
    /// console processes, so it terminates.
    pub fn stop(pid: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            Self::signal(pid, Signal::SIGTERM)
        }
        #[cfg(windows)]
        {
            Self::terminate(pid)
        }
    }

    /// Forcefully kills the process: SIGKILL to its process group on Unix,
    /// TerminateProcess on Windows.
    pub fn kill(pid: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            Self::signal(pid, Signal::SIGKILL)
        }
        #[cfg(windows)]
        {
            Self::terminate(pid)
        }
    }

    #[cfg(unix)]
    fn signal(pid: u32, signal: Signal) -> io::Result<()> {
        let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let pid = Pid::from_raw(pid);
        // a server started through a script runs as a child of the shell
        killpg(pid, signal)
            .or_else(|_| kill(pid, signal))
            .map_err(io::Error::from)
    }

    #[cfg(windows)]
    fn terminate(pid: u32) -> io::Result<()> {
        let handle = unsafe { OpenProcess(PROCESS_TERMINATE, FALSE, pid) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        let result = unsafe { TerminateProcess(handle, 1) };
        unsafe { CloseHandle(handle) };
        if result == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_signal_to_missing_process_fails() {
        // pid_max on Linux is at most 2^22
        assert!(ProcessHelper::stop(u32::MAX / 2).is_err());
        assert!(ProcessHelper::kill(u32::MAX / 2).is_err());
    }

    #[test]
    fn test_terminate_child() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        ProcessHelper::stop(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_kill_reaches_group_leader() {
        use std::os::unix::process::CommandExt;
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        ProcessHelper::kill(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
