use crate::error::{PackError, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

const PYTHON_TIMEOUT: Duration = Duration::from_secs(5);
const NUITKA_TIMEOUT: Duration = Duration::from_secs(10);

/// 解释器与 Nuitka 的检测结果，错误以文本形式保存便于直接显示
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    /// `python --version` 的输出
    pub python: std::result::Result<String, String>,
    /// Nuitka 版本行
    pub nuitka: std::result::Result<String, String>,
}

/// 运行命令并收集 stdout，超时则杀掉进程
fn run_with_timeout(program: &str, args: &[&str], timeout: Duration) -> Result<(bool, String)> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(target_os = "windows")]
    cmd.creation_flags(0x08000000);

    let mut child = cmd.spawn().map_err(|source| PackError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait().map_err(PackError::Wait)? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PackError::Timeout {
                    program: program.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
            None => thread::sleep(Duration::from_millis(50)),
        }
    };

    // 版本信息很短，进程退出后再读取管道不会阻塞
    let mut stdout = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_end(&mut stdout);
    }
    // 旧版 Python 把 --version 打印到 stderr
    if stdout.is_empty() {
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_end(&mut stdout);
        }
    }
    Ok((
        status.success(),
        String::from_utf8_lossy(&stdout).trim().to_string(),
    ))
}

fn python_program(python: &str) -> &str {
    match python.trim() {
        "" => "python",
        p => p,
    }
}

/// `python --version`
pub fn python_version(python: &str) -> Result<std::result::Result<String, String>> {
    let (ok, output) = run_with_timeout(python_program(python), &["--version"], PYTHON_TIMEOUT)?;
    Ok(if ok {
        Ok(output)
    } else {
        Err("无效的 Python 解释器".to_string())
    })
}

/// `python -m nuitka --version`
pub fn nuitka_version(python: &str) -> Result<std::result::Result<String, String>> {
    let (ok, output) = run_with_timeout(
        python_program(python),
        &["-m", "nuitka", "--version"],
        NUITKA_TIMEOUT,
    )?;
    Ok(if ok {
        Ok(pick_version_line(&output))
    } else {
        Err("未安装，请在该 Python 环境中执行 pip install nuitka".to_string())
    })
}

/// 优先取含 `Version`/`Nuitka` 的行，否则取第一行非空内容
fn pick_version_line(output: &str) -> String {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.clone().next().unwrap_or_default().to_string();
    lines
        .find(|l| l.contains("Version") || l.contains("Nuitka"))
        .map(str::to_string)
        .unwrap_or(first)
}

/// 检测指定的解释器
pub fn probe(python: &str) -> ProbeReport {
    let flatten = |r: Result<std::result::Result<String, String>>| match r {
        Ok(inner) => inner,
        Err(e) => Err(e.to_string()),
    };
    let report = ProbeReport {
        python: flatten(python_version(python)),
        nuitka: flatten(nuitka_version(python)),
    };
    log::info!("Probe {}: {:?}", python_program(python), report);
    report
}

/// 在后台线程中检测，结果通过通道返回
pub fn probe_in_background<F>(python: String, notify: F) -> Receiver<ProbeReport>
where
    F: FnOnce() + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(probe(&python));
        notify();
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_version_line() {
        assert_eq!(pick_version_line("2.4.8\nCommercial: None\nPython: 3.11.9"), "2.4.8");
        assert_eq!(
            pick_version_line("\nNuitka Version 1.9\nPython 3.10"),
            "Nuitka Version 1.9"
        );
        assert_eq!(pick_version_line(""), "");
    }

    #[test]
    fn test_missing_interpreter() {
        let report = probe("/no/such/python-binary");
        assert!(report.python.is_err());
        assert!(report.nuitka.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_process() {
        let started = Instant::now();
        let err = run_with_timeout("sleep", &["5"], Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, PackError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_background_probe_delivers() {
        let rx = probe_in_background("/no/such/python-binary".into(), || {});
        let report = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(report.python.unwrap_err().contains("python-binary"));
    }
}
