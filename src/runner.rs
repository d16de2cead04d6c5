use crate::command::Invocation;
use crate::error::{PackError, Result};
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

/// 轮询子进程状态的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Windows 下不为子进程弹出控制台窗口
#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// 后台线程发往界面线程的事件
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    /// 一行输出（已去掉行尾换行）
    Output(String),
    /// 从输出中解析出的百分比进度
    Progress(u8),
    /// 最后一个事件
    Finished(BuildOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    /// 退出码为 0
    Success,
    /// 非零退出；被信号终止时没有退出码
    Failed(Option<i32>),
    /// 用户取消
    Cancelled,
    /// 等待子进程时出错
    Error(String),
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success)
    }

    pub fn message(&self) -> String {
        match self {
            BuildOutcome::Success => "打包成功完成".to_string(),
            BuildOutcome::Failed(Some(code)) => format!("打包失败，返回代码：{}", code),
            BuildOutcome::Failed(None) => "打包失败，进程被终止".to_string(),
            BuildOutcome::Cancelled => "用户取消了打包".to_string(),
            BuildOutcome::Error(msg) => format!("打包出错：{}", msg),
        }
    }
}

/// 正在运行的一次构建
///
/// 界面线程每帧调用 [`BuildHandle::drain`] 取走事件；
/// 收到 `Finished` 之后句柄即可丢弃。
pub struct BuildHandle {
    /// 后台线程发来的事件
    rx: Receiver<BuildEvent>,
    /// 取消标志，由监督线程轮询
    cancel: Arc<AtomicBool>,
    /// 监督线程，结束时已发出 `Finished`
    worker: Option<JoinHandle<()>>,
    /// 子进程 PID
    pid: u32,
}

impl BuildHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }


    /// 请求终止子进程，实际终止由后台线程完成
    ///
    /// 只有第一次请求返回 true。
    pub fn cancel(&self) -> bool {
        !self.cancel.swap(true, Ordering::SeqCst)
    }

    /// 是否已请求取消（进程可能尚未退出）
    pub fn is_cancelling(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn drain(&self) -> Vec<BuildEvent> {
        self.rx.try_iter().collect()
    }
}

impl Drop for BuildHandle {
    fn drop(&mut self) {
        // 界面关闭时不留下孤儿进程
        let _ = self.cancel();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// 启动 Nuitka 子进程
///
/// 直接以参数列表启动程序而不经过 shell。stdout 和 stderr 各由一个线程读取，
/// 另一个线程负责等待退出和处理取消。`notify` 在每个事件发出后调用，
/// 一般用来请求界面重绘。
pub fn start_build<F>(invocation: &Invocation, notify: F) -> Result<BuildHandle>
where
    F: Fn() + Send + Sync + 'static,
{
    let notify: Arc<dyn Fn() + Send + Sync> = Arc::new(notify);
    let (tx, rx) = mpsc::channel();

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &invocation.cwd {
        cmd.current_dir(cwd);
    }
    #[cfg(target_os = "windows")]
    cmd.creation_flags(CREATE_NO_WINDOW);

    let mut child = cmd.spawn().map_err(|source| PackError::Spawn {
        program: invocation.program.clone(),
        source,
    })?;
    let pid = child.id();
    log::info!("Started build (pid {}): {}", pid, invocation.command_line());

    let send = {
        let tx = tx.clone();
        let notify = notify.clone();
        move |event: BuildEvent| {
            let _ = tx.send(event);
            notify();
        }
    };
    send(BuildEvent::Output(format!(
        "执行命令：{}",
        invocation.command_line()
    )));
    if let Some(cwd) = &invocation.cwd {
        send(BuildEvent::Output(format!("工作目录：{}", cwd.display())));
    }
    send(BuildEvent::Output("-".repeat(50)));

    // 读取线程结束时各发一条消息
    let (done_tx, done_rx) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, tx.clone(), notify.clone(), done_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, tx.clone(), notify.clone(), done_tx));
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let worker = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            let mut outcome = supervise(&mut child, &cancel);
            if outcome != BuildOutcome::Cancelled {
                if drain_readers(&done_rx, readers.len(), &cancel) {
                    for reader in readers {
                        let _ = reader.join();
                    }
                } else {
                    outcome = BuildOutcome::Cancelled;
                }
            }
            log::info!("Build finished: {:?}", outcome);
            let _ = tx.send(BuildEvent::Finished(outcome));
            notify();
        })
    };

    Ok(BuildHandle {
        rx,
        cancel,
        worker: Some(worker),
        pid,
    })
}

/// 等待所有读取线程读完输出
///
/// 子进程退出后，它启动的其他进程（例如 `mspdbsrv.exe`）可能仍占着管道。
/// 等待期间继续响应取消；被取消时返回 false，读取线程留给操作系统回收。
fn drain_readers(done_rx: &Receiver<()>, readers: usize, cancel: &AtomicBool) -> bool {
    let mut finished = 0;
    while finished < readers {
        if cancel.load(Ordering::SeqCst) {
            log::warn!("Cancelled while {} output pipe(s) still open", readers - finished);
            return false;
        }
        match done_rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) => finished += 1,
            Err(RecvTimeoutError::Timeout) => {}
            // 读取线程都已退出
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    true
}

fn supervise(child: &mut Child, cancel: &AtomicBool) -> BuildOutcome {
    loop {
        if cancel.load(Ordering::SeqCst) {
            log::warn!("Cancelling build (pid {})", child.id());
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill build process: {}", e);
            }
            let _ = child.wait();
            return BuildOutcome::Cancelled;
        }

        match child.try_wait() {
            Ok(Some(status)) if status.success() => return BuildOutcome::Success,
            Ok(Some(status)) => return BuildOutcome::Failed(status.code()),
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return BuildOutcome::Error(PackError::Wait(e).to_string()),
        }
    }
}

fn spawn_reader<R>(
    stream: R,
    tx: Sender<BuildEvent>,
    notify: Arc<dyn Fn() + Send + Sync>,
    done: Sender<()>,
) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    // Windows 上的编译器输出可能不是 UTF-8
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    let progress = parse_progress(&line);
                    if tx.send(BuildEvent::Output(line)).is_err() {
                        break;
                    }
                    if let Some(p) = progress {
                        let _ = tx.send(BuildEvent::Progress(p));
                    }
                    notify();
                }
                Err(e) => {
                    log::warn!("Failed to read build output: {}", e);
                    break;
                }
            }
        }
        let _ = done.send(());
    })
}

/// 从形如 `PASS 1: 45%|####` 的行中取出百分比
///
/// 取第一个 `%` 之前最后一个空白分隔的片段，能解析为整数即为进度，超过 100 按 100 计。
pub fn parse_progress(line: &str) -> Option<u8> {
    let (before, _) = line.split_once('%')?;
    let token = before.split_whitespace().last()?;
    let value: u32 = token.parse().ok()?;
    Some(value.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("PASS 1:  45%|####      | 12/30"), Some(45));
        assert_eq!(parse_progress("100%"), Some(100));
        assert_eq!(parse_progress("weird 250% overflow"), Some(100));
        assert_eq!(parse_progress("Nuitka: Starting Python compilation."), None);
        assert_eq!(parse_progress("% done"), None);
        assert_eq!(parse_progress("progress 12.5%"), None);
        assert_eq!(parse_progress("ratio:50% then 70%"), None);
    }

    #[test]
    fn test_outcome_messages() {
        assert!(BuildOutcome::Success.is_success());
        assert!(BuildOutcome::Failed(Some(2)).message().contains('2'));
        assert!(!BuildOutcome::Cancelled.is_success());
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let inv = Invocation {
            program: "definitely-not-a-real-python-binary".into(),
            args: vec![],
            env: vec![],
            cwd: None,
        };
        assert!(matches!(
            start_build(&inv, || {}),
            Err(PackError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    fn collect(handle: &BuildHandle) -> Vec<BuildEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.rx.recv_timeout(Duration::from_secs(10)).ok() {
            let done = matches!(event, BuildEvent::Finished(_));
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[cfg(unix)]
    fn sh(script: &str) -> Invocation {
        Invocation {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: vec![("PACKER_TEST_VAR".into(), "from-env".into())],
            cwd: Some(std::env::temp_dir()),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_streams_output_and_progress() {
        let handle = start_build(
            &sh("echo 'step 30%'; echo $PACKER_TEST_VAR; echo oops >&2; echo 'done 100%'"),
            || {},
        )
        .unwrap();
        let events = collect(&handle);

        let lines: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                BuildEvent::Output(l) => Some(l.as_str()),
                _ => None,
            })
            .collect();
        assert!(lines[0].starts_with("执行命令：sh -c"));
        assert!(lines.contains(&"from-env"));
        assert!(lines.contains(&"oops"));

        // 同一管道内的顺序保持不变
        let p30 = events.iter().position(|e| *e == BuildEvent::Progress(30)).unwrap();
        let p100 = events.iter().position(|e| *e == BuildEvent::Progress(100)).unwrap();
        assert!(p30 < p100);
        assert_eq!(
            events.last(),
            Some(&BuildEvent::Finished(BuildOutcome::Success))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit() {
        let handle = start_build(&sh("echo failing; exit 3"), || {}).unwrap();
        let events = collect(&handle);
        assert_eq!(
            events.last(),
            Some(&BuildEvent::Finished(BuildOutcome::Failed(Some(3))))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_child() {
        let handle = start_build(&sh("echo started; exec sleep 30"), || {}).unwrap();
        // 等到子进程确实开始输出
        loop {
            match handle.rx.recv_timeout(Duration::from_secs(10)).ok() {
                Some(BuildEvent::Output(line)) if line == "started" => break,
                Some(_) => continue,
                None => panic!("no output from child"),
            }
        }
        assert!(handle.cancel());
        assert!(handle.is_cancelling());
        // 重复请求不会再次生效
        assert!(!handle.cancel());
        let events = collect(&handle);
        assert_eq!(
            events.last(),
            Some(&BuildEvent::Finished(BuildOutcome::Cancelled))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_while_output_pipe_held() {
        // 后台的 sleep 继承了 stdout，父 shell 退出后管道仍未关闭
        let handle = start_build(&sh("sleep 30 & echo x"), || {}).unwrap();
        loop {
            match handle.rx.recv_timeout(Duration::from_secs(10)).ok() {
                Some(BuildEvent::Output(line)) if line == "x" => break,
                Some(_) => continue,
                None => panic!("no output from child"),
            }
        }
        // 给父进程留出退出的时间
        thread::sleep(Duration::from_millis(300));

        let started = std::time::Instant::now();
        assert!(handle.cancel());
        let events = collect(&handle);
        assert_eq!(
            events.last(),
            Some(&BuildEvent::Finished(BuildOutcome::Cancelled))
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_kills_child() {
        let handle = start_build(&sh("exec sleep 30"), || {}).unwrap();
        let pid = handle.pid();

        let started = std::time::Instant::now();
        drop(handle);
        assert!(started.elapsed() < Duration::from_secs(5));

        let alive = Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success();
        assert!(!alive, "process {} still running", pid);
    }
}
