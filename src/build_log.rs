use crate::runner::{BuildEvent, BuildOutcome};
use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::Path;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 打包日志页的数据：输出文本、进度和运行状态
#[derive(Debug, Default)]
pub struct BuildLog {
    pub text: String,
    /// 0..=100
    pub progress: u8,
    pub running: bool,
    pub outcome: Option<BuildOutcome>,
}

impl BuildLog {
    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    /// 开始新一轮打包：清空旧日志，记录开始时间和额外的环境变量
    pub fn begin(&mut self, env: &[(String, String)]) {
        self.clear();
        self.progress = 0;
        self.running = true;
        self.outcome = None;

        self.push_line(&format!("开始时间：{}", Local::now().format(TIME_FORMAT)));
        if !env.is_empty() {
            self.push_line("环境变量设置：");
            for (key, value) in env {
                self.push_line(&format!("  {}={}", key, value));
            }
        }
        self.push_line("");
    }

    /// 处理一个后台事件，返回是否为结束事件
    pub fn apply(&mut self, event: BuildEvent) -> bool {
        match event {
            BuildEvent::Output(line) => {
                self.push_line(&line);
                false
            }
            BuildEvent::Progress(p) => {
                self.progress = p.min(100);
                false
            }
            BuildEvent::Finished(outcome) => {
                self.finish(outcome);
                true
            }
        }
    }

    fn finish(&mut self, outcome: BuildOutcome) {
        self.running = false;
        self.push_line("");
        self.push_line(&format!("结束时间：{}", Local::now().format(TIME_FORMAT)));
        self.push_line(&format!("打包结果：{}", outcome.message()));
        if outcome.is_success() {
            self.progress = 100;
        }
        self.outcome = Some(outcome);
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.text)
            .with_context(|| format!("无法写入日志文件: {}", path.display()))?;
        log::info!("Saved build log to {}", path.display());
        Ok(())
    }
}

/// 保存日志对话框中的默认文件名
pub fn default_log_file_name() -> String {
    format!("nuitka_log_{}.txt", Local::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_run() {
        let mut build_log = BuildLog::default();
        build_log.begin(&[("CC".to_string(), "gcc".to_string())]);
        assert!(build_log.running);
        assert!(build_log.text.starts_with("开始时间："));
        assert!(build_log.text.contains("  CC=gcc\n"));

        assert!(!build_log.apply(BuildEvent::Output("Nuitka: compiling".into())));
        assert!(!build_log.apply(BuildEvent::Progress(42)));
        assert_eq!(build_log.progress, 42);
        assert!(build_log.apply(BuildEvent::Finished(BuildOutcome::Success)));

        assert!(!build_log.running);
        assert_eq!(build_log.progress, 100);
        assert!(build_log.text.contains("Nuitka: compiling\n"));
        assert!(build_log.text.contains("打包结果：打包成功完成"));
    }

    #[test]
    fn test_failed_run_keeps_progress() {
        let mut build_log = BuildLog::default();
        build_log.begin(&[]);
        assert!(!build_log.text.contains("环境变量"));
        build_log.apply(BuildEvent::Progress(60));
        build_log.apply(BuildEvent::Finished(BuildOutcome::Failed(Some(1))));
        assert_eq!(build_log.progress, 60);
        assert!(build_log.text.contains("返回代码：1"));
        assert_eq!(build_log.outcome, Some(BuildOutcome::Failed(Some(1))));
    }

    #[test]
    fn test_save_to() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(default_log_file_name());
        let mut build_log = BuildLog::default();
        build_log.push_line("line one");
        build_log.save_to(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "line one\n");
        assert!(build_log.save_to(&dir.path().join("no/such/dir/build_log.txt")).is_err());
    }

    #[test]
    fn test_default_name_shape() {
        let name = default_log_file_name();
        assert!(name.starts_with("nuitka_log_"));
        assert!(name.ends_with(".txt"));
        assert_eq!(name.len(), "nuitka_log_20240101_120000.txt".len());
    }
}
