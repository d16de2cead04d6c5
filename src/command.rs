use crate::error::{PackError, Result};
use crate::model::{AssetKind, Compiler, PackConfig, PackMode, KNOWN_PLUGINS};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Windows 文件版本：1 到 4 段数字
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+){0,3}$").unwrap());

/// 一次 Nuitka 调用：程序、参数、额外环境变量和工作目录
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Python 解释器，未设置时为 `python`
    pub program: String,
    /// `-m nuitka` 起始，入口脚本结尾
    pub args: Vec<String>,
    /// 在继承当前进程环境的基础上追加/覆盖的变量
    pub env: Vec<(String, String)>,
    /// 入口脚本所在目录
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    /// 用于预览和日志的单行命令，含空白的参数加双引号
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote_arg)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(char::is_whitespace) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

/// 非空的修剪后行
fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// 按 shell 规则把一行额外参数拆成多个参数，引号不配对时返回 None
///
/// 反斜杠按字面处理，Windows 路径不需要转义；单引号内的内容原样保留。
fn split_extra_line(line: &str) -> Option<Vec<String>> {
    let mut escaped = String::with_capacity(line.len());
    let (mut in_single, mut in_double) = (false, false);
    for c in line.chars() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '\\' if !in_single => escaped.push('\\'),
            _ => {}
        }
        escaped.push(c);
    }
    shlex::split(&escaped)
}

fn push_valued(args: &mut Vec<String>, flag: &str, value: &str) {
    if !value.is_empty() {
        args.push(format!("{}={}", flag, value));
    }
}

/// 根据表单状态生成 Nuitka 调用
///
/// 参数顺序固定：模式、编译器、显示、优化、输出、插件、模块、数据文件、
/// 资源、Windows 信息、额外参数，最后是入口脚本。
pub fn build_invocation(config: &PackConfig) -> Result<Invocation> {
    let script = config.basic.file.trim();
    if script.is_empty() {
        return Err(PackError::MissingScript);
    }

    let program = match config.python.trim() {
        "" => "python".to_string(),
        p => p.to_string(),
    };
    let mut args = vec!["-m".to_string(), "nuitka".to_string()];

    args.push(
        match config.basic.mode {
            PackMode::Standalone => "--standalone",
            PackMode::Onefile => "--onefile",
        }
        .to_string(),
    );

    let compile = &config.compile;
    if compile.auto_download {
        args.push("--assume-yes-for-downloads".to_string());
    }
    match compile.compiler {
        Compiler::MinGw64 => args.push("--mingw64".to_string()),
        Compiler::Clang => args.push("--clang".to_string()),
        Compiler::Msvc => args.push("--msvc=latest".to_string()),
        Compiler::Auto | Compiler::LocalGcc => {}
    }
    if !compile.console {
        args.push("--windows-disable-console".to_string());
    }
    if compile.progress {
        args.push("--show-progress".to_string());
    }
    if compile.memory {
        args.push("--show-memory".to_string());
    }
    if compile.remove {
        args.push("--remove-output".to_string());
    }

    if config.optimize.low_memory {
        args.push("--low-memory".to_string());
    }
    if config.optimize.lto {
        args.push("--lto=yes".to_string());
    }

    let output = &config.output;
    push_valued(&mut args, "--output-dir", &output.dir);
    push_valued(&mut args, "--output-filename", &output.name);
    push_valued(&mut args, "--windows-icon-from-ico", &output.icon);

    let enabled: Vec<&str> = KNOWN_PLUGINS
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| config.plugin_enabled(name))
        .collect();
    if !enabled.is_empty() {
        args.push(format!("--enable-plugin={}", enabled.join(",")));
    }
    let custom: Vec<&str> = lines(&config.custom_plugins).collect();
    if !custom.is_empty() {
        args.push(format!("--enable-plugin={}", custom.join(",")));
    }

    let modules = &config.modules;
    if modules.follow_imports {
        if modules.include.is_empty() {
            args.push("--follow-imports".to_string());
        } else {
            let includes: String = modules.include.chars().filter(|c| *c != ' ').collect();
            args.push(format!("--follow-import-to={}", includes));
        }
    } else {
        args.push("--nofollow-imports".to_string());
    }
    for exclude in modules.exclude.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        args.push(format!("--nofollow-import-to={}", exclude));
    }

    for line in lines(&modules.data) {
        if line.contains('=') {
            args.push(format!("--include-data-files={}", line));
        } else {
            args.push(format!("--include-data-dir={}", line));
        }
    }

    for asset in config.assets.iter().filter(|a| a.enabled) {
        let flag = match asset.kind {
            AssetKind::File => "--include-data-files",
            AssetKind::Folder => "--include-data-dir",
        };
        args.push(format!("{}={}={}", flag, asset.source, asset.target));
    }

    let windows = &config.windows;
    push_valued(&mut args, "--windows-company-name", &windows.company);
    push_valued(&mut args, "--windows-product-name", &windows.product);
    push_valued(&mut args, "--windows-file-version", &windows.version);
    push_valued(&mut args, "--windows-file-description", &windows.description);
    if windows.uac {
        args.push("--windows-uac-admin".to_string());
    }

    for line in lines(&config.advanced.extra) {
        let words = split_extra_line(line).ok_or_else(|| PackError::ExtraArgs {
            line: line.to_string(),
        })?;
        args.extend(words);
    }

    args.push(script.to_string());

    let invocation = Invocation {
        program,
        args,
        env: build_env(config),
        cwd: config.script_dir().map(Path::to_path_buf),
    };
    log::debug!("Built invocation: {}", invocation.command_line());
    Ok(invocation)
}

fn build_env(config: &PackConfig) -> Vec<(String, String)> {
    let mut env = Vec::new();

    let gcc = config.compile.gcc_path.trim();
    if config.compile.compiler == Compiler::LocalGcc && !gcc.is_empty() {
        env.push(("CC".to_string(), gcc.to_string()));
    }

    let ccache = config.optimize.ccache_path.trim();
    if config.optimize.ccache && !ccache.is_empty() {
        env.push(("NUITKA_CCACHE_BINARY".to_string(), ccache.to_string()));
    }

    env
}

fn has_extension(path: &str, ext: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// 检查常见的配置问题，只给出提示，不阻止打包
pub fn validate(config: &PackConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    let script = config.basic.file.trim();
    if !script.is_empty() && !has_extension(script, "py") {
        warnings.push(format!("入口文件不是 .py 文件: {}", script));
    }

    let icon = config.output.icon.trim();
    if !icon.is_empty() && !has_extension(icon, "ico") {
        warnings.push(format!("图标应为 .ico 文件: {}", icon));
    }

    let version = config.windows.version.trim();
    if !version.is_empty() && !VERSION_RE.is_match(version) {
        warnings.push(format!("文件版本格式应为 1.0.0.0: {}", version));
    }

    if config.compile.compiler == Compiler::LocalGcc && config.compile.gcc_path.trim().is_empty() {
        warnings.push("选择了本地 GCC 但未填写 gcc 路径，将由 Nuitka 自行查找".to_string());
    }

    if config.optimize.ccache && config.optimize.ccache_path.trim().is_empty() {
        warnings.push("已启用 ccache 但未填写路径，将由 Nuitka 自行查找".to_string());
    }

    warnings
}
