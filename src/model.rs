use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Nuitka 自带的常用插件，顺序即生成命令时的顺序
pub const KNOWN_PLUGINS: [(&str, &str); 8] = [
    ("pyqt5", "PyQt5"),
    ("pyside2", "PySide2"),
    ("pyside6", "PySide6"),
    ("numpy", "Numpy"),
    ("torch", "PyTorch"),
    ("tensorflow", "TensorFlow"),
    ("matplotlib", "Matplotlib"),
    ("tk-inter", "Tkinter"),
];

/// 完整的打包配置（即界面上所有表单的当前值）
///
/// 直接对应保存到磁盘的 JSON 文件。所有字段都带有 `#[serde(default)]`，
/// 因此缺失的键会回落到默认值，旧版本导出的配置也能正常加载。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PackConfig {
    /// Python 解释器路径，留空时使用 PATH 中的 `python`
    pub python: String,
    pub basic: BasicSettings,
    pub output: OutputSettings,
    pub compile: CompileSettings,
    pub optimize: OptimizeSettings,
    /// 插件名 -> 是否启用
    pub plugins: BTreeMap<String, bool>,
    /// 自定义插件，每行一个
    pub custom_plugins: String,
    pub modules: ModuleSettings,
    pub assets: Vec<AssetEntry>,
    pub windows: WindowsSettings,
    pub advanced: AdvancedSettings,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            python: String::new(),
            basic: BasicSettings::default(),
            output: OutputSettings::default(),
            compile: CompileSettings::default(),
            optimize: OptimizeSettings::default(),
            plugins: KNOWN_PLUGINS
                .iter()
                .map(|(name, _)| (name.to_string(), false))
                .collect(),
            custom_plugins: String::new(),
            modules: ModuleSettings::default(),
            assets: Vec::new(),
            windows: WindowsSettings::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

impl PackConfig {
    pub fn plugin_enabled(&self, name: &str) -> bool {
        self.plugins.get(name).copied().unwrap_or(false)
    }

    /// 返回插件开关的可变引用，不存在时先插入 false
    pub fn plugin_mut(&mut self, name: &str) -> &mut bool {
        self.plugins.entry(name.to_string()).or_insert(false)
    }

    /// 入口脚本所在目录，用作编译时的工作目录
    pub fn script_dir(&self) -> Option<&Path> {
        let script = self.basic.file.trim();
        if script.is_empty() {
            return None;
        }
        Path::new(script)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// 打包模式
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackMode {
    /// 独立文件夹，启动快
    #[default]
    Standalone,
    /// 单个可执行文件，分发方便但启动慢
    Onefile,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct BasicSettings {
    /// 要打包的 .py 入口文件
    pub file: String,
    /// 独立文件夹或单文件
    pub mode: PackMode,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct OutputSettings {
    /// 输出目录，相对路径以入口脚本目录为准
    pub dir: String,
    /// 生成的可执行文件名
    pub name: String,
    /// .ico 图标文件
    pub icon: String,
}

/// C 编译器选择
///
/// 配置文件中保存下拉框的显示名（`自动检测`、`本地GCC` 等），
/// 与已有的配置文件互通；小写英文名也可以读取。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compiler {
    #[default]
    #[serde(rename = "自动检测", alias = "auto")]
    Auto,
    #[serde(rename = "MSVC", alias = "msvc")]
    Msvc,
    #[serde(rename = "MinGW64", alias = "mingw64")]
    MinGw64,
    #[serde(rename = "Clang", alias = "clang")]
    Clang,
    /// 使用本地安装的 gcc，通过 CC 环境变量传给 Nuitka
    #[serde(rename = "本地GCC", alias = "gcc")]
    LocalGcc,
}

impl Compiler {
    pub const ALL: [Compiler; 5] = [
        Compiler::Auto,
        Compiler::Msvc,
        Compiler::MinGw64,
        Compiler::Clang,
        Compiler::LocalGcc,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Compiler::Auto => "自动检测",
            Compiler::Msvc => "MSVC",
            Compiler::MinGw64 => "MinGW64",
            Compiler::Clang => "Clang",
            Compiler::LocalGcc => "本地 GCC",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CompileSettings {
    pub compiler: Compiler,
    /// 仅在选择本地 GCC 时使用
    pub gcc_path: String,
    /// 自动确认下载依赖（--assume-yes-for-downloads）
    pub auto_download: bool,
    /// 运行时是否显示控制台窗口
    pub console: bool,
    /// --show-progress
    pub progress: bool,
    /// --show-memory
    pub memory: bool,
    /// 编译结束后删除中间产物
    pub remove: bool,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            compiler: Compiler::Auto,
            gcc_path: String::new(),
            auto_download: true,
            console: true,
            progress: true,
            memory: true,
            remove: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct OptimizeSettings {
    /// 使用 ccache 缓存编译结果
    pub ccache: bool,
    /// ccache 可执行文件路径，留空则交给 Nuitka 自己查找
    pub ccache_path: String,
    /// --low-memory
    pub low_memory: bool,
    /// --lto=yes
    pub lto: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModuleSettings {
    /// 关闭时生成 --nofollow-imports
    pub follow_imports: bool,
    /// 逗号分隔的模块/目录
    pub include: String,
    /// 逗号分隔的排除模块
    pub exclude: String,
    /// 每行一条：`源=目标` 为文件，否则视为目录
    pub data: String,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            follow_imports: true,
            include: String::new(),
            exclude: String::new(),
            data: String::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    #[default]
    File,
    Folder,
}

impl AssetKind {
    pub fn label(self) -> &'static str {
        match self {
            AssetKind::File => "文件",
            AssetKind::Folder => "文件夹",
        }
    }
}

fn default_true() -> bool {
    true
}

/// 资源列表中的一行
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AssetEntry {
    /// 取消勾选的行不参与打包，但保留在列表中
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 磁盘上的源路径
    #[serde(default)]
    pub source: String,
    /// 打包后在程序目录中的相对路径
    #[serde(default)]
    pub target: String,
    #[serde(rename = "type", default)]
    pub kind: AssetKind,
    /// 仅用于界面多选，不写入配置文件
    #[serde(skip)]
    pub selected: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct WindowsSettings {
    pub company: String,
    pub product: String,
    /// 形如 1.0.0.0
    pub version: String,
    pub description: String,
    /// 运行时请求管理员权限
    pub uac: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AdvancedSettings {
    /// 额外的 Nuitka 参数，每行一个
    pub extra: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_form() {
        let config = PackConfig::default();
        assert_eq!(config.basic.mode, PackMode::Standalone);
        assert_eq!(config.compile.compiler, Compiler::Auto);
        assert!(config.compile.auto_download);
        assert!(config.compile.console);
        assert!(config.modules.follow_imports);
        assert!(!config.optimize.lto);
        assert_eq!(config.plugins.len(), KNOWN_PLUGINS.len());
        assert!(!config.plugin_enabled("numpy"));
    }

    #[test]
    fn test_compiler_names() {
        // 写出下拉框显示名
        assert_eq!(serde_json::to_string(&Compiler::Msvc).unwrap(), r#""MSVC""#);
        assert_eq!(serde_json::to_string(&Compiler::LocalGcc).unwrap(), r#""本地GCC""#);
        assert_eq!(serde_json::to_string(&Compiler::Auto).unwrap(), r#""自动检测""#);

        let c: Compiler = serde_json::from_str(r#""本地GCC""#).unwrap();
        assert_eq!(c, Compiler::LocalGcc);
        let c: Compiler = serde_json::from_str(r#""MinGW64""#).unwrap();
        assert_eq!(c, Compiler::MinGw64);
        // 小写英文名同样可读
        let c: Compiler = serde_json::from_str(r#""gcc""#).unwrap();
        assert_eq!(c, Compiler::LocalGcc);
        let c: Compiler = serde_json::from_str(r#""clang""#).unwrap();
        assert_eq!(c, Compiler::Clang);
    }

    #[test]
    fn test_script_dir() {
        let mut config = PackConfig::default();
        assert!(config.script_dir().is_none());
        config.basic.file = "main.py".into();
        assert!(config.script_dir().is_none());
        config.basic.file = "/work/app/main.py".into();
        assert_eq!(config.script_dir(), Some(Path::new("/work/app")));
    }
}
