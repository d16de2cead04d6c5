use crate::assets;
use crate::build_log::{default_log_file_name, BuildLog};
use crate::command::{self, Invocation};
use crate::config_store;
use crate::error::PackError;
use crate::model::{Compiler, PackConfig, PackMode, KNOWN_PLUGINS};
use crate::probe::{self, ProbeReport};
use crate::runner::{self, BuildHandle};
use anyhow::Context;
use eframe::egui;
use egui_extras::{Column, TableBuilder};
use rfd::FileDialog;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

/// 表单左侧标签的固定宽度，用来对齐输入框
const LABEL_WIDTH: f32 = 110.0;

/// 依次尝试的中文字体
const FONT_CANDIDATES: [&str; 7] = [
    "C:\\Windows\\Fonts\\msyh.ttc",
    "C:\\Windows\\Fonts\\simhei.ttf",
    "/System/Library/Fonts/PingFang.ttc",
    "/System/Library/Fonts/STHeiti Medium.ttc",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Page {
    Main,
    Log,
}

/// 主页上的设置标签页
#[derive(Clone, Copy, PartialEq, Eq)]
enum Tab {
    Environment,
    Basic,
    Output,
    Compile,
    Optimize,
    Plugins,
    Modules,
    Assets,
    Windows,
    Advanced,
}

impl Tab {
    const ALL: [Tab; 10] = [
        Tab::Environment,
        Tab::Basic,
        Tab::Output,
        Tab::Compile,
        Tab::Optimize,
        Tab::Plugins,
        Tab::Modules,
        Tab::Assets,
        Tab::Windows,
        Tab::Advanced,
    ];

    fn label(self) -> &'static str {
        match self {
            Tab::Environment => "环境",
            Tab::Basic => "基础",
            Tab::Output => "输出",
            Tab::Compile => "编译",
            Tab::Optimize => "优化",
            Tab::Plugins => "插件",
            Tab::Modules => "模块",
            Tab::Assets => "资源",
            Tab::Windows => "Windows",
            Tab::Advanced => "高级",
        }
    }
}

/// 预览窗口的内容
struct CommandPreview {
    /// 单行命令，可复制
    command: String,
    /// 工作目录
    cwd: Option<PathBuf>,
    /// 额外的环境变量
    env: Vec<(String, String)>,
    /// 不阻止打包的提示
    warnings: Vec<String>,
}

/// 已加载的图标预览，按路径缓存
struct IconPreview {
    /// 纹理对应的图标路径，路径变化时重新加载
    path: String,
    /// 加载失败时保存错误信息
    texture: Result<egui::TextureHandle, String>,
}

/// 应用程序主状态
pub struct PackerApp {
    /// 当前表单状态
    config: PackConfig,
    /// 主页 / 日志页
    page: Page,
    /// 主页上选中的标签
    tab: Tab,

    /// 日志页内容
    build_log: BuildLog,
    /// 正在进行的打包，结束后置为 None
    build: Option<BuildHandle>,

    /// 检测进行中时存在
    probe_rx: Option<Receiver<ProbeReport>>,
    /// 最近一次检测结果
    probe: Option<ProbeReport>,

    /// 打开的命令预览窗口
    preview: Option<CommandPreview>,
    /// 图标缓存
    icon_preview: Option<IconPreview>,

    /// 底部状态栏
    status_msg: String,
    /// 状态栏是否以红色显示
    status_is_error: bool,
}

impl Default for PackerApp {
    fn default() -> Self {
        Self {
            config: PackConfig::default(),
            page: Page::Main,
            tab: Tab::Environment,
            build_log: BuildLog::default(),
            build: None,
            probe_rx: None,
            probe: None,
            preview: None,
            icon_preview: None,
            status_msg: "准备就绪。请选择要打包的 Python 文件。".to_owned(),
            status_is_error: false,
        }
    }
}

impl PackerApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        Self::configure_fonts(&cc.egui_ctx);
        Self::default()
    }

    /// 加载系统中的中文字体，找不到时保留 egui 默认字体
    fn configure_fonts(ctx: &egui::Context) {
        let Some((path, data)) = FONT_CANDIDATES
            .iter()
            .find_map(|p| fs::read(p).ok().map(|data| (*p, data)))
        else {
            log::warn!("No CJK font found, Chinese labels may not render");
            return;
        };

        let mut fonts = egui::FontDefinitions::default();
        fonts
            .font_data
            .insert("cjk".to_owned(), egui::FontData::from_owned(data));
        if let Some(vec) = fonts.families.get_mut(&egui::FontFamily::Proportional) {
            vec.insert(0, "cjk".to_owned());
        }
        // 等宽字体只作为后备，日志里的英文仍然对齐
        if let Some(vec) = fonts.families.get_mut(&egui::FontFamily::Monospace) {
            vec.push("cjk".to_owned());
        }
        ctx.set_fonts(fonts);
        log::debug!("Loaded font {}", path);
    }

    fn set_status(&mut self, msg: impl Into<String>) {
        self.status_msg = msg.into();
        self.status_is_error = false;
    }

    fn set_error(&mut self, msg: impl Into<String>) {
        self.status_msg = msg.into();
        self.status_is_error = true;
        log::warn!("{}", self.status_msg);
    }

    // --- 配置文件 ---

    fn save_config(&mut self) {
        let Some(path) = FileDialog::new()
            .set_title("保存配置")
            .add_filter("JSON", &["json"])
            .set_file_name("nuitka_config.json")
            .save_file()
        else {
            return;
        };
        match config_store::save_config(&path, &self.config) {
            Ok(()) => self.set_status(format!("配置已保存: {}", path.display())),
            Err(e) => self.set_error(e.to_string()),
        }
    }

    fn load_config(&mut self, ctx: &egui::Context) {
        let Some(path) = FileDialog::new()
            .set_title("加载配置")
            .add_filter("JSON", &["json"])
            .pick_file()
        else {
            return;
        };
        match config_store::load_config(&path) {
            Ok(config) => {
                self.config = config;
                self.icon_preview = None;
                self.set_status(format!("配置已加载: {}", path.display()));
                self.start_probe(ctx);
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    // --- 环境检测 ---

    fn start_probe(&mut self, ctx: &egui::Context) {
        let ctx = ctx.clone();
        self.probe = None;
        self.probe_rx = Some(probe::probe_in_background(
            self.config.python.clone(),
            move || ctx.request_repaint(),
        ));
    }

    fn poll_probe(&mut self) {
        let Some(rx) = &self.probe_rx else {
            return;
        };
        if let Ok(report) = rx.try_recv() {
            self.probe = Some(report);
            self.probe_rx = None;
        }
    }

    // --- 命令与打包 ---

    fn build_invocation(&mut self) -> Option<Invocation> {
        match command::build_invocation(&self.config) {
            Ok(invocation) => Some(invocation),
            Err(e) => {
                self.tab = match e {
                    PackError::ExtraArgs { .. } => Tab::Advanced,
                    _ => Tab::Basic,
                };
                self.set_error(e.to_string());
                None
            }
        }
    }

    fn preview_command(&mut self) {
        if let Some(invocation) = self.build_invocation() {
            self.preview = Some(CommandPreview {
                command: invocation.command_line(),
                cwd: invocation.cwd,
                env: invocation.env,
                warnings: command::validate(&self.config),
            });
        }
    }

    fn start_package(&mut self, ctx: &egui::Context) {
        if self.build.is_some() {
            return;
        }
        let Some(invocation) = self.build_invocation() else {
            return;
        };
        for warning in command::validate(&self.config) {
            log::warn!("{}", warning);
        }

        self.page = Page::Log;
        self.build_log.begin(&invocation.env);

        let repaint = ctx.clone();
        match runner::start_build(&invocation, move || repaint.request_repaint()) {
            Ok(handle) => {
                self.set_status(format!("正在打包（PID {}）...", handle.pid()));
                self.build = Some(handle);
            }
            Err(e) => {
                let msg = e.to_string();
                self.build_log
                    .apply(runner::BuildEvent::Finished(runner::BuildOutcome::Error(msg.clone())));
                self.set_error(msg);
            }
        }
    }

    fn stop_package(&mut self) {
        // 进程退出前按钮仍可点击，只记录第一次
        if let Some(build) = &self.build {
            if build.cancel() {
                self.build_log.push_line("");
                self.build_log.push_line("用户取消了打包操作");
            }
        }
    }

    fn poll_build(&mut self) {
        let Some(build) = &self.build else {
            return;
        };
        let mut finished = false;
        for event in build.drain() {
            finished |= self.build_log.apply(event);
        }
        if finished {
            self.build = None;
            if let Some(outcome) = self.build_log.outcome.clone() {
                if outcome.is_success() {
                    self.set_status(outcome.message());
                } else {
                    self.set_error(outcome.message());
                }
            }
        }
    }

    fn save_log(&mut self) {
        let Some(path) = FileDialog::new()
            .set_title("保存日志")
            .add_filter("Text", &["txt"])
            .set_file_name(default_log_file_name())
            .save_file()
        else {
            return;
        };
        match self.build_log.save_to(&path) {
            Ok(()) => self.set_status(format!("日志已保存: {}", path.display())),
            Err(e) => self.set_error(format!("{:#}", e)),
        }
    }

    /// 打开输出目录；未设置时打开入口脚本所在目录
    fn open_output_dir(&mut self) {
        let dir = match self.config.output.dir.trim() {
            "" => self.config.script_dir().map(Path::to_path_buf),
            d => {
                let d = PathBuf::from(d);
                match (d.is_relative(), self.config.script_dir()) {
                    (true, Some(base)) => Some(base.join(d)),
                    _ => Some(d),
                }
            }
        };
        match dir {
            Some(dir) => {
                if let Err(e) = open::that(&dir) {
                    self.set_error(format!("无法打开目录 {}: {}", dir.display(), e));
                }
            }
            None => self.set_error("尚未设置输出目录或入口文件"),
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .collect()
        });
        if dropped.is_empty() {
            return;
        }
        let added = assets::add_paths(
            &mut self.config.assets,
            dropped.iter().map(PathBuf::as_path),
        );
        self.page = Page::Main;
        self.tab = Tab::Assets;
        self.set_status(format!("已添加 {} 个资源", added));
    }
}

// --- 表单控件 ---

/// 带“浏览”按钮的路径输入行，返回值是否改变
fn path_row(
    ui: &mut egui::Ui,
    label: &str,
    value: &mut String,
    hint: &str,
    pick: impl FnOnce() -> Option<PathBuf>,
) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.add_sized([LABEL_WIDTH, 20.0], egui::Label::new(label));
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.button("浏览").clicked() {
                if let Some(path) = pick() {
                    *value = path.display().to_string();
                    changed = true;
                }
            }
            changed |= ui
                .add(
                    egui::TextEdit::singleline(value)
                        .hint_text(hint)
                        .desired_width(f32::INFINITY),
                )
                .changed();
        });
    });
    changed
}

fn text_row(ui: &mut egui::Ui, label: &str, value: &mut String, hint: &str) {
    ui.horizontal(|ui| {
        ui.add_sized([LABEL_WIDTH, 20.0], egui::Label::new(label));
        ui.add(
            egui::TextEdit::singleline(value)
                .hint_text(hint)
                .desired_width(f32::INFINITY),
        );
    });
}

fn multiline(ui: &mut egui::Ui, value: &mut String, hint: &str, rows: usize) {
    ui.add(
        egui::TextEdit::multiline(value)
            .hint_text(hint)
            .desired_rows(rows)
            .desired_width(f32::INFINITY)
            .font(egui::TextStyle::Monospace),
    );
}

fn card(ui: &mut egui::Ui, title: &str, add_contents: impl FnOnce(&mut egui::Ui)) {
    ui.group(|ui| {
        ui.set_width(ui.available_width());
        ui.label(egui::RichText::new(title).strong());
        ui.add_space(4.0);
        add_contents(ui);
    });
    ui.add_space(8.0);
}

fn hint(ui: &mut egui::Ui, text: &str) {
    ui.label(egui::RichText::new(text).small().weak());
}

fn load_icon_texture(ctx: &egui::Context, path: &str) -> anyhow::Result<egui::TextureHandle> {
    let img = image::open(path).with_context(|| format!("无法读取图标: {}", path))?;
    let size = [img.width() as _, img.height() as _];
    let rgba = img.to_rgba8();
    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
    Ok(ctx.load_texture(
        format!("icon:{}", path),
        color_image,
        egui::TextureOptions::default(),
    ))
}

// --- 各标签页 ---

impl PackerApp {
    fn ui_environment(&mut self, ui: &mut egui::Ui) {
        card(ui, "Python 解释器", |ui| {
            path_row(
                ui,
                "解释器：",
                &mut self.config.python,
                "留空使用 PATH 中的 python",
                || FileDialog::new().set_title("选择 Python 解释器").pick_file(),
            );
            ui.horizontal(|ui| {
                let probing = self.probe_rx.is_some();
                if ui
                    .add_enabled(!probing, egui::Button::new("检测环境"))
                    .clicked()
                {
                    self.start_probe(ui.ctx());
                }
                if probing {
                    ui.spinner();
                    ui.label("正在检测...");
                }
            });
        });

        card(ui, "检测结果", |ui| match &self.probe {
            None => {
                ui.label("未检测");
            }
            Some(report) => {
                egui::Grid::new("probe_grid")
                    .num_columns(2)
                    .spacing([10.0, 6.0])
                    .show(ui, |ui| {
                        for (name, result) in [("Python", &report.python), ("Nuitka", &report.nuitka)] {
                            ui.label(name);
                            match result {
                                Ok(version) => ui.colored_label(egui::Color32::DARK_GREEN, version),
                                Err(e) => ui.colored_label(egui::Color32::RED, e),
                            };
                            ui.end_row();
                        }
                    });
            }
        });

        hint(ui, "如果 Nuitka 未安装，请在对应环境中执行：pip install nuitka");
    }

    fn ui_basic(&mut self, ui: &mut egui::Ui) {
        card(ui, "Python 文件", |ui| {
            path_row(
                ui,
                "入口文件：",
                &mut self.config.basic.file,
                "要打包的 .py 文件",
                || {
                    FileDialog::new()
                        .add_filter("Python", &["py", "pyw"])
                        .pick_file()
                },
            );
        });

        card(ui, "打包模式", |ui| {
            ui.radio_value(
                &mut self.config.basic.mode,
                PackMode::Standalone,
                "独立文件夹 (--standalone)",
            );
            ui.radio_value(
                &mut self.config.basic.mode,
                PackMode::Onefile,
                "单文件 (--onefile)",
            );
            hint(ui, "独立文件夹启动快；单文件便于分发，但每次启动需要解压");
        });
    }

    fn ui_output(&mut self, ui: &mut egui::Ui) {
        card(ui, "输出设置", |ui| {
            path_row(
                ui,
                "输出目录：",
                &mut self.config.output.dir,
                "可选",
                || FileDialog::new().pick_folder(),
            );
            text_row(ui, "程序名称：", &mut self.config.output.name, "可选");
        });

        card(ui, "程序图标", |ui| {
            path_row(
                ui,
                "图标：",
                &mut self.config.output.icon,
                ".ico 文件",
                || FileDialog::new().add_filter("Icon", &["ico"]).pick_file(),
            );

            let icon = self.config.output.icon.trim().to_string();
            if icon.is_empty() {
                self.icon_preview = None;
                return;
            }
            let stale = self
                .icon_preview
                .as_ref()
                .map_or(true, |p| p.path != icon);
            if stale {
                let texture = load_icon_texture(ui.ctx(), &icon).map_err(|e| format!("{:#}", e));
                self.icon_preview = Some(IconPreview {
                    path: icon,
                    texture,
                });
            }
            if let Some(preview) = &self.icon_preview {
                match &preview.texture {
                    Ok(texture) => {
                        ui.add(
                            egui::Image::new(texture).fit_to_exact_size(egui::vec2(48.0, 48.0)),
                        );
                    }
                    Err(e) => {
                        ui.colored_label(egui::Color32::RED, e);
                    }
                }
            }
            hint(ui, "建议使用包含多种尺寸的 .ico 文件");
        });
    }

    fn ui_compile(&mut self, ui: &mut egui::Ui) {
        let compile = &mut self.config.compile;
        card(ui, "编译器", |ui| {
            ui.horizontal(|ui| {
                ui.add_sized([LABEL_WIDTH, 20.0], egui::Label::new("编译器："));
                egui::ComboBox::new("compiler_combo", "")
                    .selected_text(compile.compiler.label())
                    .show_ui(ui, |ui| {
                        for c in Compiler::ALL {
                            ui.selectable_value(&mut compile.compiler, c, c.label());
                        }
                    });
            });
            if compile.compiler == Compiler::LocalGcc {
                path_row(
                    ui,
                    "GCC 路径：",
                    &mut compile.gcc_path,
                    "gcc 可执行文件的完整路径",
                    || FileDialog::new().set_title("选择 gcc").pick_file(),
                );
            }
            ui.checkbox(&mut compile.auto_download, "自动下载依赖");
        });

        card(ui, "显示选项", |ui| {
            egui::Grid::new("display_grid")
                .num_columns(2)
                .spacing([40.0, 6.0])
                .show(ui, |ui| {
                    ui.checkbox(&mut compile.console, "显示控制台");
                    ui.checkbox(&mut compile.progress, "显示进度");
                    ui.end_row();
                    ui.checkbox(&mut compile.memory, "显示内存");
                    ui.checkbox(&mut compile.remove, "清理临时文件");
                    ui.end_row();
                });
        });
    }

    fn ui_optimize(&mut self, ui: &mut egui::Ui) {
        let optimize = &mut self.config.optimize;
        card(ui, "优化选项", |ui| {
            ui.checkbox(&mut optimize.ccache, "使用 ccache 加速");
            if optimize.ccache {
                path_row(
                    ui,
                    "ccache 路径：",
                    &mut optimize.ccache_path,
                    "留空由 Nuitka 自行查找",
                    || FileDialog::new().set_title("选择 ccache").pick_file(),
                );
            }
            ui.checkbox(&mut optimize.low_memory, "低内存模式");
            ui.checkbox(&mut optimize.lto, "启用 LTO 优化");
        });

        card(ui, "说明", |ui| {
            ui.label("• ccache：缓存编译结果，加速重复编译");
            ui.label("• 低内存模式：减少编译时的内存占用");
            ui.label("• LTO：链接时优化，运行更快但编译更慢");
        });
    }

    fn ui_plugins(&mut self, ui: &mut egui::Ui) {
        card(ui, "常用插件", |ui| {
            egui::Grid::new("plugin_grid")
                .num_columns(2)
                .spacing([40.0, 6.0])
                .show(ui, |ui| {
                    for (i, (name, label)) in KNOWN_PLUGINS.iter().enumerate() {
                        ui.checkbox(self.config.plugin_mut(name), *label);
                        if i % 2 == 1 {
                            ui.end_row();
                        }
                    }
                });
        });

        card(ui, "自定义插件", |ui| {
            multiline(ui, &mut self.config.custom_plugins, "插件名称，每行一个", 3);
        });
    }

    fn ui_modules(&mut self, ui: &mut egui::Ui) {
        let modules = &mut self.config.modules;
        card(ui, "模块设置", |ui| {
            ui.checkbox(&mut modules.follow_imports, "跟随导入");
            text_row(ui, "包含模块：", &mut modules.include, "逗号分隔");
            text_row(ui, "排除模块：", &mut modules.exclude, "逗号分隔");
            if !modules.follow_imports && !modules.include.is_empty() {
                hint(ui, "关闭跟随导入时不会使用“包含模块”");
            }
        });

        card(ui, "数据文件", |ui| {
            multiline(
                ui,
                &mut modules.data,
                "每行一条，源路径=目标路径\n例如：data/*.txt=data/\n不含 = 的行按目录处理",
                4,
            );
        });
    }

    fn ui_assets(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("添加文件").clicked() {
                if let Some(files) = FileDialog::new().pick_files() {
                    let added =
                        assets::add_paths(&mut self.config.assets, files.iter().map(PathBuf::as_path));
                    self.set_status(format!("已添加 {} 个资源", added));
                }
            }
            if ui.button("添加文件夹").clicked() {
                if let Some(dir) = FileDialog::new().pick_folder() {
                    assets::add_asset(&mut self.config.assets, &dir, None);
                }
            }
            if ui.button("展开添加文件夹").clicked() {
                if let Some(dir) = FileDialog::new().pick_folder() {
                    let added = assets::add_folder_expanded(&mut self.config.assets, &dir);
                    self.set_status(format!("已添加 {} 个文件", added));
                }
            }
            if ui.button("移除选中").clicked() {
                assets::remove_selected(&mut self.config.assets);
            }
            if ui.button("清空").clicked() {
                self.config.assets.clear();
            }
        });
        hint(ui, "可以直接把文件或文件夹拖到窗口中");
        ui.separator();

        if self.config.assets.is_empty() {
            ui.vertical_centered(|ui| {
                ui.add_space(40.0);
                ui.label("暂无资源文件");
            });
            return;
        }

        TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .column(Column::auto())
            .column(Column::auto())
            .column(Column::remainder().at_least(200.0).clip(true))
            .column(Column::initial(180.0).at_least(80.0))
            .column(Column::auto())
            .header(20.0, |mut header| {
                for title in ["包含", "选择", "源路径", "目标路径", "类型"] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|mut body| {
                for asset in &mut self.config.assets {
                    body.row(24.0, |mut row| {
                        row.col(|ui| {
                            ui.checkbox(&mut asset.enabled, "");
                        });
                        row.col(|ui| {
                            ui.checkbox(&mut asset.selected, "");
                        });
                        row.col(|ui| {
                            ui.label(&asset.source).on_hover_text(&asset.source);
                        });
                        row.col(|ui| {
                            ui.text_edit_singleline(&mut asset.target);
                        });
                        row.col(|ui| {
                            ui.label(asset.kind.label());
                        });
                    });
                }
            });
    }

    fn ui_windows(&mut self, ui: &mut egui::Ui) {
        let windows = &mut self.config.windows;
        card(ui, "程序信息", |ui| {
            text_row(ui, "公司名称：", &mut windows.company, "");
            text_row(ui, "产品名称：", &mut windows.product, "");
            text_row(ui, "文件版本：", &mut windows.version, "例如 1.0.0.0");
            text_row(ui, "文件描述：", &mut windows.description, "");
        });

        card(ui, "权限", |ui| {
            ui.checkbox(&mut windows.uac, "需要管理员权限");
            hint(ui, "启用后程序启动时会请求 UAC 提权");
        });
    }

    fn ui_advanced(&mut self, ui: &mut egui::Ui) {
        card(ui, "额外参数", |ui| {
            multiline(
                ui,
                &mut self.config.advanced.extra,
                "其他 Nuitka 参数，每行一个",
                6,
            );
            hint(ui, "原样追加在入口文件之前，例如 --include-package=requests");
        });

        card(ui, "常用参数", |ui| {
            for tip in [
                "--include-package=包名：强制包含整个包",
                "--include-module=模块名：强制包含模块",
                "--include-plugin-directory=路径：包含插件目录",
                "--python-flag=标志：设置 Python 标志",
                "--warn-implicit-exceptions：警告隐式异常",
                "--warn-unusual-code：警告异常代码",
            ] {
                ui.label(egui::RichText::new(tip).monospace());
            }
        });
    }

    fn ui_main_page(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("actions").show(ctx, |ui| {
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                if ui.button("💾 保存配置").clicked() {
                    self.save_config();
                }
                if ui.button("📂 加载配置").clicked() {
                    self.load_config(ctx);
                }
                if ui.button("🔍 预览命令").clicked() {
                    self.preview_command();
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let start = egui::Button::new(
                        egui::RichText::new("🚀 开始打包").color(egui::Color32::WHITE),
                    )
                    .fill(egui::Color32::from_rgb(0, 100, 200));
                    if ui.add_enabled(self.build.is_none(), start).clicked() {
                        self.start_package(ctx);
                    }
                });
            });
            ui.add_space(6.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                for tab in Tab::ALL {
                    ui.selectable_value(&mut self.tab, tab, tab.label());
                }
            });
            ui.separator();

            if self.tab == Tab::Assets {
                // 表格自带滚动
                self.ui_assets(ui);
                return;
            }
            egui::ScrollArea::vertical().show(ui, |ui| match self.tab {
                Tab::Environment => self.ui_environment(ui),
                Tab::Basic => self.ui_basic(ui),
                Tab::Output => self.ui_output(ui),
                Tab::Compile => self.ui_compile(ui),
                Tab::Optimize => self.ui_optimize(ui),
                Tab::Plugins => self.ui_plugins(ui),
                Tab::Modules => self.ui_modules(ui),
                Tab::Assets => {}
                Tab::Windows => self.ui_windows(ui),
                Tab::Advanced => self.ui_advanced(ui),
            });
        });
    }

    fn ui_log_page(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("log_header").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.heading("打包日志");
                if self.build_log.running || self.build_log.outcome.is_some() {
                    let progress = self.build_log.progress as f32 / 100.0;
                    ui.add(
                        egui::ProgressBar::new(progress)
                            .show_percentage()
                            .animate(self.build_log.running),
                    );
                }
            });
            ui.horizontal(|ui| {
                if ui.button("清空日志").clicked() {
                    self.build_log.clear();
                }
                if ui.button("保存日志").clicked() {
                    self.save_log();
                }
                let can_stop = self.build.as_ref().is_some_and(|b| !b.is_cancelling());
                if ui
                    .add_enabled(can_stop, egui::Button::new("⏹ 停止打包"))
                    .clicked()
                {
                    self.stop_package();
                }
                if ui.button("📁 打开输出目录").clicked() {
                    self.open_output_dir();
                }
            });
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut self.build_log.text.as_str())
                            .font(egui::TextStyle::Monospace)
                            .desired_width(f32::INFINITY),
                    );
                });
        });
    }

    fn ui_preview_window(&mut self, ctx: &egui::Context) {
        let Some(preview) = &self.preview else {
            return;
        };
        let mut open = true;
        egui::Window::new("命令预览")
            .open(&mut open)
            .collapsible(false)
            .resizable(true)
            .default_width(600.0)
            .show(ctx, |ui| {
                ui.add(
                    egui::TextEdit::multiline(&mut preview.command.as_str())
                        .font(egui::TextStyle::Monospace)
                        .desired_width(f32::INFINITY),
                );
                if ui.button("📋 复制").clicked() {
                    ui.ctx().copy_text(preview.command.clone());
                }
                if let Some(cwd) = &preview.cwd {
                    ui.label(format!("工作目录：{}", cwd.display()));
                }
                if !preview.env.is_empty() {
                    ui.separator();
                    ui.label("环境变量：");
                    for (key, value) in &preview.env {
                        ui.label(egui::RichText::new(format!("{}={}", key, value)).monospace());
                    }
                }
                if !preview.warnings.is_empty() {
                    ui.separator();
                    for warning in &preview.warnings {
                        ui.colored_label(egui::Color32::from_rgb(200, 120, 0), format!("⚠ {}", warning));
                    }
                }
            });
        if !open {
            self.preview = None;
        }
    }
}

impl eframe::App for PackerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_build();
        self.poll_probe();
        self.handle_dropped_files(ctx);

        // --- 顶部导航 ---
        egui::TopBottomPanel::top("nav").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("🛠️ Nuitka 打包工具");
                ui.separator();
                ui.selectable_value(&mut self.page, Page::Main, "主页");
                let log_label = if self.build.is_some() {
                    "日志 ●"
                } else {
                    "日志"
                };
                ui.selectable_value(&mut self.page, Page::Log, log_label);
            });
        });

        // --- 底部状态栏 ---
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            if self.status_is_error {
                ui.colored_label(egui::Color32::RED, &self.status_msg);
            } else {
                ui.label(&self.status_msg);
            }
        });

        match self.page {
            Page::Main => self.ui_main_page(ctx),
            Page::Log => self.ui_log_page(ctx),
        }

        self.ui_preview_window(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_stop_logs_once() {
        let mut app = PackerApp::default();
        let invocation = Invocation {
            program: "sh".into(),
            args: vec!["-c".into(), "exec sleep 30".into()],
            env: vec![],
            cwd: None,
        };
        app.build = Some(runner::start_build(&invocation, || {}).unwrap());

        app.stop_package();
        app.stop_package();
        app.stop_package();
        assert_eq!(app.build_log.text.matches("用户取消了打包操作").count(), 1);
        assert!(app.build.as_ref().unwrap().is_cancelling());
    }

    #[test]
    fn test_invalid_form_selects_tab() {
        let mut app = PackerApp::default();
        assert!(app.build_invocation().is_none());
        assert!(app.status_is_error);
        assert!(app.tab == Tab::Basic);

        app.config.basic.file = "/work/main.py".into();
        app.config.advanced.extra = "--output-filename='unclosed".into();
        assert!(app.build_invocation().is_none());
        assert!(app.tab == Tab::Advanced);
    }
}
