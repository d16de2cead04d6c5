#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // Release 模式下不弹出控制台窗口

mod app;          // 界面与交互
mod assets;       // 资源列表维护
mod build_log;    // 打包日志
mod command;      // Nuitka 命令生成
mod config_store; // 配置文件读写
mod error;
mod model;        // 配置数据模型
mod probe;        // Python / Nuitka 环境检测
mod runner;       // 后台运行 Nuitka

use app::PackerApp;
use eframe::egui;
use env_logger::{Builder, Env};

fn main() -> eframe::Result<()> {
    // 默认 info 级别，可通过 RUST_LOG 覆盖
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis))
        .init();
    log::info!("Nuitka packer v{} starting", env!("CARGO_PKG_VERSION"));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 800.0])
            .with_min_inner_size([700.0, 500.0])
            .with_drag_and_drop(true)
            .with_title("Nuitka 可视化打包工具"),
        ..Default::default()
    };

    eframe::run_native(
        "Nuitka Packer",
        options,
        Box::new(|cc| Ok(Box::new(PackerApp::new(cc)))),
    )
}
