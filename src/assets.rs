use crate::model::{AssetEntry, AssetKind};
use std::path::Path;
use walkdir::WalkDir;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// 添加一条资源，源路径已存在时忽略
///
/// 返回是否真的添加了新行。目标路径缺省为文件/文件夹名。
pub fn add_asset(assets: &mut Vec<AssetEntry>, path: &Path, target: Option<String>) -> bool {
    let source = path.to_string_lossy().to_string();
    if source.is_empty() || assets.iter().any(|a| a.source == source) {
        return false;
    }

    let kind = if path.is_dir() {
        AssetKind::Folder
    } else {
        AssetKind::File
    };
    assets.push(AssetEntry {
        enabled: true,
        source,
        target: target.unwrap_or_else(|| file_name(path)),
        kind,
        selected: false,
    });
    true
}

/// 批量添加（文件对话框多选或拖放），返回新增行数
pub fn add_paths<'a, I>(assets: &mut Vec<AssetEntry>, paths: I) -> usize
where
    I: IntoIterator<Item = &'a Path>,
{
    paths
        .into_iter()
        .filter(|p| add_asset(assets, p, None))
        .count()
}

/// 把文件夹展开为逐个文件，目标路径为 `文件夹名/相对路径`
///
/// 适合只想打包其中一部分文件的情况：展开后可以逐行取消勾选。
pub fn add_folder_expanded(assets: &mut Vec<AssetEntry>, dir: &Path) -> usize {
    let root_name = file_name(dir);
    let mut added = 0;

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        // 目标路径统一使用正斜杠，Nuitka 在各平台都接受
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let target = if root_name.is_empty() {
            relative
        } else {
            format!("{}/{}", root_name, relative)
        };
        if add_asset(assets, entry.path(), Some(target)) {
            added += 1;
        }
    }

    log::debug!("Expanded {} into {} assets", dir.display(), added);
    added
}

/// 删除界面上选中的行，返回删除数量
pub fn remove_selected(assets: &mut Vec<AssetEntry>) -> usize {
    let before = assets.len();
    assets.retain(|a| !a.selected);
    before - assets.len()
}
