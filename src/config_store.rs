use crate::error::{PackError, Result};
use crate::model::PackConfig;
use std::fs;
use std::path::Path;

/// 从 JSON 文件加载打包配置
///
/// 缺失的字段使用默认值；资源列表中没有源路径的行会被丢弃，
/// 没有目标路径的行以源文件名作为目标。
pub fn load_config(path: &Path) -> Result<PackConfig> {
    let content = fs::read_to_string(path).map_err(|source| PackError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut config: PackConfig =
        serde_json::from_str(&content).map_err(|source| PackError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

    normalize_assets(&mut config);
    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// 将配置以缩进格式写入 JSON 文件
pub fn save_config(path: &Path, config: &PackConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config).map_err(PackError::ConfigSerialize)?;
    fs::write(path, content).map_err(|source| PackError::ConfigWrite {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Saved config to {}", path.display());
    Ok(())
}

fn normalize_assets(config: &mut PackConfig) {
    config.assets.retain(|a| !a.source.trim().is_empty());
    for asset in &mut config.assets {
        if asset.target.is_empty() {
            asset.target = Path::new(&asset.source)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetKind, Compiler, PackMode};

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.json");
        fs::write(
            &path,
            r#"{
                "python": "C:/Python311/python.exe",
                "basic": { "file": "D:/proj/main.py", "mode": "onefile" },
                "compile": { "compiler": "本地GCC", "console": false },
                "plugins": { "numpy": true },
                "assets": [
                    { "source": "D:/proj/logo.png" },
                    { "source": "", "target": "ignored" },
                    { "enabled": false, "source": "D:/proj/data", "target": "data", "type": "folder" }
                ]
            }"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.basic.mode, PackMode::Onefile);
        assert_eq!(config.compile.compiler, Compiler::LocalGcc);
        assert!(!config.compile.console);
        // 未出现的开关保持默认
        assert!(config.compile.progress);
        assert!(config.modules.follow_imports);
        assert!(config.plugin_enabled("numpy"));
        assert!(!config.plugin_enabled("torch"));

        assert_eq!(config.assets.len(), 2);
        assert!(config.assets[0].enabled);
        assert_eq!(config.assets[0].target, "logo.png");
        assert_eq!(config.assets[0].kind, AssetKind::File);
        assert_eq!(config.assets[1].kind, AssetKind::Folder);
        assert!(!config.assets[1].enabled);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested.json");

        let mut config = PackConfig::default();
        config.basic.file = "/home/me/app/主程序.py".into();
        config.windows.company = "示例公司".into();
        *config.plugin_mut("pyside6") = true;
        config.compile.compiler = Compiler::MinGw64;
        save_config(&path, &config).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        // 中文原样写入，不转义
        assert!(raw.contains("示例公司"));
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["basic"]["mode"], "standalone");
        assert_eq!(v["compile"]["compiler"], "MinGW64");
        assert_eq!(v["plugins"]["pyside6"], true);

        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = load_config(&missing).unwrap_err();
        assert!(matches!(err, PackError::ConfigRead { .. }));
        assert!(err.to_string().contains("missing.json"));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            load_config(&broken).unwrap_err(),
            PackError::ConfigParse { .. }
        ));
    }
}
