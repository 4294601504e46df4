use serde_derive::Deserialize;

use log::{error, warn};
use std::fs;
use std::io;

use crate::ignore::{IgnoreRule, IgnoreSpec};

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    port: u16,
    local: bool,
    worker_threads: usize,
    /// 构建产物目录，静态资源与 service worker 都从这里读取
    build_dir: String,
    dev: bool,
    catch_errors: bool,
    ignore: Option<IgnoreRule>,
    /// 挂载前缀，例如 `/app`；为空时挂在根路径
    base_path: Option<String>,
    announce_basepath: bool,
    error_component: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 7878,
            local: true,
            worker_threads: 0,
            build_dir: "build".to_string(),
            dev: false,
            catch_errors: true,
            ignore: None,
            base_path: None,
            announce_basepath: false,
            error_component: "_error".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 文件加载配置。
    ///
    /// 文件无法读取时返回错误；内容无法解析时记录日志并回退到默认配置。
    pub fn from_toml(filename: &str) -> io::Result<Self> {
        let str_val = fs::read_to_string(filename)?;
        Ok(Self::from_toml_str(&str_val))
    }

    pub fn from_toml_str(str_val: &str) -> Self {
        let mut raw_config: Config = match toml::from_str(str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置: {}", e);
                Config::new()
            }
        };
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if let Some(base) = raw_config.base_path.take() {
            let trimmed = base.trim_end_matches('/');
            raw_config.base_path = match trimmed {
                "" => {
                    warn!("base_path为根路径，等同于不挂载");
                    None
                }
                t if t.starts_with('/') => Some(t.to_string()),
                t => Some(format!("/{}", t)),
            };
        }
        raw_config
    }

    /// 编译忽略规则；正则非法时返回错误。
    pub fn ignore_spec(&self) -> Result<Option<IgnoreSpec>, regex::Error> {
        self.ignore.as_ref().map(IgnoreRule::to_spec).transpose()
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn build_dir(&self) -> &str {
        &self.build_dir
    }

    pub fn dev(&self) -> bool {
        self.dev
    }

    pub fn catch_errors(&self) -> bool {
        self.catch_errors
    }

    pub fn base_path(&self) -> Option<&str> {
        self.base_path.as_deref()
    }

    pub fn announce_basepath(&self) -> bool {
        self.announce_basepath
    }

    pub fn error_component(&self) -> &str {
        &self.error_component
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = Config::from_toml_str("port = 3000\n");
        assert_eq!(config.port(), 3000);
        assert!(config.local());
        assert!(config.catch_errors());
        assert!(!config.dev());
        assert_eq!(config.error_component(), "_error");
        assert!(config.worker_threads() > 0);
        assert!(config.ignore_spec().unwrap().is_none());
    }

    #[test]
    fn test_invalid_toml_falls_back() {
        let config = Config::from_toml_str("port = \"not a number\"");
        assert_eq!(config.port(), 7878);
    }

    #[test]
    fn test_ignore_rules() {
        let config = Config::from_toml_str(
            r#"
ignore = ["api", { pattern = "\\.php$" }]
"#,
        );
        let spec = config.ignore_spec().unwrap().unwrap();
        assert!(spec.matches("/api/users"));
        assert!(spec.matches("/index.php"));
        assert!(!spec.matches("/client/app.js"));

        let bad = Config::from_toml_str(r#"ignore = { pattern = "(" }"#);
        assert!(bad.ignore_spec().is_err());
    }

    #[test]
    fn test_base_path_is_normalized() {
        assert_eq!(
            Config::from_toml_str("base_path = \"app/\"").base_path(),
            Some("/app")
        );
        assert_eq!(Config::from_toml_str("base_path = \"/\"").base_path(), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dev = true\nbuild_dir = \"dist\"").unwrap();

        let config = Config::from_toml(file.path().to_str().unwrap()).unwrap();
        assert!(config.dev());
        assert_eq!(config.build_dir(), "dist");

        assert!(Config::from_toml("/definitely/missing.toml").is_err());
    }
}
