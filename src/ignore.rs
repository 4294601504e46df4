//! # 忽略规则
//!
//! 决定一个请求路径是否整体绕过处理器链。规则可以递归嵌套：
//! 列表表示“任一命中即忽略”，叶子可以是正则、谓词函数或字面量路径前缀。
//! 求值是请求路径的纯函数，没有副作用。

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_derive::Deserialize;

pub type IgnorePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum IgnoreSpec {
    /// 析取：任一子规则命中即忽略
    Any(Vec<IgnoreSpec>),
    Pattern(Regex),
    Predicate(IgnorePredicate),
    /// 字面量路径前缀，不以 `/` 开头时按 `/literal` 处理
    Prefix(String),
}

impl IgnoreSpec {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        IgnoreSpec::Predicate(Arc::new(f))
    }

    pub fn matches(&self, path: &str) -> bool {
        should_ignore(path, self)
    }
}

/// 判断 `path` 是否命中忽略规则。
pub fn should_ignore(path: &str, spec: &IgnoreSpec) -> bool {
    match spec {
        IgnoreSpec::Any(specs) => specs.iter().any(|s| should_ignore(path, s)),
        IgnoreSpec::Pattern(re) => re.is_match(path),
        IgnoreSpec::Predicate(f) => f(path),
        IgnoreSpec::Prefix(literal) => {
            if literal.starts_with('/') {
                path.starts_with(literal.as_str())
            } else {
                path.strip_prefix('/')
                    .map_or(false, |rest| rest.starts_with(literal.as_str()))
            }
        }
    }
}

impl fmt::Debug for IgnoreSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreSpec::Any(specs) => f.debug_list().entries(specs).finish(),
            IgnoreSpec::Pattern(re) => write!(f, "Pattern({})", re.as_str()),
            IgnoreSpec::Predicate(_) => write!(f, "Predicate(..)"),
            IgnoreSpec::Prefix(p) => write!(f, "Prefix({:?})", p),
        }
    }
}

impl From<&str> for IgnoreSpec {
    fn from(literal: &str) -> Self {
        IgnoreSpec::Prefix(literal.to_string())
    }
}

impl From<String> for IgnoreSpec {
    fn from(literal: String) -> Self {
        IgnoreSpec::Prefix(literal)
    }
}

impl From<Regex> for IgnoreSpec {
    fn from(re: Regex) -> Self {
        IgnoreSpec::Pattern(re)
    }
}

impl<T: Into<IgnoreSpec>> From<Vec<T>> for IgnoreSpec {
    fn from(specs: Vec<T>) -> Self {
        IgnoreSpec::Any(specs.into_iter().map(Into::into).collect())
    }
}

/// 配置文件中的忽略规则：字符串为路径前缀，`{ pattern = "..." }` 为正则，数组为析取。
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum IgnoreRule {
    Prefix(String),
    Pattern { pattern: String },
    Any(Vec<IgnoreRule>),
}

impl IgnoreRule {
    pub fn to_spec(&self) -> Result<IgnoreSpec, regex::Error> {
        Ok(match self {
            IgnoreRule::Prefix(p) => IgnoreSpec::Prefix(p.clone()),
            IgnoreRule::Pattern { pattern } => IgnoreSpec::Pattern(Regex::new(pattern)?),
            IgnoreRule::Any(rules) => IgnoreSpec::Any(
                rules
                    .iter()
                    .map(IgnoreRule::to_spec)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }
}
