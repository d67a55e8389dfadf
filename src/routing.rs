use anyhow::{Context, Result};
use std::path::Path;

/// Domains dialed directly unless the operator replaces the list
pub const DEFAULT_ALLOW_LIST: &[&str] = &[
    "dingtalk.com",
    "dingtalkapps.com",
    "aliyuncs.com",
    "alicdn.com",
    "aliapp.org",
    "alipay.com",
    "aliimg.com",
    "aliwork.com",
    "mmstat.com",
    "taobao.com",
    "taobao.net",
    "tbcdn.cn",
    "tmall.com",
    "csdn.net",
    "csdnimg.cn",
    "cnblogs.com",
    "github.com",
    "googleapis.com",
];

/// Route is where a session's traffic goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Dial the destination from the ingress
    Direct,
    /// Tunnel through the upstream relay
    Relay,
    /// Drop the connection
    Discard,
}

/// Rule routes hosts containing `pattern`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub pattern: String,
    pub route: Route,
}

/// Router classifies hosts against an ordered rule list. The first matching
/// rule wins; unmatched hosts go through the relay.
#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<Rule>,
}

/// Router implementation block
impl Router {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// with_allow_list builds a router that sends every listed pattern direct
    pub fn with_allow_list<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rules = patterns
            .into_iter()
            .map(|pattern| Rule {
                pattern: pattern.into(),
                route: Route::Direct,
            })
            .collect();

        Self { rules }
    }

    /// allow appends a direct pattern after the existing rules
    pub fn allow(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            route: Route::Direct,
        });
        self
    }

    /// load_allow_list appends the patterns of an allow-list file: one per
    /// line, blank lines and `#` comments skipped
    pub fn load_allow_list(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("[ERR] failed to read allow-list {}", path.display()))?;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self = self.allow(line);
        }

        Ok(self)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// classify decides the route for `host`. Matching is plain, case-sensitive
    /// substring containment.
    pub fn classify(&self, host: &str) -> Route {
        if host.is_empty() {
            return Route::Discard;
        }

        self.rules
            .iter()
            .find(|rule| host.contains(rule.pattern.as_str()))
            .map_or(Route::Relay, |rule| rule.route)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::with_allow_list(DEFAULT_ALLOW_LIST.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let router = Router::default();
        assert_eq!(router.classify(""), Route::Discard);
        assert_eq!(router.classify("sub.github.com"), Route::Direct);
        assert_eq!(router.classify("example.org"), Route::Relay);
    }

    #[test]
    fn matching_is_case_sensitive_substring() {
        let router = Router::with_allow_list(["github.com"]);
        assert_eq!(router.classify("api.github.com.evil.net"), Route::Direct);
        assert_eq!(router.classify("GitHub.com"), Route::Relay);
    }

    #[test]
    fn ip_literals_fall_through_to_relay() {
        let router = Router::default();
        assert_eq!(router.classify("93.184.216.34"), Route::Relay);
        assert_eq!(router.classify("2606:2800:220:1::1"), Route::Relay);
    }

    #[test]
    fn first_rule_wins() {
        let router = Router::new(vec![
            Rule {
                pattern: "ads.".to_string(),
                route: Route::Discard,
            },
            Rule {
                pattern: "example.com".to_string(),
                route: Route::Direct,
            },
        ]);
        assert_eq!(router.classify("ads.example.com"), Route::Discard);
        assert_eq!(router.classify("www.example.com"), Route::Direct);
    }

    #[test]
    fn allow_list_file_skips_comments() {
        let path = std::env::temp_dir()
            .join(format!("splitsocks-allow-{}.txt", std::process::id()));
        std::fs::write(&path, "# internal\nintranet.local\n\n  wiki.corp  \n").unwrap();

        let router = Router::with_allow_list(Vec::<String>::new())
            .load_allow_list(&path)
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(router.rules().len(), 2);
        assert_eq!(router.classify("a.intranet.local"), Route::Direct);
        assert_eq!(router.classify("wiki.corp"), Route::Direct);
        assert_eq!(router.classify("internal"), Route::Relay);
    }

    #[test]
    fn missing_allow_list_is_an_error() {
        assert!(
            Router::default()
                .load_allow_list("/nonexistent/splitsocks/allow.txt")
                .is_err()
        );
    }
}
