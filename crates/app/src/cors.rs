use catalog::json::string_list;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Decides which requests go through the CORS proxy.
///
/// Hosts in `cors_domains` serve CORS headers themselves and are never
/// proxied. Otherwise a host is proxied when it (or a parent domain) is in
/// `proxyable_domains`, or when the proxy is open to every domain.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorsProxy {
    pub base_proxy_url: String,
    pub proxyable_domains: Vec<String>,
    pub cors_domains: Vec<String>,
    pub is_open_proxy: bool,
}

impl CorsProxy {
    pub fn new(base_proxy_url: impl Into<String>) -> Self {
        Self {
            base_proxy_url: base_proxy_url.into(),
            ..Self::default()
        }
    }

    /// `domains` is the proxyable-domains document or the server config
    /// (`{allowProxyFor, proxyAllDomains}`); `fallback` is used when neither
    /// is available.
    pub fn init(&mut self, domains: Option<&Value>, base_proxy_url: &str, fallback: &[String]) {
        match domains {
            Some(config @ Value::Object(_)) => {
                self.is_open_proxy = config
                    .get("proxyAllDomains")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                self.proxyable_domains = string_list(config.get("allowProxyFor"));
            }
            _ => self.proxyable_domains = fallback.to_vec(),
        }
        self.base_proxy_url = base_proxy_url.to_string();
        debug!(
            base = %self.base_proxy_url,
            domains = self.proxyable_domains.len(),
            open = self.is_open_proxy,
            "cors proxy initialized"
        );
    }

    pub fn add_cors_domains(&mut self, domains: impl IntoIterator<Item = String>) {
        for domain in domains {
            if !self.cors_domains.contains(&domain) {
                self.cors_domains.push(domain);
            }
        }
    }

    pub fn should_use_proxy(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            // Relative URLs are same-origin.
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        if host_in_domains(host, &self.cors_domains) {
            return false;
        }
        self.is_open_proxy || host_in_domains(host, &self.proxyable_domains)
    }

    /// `flag` is an optional proxy directive such as a cache duration (`1d`).
    pub fn get_proxied_url(&self, url: &str, flag: Option<&str>) -> String {
        match flag {
            Some(flag) => format!("{}_{flag}/{url}", self.base_proxy_url),
            None => format!("{}{url}", self.base_proxy_url),
        }
    }

    pub fn get_url_proxy_if_necessary(&self, url: &str, flag: Option<&str>) -> String {
        if self.should_use_proxy(url) {
            self.get_proxied_url(url, flag)
        } else {
            url.to_string()
        }
    }
}

fn host_in_domains(host: &str, domains: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    domains.iter().any(|domain| {
        let domain = domain.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    })
}
