use url::Url;

use crate::config::ViewerConfig;
use crate::error::Result;

/// Query parameter carrying the cache-busting value on stream requests.
pub const CACHE_BUSTER_PARAM: &str = "t";

/// Absolute URLs of the backend endpoints, fixed for the lifetime of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    health: Url,
    stream: Url,
    control: Url,
}

impl Endpoints {
    pub fn from_config(config: &ViewerConfig) -> Result<Self> {
        Ok(Self {
            health: join(&config.base_url, &config.health_path)?,
            stream: join(&config.base_url, &config.stream_path)?,
            control: join(&config.base_url, &config.control_path)?,
        })
    }

    pub fn health(&self) -> &Url {
        &self.health
    }

    pub fn control(&self) -> &Url {
        &self.control
    }

    /// The stream URL without a cache-busting parameter.
    pub fn stream_base(&self) -> &Url {
        &self.stream
    }

    pub fn stream(&self, cache_buster: u64) -> Url {
        let mut url = self.stream.clone();
        url.query_pairs_mut()
            .append_pair(CACHE_BUSTER_PARAM, &cache_buster.to_string());
        url
    }
}

/// Appends `path` to `base` verbatim, so a base URL with a path prefix keeps it.
fn join(base: &str, path: &str) -> Result<Url> {
    let base = base.trim_end_matches('/');
    let url = if path.starts_with('/') {
        Url::parse(&format!("{base}{path}"))?
    } else {
        Url::parse(&format!("{base}/{path}"))?
    };
    Ok(url)
}

/// Reads the cache-busting value back out of a stream URL.
pub fn cache_buster(url: &Url) -> Option<u64> {
    url.query_pairs()
        .find(|(key, _)| key == CACHE_BUSTER_PARAM)
        .and_then(|(_, value)| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_from_defaults() {
        let config = ViewerConfig::new("https://example.ngrok-free.dev");
        let endpoints = Endpoints::from_config(&config).unwrap();

        assert_eq!(
            endpoints.health().as_str(),
            "https://example.ngrok-free.dev/health"
        );
        assert_eq!(
            endpoints.control().as_str(),
            "https://example.ngrok-free.dev/control/click"
        );
        assert_eq!(
            endpoints.stream(1700000000123).as_str(),
            "https://example.ngrok-free.dev/stream?t=1700000000123"
        );
    }

    #[test]
    fn test_base_url_with_path_prefix_and_trailing_slash() {
        let mut config = ViewerConfig::new("http://10.0.0.5:8080/camera/");
        config.stream_path = "stream.mjpg".to_string();
        let endpoints = Endpoints::from_config(&config).unwrap();

        assert_eq!(
            endpoints.health().as_str(),
            "http://10.0.0.5:8080/camera/health"
        );
        assert_eq!(
            endpoints.stream_base().as_str(),
            "http://10.0.0.5:8080/camera/stream.mjpg"
        );
    }

    #[test]
    fn test_cache_buster_is_appended_to_existing_query() {
        let mut config = ViewerConfig::new("http://localhost:8080");
        config.stream_path = "/stream?quality=medium".to_string();
        let endpoints = Endpoints::from_config(&config).unwrap();

        let url = endpoints.stream(42);
        assert_eq!(url.as_str(), "http://localhost:8080/stream?quality=medium&t=42");
        assert_eq!(cache_buster(&url), Some(42));
    }
}
