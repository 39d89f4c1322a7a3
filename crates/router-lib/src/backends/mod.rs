//! The tool backends the router talks to, each served as an MCP server

pub mod math;
pub mod system;
pub mod weather;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A built-in backend and its conventional port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Math,
    Weather,
    Sys,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Math, Backend::Weather, Backend::Sys];

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Math => "math",
            Backend::Weather => "weather",
            Backend::Sys => "sys",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Backend::Math => 8002,
            Backend::Weather => 8000,
            Backend::Sys => 8001,
        }
    }

    /// Default `/mcp` URL on localhost
    pub fn default_url(&self) -> String {
        format!("http://localhost:{}/mcp", self.default_port())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown backend '{}', expected math, weather or sys", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_urls() {
        assert_eq!(Backend::Math.default_url(), "http://localhost:8002/mcp");
        assert_eq!(Backend::Weather.default_url(), "http://localhost:8000/mcp");
        assert_eq!(Backend::Sys.default_url(), "http://localhost:8001/mcp");
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("Weather".parse::<Backend>(), Ok(Backend::Weather));
        assert!("files".parse::<Backend>().is_err());
    }
}
