use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Tls,
}

/// Remote feed address, `tcp://host:port` or `tls://host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("endpoint must start with tcp:// or tls://: {0}")]
    UnknownScheme(String),
    #[error("endpoint missing host: {0}")]
    MissingHost(String),
    #[error("endpoint missing port: {0}")]
    MissingPort(String),
    #[error("endpoint port invalid: {0}")]
    InvalidPort(String),
}

impl Endpoint {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = if let Some(r) = s.strip_prefix("tcp://") {
            (Scheme::Tcp, r)
        } else if let Some(r) = s.strip_prefix("tls://") {
            (Scheme::Tls, r)
        } else {
            return Err(EndpointError::UnknownScheme(s.to_string()));
        };

        let rest = rest.trim_end_matches('/');
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::MissingPort(s.to_string()))?;
        if host.is_empty() {
            return Err(EndpointError::MissingHost(s.to_string()));
        }
        if port.is_empty() {
            return Err(EndpointError::MissingPort(s.to_string()));
        }
        let port: u16 = port.parse().map_err(|_| EndpointError::InvalidPort(s.to_string()))?;
        if port == 0 {
            return Err(EndpointError::InvalidPort(s.to_string()));
        }

        Ok(Self { scheme, host: host.to_string(), port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Tcp => "tcp",
            Scheme::Tls => "tls",
        };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_schemes() {
        let ep: Endpoint = "tcp://172.25.25.112:5000".parse().unwrap();
        assert_eq!(ep.scheme, Scheme::Tcp);
        assert_eq!(ep.addr(), "172.25.25.112:5000");

        let ep: Endpoint = "tls://detect.example.org:8443/".parse().unwrap();
        assert_eq!(ep.scheme, Scheme::Tls);
        assert_eq!(ep.host, "detect.example.org");
        assert_eq!(ep.to_string(), "tls://detect.example.org:8443");
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(matches!("ws://host:1".parse::<Endpoint>(), Err(EndpointError::UnknownScheme(_))));
        assert!(matches!("tcp://host".parse::<Endpoint>(), Err(EndpointError::MissingPort(_))));
        assert!(matches!("tcp://:80".parse::<Endpoint>(), Err(EndpointError::MissingHost(_))));
        assert!(matches!("tcp://host:http".parse::<Endpoint>(), Err(EndpointError::InvalidPort(_))));
        assert!(matches!("tcp://host:0".parse::<Endpoint>(), Err(EndpointError::InvalidPort(_))));
    }
}
