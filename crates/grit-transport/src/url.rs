//! Remote URL forms grit understands: bare paths, `file://`, and `ssh://`.

use crate::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUrl {
    File {
        path: String,
    },
    Ssh {
        user: Option<String>,
        host: String,
        port: Option<u16>,
        path: String,
    },
}

impl RemoteUrl {
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        if let Some(rest) = url.strip_prefix("file://") {
            return Ok(Self::File {
                path: rest.to_string(),
            });
        }

        if let Some(rest) = url.strip_prefix("ssh://") {
            let (authority, path) = match rest.find('/') {
                Some(slash) => (&rest[..slash], &rest[slash..]),
                None => (rest, "/"),
            };

            let (user, host_port) = match authority.split_once('@') {
                Some((user, host_port)) => (Some(user.to_string()), host_port),
                None => (None, authority),
            };

            let (host, port) = match host_port.split_once(':') {
                Some((host, port)) => {
                    let port = port.parse().map_err(|_| {
                        TransportError::InvalidUrl(format!("bad port in {url}"))
                    })?;
                    (host.to_string(), Some(port))
                }
                None => (host_port.to_string(), None),
            };

            if host.is_empty() {
                return Err(TransportError::InvalidUrl(url.to_string()));
            }

            return Ok(Self::Ssh {
                user,
                host,
                port,
                path: path.to_string(),
            });
        }

        // Anything else is a local filesystem path.
        Ok(Self::File {
            path: url.to_string(),
        })
    }
}
