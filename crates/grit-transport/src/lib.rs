//! Process-spawn transport.
//!
//! A remote is reached by running its agent program (`grit upload-pack` or
//! `grit receive-pack`) with the repository path as argument: directly for
//! local paths and `file://` URLs, through `ssh` otherwise. The agent's
//! stdio becomes the wire.

pub mod url;

use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub use url::RemoteUrl;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid remote url: {0}")]
    InvalidUrl(String),

    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A running remote agent with its pipe endpoints. The caller owns the
/// child and reaps it once the exchange is over.
pub struct Connection {
    pub child: Child,
    pub input: ChildStdout,
    pub output: ChildStdin,
}

/// Spawn the agent `program` for `url` and wire up its stdio.
pub fn start_agent(program: &str, url: &str) -> Result<Connection, TransportError> {
    let argv = build_agent_command(program, url)?;
    let (cmd, args) = argv
        .split_first()
        .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;

    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| TransportError::Spawn {
            command: argv.join(" "),
            source: e,
        })?;

    let output = child.stdin.take().expect("piped stdin");
    let input = child.stdout.take().expect("piped stdout");

    Ok(Connection {
        child,
        input,
        output,
    })
}

fn build_agent_command(program: &str, url: &str) -> Result<Vec<String>, TransportError> {
    let mut argv: Vec<String> = program.split_whitespace().map(String::from).collect();
    if argv.is_empty() {
        return Err(TransportError::InvalidUrl(format!(
            "empty agent program for {url}"
        )));
    }

    match RemoteUrl::parse(url)? {
        RemoteUrl::File { path } => {
            argv.push(path);
            Ok(argv)
        }
        RemoteUrl::Ssh {
            user,
            host,
            port,
            path,
        } => {
            let mut ssh = vec!["ssh".to_string(), host];
            if let Some(user) = user {
                ssh.push("-l".to_string());
                ssh.push(user);
            }
            if let Some(port) = port {
                ssh.push("-p".to_string());
                ssh.push(port.to_string());
            }
            argv.push(path);
            ssh.extend(argv);
            Ok(ssh)
        }
    }
}
