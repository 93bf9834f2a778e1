use clap::{Parser, Subcommand};

use dialtone_core::Config;

#[derive(Parser, Debug)]
#[command(name = "dialtone")]
#[command(about = "Peer-to-peer audio calls over a WebSocket signaling relay", long_about = None)]
pub struct Cli {
    /// Path to a YAML or TOML config file
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the signaling relay
    Serve {
        /// Listen host (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run an interactive phone endpoint
    Phone {
        /// Relay WebSocket URL (overrides phone.server_url)
        #[arg(long)]
        server: Option<String>,

        /// Call this endpoint id as soon as registered
        #[arg(long)]
        call: Option<String>,

        /// Accept incoming calls without asking
        #[arg(long)]
        auto_answer: bool,
    },
}

impl Command {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        match self {
            Self::Serve { host, port } => {
                if let Some(host) = host {
                    config.server.host.clone_from(host);
                }
                if let Some(port) = port {
                    config.server.port = *port;
                }
            }
            Self::Phone { server, .. } => {
                if let Some(server) = server {
                    config.phone.server_url.clone_from(server);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from(["dialtone", "serve", "--port", "4100"]);
        let mut config = Config::default();
        cli.command.apply(&mut config);

        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_phone_flags() {
        let cli = Cli::parse_from([
            "dialtone",
            "phone",
            "--config",
            "phone.yaml",
            "--server",
            "ws://relay.example:4000/ws",
            "--call",
            "b1",
            "--auto-answer",
        ]);
        assert_eq!(cli.config.as_deref(), Some("phone.yaml"));

        let mut config = Config::default();
        cli.command.apply(&mut config);
        assert_eq!(config.phone.server_url, "ws://relay.example:4000/ws");

        match cli.command {
            Command::Phone {
                call, auto_answer, ..
            } => {
                assert_eq!(call.as_deref(), Some("b1"));
                assert!(auto_answer);
            }
            Command::Serve { .. } => panic!("expected phone command"),
        }
    }
}
