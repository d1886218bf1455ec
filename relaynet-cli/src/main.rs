//! Validates an endpoint/server TOML configuration pair without standing up
//! a socket, useful for catching a typo'd config before it reaches a
//! running process.

use clap::{App, Arg};
use relaynet::config::{EndpointConfig, ServerConfig};
use relaynet::logging;
use slog::info;
use std::fs;

pub fn main() {
    let matches = App::new("relaynet-cli")
        .version("1.0")
        .about("Validates relaynet endpoint and server configuration files.")
        .arg(Arg::with_name("ENDPOINT_CONFIG").help("Path to an endpoint config TOML file").required(true))
        .arg(Arg::with_name("SERVER_CONFIG").help("Path to a server config TOML file").required(true))
        .get_matches();

    let logger = logging::terminal_logger("info");

    let endpoint_config_path = matches.value_of("ENDPOINT_CONFIG").unwrap();
    let endpoint_toml = fs::read_to_string(endpoint_config_path).expect("failed to read endpoint config file");
    let endpoint_config =
        EndpointConfig::from_toml_str(&endpoint_toml).expect("endpoint config failed to parse");
    info!(logger, "endpoint config is valid"; "config" => ?endpoint_config);

    let server_config_path = matches.value_of("SERVER_CONFIG").unwrap();
    let server_toml = fs::read_to_string(server_config_path).expect("failed to read server config file");
    let server_config = ServerConfig::from_toml_str(&server_toml).expect("server config failed to parse");
    info!(logger, "server config is valid"; "config" => ?server_config);
}
