//! Mints a connect token for one client against a running server's private
//! key, the same role a backend matchmaker plays: it holds the server's
//! private key, the client never does.

use clap::{App, Arg};
use relaynet::crypto::{self, XNONCE_SIZE};
use relaynet::time_source;
use relaynet::token::ConnectToken;
use std::fs;
use std::net::SocketAddr;

fn main() {
    let matches = App::new("Connect Token Minter")
        .version("1.0")
        .about("Mints a sealed connect token for one client.")
        .arg(Arg::with_name("KEY_FILE").help("Path to the server's private key").required(true))
        .arg(Arg::with_name("CLIENT_ID").help("Numeric client id, must be non-zero").required(true))
        .arg(Arg::with_name("SERVER_ADDR").help("Server address the token is valid for, e.g. 127.0.0.1:40000").required(true))
        .arg(
            Arg::with_name("PROTOCOL_ID")
                .help("Protocol id the client and server must agree on")
                .long("protocol-id")
                .takes_value(true)
                .default_value("1"),
        )
        .arg(
            Arg::with_name("EXPIRE_SECONDS")
                .help("Seconds from now the token remains valid")
                .long("expire-seconds")
                .takes_value(true)
                .default_value("45"),
        )
        .get_matches();

    let key_file_path = matches.value_of("KEY_FILE").unwrap();
    let client_id: u64 = matches.value_of("CLIENT_ID").unwrap().parse().expect("CLIENT_ID must be a non-negative integer");
    let server_addr: SocketAddr = matches.value_of("SERVER_ADDR").unwrap().parse().expect("SERVER_ADDR must be a valid socket address");
    let protocol_id: u64 = matches.value_of("PROTOCOL_ID").unwrap().parse().expect("PROTOCOL_ID must be an integer");
    let expire_seconds: u64 = matches.value_of("EXPIRE_SECONDS").unwrap().parse().expect("EXPIRE_SECONDS must be an integer");

    if client_id == 0 {
        panic!("CLIENT_ID must be non-zero: zero is reserved and always rejected by the server");
    }

    let encoded_key = fs::read_to_string(key_file_path).expect("failed to read key file");
    let key_bytes = base64::decode(encoded_key.trim()).expect("key file did not contain valid base64");
    let private_key: crypto::Key = key_bytes.try_into().expect("key file did not contain a 32-byte key");

    let mut random = [0u8; 32];
    crypto::random_bytes(&mut random);

    let token = ConnectToken {
        protocol_id,
        client_id,
        expire_timestamp: time_source::timestamp_secs() + expire_seconds,
        server_addresses: vec![server_addr],
        client_to_server_key: crypto::random_key(),
        server_to_client_key: crypto::random_key(),
        random,
    };

    let mut nonce = [0u8; XNONCE_SIZE];
    crypto::random_bytes(&mut nonce);
    let sealed = token.seal(&private_key, &nonce).expect("token serialization failed");

    println!("expire_timestamp = {}", token.expire_timestamp);
    println!("sealed_connect_token = {}", base64::encode(&sealed));
}
