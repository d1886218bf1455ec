//! Generates a fresh server private key and writes it to a file, base64
//! encoded. The same key seals and opens connect/challenge tokens, so the
//! matchmaker minting tokens and the server admitting them must share it.

use clap::{App, Arg};
use relaynet::crypto;
use std::fs;

fn main() {
    let matches = App::new("Key Generator")
        .version("1.0")
        .about("Generates a relaynet server private key.")
        .arg(Arg::with_name("KEY_FILE").help("Path the new key will be written to").required(true))
        .get_matches();

    let key_file_path = matches.value_of("KEY_FILE").unwrap();

    let key = crypto::random_key();
    let encoded = base64::encode(&key);

    fs::write(key_file_path, encoded).expect("failed to write key file");
    println!("Wrote a new server private key to `{}`", key_file_path);
}
