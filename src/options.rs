//! Encoding of server options passed through `pg_ctl -o`.

use std::collections::BTreeMap;

fn quote_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Build the option string for the server: `-p <port>` followed by one
/// `-c key="value"` per parameter.
///
/// Parameters are emitted in key order, so the same map always produces the
/// same command line.
pub fn encode_options(port: u16, parameters: &BTreeMap<String, String>) -> String {
    let mut encoded = format!("-p {port}");
    for (key, value) in parameters {
        encoded.push_str(" -c ");
        encoded.push_str(key);
        encoded.push('=');
        encoded.push_str(&quote_value(value));
    }
    encoded
}
