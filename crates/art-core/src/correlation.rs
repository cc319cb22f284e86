//! Correlation ids tying one client action to the engine's logs

use std::thread;
use ulid::Ulid;

/// Upper bound accepted by the engine for a correlation id
pub const MAX_CORRELATION_ID_LEN: usize = 50;

/// Length of the random prefix
pub const TOKEN_LEN: usize = 10;

const FALLBACK_TEST_NAME: &str = "art";

/// Build an id for `operation`, taking the test name from the current thread
pub fn correlation_id(operation: &str) -> String {
    build(&current_test_name(), operation)
}

/// Build `<token>_<test>_<operation>`, truncated to the engine's limit
pub fn build(test: &str, operation: &str) -> String {
    let mut id = random_token();
    for part in [test, operation] {
        if part.is_empty() {
            continue;
        }
        id.push('_');
        id.extend(part.chars().map(sanitize));
    }
    id.truncate(MAX_CORRELATION_ID_LEN);
    id
}

/// A caller-supplied id with the characters the engine rejects replaced,
/// truncated to the engine's limit
pub fn clean(id: &str) -> String {
    id.chars().map(sanitize).take(MAX_CORRELATION_ID_LEN).collect()
}

/// Ten characters from the random part of a fresh ULID
fn random_token() -> String {
    let ulid = Ulid::new().to_string();
    ulid[ulid.len() - TOKEN_LEN..].to_string()
}

fn sanitize(c: char) -> char {
    if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
        c
    } else {
        '_'
    }
}

/// The test harness names each test thread after its test path
fn current_test_name() -> String {
    thread::current()
        .name()
        .and_then(|name| name.rsplit("::").next())
        .filter(|name| !name.is_empty() && *name != "main")
        .unwrap_or(FALLBACK_TEST_NAME)
        .to_string()
}
