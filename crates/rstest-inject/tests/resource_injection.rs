//! Behavioural tests for resource injection through the attribute macros.

use std::io::Read;
use std::sync::Arc;

use rstest::rstest;
use rstest_inject_macros::with_resources;

#[with_resources]
#[test]
fn injects_owned_text(#[resource(path = "tests/data/greeting.txt")] content: String) {
    assert_eq!(content, "Hello, injected world!\n");
}

#[with_resources]
#[test]
fn injects_shared_text(#[resource(path = "tests/data/greeting.txt")] content: Arc<str>) {
    assert!(content.starts_with("Hello"));
}

#[with_resources]
#[test]
fn injects_boxed_text(#[resource(path = "tests/data/greeting.txt")] content: Box<str>) {
    assert!(content.ends_with("world!\n"));
}

#[with_resources]
#[test]
fn injects_raw_bytes(#[resource(path = "tests/data/blob.bin")] bytes: Vec<u8>) {
    assert_eq!(bytes, [0x00, 0x01, 0xfe, 0xff]);
}

#[with_resources]
#[test]
fn decodes_with_an_explicit_encoding(
    #[resource(path = "tests/data/latin1.txt", encoding = "windows-1252")] content: String,
) {
    assert_eq!(content.trim_end(), "Grüße aus München");
}

#[with_resources(encoding = "windows-1252")]
#[test]
fn function_level_encoding_applies(
    #[resource(path = "tests/data/latin1.txt")] content: String,
) {
    assert_eq!(content.trim_end(), "Grüße aus München");
}

#[with_resources]
#[test]
fn normalises_line_endings(
    #[resource(path = "tests/data/mixed_eol.txt", eol = "lf")] content: String,
) {
    assert_eq!(content, "one\ntwo\nthree\n");
}

#[with_resources]
#[test]
fn shared_text_is_cached_across_targets(
    #[resource(path = "tests/data/greeting.txt")] first: Arc<str>,
    #[resource(path = "tests/data/greeting.txt")] second: Arc<str>,
) {
    // Both parameters resolve from the per-run cache: same allocation.
    assert!(Arc::ptr_eq(&first, &second));
}

fn parse_numbers(text: &str) -> std::io::Result<Vec<u32>> {
    text.lines()
        .map(|line| {
            line.trim()
                .parse::<u32>()
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
        })
        .collect()
}

#[with_resources]
#[test]
fn loads_custom_types_through_a_text_loader(
    #[resource(path = "tests/data/numbers.txt", load_with = text(parse_numbers))] numbers: Vec<u32>,
) {
    assert_eq!(numbers, [1, 2, 3]);
}

fn count_bytes(stream: &mut dyn Read) -> std::io::Result<usize> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    Ok(bytes.len())
}

#[with_resources]
#[test]
fn loads_custom_types_through_a_byte_loader(
    #[resource(path = "tests/data/blob.bin", load_with = bytes(count_bytes))] size: usize,
) {
    assert_eq!(size, 4);
}

#[with_resources]
#[rstest]
fn composes_with_rstest(#[resource(path = "tests/data/greeting.txt")] content: String) {
    assert!(!content.is_empty());
}

#[with_resources]
fn missing_resource_case(
    #[resource(path = "tests/data/never-created.txt")] content: String,
) {
    let _ = content;
}

#[test]
fn missing_resources_panic_with_the_requested_path() {
    let outcome = std::panic::catch_unwind(missing_resource_case);
    let payload = outcome.err().and_then(|payload| {
        payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| (*s).to_owned()))
    });
    let message = payload.unwrap_or_default();
    assert!(
        message.contains("tests/data/never-created.txt"),
        "unexpected panic message: {message}"
    );
}
