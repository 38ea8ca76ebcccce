use knowbase::infrastructure::observability::sanitize_prompt;

#[test]
fn given_empty_prompt_when_sanitizing_then_returns_empty_marker() {
    assert_eq!(sanitize_prompt(""), "[EMPTY]");
    assert_eq!(sanitize_prompt("   "), "[EMPTY]");
}

#[test]
fn given_short_prompt_when_sanitizing_then_returns_unchanged() {
    let prompt = "What is the capital of Norway?";
    assert_eq!(sanitize_prompt(prompt), prompt);
}

#[test]
fn given_long_prompt_when_sanitizing_then_truncates_with_length() {
    let prompt = "a".repeat(150);
    let result = sanitize_prompt(&prompt);
    assert!(result.contains("... (150 chars total)"));
    assert!(result.starts_with(&"a".repeat(100)));
}

#[test]
fn given_long_multibyte_prompt_when_sanitizing_then_cuts_on_char_boundary() {
    let prompt = "ø".repeat(120);
    let result = sanitize_prompt(&prompt);
    assert!(result.starts_with(&"ø".repeat(100)));
    assert!(result.ends_with("... (120 chars total)"));
}

#[test]
fn given_bearer_token_when_sanitizing_then_redacts_token() {
    let result = sanitize_prompt("Authorization: Bearer r8_abc123xyz");
    assert!(result.contains("Bearer [REDACTED]"));
    assert!(!result.contains("r8_abc123xyz"));
}

#[test]
fn given_api_key_when_sanitizing_then_redacts_key() {
    let result = sanitize_prompt("Send request with api_key=secret123&x=1");
    assert_eq!(result, "Send request with api_key=[REDACTED]&x=1");
}

#[test]
fn given_repeated_secrets_when_sanitizing_then_redacts_every_occurrence() {
    let result = sanitize_prompt("token=one and token=two");
    assert_eq!(result, "token=[REDACTED] and token=[REDACTED]");
}

#[test]
fn given_whitespace_padded_prompt_when_sanitizing_then_trims() {
    assert_eq!(sanitize_prompt("  Hello world  "), "Hello world");
}

#[test]
fn given_secret_straddling_cut_when_sanitizing_then_redacts_before_truncating() {
    let prompt = format!("{} token=supersecretvalue", "a".repeat(90));
    let result = sanitize_prompt(&prompt);
    assert!(!result.contains("sup"));
    assert!(result.starts_with(&format!("{} token=[RE", "a".repeat(90))));
    assert!(result.ends_with("... (107 chars total)"));
}
