use std::sync::LazyLock;
use tiktoken_rs::CoreBPE;

static TOKENIZER: LazyLock<CoreBPE> = LazyLock::new(|| {
    tiktoken_rs::cl100k_base().expect("Failed to initialize cl100k_base tokenizer")
});

/// Token count under cl100k, used for chunk sizing and context budgets.
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    TOKENIZER.encode_with_special_tokens(text).len()
}
