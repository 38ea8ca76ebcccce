const CONTEXT_PLACEHOLDER: &str = "{context_str}";
const QUERY_PLACEHOLDER: &str = "{query_str}";

pub const DEFAULT_QA_TEMPLATE: &str = "Context information is below.\n\
---------------------\n\
{context_str}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {query_str}\n\
Answer: ";

/// System message sent alongside the QA prompt to chat-tuned models.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert Q&A system that is trusted around the world.\n\
Always answer the query using the provided context information, and not prior knowledge.\n\
Some rules to follow:\n\
1. Never directly reference the given context in your answer.\n\
2. Avoid statements like 'Based on the context, ...' or \
'The context information ...' or anything along those lines.";

/// Question-answering prompt with `{context_str}` and `{query_str}` slots.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PromptTemplateError {
    #[error("template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, PromptTemplateError> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUERY_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(PromptTemplateError::MissingPlaceholder(placeholder));
            }
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Single pass, so placeholder text inside the context or query is left alone.
    pub fn format(&self, context: &str, query: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + query.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUERY_PLACEHOLDER) {
                out.push_str(query);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);

        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_QA_TEMPLATE.to_string(),
        }
    }
}
