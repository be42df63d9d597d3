//! AI-powered ExpenseExtractor implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::domain::extraction::{
    parse_extraction_response, BudgetCandidate, ExtractedTransaction, ExtractionError, ExtractionInput,
};
use crate::ports::{AIProvider, CompletionRequest, ExpenseExtractor, ImageAttachment, Message};

const RECEIPT_INSTRUCTION: &str = "Please analyze this receipt and extract the relevant information.";

/// Generation settings for extraction requests.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    pub max_tokens: u32,
    /// Applied to text input only; receipts use the provider default.
    pub temperature: f32,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Extracts transactions by prompting an LLM for a JSON answer.
pub struct LlmExpenseExtractor {
    ai_provider: Arc<dyn AIProvider>,
    settings: ExtractionSettings,
    today: Option<NaiveDate>,
}

impl LlmExpenseExtractor {
    pub fn new(ai_provider: Arc<dyn AIProvider>, settings: ExtractionSettings) -> Self {
        Self {
            ai_provider,
            settings,
            today: None,
        }
    }

    /// Pins "today" in the prompt instead of reading the clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Create the system prompt listing the candidate budgets
    fn create_system_prompt(&self, candidates: &[BudgetCandidate]) -> String {
        let budgets = serde_json::to_string_pretty(candidates).unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"You are a helpful receipt tracking AI. Review the details provided by the user and create one or more transactions to be added to the database.

### Requirements:
- Each transaction must include:
  - description: A clear description of the expense
  - amount: Extract or estimate the amount as a number
  - date: In YYYY-MM-DD format (use today's date if not specified)
  - budgetId: Must match one of the provided budget ids

### Budgets:
{}

### Response Format:
Your response must be valid JSON with this exact structure:
{{
  "transactions": [
    {{
      "description": "string",
      "amount": number,
      "date": "YYYY-MM-DD",
      "budgetId": "string"
    }}
  ]
}}

### Notes:
- Today's date is: {}
- Use the exact id from the provided budgets
- Amounts must be numbers (not strings)
- If the amount is not specified, make a reasonable estimate based on the description
- If multiple budgets could apply, choose the most appropriate one"#,
            budgets,
            self.today().format("%Y-%m-%d")
        )
    }

    fn build_request(&self, input: ExtractionInput, candidates: &[BudgetCandidate]) -> CompletionRequest {
        let request = CompletionRequest::new()
            .with_system_prompt(self.create_system_prompt(candidates))
            .with_max_tokens(self.settings.max_tokens)
            .with_json_output();

        match input {
            ExtractionInput::Text(text) => request
                .with(Message::user(text))
                .with_temperature(self.settings.temperature),
            ExtractionInput::Receipt { bytes, media_type } => request.with(
                Message::user(RECEIPT_INSTRUCTION).with_image(ImageAttachment::new(media_type, bytes)),
            ),
        }
    }
}

#[async_trait]
impl ExpenseExtractor for LlmExpenseExtractor {
    async fn extract(
        &self,
        input: ExtractionInput,
        candidates: &[BudgetCandidate],
    ) -> Result<Vec<ExtractedTransaction>, ExtractionError> {
        if let ExtractionInput::Text(ref text) = input {
            if text.trim().is_empty() {
                return Err(ExtractionError::NoTransactions);
            }
        }

        if matches!(input, ExtractionInput::Receipt { .. })
            && !self.ai_provider.provider_info().supports_images
        {
            return Err(ExtractionError::Provider(
                "the configured model does not accept receipt images".to_string(),
            ));
        }

        let request = self.build_request(input, candidates);
        let response = self.ai_provider.complete(request).await.map_err(|e| {
            tracing::warn!(error = %e, "Extraction provider call failed");
            ExtractionError::Provider(e.to_string())
        })?;
        if response.is_truncated() {
            tracing::warn!(tokens = response.usage.total_tokens, "Extraction response hit the token limit");
            return Err(ExtractionError::Malformed("response was cut off".to_string()));
        }

        let transactions = parse_extraction_response(&response.content, candidates).map_err(|e| {
            tracing::warn!(error = %e, "Extraction response rejected");
            e
        })?;

        tracing::debug!(count = transactions.len(), model = %response.model, "Extracted transactions");
        Ok(transactions)
    }
}

/// Extractor used when no provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredExtractor;

#[async_trait]
impl ExpenseExtractor for UnconfiguredExtractor {
    async fn extract(
        &self,
        _input: ExtractionInput,
        _candidates: &[BudgetCandidate],
    ) -> Result<Vec<ExtractedTransaction>, ExtractionError> {
        Err(ExtractionError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{MockAIProvider, MockError};
    use crate::ports::ProviderInfo;
    use crate::domain::foundation::{BudgetId, Money};

    fn candidates() -> Vec<BudgetCandidate> {
        vec![BudgetCandidate {
            id: BudgetId::new(),
            name: "Groceries".to_string(),
        }]
    }

    fn extractor(provider: MockAIProvider) -> LlmExpenseExtractor {
        LlmExpenseExtractor::new(Arc::new(provider), ExtractionSettings::default())
            .with_today(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
    }

    #[tokio::test]
    async fn extracts_valid_transactions() {
        let candidates = candidates();
        let response = format!(
            r#"{{"transactions":[{{"description":"Milk","amount":4.5,"date":"2024-01-15","budgetId":"{}"}}]}}"#,
            candidates[0].id
        );
        let provider = MockAIProvider::new().with_response(response);

        let txs = extractor(provider)
            .extract(ExtractionInput::Text("milk 4.50".into()), &candidates)
            .await
            .unwrap();

        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, Money::from_cents(450));
        assert_eq!(txs[0].budget_id, candidates[0].id);
    }

    #[tokio::test]
    async fn prompt_lists_budgets_and_today() {
        let candidates = candidates();
        let provider = MockAIProvider::new();
        let extractor = extractor(provider.clone());

        let _ = extractor
            .extract(ExtractionInput::Text("coffee".into()), &candidates)
            .await;

        let call = &provider.get_calls()[0];
        let prompt = call.system_prompt.as_deref().unwrap();
        assert!(prompt.contains("Groceries"));
        assert!(prompt.contains(&candidates[0].id.to_string()));
        assert!(prompt.contains("2024-01-15"));
        assert!(call.json_output);
        assert_eq!(call.temperature, Some(0.7));
        assert_eq!(call.max_tokens, Some(1024));
    }

    #[tokio::test]
    async fn receipt_is_sent_as_image() {
        let provider = MockAIProvider::new();
        let extractor = extractor(provider.clone());

        let _ = extractor
            .extract(
                ExtractionInput::Receipt {
                    bytes: vec![0xFF, 0xD8],
                    media_type: "image/jpeg".into(),
                },
                &candidates(),
            )
            .await;

        let call = &provider.get_calls()[0];
        assert_eq!(call.messages[0].content, RECEIPT_INSTRUCTION);
        assert_eq!(call.messages[0].images[0].media_type, "image/jpeg");
        assert_eq!(call.temperature, None);
    }

    #[tokio::test]
    async fn string_amount_is_rejected() {
        let candidates = candidates();
        let response = format!(
            r#"{{"transactions":[{{"description":"Coffee","amount":"3.50","date":"2024-01-01","budgetId":"{}"}}]}}"#,
            candidates[0].id
        );
        let provider = MockAIProvider::new().with_response(response);

        let err = extractor(provider)
            .extract(ExtractionInput::Text("coffee 3.50".into()), &candidates)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::InvalidAmount { index: 0, .. }));
    }

    #[tokio::test]
    async fn provider_failure_maps_to_provider_error() {
        let provider = MockAIProvider::new().with_error(MockError::Unavailable {
            message: "down".into(),
        });

        let err = extractor(provider)
            .extract(ExtractionInput::Text("coffee".into()), &candidates())
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::Provider(_)));
    }

    #[tokio::test]
    async fn blank_text_never_reaches_the_provider() {
        let provider = MockAIProvider::new();
        let err = extractor(provider.clone())
            .extract(ExtractionInput::Text("   ".into()), &candidates())
            .await
            .unwrap_err();

        assert_eq!(err, ExtractionError::NoTransactions);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn unconfigured_extractor_reports_not_configured() {
        let err = UnconfiguredExtractor
            .extract(ExtractionInput::Text("milk".into()), &candidates())
            .await
            .unwrap_err();
        assert_eq!(err, ExtractionError::NotConfigured);
    }

    #[tokio::test]
    async fn text_only_model_refuses_receipts() {
        let provider = MockAIProvider::new()
            .with_provider_info(ProviderInfo::new("openai", "gpt-3.5-turbo"));
        let extractor = extractor(provider.clone());

        let err = extractor
            .extract(
                ExtractionInput::Receipt {
                    bytes: vec![0xFF, 0xD8],
                    media_type: "image/jpeg".into(),
                },
                &candidates(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::Provider(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn truncated_response_is_malformed() {
        let provider = MockAIProvider::new().with_truncated_response(r#"{"transactions":[{"descr"#);

        let err = extractor(provider)
            .extract(ExtractionInput::Text("lots of things".into()), &candidates())
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::Malformed(_)));
    }
}
