//! Generation context assembly.
//!
//! Builds the completion request for one pipeline run: a system prompt
//! from the business profile, catalog snapshot, customer details, and any
//! pending order, plus the recent history window. Rebuilt from scratch on
//! every invocation so admin changes take effect immediately.

use std::fmt::Write as _;

use vendly_types::chat::ConversationContext;
use vendly_types::llm::CompletionRequest;

pub struct ContextBuilder {
    max_tokens: u32,
}

impl ContextBuilder {
    pub fn new(max_tokens: u32) -> Self {
        Self { max_tokens }
    }

    pub fn build(&self, context: &ConversationContext) -> CompletionRequest {
        CompletionRequest {
            // The dispatcher substitutes each provider's configured model
            model: String::new(),
            messages: context.history.clone(),
            system: Some(self.render_system_prompt(context)),
            max_tokens: self.max_tokens,
            temperature: None,
        }
    }

    fn render_system_prompt(&self, context: &ConversationContext) -> String {
        let mut prompt = context.business_profile.trim().to_string();

        if !context.catalog.is_empty() {
            prompt.push_str("\n\nAvailable packages:\n");
            for package in &context.catalog {
                let _ = writeln!(
                    prompt,
                    "- {}: {} ({})",
                    package.name,
                    format_price(package.price_cents, &package.currency),
                    package.description
                );
            }
        }

        let _ = write!(
            prompt,
            "\nCustomer: {}",
            context.customer.name.as_deref().unwrap_or(&context.customer.address)
        );
        if let Some(language) = &context.customer.language {
            let _ = write!(prompt, " (preferred language: {language})");
        }

        if let Some(order) = &context.pending_order {
            let package_name = context
                .selected_package
                .as_ref()
                .map(|p| p.name.as_str())
                .unwrap_or("unknown package");
            let _ = write!(
                prompt,
                "\nThe customer has a pending order {} for {} ({}), status {}. \
                 Ask them to send a photo of their payment proof to proceed.",
                order.reference,
                package_name,
                format_price(order.price_cents, &order.currency),
                order.status
            );
        }

        prompt
    }
}

/// Minor units to a display amount, e.g. `(150000, "IDR")` -> "IDR 1500.00".
pub fn format_price(cents: i64, currency: &str) -> String {
    format!("{currency} {}.{:02}", cents / 100, (cents % 100).abs())
}
