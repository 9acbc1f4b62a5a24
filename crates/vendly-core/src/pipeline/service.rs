//! The conversation pipeline.
//!
//! One inbound message flows through: sender slot acquisition (per-sender
//! ordering, global cap), customer and conversation resolution, the
//! payment-proof short-circuit, context assembly, generation dispatch,
//! and reply persistence + delivery. The whole run sits under one
//! absolute deadline. Failures never reach the end user as errors; they
//! surface in logs and the reply is simply not sent.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vendly_types::chat::{ChatMessage, Conversation, ConversationContext, Customer, Direction};
use vendly_types::config::EngineConfig;
use vendly_types::error::RepositoryError;
use vendly_types::event::EngineEvent;
use vendly_types::llm::{Message, MessageRole};
use vendly_types::order::{Order, OrderError};
use vendly_types::transport::{InboundMessage, MessageKind};

use crate::event::EventBus;
use crate::llm::ProviderDispatcher;
use crate::repository::catalog::CatalogRepository;
use crate::repository::conversation::ConversationRepository;
use crate::repository::customer::CustomerRepository;
use crate::repository::order::OrderRepository;
use crate::repository::provider::ProviderRepository;

use super::context::ContextBuilder;
use super::gateway::OutboundGateway;
use super::orders::OrderService;
use super::slots::ProcessingSlots;

const DEFAULT_MAX_TOKENS: u32 = 1024;
const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub history_window: usize,
    pub processing_timeout: Duration,
    pub max_processing_slots: usize,
    pub max_tokens: u32,
}

impl PipelineSettings {
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self {
            history_window: config.history_window,
            processing_timeout: Duration::from_millis(config.processing_timeout_ms),
            max_processing_slots: config.max_processing_slots,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Order(#[from] OrderError),
}

pub struct ConversationPipeline<Cust, Conv, Ord, Cat, P, G>
where
    P: ProviderRepository,
{
    customers: Cust,
    conversations: Conv,
    catalog: Cat,
    orders: OrderService<Ord, Cust, Cat, G>,
    dispatcher: Arc<Mutex<ProviderDispatcher<P>>>,
    gateway: G,
    context_builder: ContextBuilder,
    slots: ProcessingSlots,
    bus: EventBus,
    settings: PipelineSettings,
}

impl<Cust, Conv, Ord, Cat, P, G> ConversationPipeline<Cust, Conv, Ord, Cat, P, G>
where
    Cust: CustomerRepository + Clone,
    Conv: ConversationRepository,
    Ord: OrderRepository,
    Cat: CatalogRepository + Clone,
    P: ProviderRepository,
    G: OutboundGateway + Clone,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        customers: Cust,
        conversations: Conv,
        order_repo: Ord,
        catalog: Cat,
        dispatcher: Arc<Mutex<ProviderDispatcher<P>>>,
        gateway: G,
        bus: EventBus,
        settings: PipelineSettings,
    ) -> Self {
        let orders = OrderService::new(
            order_repo,
            customers.clone(),
            catalog.clone(),
            gateway.clone(),
            bus.clone(),
        );
        Self {
            customers,
            conversations,
            catalog,
            orders,
            dispatcher,
            gateway,
            context_builder: ContextBuilder::new(settings.max_tokens),
            slots: ProcessingSlots::new(settings.max_processing_slots),
            bus,
            settings,
        }
    }

    /// Order operations share the pipeline's repositories and gateway.
    pub fn orders(&self) -> &OrderService<Ord, Cust, Cat, G> {
        &self.orders
    }

    /// Handle one inbound message end to end.
    pub async fn on_inbound(&self, message: InboundMessage) {
        if message.from_group {
            tracing::trace!(sender = %message.sender, "Ignoring group message");
            return;
        }

        let Some(_slot) = self.slots.acquire(&message.sender).await else {
            tracing::warn!(sender = %message.sender, "Processing slots full, dropping message");
            return;
        };

        match tokio::time::timeout(self.settings.processing_timeout, self.process(&message)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(sender = %message.sender, error = %err, "Message processing failed");
            }
            Err(_) => {
                tracing::error!(
                    sender = %message.sender,
                    timeout_ms = self.settings.processing_timeout.as_millis() as u64,
                    "Message processing timed out"
                );
            }
        }
    }

    /// Consume the inbound channel, spawning one task per message so
    /// distinct senders process concurrently.
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<InboundMessage>,
        cancel: CancellationToken,
    ) where
        Cust: Send + Sync + 'static,
        Conv: Send + Sync + 'static,
        Ord: Send + Sync + 'static,
        Cat: Send + Sync + 'static,
        P: Send + Sync + 'static,
        G: Send + Sync + 'static,
    {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            let pipeline = self.clone();
            tokio::spawn(async move {
                pipeline.on_inbound(message).await;
            });
        }
        tracing::info!("Conversation pipeline stopped");
    }

    async fn process(&self, message: &InboundMessage) -> Result<(), PipelineError> {
        let customer = self.resolve_customer(message).await?;
        if customer.blocked {
            tracing::debug!(sender = %message.sender, "Blocked customer, dropping message");
            return Ok(());
        }

        let conversation = self.resolve_conversation(&customer, message).await?;
        self.bus.publish(EngineEvent::MessageReceived {
            account_id: message.account_id,
            conversation_id: conversation.id,
            customer_id: customer.id,
            preview: preview(&message.text),
        });

        let pending = self.orders.find_pending(&customer.id).await?;

        // An image while an order awaits payment is treated as the
        // payment proof; no generation happens for it.
        if message.kind == MessageKind::Image {
            if let Some(order) = pending {
                let proof_path = match &message.media {
                    Some(media) => self
                        .gateway
                        .fetch_media(message.account_id, media)
                        .await
                        .map(|path| path.to_string_lossy().into_owned()),
                    None => None,
                };
                self.save_inbound(&conversation, message, proof_path.clone())
                    .await?;
                self.orders.submit_payment_proof(&order, proof_path).await?;
                self.conversations.touch(&conversation.id).await?;
                return Ok(());
            }
        }

        self.save_inbound(&conversation, message, None).await?;

        let context = self
            .build_context(&customer, &conversation, pending)
            .await?;
        let request = self.context_builder.build(&context);

        let result = {
            let mut dispatcher = self.dispatcher.lock().await;
            dispatcher.generate(&request).await
        };
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(
                    sender = %message.sender,
                    error = %err,
                    "All providers exhausted, no reply generated"
                );
                return Ok(());
            }
        };

        let reply = ChatMessage {
            id: Uuid::now_v7(),
            conversation_id: conversation.id,
            direction: Direction::Outbound,
            kind: MessageKind::Text,
            content: result.content.clone(),
            media_path: None,
            provider_id: Some(result.provider_id),
            input_tokens: Some(result.input_tokens),
            output_tokens: Some(result.output_tokens),
            created_at: Utc::now(),
        };
        self.conversations.save_message(&reply).await?;
        self.conversations.touch(&conversation.id).await?;

        if let Err(err) = self
            .gateway
            .send_text(message.account_id, &message.sender, &result.content)
            .await
        {
            tracing::warn!(sender = %message.sender, error = %err, "Reply send failed");
        }

        self.bus.publish(EngineEvent::ReplySent {
            account_id: message.account_id,
            conversation_id: conversation.id,
            provider_name: result.provider_name,
            latency_ms: result.latency_ms,
        });
        Ok(())
    }

    async fn resolve_customer(&self, message: &InboundMessage) -> Result<Customer, PipelineError> {
        if let Some(customer) = self.customers.find_by_address(&message.sender).await? {
            return Ok(customer);
        }
        let customer = Customer {
            id: Uuid::now_v7(),
            address: message.sender.clone(),
            name: message.sender_name.clone(),
            language: None,
            blocked: false,
            total_orders: 0,
            total_spent_cents: 0,
            created_at: Utc::now(),
        };
        self.customers.create(&customer).await?;
        tracing::info!(address = %customer.address, "New customer created");
        Ok(customer)
    }

    async fn resolve_conversation(
        &self,
        customer: &Customer,
        message: &InboundMessage,
    ) -> Result<Conversation, PipelineError> {
        if let Some(conversation) = self
            .conversations
            .find_active(&customer.id, &message.account_id)
            .await?
        {
            return Ok(conversation);
        }
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::now_v7(),
            customer_id: customer.id,
            account_id: message.account_id,
            active: true,
            started_at: now,
            last_message_at: now,
        };
        self.conversations.create(&conversation).await?;
        Ok(conversation)
    }

    async fn save_inbound(
        &self,
        conversation: &Conversation,
        message: &InboundMessage,
        media_path: Option<String>,
    ) -> Result<(), PipelineError> {
        let record = ChatMessage {
            id: Uuid::now_v7(),
            conversation_id: conversation.id,
            direction: Direction::Inbound,
            kind: message.kind,
            content: message.text.clone(),
            media_path,
            provider_id: None,
            input_tokens: None,
            output_tokens: None,
            created_at: message.timestamp,
        };
        self.conversations.save_message(&record).await?;
        Ok(())
    }

    async fn build_context(
        &self,
        customer: &Customer,
        conversation: &Conversation,
        pending_order: Option<Order>,
    ) -> Result<ConversationContext, PipelineError> {
        let mut history: Vec<Message> = self
            .conversations
            .recent_messages(&conversation.id, self.settings.history_window)
            .await?
            .into_iter()
            .map(|m| Message {
                role: match m.direction {
                    Direction::Inbound => MessageRole::User,
                    Direction::Outbound => MessageRole::Assistant,
                },
                content: m.content,
            })
            .collect();
        // Repository returns newest first; the request wants oldest first
        history.reverse();

        let catalog = self.catalog.list_active_packages().await?;
        let business_profile = self.catalog.business_profile().await?;
        let selected_package = match &pending_order {
            Some(order) => self.catalog.get_package(&order.package_id).await?,
            None => None,
        };

        Ok(ConversationContext {
            customer: customer.clone(),
            history,
            pending_order,
            selected_package,
            catalog,
            business_profile,
        })
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use secrecy::SecretString;

    use vendly_types::chat::ServicePackage;
    use vendly_types::llm::{
        CompletionRequest, CompletionResponse, LlmError, ProviderConfig, ProviderKind, Usage,
        UsageRecord,
    };
    use vendly_types::order::OrderStatus;
    use vendly_types::transport::MediaRef;

    use crate::llm::{BoxGenerationBackend, DispatcherSettings, GenerationBackend};
    use crate::pipeline::test_support::{MemoryStore, RecordingGateway};

    // --- Dispatcher plumbing ---

    #[derive(Clone, Default)]
    struct NoopProviderRepo;

    impl ProviderRepository for NoopProviderRepo {
        async fn list_configs(&self) -> Result<Vec<ProviderConfig>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn record_usage(&self, _record: &UsageRecord) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn mark_exhausted(&self, _provider_id: &Uuid) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn reset_daily_usage(&self) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    struct FixedBackend {
        reply: String,
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    impl GenerationBackend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LlmError::AuthenticationFailed);
            }
            Ok(CompletionResponse {
                content: self.reply.clone(),
                model: request.model.clone(),
                usage: Usage {
                    input_tokens: 12,
                    output_tokens: 34,
                },
            })
        }
    }

    type TestPipeline = ConversationPipeline<
        MemoryStore,
        MemoryStore,
        MemoryStore,
        MemoryStore,
        NoopProviderRepo,
        RecordingGateway,
    >;

    struct Harness {
        pipeline: TestPipeline,
        store: MemoryStore,
        gateway: RecordingGateway,
        bus: EventBus,
        backend_calls: Arc<AtomicU32>,
    }

    fn make_harness(fail_generation: bool) -> Harness {
        let store = MemoryStore::default();
        store.set_profile("You are the Vendly sales assistant.");
        let gateway = RecordingGateway::default();
        let bus = EventBus::new();
        let backend_calls = Arc::new(AtomicU32::new(0));

        let backend = FixedBackend {
            reply: "Thanks for reaching out!".to_string(),
            calls: backend_calls.clone(),
            fail: fail_generation,
        };
        let config = ProviderConfig {
            id: Uuid::now_v7(),
            name: "primary".to_string(),
            kind: ProviderKind::OpenAiCompatible,
            api_key: SecretString::from("sk-test"),
            base_url: None,
            model: "test-model".to_string(),
            priority: 10,
            daily_limit: 100,
            used_today: 0,
            exhausted: false,
            enabled: true,
        };
        let dispatcher = ProviderDispatcher::new(
            vec![(config, BoxGenerationBackend::new(backend))],
            NoopProviderRepo,
            DispatcherSettings {
                generation_timeout: Duration::from_millis(200),
                retry_max_attempts: 1,
                retry_base_delay: Duration::from_millis(1),
                retry_max_delay: Duration::from_millis(2),
                circuit_failure_threshold: 3,
                circuit_open_duration: Duration::from_secs(30),
            },
        );

        let settings = PipelineSettings {
            history_window: 20,
            processing_timeout: Duration::from_secs(5),
            max_processing_slots: 50,
            max_tokens: 512,
        };
        let pipeline = ConversationPipeline::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(Mutex::new(dispatcher)),
            gateway.clone(),
            bus.clone(),
            settings,
        );

        Harness {
            pipeline,
            store,
            gateway,
            bus,
            backend_calls,
        }
    }

    fn text_message(sender: &str, body: &str) -> InboundMessage {
        InboundMessage {
            account_id: Uuid::now_v7(),
            sender: sender.to_string(),
            sender_name: Some("Dina".to_string()),
            from_group: false,
            kind: MessageKind::Text,
            text: body.to_string(),
            media: None,
            timestamp: Utc::now(),
        }
    }

    fn image_message(sender: &str) -> InboundMessage {
        InboundMessage {
            account_id: Uuid::now_v7(),
            sender: sender.to_string(),
            sender_name: None,
            from_group: false,
            kind: MessageKind::Image,
            text: "[image]".to_string(),
            media: Some(MediaRef {
                id: "proof-1".to_string(),
                mime_type: "image/jpeg".to_string(),
            }),
            timestamp: Utc::now(),
        }
    }

    fn seed_pending_order(harness: &Harness, sender: &str) -> (Customer, Order) {
        let customer = Customer {
            id: Uuid::now_v7(),
            address: sender.to_string(),
            name: None,
            language: None,
            blocked: false,
            total_orders: 0,
            total_spent_cents: 0,
            created_at: Utc::now(),
        };
        harness.store.insert_customer(customer.clone());

        let package = ServicePackage {
            id: Uuid::now_v7(),
            name: "Pro".to_string(),
            description: "one month".to_string(),
            price_cents: 29_99,
            currency: "USD".to_string(),
            active: true,
        };
        harness.store.insert_package(package.clone());

        let now = Utc::now();
        let order = Order {
            id: Uuid::now_v7(),
            reference: "VND-TEST-1".to_string(),
            customer_id: customer.id,
            package_id: package.id,
            account_id: Uuid::now_v7(),
            status: OrderStatus::Pending,
            price_cents: package.price_cents,
            currency: package.currency.clone(),
            payment_proof_path: None,
            created_at: now,
            updated_at: now,
        };
        harness.store.insert_order(order.clone());
        (customer, order)
    }

    // --- Tests ---

    #[test]
    fn test_settings_derive_from_engine_config() {
        let config = EngineConfig::default();
        let settings = PipelineSettings::from_engine_config(&config);
        assert_eq!(settings.history_window, config.history_window);
        assert_eq!(settings.max_processing_slots, config.max_processing_slots);
        assert_eq!(
            settings.processing_timeout,
            Duration::from_millis(config.processing_timeout_ms)
        );
        assert_eq!(settings.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[tokio::test]
    async fn test_text_message_generates_and_sends_reply() {
        let harness = make_harness(false);
        let mut rx = harness.bus.subscribe();

        harness
            .pipeline
            .on_inbound(text_message("15550001111", "hi, what do you sell?"))
            .await;

        let customers = harness.store.customers();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].address, "15550001111");

        let messages = harness.store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].direction, Direction::Inbound);
        assert_eq!(messages[1].direction, Direction::Outbound);
        assert_eq!(messages[1].content, "Thanks for reaching out!");
        assert!(messages[1].provider_id.is_some());

        let sent = harness.gateway.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].2, "Thanks for reaching out!");

        match rx.recv().await.unwrap() {
            EngineEvent::MessageReceived { preview, .. } => {
                assert_eq!(preview, "hi, what do you sell?");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            EngineEvent::ReplySent { provider_name, .. } => {
                assert_eq!(provider_name, "primary");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_group_message_ignored() {
        let harness = make_harness(false);
        let mut message = text_message("15550001111", "group chatter");
        message.from_group = true;

        harness.pipeline.on_inbound(message).await;

        assert!(harness.store.customers().is_empty());
        assert!(harness.store.messages().is_empty());
        assert_eq!(harness.backend_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blocked_customer_dropped_silently() {
        let harness = make_harness(false);
        harness.store.insert_customer(Customer {
            id: Uuid::now_v7(),
            address: "15550001111".to_string(),
            name: None,
            language: None,
            blocked: true,
            total_orders: 0,
            total_spent_cents: 0,
            created_at: Utc::now(),
        });

        harness
            .pipeline
            .on_inbound(text_message("15550001111", "hello?"))
            .await;

        assert!(harness.store.messages().is_empty());
        assert!(harness.gateway.sent.lock().unwrap().is_empty());
        assert_eq!(harness.backend_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_payment_proof_short_circuits_generation() {
        let harness = make_harness(false);
        harness
            .store
            .insert_template("payment_confirmation", "Got your proof for {reference}!");
        let (_, order) = seed_pending_order(&harness, "15550001111");

        harness.pipeline.on_inbound(image_message("15550001111")).await;

        // Order advanced with the stored proof path, no generation ran
        let orders = harness.store.orders();
        assert_eq!(orders[0].status, OrderStatus::PaymentSubmitted);
        assert_eq!(
            orders[0].payment_proof_path.as_deref(),
            Some("/tmp/media-proof-1.bin")
        );
        assert_eq!(harness.backend_calls.load(Ordering::SeqCst), 0);

        let sent = harness.gateway.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].2, format!("Got your proof for {}!", order.reference));

        let messages = harness.store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, Direction::Inbound);
        assert_eq!(messages[0].kind, MessageKind::Image);
    }

    #[tokio::test]
    async fn test_image_without_pending_order_is_conversational() {
        let harness = make_harness(false);
        harness.pipeline.on_inbound(image_message("15550001111")).await;

        assert_eq!(harness.backend_calls.load(Ordering::SeqCst), 1);
        let sent = harness.gateway.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].2, "Thanks for reaching out!");
    }

    #[tokio::test]
    async fn test_generation_failure_drops_reply_silently() {
        let harness = make_harness(true);
        harness
            .pipeline
            .on_inbound(text_message("15550001111", "hello"))
            .await;

        // Inbound persisted, but no reply generated or sent
        let messages = harness.store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, Direction::Inbound);
        assert!(harness.gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_window_feeds_context() {
        let harness = make_harness(false);
        let first = text_message("15550001111", "first message");
        let mut second = text_message("15550001111", "second message");
        second.account_id = first.account_id;

        harness.pipeline.on_inbound(first).await;
        harness.pipeline.on_inbound(second).await;

        // first inbound + first reply + second inbound + second reply
        let messages = harness.store.messages();
        assert_eq!(messages.len(), 4);
        // One conversation reused across both messages
        let conversation_ids: std::collections::HashSet<Uuid> =
            messages.iter().map(|m| m.conversation_id).collect();
        assert_eq!(conversation_ids.len(), 1);
    }
}
