//! Inbound webhook processing: verify, parse, dispatch.
//!
//! Per request the pipeline is `received → verifying → {verified → parsed
//! → dispatched} | rejected`, and verification fails closed. The dispatcher
//! is stateless; de-duplication by event id belongs to the external event
//! store. This module is the only place connector errors become HTTP
//! statuses.

use billkit_interfaces::{
    api::PaymentProvider,
    errors::ConnectorError,
    events::{
        ChargebackCreatedData, CheckoutCompletedData, PaymentEvent, PaymentEventKind,
        PaymentFailedData, PaymentSucceededData, RefundCreatedData, SubscriptionCancelledData,
        SubscriptionEventData,
    },
    webhooks::IncomingWebhookRequestDetails,
};
use common_utils::{errors::CustomResult, logger};
use http::StatusCode;

/// Failure inside a caller-registered event handler.
#[derive(Debug, thiserror::Error)]
pub enum WebhookProcessingError {
    #[error("Event handler failed")]
    EventHandlingFailed,
}

/// Caller-supplied reactions to canonical events. Every method defaults to
/// a no-op so a caller only registers what it cares about; the dispatcher
/// invokes at most one method per delivery.
#[async_trait::async_trait]
pub trait PaymentEventHandler: Send + Sync {
    async fn on_checkout_completed(
        &self,
        _event: &PaymentEvent,
        _data: &CheckoutCompletedData,
    ) -> CustomResult<(), WebhookProcessingError> {
        Ok(())
    }

    async fn on_subscription_created(
        &self,
        _event: &PaymentEvent,
        _data: &SubscriptionEventData,
    ) -> CustomResult<(), WebhookProcessingError> {
        Ok(())
    }

    async fn on_subscription_updated(
        &self,
        _event: &PaymentEvent,
        _data: &SubscriptionEventData,
    ) -> CustomResult<(), WebhookProcessingError> {
        Ok(())
    }

    async fn on_subscription_renewed(
        &self,
        _event: &PaymentEvent,
        _data: &SubscriptionEventData,
    ) -> CustomResult<(), WebhookProcessingError> {
        Ok(())
    }

    async fn on_subscription_cancelled(
        &self,
        _event: &PaymentEvent,
        _data: &SubscriptionCancelledData,
    ) -> CustomResult<(), WebhookProcessingError> {
        Ok(())
    }

    async fn on_payment_succeeded(
        &self,
        _event: &PaymentEvent,
        _data: &PaymentSucceededData,
    ) -> CustomResult<(), WebhookProcessingError> {
        Ok(())
    }

    async fn on_payment_failed(
        &self,
        _event: &PaymentEvent,
        _data: &PaymentFailedData,
    ) -> CustomResult<(), WebhookProcessingError> {
        Ok(())
    }

    async fn on_refund_created(
        &self,
        _event: &PaymentEvent,
        _data: &RefundCreatedData,
    ) -> CustomResult<(), WebhookProcessingError> {
        Ok(())
    }

    async fn on_chargeback_created(
        &self,
        _event: &PaymentEvent,
        _data: &ChargebackCreatedData,
    ) -> CustomResult<(), WebhookProcessingError> {
        Ok(())
    }
}

/// Which path a delivery took through the pipeline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WebhookOutcome {
    /// Verified, parsed and handled.
    Dispatched { event_id: String },
    /// Verified but the vendor event type has no canonical mapping;
    /// acknowledged so the vendor stops redelivering.
    Ignored { event_type: String },
    /// Signature or payload did not hold up. The body was never processed.
    Rejected,
    /// The registered handler failed; the vendor should redeliver.
    HandlerFailed { event_id: String },
}

/// The HTTP answer the route layer should write, with the taken path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WebhookAck {
    pub status: StatusCode,
    pub outcome: WebhookOutcome,
}

/// Run one inbound delivery through verification, parsing and dispatch.
pub async fn process_incoming_webhook(
    connector: &dyn PaymentProvider,
    handler: &dyn PaymentEventHandler,
    request: IncomingWebhookRequestDetails<'_>,
) -> WebhookAck {
    let event = match connector.parse_webhook_event(&request) {
        Ok(event) => event,
        Err(error) => return reject(&error),
    };

    logger::info!(
        event_id = %event.id,
        event_type = event.kind.event_type(),
        provider = %event.provider,
        "Dispatching webhook event"
    );

    match dispatch(handler, &event).await {
        Ok(()) => WebhookAck {
            status: StatusCode::OK,
            outcome: WebhookOutcome::Dispatched { event_id: event.id },
        },
        Err(error) => {
            // Surface a 5xx so the vendor redelivers; the event is not
            // considered seen until a handler completes.
            logger::error!(?error, event_id = %event.id, "Webhook handler failed");
            WebhookAck {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                outcome: WebhookOutcome::HandlerFailed { event_id: event.id },
            }
        }
    }
}

fn reject(error: &error_stack::Report<ConnectorError>) -> WebhookAck {
    match error.current_context() {
        ConnectorError::UnhandledEventType { event_type } => {
            logger::info!(event_type = %event_type, "Ignoring unmapped vendor event");
            WebhookAck {
                status: StatusCode::OK,
                outcome: WebhookOutcome::Ignored {
                    event_type: event_type.clone(),
                },
            }
        }
        _ => {
            logger::warn!(?error, "Rejecting webhook delivery");
            WebhookAck {
                status: StatusCode::BAD_REQUEST,
                outcome: WebhookOutcome::Rejected,
            }
        }
    }
}

async fn dispatch(
    handler: &dyn PaymentEventHandler,
    event: &PaymentEvent,
) -> CustomResult<(), WebhookProcessingError> {
    match &event.kind {
        PaymentEventKind::CheckoutCompleted(data) => {
            handler.on_checkout_completed(event, data).await
        }
        PaymentEventKind::SubscriptionCreated(data) => {
            handler.on_subscription_created(event, data).await
        }
        PaymentEventKind::SubscriptionUpdated(data) => {
            handler.on_subscription_updated(event, data).await
        }
        PaymentEventKind::SubscriptionRenewed(data) => {
            handler.on_subscription_renewed(event, data).await
        }
        PaymentEventKind::SubscriptionCancelled(data) => {
            handler.on_subscription_cancelled(event, data).await
        }
        PaymentEventKind::PaymentSucceeded(data) => handler.on_payment_succeeded(event, data).await,
        PaymentEventKind::PaymentFailed(data) => handler.on_payment_failed(event, data).await,
        PaymentEventKind::RefundCreated(data) => handler.on_refund_created(event, data).await,
        PaymentEventKind::ChargebackCreated(data) => {
            handler.on_chargeback_created(event, data).await
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::sync::atomic::{AtomicU32, Ordering};

    use billkit_interfaces::{
        api::{CheckoutSessionRequest, PaymentProvider},
        events::{CheckoutSession, Provider, Subscription},
    };
    use common_utils::ext_traits::ByteSliceExt;
    use time::macros::datetime;

    use super::*;

    /// Parses the test body as a canonical event directly; "bad-signature"
    /// and "unknown-type" bodies simulate the adapter's failure modes.
    struct FakeConnector;

    #[async_trait::async_trait]
    impl PaymentProvider for FakeConnector {
        fn id(&self) -> Provider {
            Provider::Cardlane
        }

        async fn create_checkout_session(
            &self,
            _request: &CheckoutSessionRequest,
        ) -> CustomResult<CheckoutSession, ConnectorError> {
            Err(ConnectorError::FlowNotSupported {
                flow: "Checkout".to_string(),
                connector: "fake",
            }
            .into())
        }

        async fn get_subscription(
            &self,
            _subscription_id: &str,
        ) -> CustomResult<Option<Subscription>, ConnectorError> {
            Ok(None)
        }

        async fn cancel_subscription(
            &self,
            _subscription_id: &str,
            _immediately: bool,
        ) -> CustomResult<(), ConnectorError> {
            Ok(())
        }

        fn parse_webhook_event(
            &self,
            request: &IncomingWebhookRequestDetails<'_>,
        ) -> CustomResult<PaymentEvent, ConnectorError> {
            if request.body == b"bad-signature" {
                Err(ConnectorError::InvalidSignature.into())
            } else if request.body == b"unknown-type" {
                Err(ConnectorError::UnhandledEventType {
                    event_type: "vendor.esoteric.event".to_string(),
                }
                .into())
            } else {
                request
                    .body
                    .parse_struct("PaymentEvent")
                    .map_err(|err| err.change_context(ConnectorError::WebhookBodyDecodingFailed))
            }
        }
    }

    #[derive(Default)]
    struct CountingHandler {
        payment_failed: AtomicU32,
        fail_dispatch: bool,
    }

    #[async_trait::async_trait]
    impl PaymentEventHandler for CountingHandler {
        async fn on_payment_failed(
            &self,
            _event: &PaymentEvent,
            _data: &PaymentFailedData,
        ) -> CustomResult<(), WebhookProcessingError> {
            self.payment_failed.fetch_add(1, Ordering::SeqCst);
            if self.fail_dispatch {
                Err(WebhookProcessingError::EventHandlingFailed.into())
            } else {
                Ok(())
            }
        }
    }

    fn event_body() -> Vec<u8> {
        serde_json::to_vec(&PaymentEvent {
            id: "evt_1".to_string(),
            provider: Provider::Cardlane,
            timestamp: datetime!(2024-03-01 12:00),
            kind: PaymentEventKind::PaymentFailed(PaymentFailedData {
                invoice_id: "in_1".to_string(),
                subscription_id: Some("sub_1".to_string()),
                customer_id: "cus_1".to_string(),
                error_message: "card_declined".to_string(),
            }),
        })
        .unwrap()
    }

    fn request(body: &[u8]) -> IncomingWebhookRequestDetails<'_> {
        static EMPTY: std::sync::OnceLock<http::HeaderMap> = std::sync::OnceLock::new();
        IncomingWebhookRequestDetails {
            method: http::Method::POST,
            headers: EMPTY.get_or_init(http::HeaderMap::new),
            body,
            query_params: String::new(),
        }
    }

    #[tokio::test]
    async fn dispatched_event_invokes_exactly_one_handler() {
        let handler = CountingHandler::default();
        let body = event_body();

        let ack = process_incoming_webhook(&FakeConnector, &handler, request(&body)).await;

        assert_eq!(ack.status, StatusCode::OK);
        assert_eq!(
            ack.outcome,
            WebhookOutcome::Dispatched {
                event_id: "evt_1".to_string()
            }
        );
        assert_eq!(handler.payment_failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bad_signature_maps_to_400_and_never_reaches_handlers() {
        let handler = CountingHandler::default();

        let ack =
            process_incoming_webhook(&FakeConnector, &handler, request(b"bad-signature")).await;

        assert_eq!(ack.status, StatusCode::BAD_REQUEST);
        assert_eq!(ack.outcome, WebhookOutcome::Rejected);
        assert_eq!(handler.payment_failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unhandled_vendor_event_is_acknowledged_with_200() {
        let handler = CountingHandler::default();

        let ack =
            process_incoming_webhook(&FakeConnector, &handler, request(b"unknown-type")).await;

        assert_eq!(ack.status, StatusCode::OK);
        assert_eq!(
            ack.outcome,
            WebhookOutcome::Ignored {
                event_type: "vendor.esoteric.event".to_string()
            }
        );
    }

    #[tokio::test]
    async fn handler_failure_surfaces_as_500_for_vendor_redelivery() {
        let handler = CountingHandler {
            fail_dispatch: true,
            ..Default::default()
        };
        let body = event_body();

        let ack = process_incoming_webhook(&FakeConnector, &handler, request(&body)).await;

        assert_eq!(ack.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ack.outcome,
            WebhookOutcome::HandlerFailed {
                event_id: "evt_1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn duplicate_delivery_gets_an_identical_ack() {
        let handler = CountingHandler::default();
        let body = event_body();

        let first = process_incoming_webhook(&FakeConnector, &handler, request(&body)).await;
        let second = process_incoming_webhook(&FakeConnector, &handler, request(&body)).await;

        assert_eq!(first, second);
        assert_eq!(handler.payment_failed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_not_server_error() {
        let handler = CountingHandler::default();

        let ack = process_incoming_webhook(&FakeConnector, &handler, request(b"{not json")).await;

        assert_eq!(ack.status, StatusCode::BAD_REQUEST);
        assert_eq!(ack.outcome, WebhookOutcome::Rejected);
    }
}
