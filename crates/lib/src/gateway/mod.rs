//! Gateway: HTTP surface for the messaging webhook, health checks and session admin.
//!
//! Webhook deliveries are validated, then eligible events are handed to the per-phone
//! dispatcher so each customer's turns apply in arrival order.

mod protocol;
mod server;

pub use protocol::{EventResult, EventStatus, HealthChecks, HealthReport, WebhookResponse};
pub use server::{router, run_gateway, GatewayState};
