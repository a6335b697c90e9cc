//! Slack side of the welcome bot.
//!
//! - **Payloads** (`payload`, `commands`) - Events API bodies and slash command forms
//! - **Events** (`events`) - typed events, dispatcher and per-type handlers
//! - **Bot** (`bot`) - counting, moderation and welcome flow behind the handlers
//! - **Welcome** (`welcome`) - welcome message lifecycle, one writer at a time
//! - **Schedule** (`schedule`) - startup scheduled-message bootstrap
//! - **Gateway** (`gateway`) - outbound Web API calls
//! - **Block Kit** (`blocks`) - message rendering
//!
//! # Architecture
//!
//! ```text
//! HTTP body → parse_events_api_payload → EventDispatcher → Handlers → BotRuntime
//!                                                                       ↓
//!                                                   MessagingGateway ← Block Kit
//! ```

pub mod blocks;
pub mod bot;
pub mod commands;
pub mod events;
pub mod gateway;
pub mod payload;
pub mod schedule;
pub mod welcome;
