//! In-process publish/subscribe mediator.
//!
//! This crate connects event producers (domain logic) to handlers without
//! coupling them: a [`Mediator`] holds a read-only registry from message
//! kind to ordered handlers, built once at startup, and dispatches
//! synchronously in the caller's task. Per-operation state lives in an
//! [`OperationScope`] carried through each publish call, so the mediator
//! itself is shared freely via `Arc` and never reached through globals.
//!
//! Post-commit subscribers (e.g. an outbound relay) are a separate list:
//! their failures are collected as [`DeliveryFailure`]s instead of
//! propagating, because by then the unit of work has already committed.

pub mod bus;
pub mod error;
pub mod handler;
pub mod message;
pub mod scope;

pub use bus::{Mediator, MediatorBuilder};
pub use error::{DeliveryError, DeliveryFailure, DispatchError, Result};
pub use handler::{
    EventStagingHandler, MessageHandler, NotificationBufferingHandler, PostCommitHandler,
};
pub use message::{Message, MessageKind};
pub use scope::OperationScope;
