pub mod audit;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extraction;
pub mod flows;
pub mod signals;
pub mod slots;
pub mod text;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::message::{Message, MessageKind, OrderSnapshot, Sender};
pub use domain::order::{CustomerSlot, LineItem, Order, OrderId, OrderStatus};
pub use domain::product::{Product, ProductId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use extraction::{EntityExtractor, Extraction, QuantityError};
pub use flows::{CheckoutFlow, FlowEngine};
pub use slots::{HeuristicSlotDetector, SlotDetector};
