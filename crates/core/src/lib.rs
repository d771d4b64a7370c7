pub mod access;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod money;
pub mod pricing;

pub use access::{authorize, Access, Actor, AuthorizationPort, Capability, QuotationAction, Role};
pub use auth::TokenCodec;
pub use domain::catalog::{Part, PartId, Service, ServiceId};
pub use domain::customer::{Customer, CustomerId};
pub use domain::line_item::{LineItem, LineItemId, LineItemInput, LineKind, PreparedLine};
pub use domain::quotation::{Quotation, QuotationId, QuotationStatus};
pub use domain::vehicle::{Vehicle, VehicleId};
pub use domain::workorder::{WorkOrder, WorkOrderId, WorkOrderStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pricing::{DiscountRule, DisplayTotals, QuotationTotals};
