//! Domain models for parking-service.

mod debt;
mod discount;
mod payment;
mod pricing;
mod session;
mod shift;

pub use debt::{CreateDebt, Debt, DebtOrigin, DebtStatus, ListDebtsFilter};
pub use discount::{DiscountType, SessionDiscount};
pub use payment::{CreatePayment, Payment, PaymentMethod, PaymentStatus};
pub use pricing::{PricingProfile, PricingRule, RuleType};
pub use session::{CreateSession, ParkingSession, SessionStatus};
pub use shift::{
    CashAdjustment, OpenShift, OperationKind, Shift, ShiftOperation, ShiftStatus, ShiftTotals,
};
