//! Interceptors composing an element's behaviour.
//!
//! Elements are wrapped, outermost first, by [`ConditionInterceptor`],
//! [`TransactionInterceptor`] (scripts with `new_tx`),
//! [`ErrorPolicyInterceptor`], [`ConnectionInterceptor`] and
//! [`StatisticsInterceptor`]. A skipped element therefore opens no connection
//! and records no statistics, and a failure continued by the error policy has
//! already been counted.
//!
//! This is the reverse of the usual wrapping order, where statistics and
//! connection binding sit outside the condition. In that order a skipped
//! element would still bind its connection, opening a lazy one, and count an
//! invocation. Keeping the condition outermost is what lets a skipped element
//! leave no trace.

mod condition;
mod connection;
mod error;
mod statistics;
mod transaction;

pub(crate) use condition::ConditionInterceptor;
pub(crate) use connection::ConnectionInterceptor;
pub(crate) use error::{ErrorHandling, ErrorPolicyInterceptor};
pub(crate) use statistics::StatisticsInterceptor;
pub(crate) use transaction::TransactionInterceptor;
