//! Input sources that push sensor values into accessories.
//!
//! - `mqtt`: broker subscriptions mapped to characteristics
//! - `notification`: HTTP endpoint receiving `{characteristic, value}` pushes

pub mod mqtt;
pub mod notification;
