pub mod dispatch;
pub mod reconcile;
pub mod seed;
