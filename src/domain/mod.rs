pub mod accrual;
pub mod amount;
pub mod balance;
pub mod models;
pub mod period;
pub mod policy;
pub mod resource;
pub mod time;
