pub mod commission;
pub mod distributor;
pub mod health;
pub mod webhook;
