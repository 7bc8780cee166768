//! `SeaORM` entities for the commission schema

pub mod commission;
pub mod commission_rule_set;
pub mod commission_run;
pub mod distributor;
pub mod matrix_position;
pub mod notification;
pub mod order;
pub mod order_item;
pub mod rank_achievement;
pub mod sea_orm_active_enums;
pub mod stripe_event;
