//! All available migrations.
//!
//! Each module exposes an `entry()` registered in
//! [`create_registry`](crate::migration::create_registry). Module names mirror
//! the migration identifier, which must follow
//! `v<major>.<minor>.<patch>_<name>_<order>`.

pub mod v0_0_0_create_migrations;
pub mod v0_0_1_create_users;
