use chrono::{DateTime, SubsecRound, Utc};

/// Default name of the ledger collection
pub const MIGRATIONS_COLLECTION: &str = "migrations";

/// Current time truncated to milliseconds, the precision BSON dates store
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
